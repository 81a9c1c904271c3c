use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::binding::BindingKind;

#[derive(Clone, Deserialize)]
pub struct Config {
    /// Capabilities URL of the service under test
    pub endpoint: String,
    #[serde(default)]
    pub preferred_binding: Option<BindingKind>,
    /// Local copy of the capabilities document, used instead of fetching it
    #[serde(default)]
    pub capabilities_path: Option<String>,
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_stored_query_retries")]
    pub stored_query_retries: u32,
    #[serde(default = "default_stored_query_backoff_ms")]
    pub stored_query_backoff_ms: u64,
    #[serde(default = "default_lock_expiry_secs")]
    pub lock_expiry_secs: u64,
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Value of the Authorization header sent with every request
    #[serde(default)]
    pub authorization: Option<String>,
}

// Custom Debug implementation to keep credentials out of the logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("preferred_binding", &self.preferred_binding)
            .field("capabilities_path", &self.capabilities_path)
            .field("sample_size", &self.sample_size)
            .field("concurrency", &self.concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("stored_query_retries", &self.stored_query_retries)
            .field("stored_query_backoff_ms", &self.stored_query_backoff_ms)
            .field("lock_expiry_secs", &self.lock_expiry_secs)
            .field("random_seed", &self.random_seed)
            .field("authorization", &self.authorization.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn default_sample_size() -> usize {
    25
}

fn default_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_stored_query_retries() -> u32 {
    5
}

fn default_stored_query_backoff_ms() -> u64 {
    250
}

fn default_lock_expiry_secs() -> u64 {
    60
}

impl Config {
    pub fn load() -> Result<Arc<Self>, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("wfsconform").required(false))
            .add_source(
                config::Environment::with_prefix("WFSCONFORM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Config = config.try_deserialize()?;
        Ok(Arc::new(settings.normalized()))
    }

    /// Configuration for a given endpoint with every other field at its default.
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            preferred_binding: None,
            capabilities_path: None,
            sample_size: default_sample_size(),
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            stored_query_retries: default_stored_query_retries(),
            stored_query_backoff_ms: default_stored_query_backoff_ms(),
            lock_expiry_secs: default_lock_expiry_secs(),
            random_seed: None,
            authorization: None,
        }
    }

    fn normalized(mut self) -> Self {
        if self.sample_size == 0 {
            self.sample_size = default_sample_size();
        }
        if self.concurrency == 0 {
            self.concurrency = 1;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stored_query_backoff(&self) -> Duration {
        Duration::from_millis(self.stored_query_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(default_sample_size(), 25);
        assert_eq!(default_concurrency(), 4);
        assert_eq!(default_request_timeout_secs(), 30);
        assert_eq!(default_lock_expiry_secs(), 60);
    }

    #[test]
    fn test_normalized_guards_zero_values() {
        let mut config = Config::for_endpoint("http://localhost:8080/wfs");
        config.sample_size = 0;
        config.concurrency = 0;
        let config = config.normalized();
        assert_eq!(config.sample_size, 25);
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn test_debug_redacts_authorization() {
        let mut config = Config::for_endpoint("http://localhost:8080/wfs");
        config.authorization = Some("Basic c2VjcmV0".to_string());
        let debug = format!("{:?}", config);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("c2VjcmV0"));
    }
}
