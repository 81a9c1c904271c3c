use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

use crate::binding::{HttpTransport, Operation, WfsClient, WfsRequest};
use crate::capabilities::{CapabilityModel, app_schema};
use crate::config::Config;
use crate::error::{ConformanceError, ConformanceResult};
use crate::filter::{FilterBuilder, FilterOptions};
use crate::services::{
    DataSampler, FeatureSample, KeyedLocks, PagingController, StoredQueryManager, TransactionEngine,
};
use crate::validation::{ResponseValidator, SchemaRef};
use crate::xml::namespaces::WFS;
use crate::xml::{Element, QName};

/// Version requested from the service; 2.0.0 services answer with their own.
const REQUESTED_VERSION: &str = "2.0.2";

/// Everything a test needs, created once per run and shared by reference.
pub struct SuiteContext {
    pub config: Arc<Config>,
    pub client: Arc<WfsClient>,
    pub validator: ResponseValidator,
    pub sampler: DataSampler,
    pub transactions: TransactionEngine,
    pub stored_queries: StoredQueryManager,
    pub paging: PagingController,
    shut_down: AtomicBool,
}

impl SuiteContext {
    /// Read capabilities, negotiate the binding, describe every feature type
    /// and count its instances.
    pub async fn initialize(config: Arc<Config>) -> ConformanceResult<Self> {
        let transport = HttpTransport::new(&config)?;
        let source = match &config.capabilities_path {
            Some(path) => {
                tracing::info!(path = %path, "Reading capabilities from file");
                tokio::fs::read_to_string(path).await?
            }
            None => {
                let endpoint = Url::parse(&config.endpoint)?;
                let response =
                    WfsClient::fetch_capabilities(&transport, &endpoint, REQUESTED_VERSION).await?;
                if !response.is_success() {
                    return Err(ConformanceError::transport(format!(
                        "GetCapabilities answered HTTP {}",
                        response.status
                    ))
                    .with_exchange(&response.exchange));
                }
                response.body
            }
        };
        let mut capabilities = CapabilityModel::parse(&source)?;
        tracing::info!(
            version = %capabilities.version,
            feature_types = capabilities.feature_types.len(),
            conformance = ?capabilities.conformance,
            "Parsed capabilities"
        );

        let bootstrap = WfsClient::new(
            Arc::new(capabilities.clone()),
            transport.clone(),
            config.preferred_binding,
        );
        let type_names: Vec<QName> = capabilities.feature_types.keys().cloned().collect();
        for type_name in &type_names {
            let properties = describe_feature_type(&bootstrap, type_name).await;
            let count = count_hits(&bootstrap, type_name).await;
            if let Some(info) = capabilities.feature_types.get_mut(type_name) {
                match properties {
                    Ok(properties) => info.properties = properties,
                    Err(e) => tracing::warn!(
                        type_name = %type_name.prefixed(),
                        "DescribeFeatureType failed: {}", e
                    ),
                }
                info.count_estimate = count;
            }
        }

        let client = Arc::new(WfsClient::new(
            Arc::new(capabilities),
            transport,
            config.preferred_binding,
        ));
        tracing::info!(binding = ?client.negotiated_binding(), "Negotiated binding");

        let validator = ResponseValidator::default();
        let locks = Arc::new(KeyedLocks::new());
        Ok(Self {
            sampler: DataSampler::new(client.clone(), config.sample_size),
            transactions: TransactionEngine::new(
                client.clone(),
                validator.clone(),
                locks.clone(),
                Duration::from_secs(config.lock_expiry_secs),
            ),
            stored_queries: StoredQueryManager::new(
                client.clone(),
                validator.clone(),
                locks,
                config.stored_query_retries,
                config.stored_query_backoff(),
            ),
            paging: PagingController::new(client.clone(), validator.clone()),
            validator,
            client,
            config,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn capabilities(&self) -> &CapabilityModel {
        self.client.capabilities()
    }

    pub fn filter_builder(&self) -> FilterBuilder<'_> {
        FilterBuilder::new(self.capabilities())
    }

    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            random_seed: self.config.random_seed,
            ..FilterOptions::default()
        }
    }

    /// First advertised feature type holding data, with its sample.
    pub async fn sampled_type(&self) -> ConformanceResult<(QName, Arc<FeatureSample>)> {
        for type_name in self.capabilities().feature_types.keys() {
            let sample = self.sampler.sample(type_name).await?;
            if !sample.is_empty() {
                return Ok((type_name.clone(), sample));
            }
        }
        Err(ConformanceError::Inapplicable(
            "SUT reports zero instances for every feature type".to_string(),
        ))
    }

    /// Every advertised feature type holding data, with its sample.
    pub async fn sampled_types(&self) -> ConformanceResult<Vec<(QName, Arc<FeatureSample>)>> {
        let mut found = Vec::new();
        for type_name in self.capabilities().feature_types.keys() {
            let sample = self.sampler.sample(type_name).await?;
            if !sample.is_empty() {
                found.push((type_name.clone(), sample));
            }
        }
        if found.is_empty() {
            return Err(ConformanceError::Inapplicable(
                "SUT reports zero instances for every feature type".to_string(),
            ));
        }
        Ok(found)
    }

    /// Tests that mutate the service skip once a compensation has failed.
    pub fn require_clean_baseline(&self) -> ConformanceResult<()> {
        if self.transactions.is_dirty() {
            Err(ConformanceError::Inapplicable(
                "baseline is no longer clean after a failed compensation".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// Undo remaining mutations and drop created stored queries. Runs once.
    pub async fn shutdown(&self) -> ConformanceResult<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let transactions = self.transactions.shutdown().await;
        let stored_queries = self.stored_queries.cleanup().await;
        tracing::info!(
            transactions = self.transactions.records().len(),
            "Suite teardown complete"
        );
        transactions.and(stored_queries)
    }
}

async fn describe_feature_type(
    client: &WfsClient,
    type_name: &QName,
) -> ConformanceResult<Vec<crate::capabilities::PropertyDescriptor>> {
    let request = WfsRequest::new(Operation::DescribeFeatureType, client.version()).child(
        Element::new(WFS, "TypeName")
            .declare_name(type_name)
            .text(type_name.prefixed()),
    );
    let response = client.send(&request).await?;
    ResponseValidator::default().require_success(&response, SchemaRef::Schema)?;
    app_schema::properties_for(&response.body, type_name)
}

async fn count_hits(client: &WfsClient, type_name: &QName) -> Option<u64> {
    let request = WfsRequest::get_feature(client.version(), type_name, None).attr("resultType", "hits");
    let response = client.send(&request).await.ok()?;
    let doc = response.document().ok()?;
    doc.root_element()
        .attribute("numberMatched")
        .and_then(|m| m.parse().ok())
}

/// Owner of the one-time initialization barrier. Every test awaits the same
/// context; a failed initialization is retried by the next caller.
pub struct Suite {
    config: Arc<Config>,
    context: OnceCell<Arc<SuiteContext>>,
}

impl Suite {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            context: OnceCell::new(),
        }
    }

    pub async fn context(&self) -> ConformanceResult<Arc<SuiteContext>> {
        self.context
            .get_or_try_init(|| async {
                SuiteContext::initialize(self.config.clone()).await.map(Arc::new)
            })
            .await
            .cloned()
    }

    /// Tear down the context if it was ever created.
    pub async fn shutdown(&self) -> ConformanceResult<()> {
        match self.context.get() {
            Some(context) => context.shutdown().await,
            None => Ok(()),
        }
    }
}
