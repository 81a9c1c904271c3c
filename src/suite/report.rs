use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::capabilities::ConformanceClass;
use crate::error::{ConformanceError, Verdict, Violation};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub name: String,
    pub class: String,
    pub verdict: Verdict,
    /// Failure summary or skip reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    pub duration_ms: u64,
}

impl TestOutcome {
    pub fn passed(name: &str, class: ConformanceClass, duration_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            class: class.to_string(),
            verdict: Verdict::Pass,
            reason: None,
            violations: Vec::new(),
            duration_ms,
        }
    }

    pub fn skipped(name: &str, class: ConformanceClass, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            class: class.to_string(),
            verdict: Verdict::Skip,
            reason: Some(reason.into()),
            violations: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Classify an error: inapplicable and unsupported become skips, everything else fails.
    pub fn from_error(
        name: &str,
        class: ConformanceClass,
        error: &ConformanceError,
        duration_ms: u64,
    ) -> Self {
        let reason = match error {
            ConformanceError::Inapplicable(reason) => reason.clone(),
            other => other.to_string(),
        };
        Self {
            name: name.to_string(),
            class: class.to_string(),
            verdict: error.verdict(),
            reason: Some(reason),
            violations: error.violations(),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<TestOutcome>,
    /// Problems outside any single test, e.g. teardown failures
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl RunReport {
    pub fn new(
        endpoint: String,
        version: Option<String>,
        started_at: DateTime<Utc>,
        mut outcomes: Vec<TestOutcome>,
    ) -> Self {
        outcomes.sort_by(|a, b| a.class.cmp(&b.class).then_with(|| a.name.cmp(&b.name)));
        let count = |verdict: Verdict| outcomes.iter().filter(|o| o.verdict == verdict).count();
        Self {
            endpoint,
            version,
            started_at,
            finished_at: Utc::now(),
            passed: count(Verdict::Pass),
            failed: count(Verdict::Fail),
            skipped: count(Verdict::Skip),
            outcomes,
            errors: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || !self.errors.is_empty()
    }

    pub fn outcome(&self, name: &str) -> Option<&TestOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}
