use serde::Serialize;
use thiserror::Error;

use crate::binding::Exchange;

/// Outcome of a single conformance test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    Transport,
    Schema,
    BusinessRule,
    Concurrency,
    Compensation,
}

/// A single reportable problem, optionally tied to the exchange that exposed it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<Exchange>,
}

impl Violation {
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            exchange: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ConformanceError {
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        exchange: Option<Box<Exchange>>,
    },

    #[error("Schema violation: {}", summarize(.0))]
    SchemaViolation(Vec<Violation>),

    #[error("Business rule violation: {}", summarize(.0))]
    BusinessRuleViolation(Vec<Violation>),

    #[error("Unsupported predicate: {0}")]
    UnsupportedPredicate(String),

    #[error("Inapplicable: {0}")]
    Inapplicable(String),

    #[error("Concurrency violation: {message}")]
    ConcurrencyViolation {
        message: String,
        exchange: Option<Box<Exchange>>,
    },

    #[error("Compensation failure: {0}")]
    CompensationFailure(String),
}

fn summarize(violations: &[Violation]) -> String {
    match violations {
        [] => "no details".to_string(),
        [only] => only.message.clone(),
        [first, rest @ ..] => format!("{} (and {} more)", first.message, rest.len()),
    }
}

impl ConformanceError {
    pub fn transport(message: impl Into<String>) -> Self {
        ConformanceError::Transport {
            message: message.into(),
            exchange: None,
        }
    }

    pub fn business_rule(message: impl Into<String>) -> Self {
        ConformanceError::BusinessRuleViolation(vec![Violation::new(
            ViolationKind::BusinessRule,
            message,
        )])
    }

    pub fn schema(message: impl Into<String>) -> Self {
        ConformanceError::SchemaViolation(vec![Violation::new(ViolationKind::Schema, message)])
    }

    pub fn concurrency(message: impl Into<String>) -> Self {
        ConformanceError::ConcurrencyViolation {
            message: message.into(),
            exchange: None,
        }
    }

    /// Attach the request/response pair that produced this error.
    pub fn with_exchange(self, exchange: &Exchange) -> Self {
        match self {
            ConformanceError::Transport { message, .. } => ConformanceError::Transport {
                message,
                exchange: Some(Box::new(exchange.clone())),
            },
            ConformanceError::ConcurrencyViolation { message, .. } => {
                ConformanceError::ConcurrencyViolation {
                    message,
                    exchange: Some(Box::new(exchange.clone())),
                }
            }
            ConformanceError::SchemaViolation(violations) => {
                ConformanceError::SchemaViolation(attach(violations, exchange))
            }
            ConformanceError::BusinessRuleViolation(violations) => {
                ConformanceError::BusinessRuleViolation(attach(violations, exchange))
            }
            other => other,
        }
    }

    pub fn verdict(&self) -> Verdict {
        match self {
            ConformanceError::UnsupportedPredicate(_) | ConformanceError::Inapplicable(_) => {
                Verdict::Skip
            }
            // The test that hit a compensation failure reports it; dependents skip
            // through SuiteContext::require_clean_baseline.
            _ => Verdict::Fail,
        }
    }

    pub fn is_skip(&self) -> bool {
        self.verdict() == Verdict::Skip
    }

    pub fn violations(&self) -> Vec<Violation> {
        match self {
            ConformanceError::Transport { message, exchange } => vec![Violation {
                kind: ViolationKind::Transport,
                message: message.clone(),
                location: None,
                exchange: exchange.as_deref().cloned(),
            }],
            ConformanceError::SchemaViolation(v) | ConformanceError::BusinessRuleViolation(v) => {
                v.clone()
            }
            ConformanceError::ConcurrencyViolation { message, exchange } => vec![Violation {
                kind: ViolationKind::Concurrency,
                message: message.clone(),
                location: None,
                exchange: exchange.as_deref().cloned(),
            }],
            ConformanceError::CompensationFailure(message) => {
                vec![Violation::new(ViolationKind::Compensation, message.clone())]
            }
            ConformanceError::UnsupportedPredicate(_) | ConformanceError::Inapplicable(_) => {
                Vec::new()
            }
        }
    }
}

fn attach(violations: Vec<Violation>, exchange: &Exchange) -> Vec<Violation> {
    violations
        .into_iter()
        .map(|mut v| {
            if v.exchange.is_none() {
                v.exchange = Some(exchange.clone());
            }
            v
        })
        .collect()
}

impl From<reqwest::Error> for ConformanceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ConformanceError::transport(format!("Request timed out: {}", e))
        } else if e.is_connect() {
            ConformanceError::transport(format!("Endpoint unreachable: {}", e))
        } else {
            ConformanceError::transport(e.to_string())
        }
    }
}

impl From<roxmltree::Error> for ConformanceError {
    fn from(e: roxmltree::Error) -> Self {
        ConformanceError::transport(format!("Response is not well-formed XML: {}", e))
    }
}

impl From<url::ParseError> for ConformanceError {
    fn from(e: url::ParseError) -> Self {
        ConformanceError::transport(format!("Invalid endpoint URL: {}", e))
    }
}

impl From<std::io::Error> for ConformanceError {
    fn from(e: std::io::Error) -> Self {
        ConformanceError::transport(format!("IO error: {}", e))
    }
}

pub type ConformanceResult<T> = Result<T, ConformanceError>;
