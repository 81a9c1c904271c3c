use std::sync::Arc;

use super::checks::Check;
use super::exception::ExceptionReport;
use super::schema::{SchemaRef, SchemaValidator, StructuralValidator};
use crate::binding::WfsResponse;
use crate::error::{ConformanceError, ConformanceResult, Violation, ViolationKind};
use crate::xml::reader;

/// The outcome the caller requires from a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Expect {
    Success,
    Exception {
        /// Any of these codes is accepted; empty accepts any code
        codes: Vec<String>,
        locator: Option<String>,
        status: Option<u16>,
    },
}

#[derive(Debug)]
pub struct Expectations {
    pub expect: Expect,
    pub checks: Vec<Check>,
}

impl Expectations {
    pub fn success() -> Self {
        Self {
            expect: Expect::Success,
            checks: Vec::new(),
        }
    }

    pub fn exception(code: &str) -> Self {
        Self {
            expect: Expect::Exception {
                codes: vec![code.to_string()],
                locator: None,
                status: None,
            },
            checks: Vec::new(),
        }
    }

    pub fn any_exception() -> Self {
        Self {
            expect: Expect::Exception {
                codes: Vec::new(),
                locator: None,
                status: None,
            },
            checks: Vec::new(),
        }
    }

    /// Also accept `code`.
    pub fn or_code(mut self, code: &str) -> Self {
        if let Expect::Exception { codes, .. } = &mut self.expect {
            codes.push(code.to_string());
        }
        self
    }

    pub fn with_locator(mut self, wanted: &str) -> Self {
        if let Expect::Exception { locator, .. } = &mut self.expect {
            *locator = Some(wanted.to_string());
        }
        self
    }

    pub fn with_status(mut self, code: u16) -> Self {
        if let Expect::Exception { status, .. } = &mut self.expect {
            *status = Some(code);
        }
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub passed: bool,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Schema problems take precedence when classifying a failed validation.
    pub fn into_result(self) -> ConformanceResult<()> {
        if self.passed {
            Ok(())
        } else if self
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::Schema)
        {
            Err(ConformanceError::SchemaViolation(self.violations))
        } else {
            Err(ConformanceError::BusinessRuleViolation(self.violations))
        }
    }
}

#[derive(Clone)]
pub struct ResponseValidator {
    schema: Arc<dyn SchemaValidator>,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new(Arc::new(StructuralValidator))
    }
}

impl ResponseValidator {
    pub fn new(schema: Arc<dyn SchemaValidator>) -> Self {
        Self { schema }
    }

    pub fn validate(
        &self,
        response: &WfsResponse,
        schema: SchemaRef,
        expectations: &Expectations,
    ) -> ValidationResult {
        let mut violations = self.collect(response, schema, expectations);
        for violation in &mut violations {
            if violation.exchange.is_none() {
                violation.exchange = Some(response.exchange.clone());
            }
        }
        if !violations.is_empty() {
            tracing::debug!(
                operation = %response.exchange.operation,
                count = violations.len(),
                "Response failed validation"
            );
        }
        ValidationResult::from_violations(violations)
    }

    /// Validate and convert a failure into the matching error kind.
    pub fn require(
        &self,
        response: &WfsResponse,
        schema: SchemaRef,
        expectations: &Expectations,
    ) -> ConformanceResult<()> {
        self.validate(response, schema, expectations).into_result()
    }

    pub fn require_success(&self, response: &WfsResponse, schema: SchemaRef) -> ConformanceResult<()> {
        self.require(response, schema, &Expectations::success())
    }

    fn collect(
        &self,
        response: &WfsResponse,
        schema: SchemaRef,
        expectations: &Expectations,
    ) -> Vec<Violation> {
        let document = match roxmltree::Document::parse(&response.body) {
            Ok(doc) => doc,
            Err(e) => {
                return vec![Violation::new(
                    ViolationKind::Schema,
                    format!("Response is not well-formed XML: {}", e),
                )];
            }
        };
        let root = document.root_element();
        let report = ExceptionReport::from_node(root);

        match (&expectations.expect, report) {
            (Expect::Success, Some(report)) => {
                let mut violations = vec![Violation::new(
                    ViolationKind::BusinessRule,
                    format!(
                        "Expected a {} response, got an exception report: {}",
                        response.exchange.operation,
                        report.summary()
                    ),
                )];
                violations.extend(self.schema.validate(&document, SchemaRef::ExceptionReport));
                violations
            }
            (Expect::Success, None) => {
                let mut violations = Vec::new();
                if !response.is_success() {
                    violations.push(Violation::new(
                        ViolationKind::BusinessRule,
                        format!("Unexpected HTTP status {}", response.status),
                    ));
                }
                // Schema and semantic checks are independent; both always run
                violations.extend(self.schema.validate(&document, schema));
                violations.extend(expectations.checks.iter().filter_map(|check| {
                    check.run(root).err().map(|message| {
                        Violation::new(ViolationKind::BusinessRule, message)
                            .at(check.description.clone())
                    })
                }));
                violations
            }
            (Expect::Exception { codes, .. }, None) => vec![Violation::new(
                ViolationKind::BusinessRule,
                format!(
                    "Expected an exception report ({}), got {}",
                    if codes.is_empty() { "any code".to_string() } else { codes.join(" or ") },
                    reader::element_qname(root)
                ),
            )],
            (
                Expect::Exception {
                    codes,
                    locator,
                    status,
                },
                Some(report),
            ) => {
                let mut violations = self.schema.validate(&document, SchemaRef::ExceptionReport);
                if !codes.is_empty() && !codes.iter().any(|c| report.has_code(c)) {
                    violations.push(Violation::new(
                        ViolationKind::BusinessRule,
                        format!(
                            "Expected exception code {}, got {}",
                            codes.join(" or "),
                            report.codes().join(", ")
                        ),
                    ));
                }
                if let Some(locator) = locator
                    && !report.has_locator(locator)
                {
                    violations.push(Violation::new(
                        ViolationKind::BusinessRule,
                        format!(
                            "Expected exception locator '{}', got: {}",
                            locator,
                            report.summary()
                        ),
                    ));
                }
                if let Some(status) = status
                    && response.status != *status
                {
                    violations.push(Violation::new(
                        ViolationKind::BusinessRule,
                        format!("Expected HTTP status {}, got {}", status, response.status),
                    ));
                }
                violations
            }
        }
    }
}
