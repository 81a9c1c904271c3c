//! Schema conformance seam.
//!
//! Full XML Schema validation is delegated to an external engine through
//! [`SchemaValidator`]. The bundled [`StructuralValidator`] checks the parts of
//! each response schema the suite relies on: the root element, its required
//! attributes and its required children.

use roxmltree::Document;

use crate::error::{Violation, ViolationKind};
use crate::xml::namespaces::{FES, OWS2, WFS, XSD, is_ows};
use crate::xml::reader;

/// The schema a response is expected to conform to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaRef {
    FeatureCollection,
    ValueCollection,
    TransactionResponse,
    LockFeatureResponse,
    ListStoredQueriesResponse,
    DescribeStoredQueriesResponse,
    CreateStoredQueryResponse,
    DropStoredQueryResponse,
    Capabilities,
    ExceptionReport,
    /// XML Schema document (DescribeFeatureType)
    Schema,
    /// Any well-formed document
    Any,
}

impl SchemaRef {
    /// Namespace and local name of the expected root element.
    pub fn root(&self) -> Option<(&'static str, &'static str)> {
        match self {
            SchemaRef::FeatureCollection => Some((WFS, "FeatureCollection")),
            SchemaRef::ValueCollection => Some((WFS, "ValueCollection")),
            SchemaRef::TransactionResponse => Some((WFS, "TransactionResponse")),
            SchemaRef::LockFeatureResponse => Some((WFS, "LockFeatureResponse")),
            SchemaRef::ListStoredQueriesResponse => Some((WFS, "ListStoredQueriesResponse")),
            SchemaRef::DescribeStoredQueriesResponse => {
                Some((WFS, "DescribeStoredQueriesResponse"))
            }
            SchemaRef::CreateStoredQueryResponse => Some((WFS, "CreateStoredQueryResponse")),
            SchemaRef::DropStoredQueryResponse => Some((WFS, "DropStoredQueryResponse")),
            SchemaRef::Capabilities => Some((WFS, "WFS_Capabilities")),
            SchemaRef::ExceptionReport => Some((OWS2, "ExceptionReport")),
            SchemaRef::Schema => Some((XSD, "schema")),
            SchemaRef::Any => None,
        }
    }

    fn required_attributes(&self) -> &'static [&'static str] {
        match self {
            SchemaRef::FeatureCollection | SchemaRef::ValueCollection => {
                &["numberMatched", "numberReturned", "timeStamp"]
            }
            SchemaRef::LockFeatureResponse => &["lockId"],
            SchemaRef::Capabilities => &["version"],
            SchemaRef::CreateStoredQueryResponse | SchemaRef::DropStoredQueryResponse => {
                &["status"]
            }
            _ => &[],
        }
    }

    fn required_children(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            SchemaRef::TransactionResponse => &[(WFS, "TransactionSummary")],
            _ => &[],
        }
    }
}

pub trait SchemaValidator: Send + Sync {
    fn validate(&self, document: &Document<'_>, schema: SchemaRef) -> Vec<Violation>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralValidator;

impl SchemaValidator for StructuralValidator {
    fn validate(&self, document: &Document<'_>, schema: SchemaRef) -> Vec<Violation> {
        let root = document.root_element();
        let mut violations = Vec::new();

        let Some((namespace, name)) = schema.root() else {
            return violations;
        };
        let root_matches = if schema == SchemaRef::ExceptionReport {
            root.tag_name().name() == name && is_ows(root.tag_name().namespace())
        } else {
            reader::is(root, namespace, name)
        };
        if !root_matches {
            violations.push(
                Violation::new(
                    ViolationKind::Schema,
                    format!(
                        "Expected root element {{{}}}{}, found {}",
                        namespace,
                        name,
                        reader::element_qname(root)
                    ),
                )
                .at("/"),
            );
            return violations;
        }

        for attribute in schema.required_attributes() {
            if root.attribute(*attribute).is_none() {
                violations.push(
                    Violation::new(
                        ViolationKind::Schema,
                        format!("Missing required attribute {}", attribute),
                    )
                    .at(format!("/{}/@{}", name, attribute)),
                );
            }
        }
        for (child_ns, child_name) in schema.required_children() {
            if reader::child(root, child_ns, child_name).is_none() {
                violations.push(
                    Violation::new(
                        ViolationKind::Schema,
                        format!("Missing required element {}", child_name),
                    )
                    .at(format!("/{}/{}", name, child_name)),
                );
            }
        }

        match schema {
            SchemaRef::FeatureCollection | SchemaRef::ValueCollection => {
                violations.extend(check_counts(root, name));
            }
            SchemaRef::ExceptionReport => {
                if !reader::elements(root).any(|e| e.tag_name().name() == "Exception") {
                    violations.push(
                        Violation::new(ViolationKind::Schema, "Exception report has no Exception")
                            .at("/ExceptionReport"),
                    );
                }
            }
            SchemaRef::Capabilities => {
                if reader::descendants(root, FES, "Filter_Capabilities").next().is_none() {
                    violations.push(
                        Violation::new(ViolationKind::Schema, "Missing fes:Filter_Capabilities")
                            .at("/WFS_Capabilities"),
                    );
                }
            }
            _ => {}
        }
        violations
    }
}

/// `numberMatched` is a count or `unknown`; `numberReturned` is a count.
fn check_counts(root: roxmltree::Node<'_, '_>, name: &str) -> Vec<Violation> {
    let mut violations = Vec::new();
    if let Some(matched) = root.attribute("numberMatched")
        && matched != "unknown"
        && matched.parse::<u64>().is_err()
    {
        violations.push(
            Violation::new(
                ViolationKind::Schema,
                format!("numberMatched '{}' is neither a count nor 'unknown'", matched),
            )
            .at(format!("/{}/@numberMatched", name)),
        );
    }
    if let Some(returned) = root.attribute("numberReturned")
        && returned.parse::<u64>().is_err()
    {
        violations.push(
            Violation::new(
                ViolationKind::Schema,
                format!("numberReturned '{}' is not a count", returned),
            )
            .at(format!("/{}/@numberReturned", name)),
        );
    }
    violations
}
