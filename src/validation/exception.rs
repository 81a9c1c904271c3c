use roxmltree::Node;
use serde::Serialize;

use crate::xml::namespaces::is_ows;
use crate::xml::reader;

/// One `ows:Exception` entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwsException {
    pub code: String,
    pub locator: Option<String>,
    pub texts: Vec<String>,
}

/// Parsed `ows:ExceptionReport` (OWS 1.1 or 2.0).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionReport {
    pub version: Option<String>,
    pub exceptions: Vec<OwsException>,
}

impl ExceptionReport {
    /// `None` unless `root` is an exception report.
    pub fn from_node(root: Node<'_, '_>) -> Option<Self> {
        if root.tag_name().name() != "ExceptionReport" || !is_ows(root.tag_name().namespace()) {
            return None;
        }
        let exceptions = reader::elements(root)
            .filter(|n| n.tag_name().name() == "Exception" && is_ows(n.tag_name().namespace()))
            .map(|n| OwsException {
                code: n.attribute("exceptionCode").unwrap_or_default().to_string(),
                locator: n.attribute("locator").map(str::to_string),
                texts: reader::elements(n)
                    .filter(|t| t.tag_name().name() == "ExceptionText")
                    .map(reader::text)
                    .collect(),
            })
            .collect();
        Some(Self {
            version: root.attribute("version").map(str::to_string),
            exceptions,
        })
    }

    pub fn parse(body: &str) -> Option<Self> {
        let doc = roxmltree::Document::parse(body).ok()?;
        Self::from_node(doc.root_element())
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.exceptions.iter().any(|e| e.code == code)
    }

    /// Locators are compared case-insensitively and by containment, since
    /// services report either the parameter name or a path ending in it.
    pub fn has_locator(&self, locator: &str) -> bool {
        let wanted = locator.to_ascii_lowercase();
        self.exceptions.iter().any(|e| {
            e.locator
                .as_deref()
                .is_some_and(|l| l.to_ascii_lowercase().contains(&wanted))
        })
    }

    pub fn codes(&self) -> Vec<&str> {
        self.exceptions.iter().map(|e| e.code.as_str()).collect()
    }

    pub fn summary(&self) -> String {
        self.exceptions
            .iter()
            .map(|e| match (&e.locator, e.texts.first()) {
                (Some(l), Some(t)) => format!("{} [{}]: {}", e.code, l, t),
                (Some(l), None) => format!("{} [{}]", e.code, l),
                (None, Some(t)) => format!("{}: {}", e.code, t),
                (None, None) => e.code.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}
