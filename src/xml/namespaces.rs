use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

pub const WFS: &str = "http://www.opengis.net/wfs/2.0";
pub const FES: &str = "http://www.opengis.net/fes/2.0";
pub const GML: &str = "http://www.opengis.net/gml/3.2";
pub const OWS: &str = "http://www.opengis.net/ows/1.1";
pub const OWS2: &str = "http://www.opengis.net/ows/2.0";
pub const XLINK: &str = "http://www.w3.org/1999/xlink";
pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema";
pub const SOAP11: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP12: &str = "http://www.w3.org/2003/05/soap-envelope";

/// Query language identifier for stored queries built from ad hoc query expressions.
pub const WFS_QUERY_LANGUAGE: &str = "urn:ogc:def:queryLanguage:OGC-WFS::WFSQueryExpression";

/// Conventional prefix for a well-known namespace.
pub fn preferred_prefix(namespace: &str) -> Option<&'static str> {
    match namespace {
        WFS => Some("wfs"),
        FES => Some("fes"),
        GML => Some("gml"),
        OWS => Some("ows"),
        OWS2 => Some("ows"),
        XLINK => Some("xlink"),
        XSI => Some("xsi"),
        XSD => Some("xsd"),
        SOAP11 | SOAP12 => Some("soap"),
        _ => None,
    }
}

pub fn is_ows(namespace: Option<&str>) -> bool {
    matches!(namespace, Some(OWS) | Some(OWS2))
}

/// Namespace-qualified name. Equality ignores the prefix.
#[derive(Debug, Clone)]
pub struct QName {
    pub namespace: String,
    pub local_name: String,
    pub prefix: Option<String>,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Prefix to use when writing this name into a document.
    pub fn effective_prefix(&self) -> &str {
        match &self.prefix {
            Some(prefix) => prefix,
            None => preferred_prefix(&self.namespace).unwrap_or("tns"),
        }
    }

    /// Prefixed form, e.g. `tns:Place`, for use in attribute values and value references.
    pub fn prefixed(&self) -> String {
        if self.namespace.is_empty() {
            self.local_name.clone()
        } else {
            format!("{}:{}", self.effective_prefix(), self.local_name)
        }
    }

    pub fn matches(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace == namespace.unwrap_or("")
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.local_name == other.local_name
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.local_name.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_name)
        }
    }
}

impl Serialize for QName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.prefixed())
    }
}
