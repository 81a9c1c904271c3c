use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::ConformanceResult;

pub mod client;
pub mod kvp;
pub mod request;
pub mod soap;
pub mod transport;
pub mod xml_post;

pub use client::WfsClient;
pub use kvp::KvpBinding;
pub use request::WfsRequest;
pub use soap::SoapBinding;
pub use transport::{Exchange, HttpTransport, WfsResponse};
pub use xml_post::XmlBinding;

/// Transport encodings defined for WFS 2.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    Kvp,
    Xml,
    Soap,
}

impl BindingKind {
    pub fn all() -> [BindingKind; 3] {
        [BindingKind::Kvp, BindingKind::Xml, BindingKind::Soap]
    }

    /// Name of the `ows:Constraint` that advertises the encoding.
    pub fn constraint_name(&self) -> &'static str {
        match self {
            BindingKind::Kvp => "KVPEncoding",
            BindingKind::Xml => "XMLEncoding",
            BindingKind::Soap => "SOAPEncoding",
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Kvp => write!(f, "KVP"),
            BindingKind::Xml => write!(f, "XML"),
            BindingKind::Soap => write!(f, "SOAP"),
        }
    }
}

/// WFS 2.0 request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operation {
    GetCapabilities,
    DescribeFeatureType,
    GetFeature,
    GetPropertyValue,
    GetFeatureWithLock,
    LockFeature,
    Transaction,
    ListStoredQueries,
    DescribeStoredQueries,
    CreateStoredQuery,
    DropStoredQuery,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetCapabilities => "GetCapabilities",
            Operation::DescribeFeatureType => "DescribeFeatureType",
            Operation::GetFeature => "GetFeature",
            Operation::GetPropertyValue => "GetPropertyValue",
            Operation::GetFeatureWithLock => "GetFeatureWithLock",
            Operation::LockFeature => "LockFeature",
            Operation::Transaction => "Transaction",
            Operation::ListStoredQueries => "ListStoredQueries",
            Operation::DescribeStoredQueries => "DescribeStoredQueries",
            Operation::CreateStoredQuery => "CreateStoredQuery",
            Operation::DropStoredQuery => "DropStoredQuery",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let all = [
            Operation::GetCapabilities,
            Operation::DescribeFeatureType,
            Operation::GetFeature,
            Operation::GetPropertyValue,
            Operation::GetFeatureWithLock,
            Operation::LockFeature,
            Operation::Transaction,
            Operation::ListStoredQueries,
            Operation::DescribeStoredQueries,
            Operation::CreateStoredQuery,
            Operation::DropStoredQuery,
        ];
        all.into_iter().find(|op| op.as_str().eq_ignore_ascii_case(name))
    }

    /// Transaction and CreateStoredQuery carry XML content with no KVP form.
    pub fn is_kvp_encodable(&self) -> bool {
        !matches!(self, Operation::Transaction | Operation::CreateStoredQuery)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transport encoding of WFS requests.
#[async_trait]
pub trait ProtocolBinding: Send + Sync {
    fn kind(&self) -> BindingKind;

    async fn send(&self, endpoint: &Url, request: &WfsRequest) -> ConformanceResult<WfsResponse>;
}
