use async_trait::async_trait;
use url::Url;

use super::transport::{HttpTransport, WfsResponse, finish_response};
use super::{BindingKind, ProtocolBinding, WfsRequest};
use crate::error::ConformanceResult;

pub const XML_CONTENT_TYPE: &str = "application/xml";

/// HTTP POST with the request as the XML entity body.
#[derive(Clone)]
pub struct XmlBinding {
    transport: HttpTransport,
}

impl XmlBinding {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ProtocolBinding for XmlBinding {
    fn kind(&self) -> BindingKind {
        BindingKind::Xml
    }

    async fn send(&self, endpoint: &Url, request: &WfsRequest) -> ConformanceResult<WfsResponse> {
        let entity = request.to_element().to_document();
        let (status, content_type, raw, exchange) = self
            .transport
            .post(
                endpoint.clone(),
                entity,
                XML_CONTENT_TYPE,
                request.operation.as_str(),
                BindingKind::Xml,
            )
            .await?;
        let body = String::from_utf8_lossy(&raw).into_owned();
        finish_response(status, content_type, raw, body, BindingKind::Xml, exchange)
    }
}
