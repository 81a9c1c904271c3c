use std::sync::Arc;
use url::Url;

use super::transport::{HttpTransport, WfsResponse, finish_response};
use super::{
    BindingKind, KvpBinding, Operation, ProtocolBinding, SoapBinding, WfsRequest, XmlBinding,
};
use crate::capabilities::CapabilityModel;
use crate::error::{ConformanceError, ConformanceResult};

/// Sends requests to the service under test through the binding negotiated
/// from its capabilities.
pub struct WfsClient {
    capabilities: Arc<CapabilityModel>,
    transport: HttpTransport,
    kvp: KvpBinding,
    xml: XmlBinding,
    soap: SoapBinding,
    negotiated: Option<BindingKind>,
}

impl WfsClient {
    pub fn new(
        capabilities: Arc<CapabilityModel>,
        transport: HttpTransport,
        preferred: Option<BindingKind>,
    ) -> Self {
        let global = capabilities.global_bindings();
        let negotiated = match preferred {
            Some(p) if global.contains(&p) => Some(p),
            Some(p) => {
                tracing::warn!(
                    "Preferred binding {} is not advertised, falling back to {:?}",
                    p,
                    global.first()
                );
                global.first().copied()
            }
            None => global.first().copied(),
        };
        Self {
            capabilities,
            kvp: KvpBinding::new(transport.clone()),
            xml: XmlBinding::new(transport.clone()),
            soap: SoapBinding::new(transport.clone()),
            transport,
            negotiated,
        }
    }

    /// Fetch the capabilities document with a KVP GetCapabilities request.
    pub async fn fetch_capabilities(
        transport: &HttpTransport,
        endpoint: &Url,
        version: &str,
    ) -> ConformanceResult<WfsResponse> {
        let mut base = endpoint.clone();
        base.set_query(None);
        let request = WfsRequest::new(Operation::GetCapabilities, version);
        KvpBinding::new(transport.clone()).send(&base, &request).await
    }

    pub fn capabilities(&self) -> &CapabilityModel {
        &self.capabilities
    }

    pub fn version(&self) -> &str {
        &self.capabilities.version
    }

    pub fn negotiated_binding(&self) -> Option<BindingKind> {
        self.negotiated
    }

    /// Usable bindings for an operation, the negotiated one first.
    pub fn bindings_for(&self, operation: Operation) -> Vec<BindingKind> {
        let mut bindings = self.capabilities.operation_bindings(operation);
        if let Some(negotiated) = self.negotiated
            && let Some(pos) = bindings.iter().position(|b| *b == negotiated)
        {
            let preferred = bindings.remove(pos);
            bindings.insert(0, preferred);
        }
        bindings
    }

    pub fn binding_for(&self, operation: Operation) -> ConformanceResult<BindingKind> {
        self.bindings_for(operation).first().copied().ok_or_else(|| {
            ConformanceError::Inapplicable(format!(
                "{} is not offered through any supported binding",
                operation
            ))
        })
    }

    fn binding(&self, kind: BindingKind) -> &dyn ProtocolBinding {
        match kind {
            BindingKind::Kvp => &self.kvp,
            BindingKind::Xml => &self.xml,
            BindingKind::Soap => &self.soap,
        }
    }

    pub async fn send(&self, request: &WfsRequest) -> ConformanceResult<WfsResponse> {
        let kind = self.binding_for(request.operation)?;
        self.send_with(request, kind).await
    }

    pub async fn send_with(
        &self,
        request: &WfsRequest,
        kind: BindingKind,
    ) -> ConformanceResult<WfsResponse> {
        let endpoint = self
            .capabilities
            .endpoint(request.operation, kind)
            .ok_or_else(|| {
                ConformanceError::Inapplicable(format!(
                    "No {} endpoint advertised for {}",
                    kind, request.operation
                ))
            })?;
        self.binding(kind).send(endpoint, request).await
    }

    /// Follow a `next` or `previous` link from a paged response.
    pub async fn fetch_link(&self, link: &str) -> ConformanceResult<WfsResponse> {
        let url = Url::parse(link)?;
        let (status, content_type, raw, exchange) = self
            .transport
            .get(url, Operation::GetFeature.as_str(), BindingKind::Kvp)
            .await?;
        let body = String::from_utf8_lossy(&raw).into_owned();
        finish_response(status, content_type, raw, body, BindingKind::Kvp, exchange)
    }
}
