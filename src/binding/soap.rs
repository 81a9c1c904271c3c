use async_trait::async_trait;
use roxmltree::Document;
use url::Url;

use super::transport::{HttpTransport, WfsResponse, finish_response};
use super::{BindingKind, ProtocolBinding, WfsRequest};
use crate::error::{ConformanceError, ConformanceResult};
use crate::xml::namespaces::{self, OWS, SOAP11, SOAP12};
use crate::xml::{Element, reader};

pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml";

/// HTTP POST with the request wrapped in a SOAP envelope.
#[derive(Clone)]
pub struct SoapBinding {
    transport: HttpTransport,
}

impl SoapBinding {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

/// SOAP 1.2 for WFS 2.0.2, SOAP 1.1 otherwise.
pub fn envelope_namespace(version: &str) -> &'static str {
    if version == "2.0.2" { SOAP12 } else { SOAP11 }
}

pub fn wrap(request: &WfsRequest) -> Element {
    let soap = envelope_namespace(&request.version);
    Element::new(soap, "Envelope").child(Element::new(soap, "Body").child(request.to_element()))
}

/// Extract the payload of a SOAP response. A fault surfaces as the exception
/// report it carries, or as a synthesized one when it carries none.
pub fn unwrap(body: &str) -> ConformanceResult<String> {
    let doc = Document::parse(body)?;
    let root = doc.root_element();
    let soap = match root.tag_name().namespace() {
        Some(ns @ (SOAP11 | SOAP12)) if root.tag_name().name() == "Envelope" => ns,
        _ => return Ok(body.to_string()),
    };

    let payload = reader::child(root, soap, "Body")
        .and_then(reader::first_element)
        .ok_or_else(|| ConformanceError::transport("SOAP envelope has an empty Body"))?;

    if !reader::is(payload, soap, "Fault") {
        return Ok(Element::from_node(payload).to_string());
    }

    if let Some(report) = payload.descendants().find(|n| {
        n.is_element()
            && n.tag_name().name() == "ExceptionReport"
            && namespaces::is_ows(n.tag_name().namespace())
    }) {
        return Ok(Element::from_node(report).to_string());
    }

    let reason = payload
        .descendants()
        .find(|n| {
            n.is_element() && matches!(n.tag_name().name(), "faultstring" | "Text" | "Reason")
        })
        .map(reader::text)
        .unwrap_or_else(|| "SOAP fault without reason".to_string());
    let report = Element::new(OWS, "ExceptionReport")
        .attr("version", "2.0.0")
        .child(
            Element::new(OWS, "Exception")
                .attr("exceptionCode", "NoApplicableCode")
                .child(Element::new(OWS, "ExceptionText").text(reason)),
        );
    Ok(report.to_string())
}

#[async_trait]
impl ProtocolBinding for SoapBinding {
    fn kind(&self) -> BindingKind {
        BindingKind::Soap
    }

    async fn send(&self, endpoint: &Url, request: &WfsRequest) -> ConformanceResult<WfsResponse> {
        let entity = wrap(request).to_document();
        let (status, content_type, raw, exchange) = self
            .transport
            .post(
                endpoint.clone(),
                entity,
                SOAP_CONTENT_TYPE,
                request.operation.as_str(),
                BindingKind::Soap,
            )
            .await?;
        let text = String::from_utf8_lossy(&raw).into_owned();
        let body = unwrap(&text).map_err(|e| e.with_exchange(&exchange))?;
        finish_response(status, content_type, raw, body, BindingKind::Soap, exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Operation;

    #[test]
    fn test_envelope_version_follows_wfs_version() {
        let request = WfsRequest::new(Operation::ListStoredQueries, "2.0.2");
        let xml = wrap(&request).to_string();
        assert!(xml.contains(SOAP12));
        assert!(xml.contains("<wfs:ListStoredQueries"));

        let request = WfsRequest::new(Operation::ListStoredQueries, "2.0.0");
        assert!(wrap(&request).to_string().contains(SOAP11));
    }

    #[test]
    fn test_unwrap_body_payload() {
        let envelope = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"
            xmlns:wfs="http://www.opengis.net/wfs/2.0">
          <soap:Body><wfs:FeatureCollection numberMatched="0" numberReturned="0"/></soap:Body>
        </soap:Envelope>"#;
        let payload = unwrap(envelope).unwrap();
        let doc = Document::parse(&payload).unwrap();
        assert!(reader::is(doc.root_element(), crate::xml::namespaces::WFS, "FeatureCollection"));
    }

    #[test]
    fn test_fault_surfaces_exception_report() {
        let envelope = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
          <soap:Body><soap:Fault>
            <soap:Code><soap:Value>soap:Sender</soap:Value></soap:Code>
            <soap:Reason><soap:Text>bad</soap:Text></soap:Reason>
            <soap:Detail>
              <ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows/1.1" version="2.0.0">
                <ows:Exception exceptionCode="InvalidParameterValue" locator="typeNames"/>
              </ows:ExceptionReport>
            </soap:Detail>
          </soap:Fault></soap:Body>
        </soap:Envelope>"#;
        let payload = unwrap(envelope).unwrap();
        assert!(payload.contains("InvalidParameterValue"));
    }

    #[test]
    fn test_fault_without_report_is_synthesized() {
        let envelope = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
          <soap:Body><soap:Fault><faultcode>soap:Server</faultcode><faultstring>boom</faultstring></soap:Fault></soap:Body>
        </soap:Envelope>"#;
        let payload = unwrap(envelope).unwrap();
        assert!(payload.contains("NoApplicableCode"));
        assert!(payload.contains("boom"));
    }
}
