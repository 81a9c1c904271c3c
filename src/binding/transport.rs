use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use url::Url;

use super::BindingKind;
use crate::config::Config;
use crate::error::{ConformanceError, ConformanceResult};
use crate::xml::namespaces;

const EXCHANGE_BODY_LIMIT: usize = 4096;

/// Request/response pair kept for diagnosing a failed test.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub operation: String,
    pub binding: BindingKind,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

fn truncate(text: &str) -> String {
    if text.len() <= EXCHANGE_BODY_LIMIT {
        return text.to_string();
    }
    let mut end = EXCHANGE_BODY_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes total)", &text[..end], text.len())
}

#[derive(Debug, Clone)]
pub struct WfsResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Bytes exactly as received
    pub raw: Bytes,
    /// XML payload; for SOAP this is the unwrapped body content
    pub body: String,
    pub binding: BindingKind,
    pub exchange: Exchange,
}

impl WfsResponse {
    pub fn document(&self) -> ConformanceResult<roxmltree::Document<'_>> {
        roxmltree::Document::parse(&self.body)
            .map_err(|e| ConformanceError::from(e).with_exchange(&self.exchange))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the payload is an OWS exception report.
    pub fn is_exception_report(&self) -> bool {
        self.document()
            .map(|doc| {
                let root = doc.root_element();
                root.tag_name().name() == "ExceptionReport"
                    && namespaces::is_ows(root.tag_name().namespace())
            })
            .unwrap_or(false)
    }
}

/// HTTP plumbing shared by every binding.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    authorization: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &Config) -> ConformanceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            authorization: config.authorization.clone(),
        })
    }

    pub async fn get(
        &self,
        url: Url,
        operation: &str,
        binding: BindingKind,
    ) -> ConformanceResult<(u16, Option<String>, Bytes, Exchange)> {
        let exchange = Exchange {
            operation: operation.to_string(),
            binding,
            method: "GET".to_string(),
            url: url.to_string(),
            request: None,
            status: None,
            response: None,
        };
        tracing::debug!(operation, %binding, url = %url, "WFS request");
        let mut builder = self.client.get(url);
        if let Some(auth) = &self.authorization {
            builder = builder.header(AUTHORIZATION, auth);
        }
        self.execute(builder, exchange).await
    }

    pub async fn post(
        &self,
        url: Url,
        body: String,
        content_type: &str,
        operation: &str,
        binding: BindingKind,
    ) -> ConformanceResult<(u16, Option<String>, Bytes, Exchange)> {
        let exchange = Exchange {
            operation: operation.to_string(),
            binding,
            method: "POST".to_string(),
            url: url.to_string(),
            request: Some(truncate(&body)),
            status: None,
            response: None,
        };
        tracing::debug!(operation, %binding, url = %url, request = %body, "WFS request");
        let mut builder = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body);
        if let Some(auth) = &self.authorization {
            builder = builder.header(AUTHORIZATION, auth);
        }
        self.execute(builder, exchange).await
    }

    async fn execute(
        &self,
        builder: reqwest::RequestBuilder,
        mut exchange: Exchange,
    ) -> ConformanceResult<(u16, Option<String>, Bytes, Exchange)> {
        let response = builder
            .send()
            .await
            .map_err(|e| ConformanceError::from(e).with_exchange(&exchange))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let raw = response
            .bytes()
            .await
            .map_err(|e| ConformanceError::from(e).with_exchange(&exchange))?;

        let text = String::from_utf8_lossy(&raw);
        tracing::debug!(
            operation = %exchange.operation,
            binding = %exchange.binding,
            status,
            response = %text,
            "WFS response"
        );
        exchange.status = Some(status);
        exchange.response = Some(truncate(&text));
        Ok((status, content_type, raw, exchange))
    }
}

/// Assemble a response. Any non-empty payload must be well-formed XML,
/// whatever content type the service declared.
pub fn finish_response(
    status: u16,
    content_type: Option<String>,
    raw: Bytes,
    body: String,
    binding: BindingKind,
    exchange: Exchange,
) -> ConformanceResult<WfsResponse> {
    let response = WfsResponse {
        status,
        content_type,
        raw,
        body,
        binding,
        exchange,
    };
    if !response.body.trim().is_empty()
        && let Err(e) = roxmltree::Document::parse(&response.body)
    {
        tracing::warn!(
            operation = %response.exchange.operation,
            content_type = response.content_type.as_deref().unwrap_or("-"),
            "Response is not XML"
        );
        return Err(ConformanceError::from(e).with_exchange(&response.exchange));
    }
    Ok(response)
}
