//! Creation, discovery and removal of stored queries.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::keyed_lock::{KeyedLocks, stored_query_key};
use crate::binding::request::query_element;
use crate::binding::{Operation, WfsClient, WfsRequest, WfsResponse};
use crate::error::{ConformanceError, ConformanceResult};
use crate::filter::FilterExpression;
use crate::filter::decode::decode_filter;
use crate::validation::{Expectations, ResponseValidator, SchemaRef};
use crate::xml::namespaces::{FES, WFS, WFS_QUERY_LANGUAGE, XSD};
use crate::xml::{Element, QName, reader};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredQueryParameter {
    pub name: String,
    pub xml_type: QName,
}

impl StoredQueryParameter {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            xml_type: QName::new(XSD, "string").with_prefix("xsd"),
        }
    }
}

/// Defining query of a stored query: one feature type and an optional filter
/// whose literals may reference parameters as `${name}`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredQueryExpression {
    pub type_name: QName,
    pub filter: Option<FilterExpression>,
}

#[derive(Debug, Clone)]
pub struct StoredQueryDescriptor {
    pub id: String,
    pub title: Option<String>,
    pub parameters: Vec<StoredQueryParameter>,
    pub return_types: Vec<QName>,
    pub language: String,
    /// `None` when the service keeps the definition private
    pub query: Option<StoredQueryExpression>,
}

impl StoredQueryDescriptor {
    /// Query returning features of `type_name` whose `property` equals the `value` parameter.
    pub fn equal_to(id: impl Into<String>, type_name: &QName, property: &QName) -> Self {
        Self {
            id: id.into(),
            title: Some("Features with a given property value".to_string()),
            parameters: vec![StoredQueryParameter::string("value")],
            return_types: vec![type_name.clone()],
            language: WFS_QUERY_LANGUAGE.to_string(),
            query: Some(StoredQueryExpression {
                type_name: type_name.clone(),
                filter: Some(FilterExpression::equal_to(property.clone(), "${value}")),
            }),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Equality of everything a service must round-trip. Titles are free text
    /// and a private definition may be withheld.
    pub fn is_structurally_equal(&self, other: &StoredQueryDescriptor) -> bool {
        let mut mine: Vec<(&str, &QName)> = self.parameters.iter().map(|p| (p.name.as_str(), &p.xml_type)).collect();
        let mut theirs: Vec<(&str, &QName)> = other.parameters.iter().map(|p| (p.name.as_str(), &p.xml_type)).collect();
        mine.sort_by(|a, b| a.0.cmp(b.0));
        theirs.sort_by(|a, b| a.0.cmp(b.0));
        self.id == other.id
            && mine == theirs
            && self.return_types.len() == other.return_types.len()
            && self.return_types.iter().all(|t| other.return_types.contains(t))
            && match (&self.query, &other.query) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }

    fn to_element(&self) -> Element {
        let mut definition = Element::new(WFS, "StoredQueryDefinition")
            .attr("id", self.id.as_str())
            .declare("xsd", XSD);
        if let Some(title) = &self.title {
            definition.push(Element::new(WFS, "Title").text(title.clone()));
        }
        for parameter in &self.parameters {
            definition = definition.declare_name(&parameter.xml_type).child(
                Element::new(WFS, "Parameter")
                    .attr("name", parameter.name.as_str())
                    .attr("type", parameter.xml_type.prefixed()),
            );
        }
        let mut text = Element::new(WFS, "QueryExpressionText")
            .attr(
                "returnFeatureTypes",
                self.return_types
                    .iter()
                    .map(QName::prefixed)
                    .collect::<Vec<_>>()
                    .join(" "),
            )
            .attr("language", self.language.as_str())
            .attr("isPrivate", "false");
        for return_type in &self.return_types {
            text = text.declare_name(return_type);
        }
        if let Some(query) = &self.query {
            text.push(query_element(&query.type_name, query.filter.as_ref()));
        }
        definition.child(text)
    }
}

/// Entry of a ListStoredQueries response.
#[derive(Debug, Clone)]
pub struct ListedStoredQuery {
    pub id: String,
    pub title: Option<String>,
    pub return_types: Vec<QName>,
}

pub struct StoredQueryManager {
    client: Arc<WfsClient>,
    validator: ResponseValidator,
    locks: Arc<KeyedLocks>,
    retries: u32,
    backoff: Duration,
    /// Identifiers created during the run, dropped at teardown
    created: Mutex<Vec<String>>,
}

impl StoredQueryManager {
    pub fn new(
        client: Arc<WfsClient>,
        validator: ResponseValidator,
        locks: Arc<KeyedLocks>,
        retries: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            client,
            validator,
            locks,
            retries,
            backoff,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn remember(&self, id: &str) {
        let mut created = self.created.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !created.iter().any(|c| c == id) {
            created.push(id.to_string());
        }
    }

    fn forget(&self, id: &str) {
        self.created
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|c| c != id);
    }

    fn create_request(&self, descriptor: &StoredQueryDescriptor) -> WfsRequest {
        WfsRequest::new(Operation::CreateStoredQuery, self.client.version())
            .child(descriptor.to_element())
    }

    /// Create the query and wait until the service lists it.
    pub async fn create(&self, descriptor: &StoredQueryDescriptor) -> ConformanceResult<()> {
        let _guard = self.locks.acquire(&stored_query_key(&descriptor.id)).await;
        let response = self.client.send(&self.create_request(descriptor)).await?;
        self.validator
            .require_success(&response, SchemaRef::CreateStoredQueryResponse)?;
        self.remember(&descriptor.id);
        tracing::info!(id = %descriptor.id, "Stored query created");
        self.await_listing(&descriptor.id, true).await
    }

    /// Submit a definition the service must refuse.
    pub async fn create_expecting(
        &self,
        descriptor: &StoredQueryDescriptor,
        expectations: &Expectations,
    ) -> ConformanceResult<()> {
        let _guard = self.locks.acquire(&stored_query_key(&descriptor.id)).await;
        let response = self.client.send(&self.create_request(descriptor)).await?;
        if response.is_success() && !response.is_exception_report() {
            // Accepted anyway; make sure teardown removes it.
            self.remember(&descriptor.id);
        }
        self.validator
            .require(&response, SchemaRef::ExceptionReport, expectations)
    }

    pub async fn drop(&self, id: &str) -> ConformanceResult<()> {
        let _guard = self.locks.acquire(&stored_query_key(id)).await;
        let response = self.client.send(&drop_request(self.client.version(), id)).await?;
        self.validator
            .require_success(&response, SchemaRef::DropStoredQueryResponse)?;
        self.forget(id);
        tracing::info!(id, "Stored query dropped");
        self.await_listing(id, false).await
    }

    /// Drop a query that must not be droppable: unknown or built in.
    pub async fn drop_expecting(&self, id: &str, expectations: &Expectations) -> ConformanceResult<()> {
        let _guard = self.locks.acquire(&stored_query_key(id)).await;
        let response = self.client.send(&drop_request(self.client.version(), id)).await?;
        self.validator
            .require(&response, SchemaRef::ExceptionReport, expectations)
    }

    pub async fn list(&self) -> ConformanceResult<Vec<ListedStoredQuery>> {
        let request = WfsRequest::new(Operation::ListStoredQueries, self.client.version());
        let response = self.client.send(&request).await?;
        self.validator
            .require_success(&response, SchemaRef::ListStoredQueriesResponse)?;
        parse_listing(&response)
    }

    pub async fn describe(&self, id: &str) -> ConformanceResult<StoredQueryDescriptor> {
        let request = WfsRequest::new(Operation::DescribeStoredQueries, self.client.version())
            .child(Element::new(WFS, "StoredQueryId").text(id));
        let response = self.client.send(&request).await?;
        self.validator
            .require_success(&response, SchemaRef::DescribeStoredQueriesResponse)?;
        parse_descriptions(&response)?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| {
                ConformanceError::business_rule(format!("DescribeStoredQueries did not describe {}", id))
                    .with_exchange(&response.exchange)
            })
    }

    /// Describe `descriptor.id` and compare with what was created.
    pub async fn verify_description(&self, descriptor: &StoredQueryDescriptor) -> ConformanceResult<()> {
        let described = self.describe(&descriptor.id).await?;
        if described.is_structurally_equal(descriptor) {
            Ok(())
        } else {
            Err(ConformanceError::business_rule(format!(
                "Description of stored query {} differs from its definition: {:?}",
                descriptor.id, described
            )))
        }
    }

    pub async fn invoke(
        &self,
        id: &str,
        parameters: &[(String, String)],
    ) -> ConformanceResult<WfsResponse> {
        let request = WfsRequest::stored_query(self.client.version(), id, parameters);
        self.client.send(&request).await
    }

    /// Poll the listing until `id` is present (or absent), backing off exponentially.
    async fn await_listing(&self, id: &str, present: bool) -> ConformanceResult<()> {
        let mut delays = backoff_delays(self.backoff);
        for attempt in 0..=self.retries {
            let listed = self.list().await?.iter().any(|q| q.id == id);
            if listed == present {
                return Ok(());
            }
            if attempt < self.retries
                && let Some(delay) = delays.next()
            {
                tracing::debug!(id, attempt, delay_ms = delay.as_millis() as u64, "Waiting for stored query listing");
                tokio::time::sleep(delay).await;
            }
        }
        Err(ConformanceError::business_rule(format!(
            "Stored query {} {} ListStoredQueries after {} attempts",
            id,
            if present { "never appeared in" } else { "is still listed by" },
            self.retries + 1
        )))
    }

    /// Drop every query created during the run.
    pub async fn cleanup(&self) -> ConformanceResult<()> {
        let mut failures = Vec::new();
        for id in self.created() {
            if let Err(e) = self.drop(&id).await {
                tracing::error!(id = %id, "Failed to drop stored query: {}", e);
                failures.push(format!("{}: {}", id, e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ConformanceError::CompensationFailure(failures.join("; ")))
        }
    }
}

fn drop_request(version: &str, id: &str) -> WfsRequest {
    WfsRequest::new(Operation::DropStoredQuery, version).attr("id", id)
}

fn return_types(node: roxmltree::Node<'_, '_>, value: &str) -> Vec<QName> {
    value
        .split_whitespace()
        .filter_map(|token| reader::resolve_qname(node, token))
        .collect()
}

fn parse_listing(response: &WfsResponse) -> ConformanceResult<Vec<ListedStoredQuery>> {
    let doc = response.document()?;
    Ok(reader::children(doc.root_element(), WFS, "StoredQuery")
        .filter_map(|query| {
            let id = query.attribute("id")?;
            Some(ListedStoredQuery {
                id: id.to_string(),
                title: reader::child_text(query, WFS, "Title"),
                return_types: reader::children(query, WFS, "ReturnFeatureType")
                    .filter_map(|t| reader::resolve_qname(t, &reader::text(t)))
                    .collect(),
            })
        })
        .collect())
}

fn parse_descriptions(response: &WfsResponse) -> ConformanceResult<Vec<StoredQueryDescriptor>> {
    let doc = response.document()?;
    let mut descriptors = Vec::new();
    for description in reader::children(doc.root_element(), WFS, "StoredQueryDescription") {
        let Some(id) = description.attribute("id") else {
            continue;
        };
        let parameters = reader::children(description, WFS, "Parameter")
            .filter_map(|p| {
                Some(StoredQueryParameter {
                    name: p.attribute("name")?.to_string(),
                    xml_type: reader::resolve_qname(p, p.attribute("type")?)?,
                })
            })
            .collect();
        let text = reader::child(description, WFS, "QueryExpressionText");
        let query = match text.and_then(|t| reader::child(t, WFS, "Query")) {
            Some(query) => {
                let type_name = query
                    .attribute("typeNames")
                    .and_then(|t| reader::resolve_qname(query, t))
                    .ok_or_else(|| {
                        ConformanceError::schema(format!("Stored query {} has a query without typeNames", id))
                            .with_exchange(&response.exchange)
                    })?;
                let filter = reader::child(query, FES, "Filter")
                    .map(decode_filter)
                    .transpose()?;
                Some(StoredQueryExpression { type_name, filter })
            }
            None => None,
        };
        descriptors.push(StoredQueryDescriptor {
            id: id.to_string(),
            title: reader::child_text(description, WFS, "Title"),
            parameters,
            return_types: text
                .and_then(|t| t.attribute("returnFeatureTypes").map(|v| return_types(t, v)))
                .unwrap_or_default(),
            language: text
                .and_then(|t| t.attribute("language"))
                .unwrap_or(WFS_QUERY_LANGUAGE)
                .to_string(),
            query,
        });
    }
    Ok(descriptors)
}

/// Doubling delays starting at `initial`, saturating instead of overflowing.
fn backoff_delays(initial: Duration) -> impl Iterator<Item = Duration> {
    std::iter::successors(Some(initial), |delay| Some(delay.saturating_mul(2)))
}
