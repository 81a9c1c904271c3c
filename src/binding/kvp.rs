use async_trait::async_trait;
use url::Url;

use super::transport::{HttpTransport, WfsResponse, finish_response};
use super::{BindingKind, Operation, ProtocolBinding, WfsRequest};
use crate::error::{ConformanceError, ConformanceResult};
use crate::xml::Element;
use crate::xml::namespaces::{FES, WFS};

/// HTTP GET with key-value pair encoding.
#[derive(Clone)]
pub struct KvpBinding {
    transport: HttpTransport,
}

impl KvpBinding {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ProtocolBinding for KvpBinding {
    fn kind(&self) -> BindingKind {
        BindingKind::Kvp
    }

    async fn send(&self, endpoint: &Url, request: &WfsRequest) -> ConformanceResult<WfsResponse> {
        let params = encode(request)?;
        let mut url = endpoint.clone();
        url.query_pairs_mut().extend_pairs(params.iter());
        let (status, content_type, raw, exchange) = self
            .transport
            .get(url, request.operation.as_str(), BindingKind::Kvp)
            .await?;
        let body = String::from_utf8_lossy(&raw).into_owned();
        finish_response(status, content_type, raw, body, BindingKind::Kvp, exchange)
    }
}

/// Map a request onto KVP parameters.
pub fn encode(request: &WfsRequest) -> ConformanceResult<Vec<(String, String)>> {
    let operation = request.operation;
    if !operation.is_kvp_encodable() {
        return Err(ConformanceError::Inapplicable(format!(
            "{} has no KVP encoding",
            operation
        )));
    }

    let mut params = vec![("SERVICE".to_string(), "WFS".to_string())];
    if operation == Operation::GetCapabilities {
        params.push(("ACCEPTVERSIONS".to_string(), request.version.clone()));
    } else {
        params.push(("VERSION".to_string(), request.version.clone()));
    }
    params.push(("REQUEST".to_string(), operation.as_str().to_string()));

    for (name, value) in &request.attributes {
        let key = match (operation, name.as_str()) {
            (Operation::DropStoredQuery, "id") => "STOREDQUERY_ID".to_string(),
            _ => name.to_uppercase(),
        };
        params.push((key, value.clone()));
    }

    let mut namespaces: Vec<(String, String)> = Vec::new();
    let mut type_names = Vec::new();
    let mut aliases = Vec::new();
    let mut filters = Vec::new();
    let mut resource_ids = Vec::new();
    let mut sort_by = Vec::new();
    let mut srs_names = Vec::new();
    let mut stored_query_ids = Vec::new();

    for element in &request.body {
        collect_namespaces(element, &mut namespaces);
        match (element.namespace.as_deref(), element.name.as_str()) {
            (Some(WFS), "Query") => {
                // Joined types are comma separated within one query
                if let Some(t) = element.attribute("typeNames") {
                    type_names.push(t.split_whitespace().collect::<Vec<_>>().join(","));
                }
                if let Some(a) = element.attribute("aliases") {
                    aliases.push(a.split_whitespace().collect::<Vec<_>>().join(","));
                }
                if let Some(srs) = element.attribute("srsName") {
                    srs_names.push(srs.to_string());
                }
                if let Some(filter) = element.find(FES, "Filter") {
                    match plain_resource_ids(filter) {
                        Some(ids) => resource_ids.extend(ids),
                        None => filters.push(filter.to_string()),
                    }
                }
                if let Some(sort) = element.find(FES, "SortBy") {
                    sort_by.push(encode_sort_by(sort));
                }
            }
            (Some(WFS), "StoredQuery") => {
                if let Some(id) = element.attribute("id") {
                    params.push(("STOREDQUERY_ID".to_string(), id.to_string()));
                }
                for parameter in element.elements().filter(|e| e.is(WFS, "Parameter")) {
                    if let Some(name) = parameter.attribute("name") {
                        params.push((name.to_string(), parameter.text_content()));
                    }
                }
            }
            (Some(WFS), "TypeName") => type_names.push(element.text_content()),
            (Some(WFS), "StoredQueryId") => stored_query_ids.push(element.text_content()),
            _ => {
                return Err(ConformanceError::Inapplicable(format!(
                    "{} content {} has no KVP encoding",
                    operation, element.name
                )));
            }
        }
    }

    let type_key = if operation == Operation::DescribeFeatureType {
        "TYPENAME"
    } else {
        "TYPENAMES"
    };
    push_list(&mut params, type_key, &type_names, "");
    push_list(&mut params, "ALIASES", &aliases, "");
    push_list(&mut params, "SRSNAME", &srs_names, ",");
    push_list(&mut params, "FILTER", &filters, "");
    push_list(&mut params, "SORTBY", &sort_by, ",");
    if !resource_ids.is_empty() {
        params.push(("RESOURCEID".to_string(), resource_ids.join(",")));
    }
    if !stored_query_ids.is_empty() {
        params.push(("STOREDQUERY_ID".to_string(), stored_query_ids.join(",")));
    }
    if !namespaces.is_empty() {
        let value = namespaces
            .iter()
            .map(|(prefix, uri)| format!("xmlns({},{})", prefix, uri))
            .collect::<Vec<_>>()
            .join(",");
        params.push(("NAMESPACES".to_string(), value));
    }

    Ok(params)
}

/// Per-query values: a single query is written plain, several are parenthesized.
fn push_list(params: &mut Vec<(String, String)>, key: &str, values: &[String], separator: &str) {
    match values {
        [] => {}
        [single] => params.push((key.to_string(), single.clone())),
        many => {
            let joined = many
                .iter()
                .map(|v| format!("({})", v))
                .collect::<Vec<_>>()
                .join(separator);
            params.push((key.to_string(), joined));
        }
    }
}

fn collect_namespaces(element: &Element, out: &mut Vec<(String, String)>) {
    for (prefix, uri) in &element.declarations {
        if !out.iter().any(|(p, u)| p == prefix && u == uri) {
            out.push((prefix.clone(), uri.clone()));
        }
    }
}

/// Identifiers of a filter made only of unversioned `fes:ResourceId` predicates.
fn plain_resource_ids(filter: &Element) -> Option<Vec<String>> {
    let predicates: Vec<&Element> = filter.elements().collect();
    if predicates.is_empty()
        || !predicates
            .iter()
            .all(|p| p.is(FES, "ResourceId") && p.attribute("version").is_none())
    {
        return None;
    }
    predicates
        .iter()
        .map(|p| p.attribute("rid").map(str::to_string))
        .collect()
}

fn encode_sort_by(sort: &Element) -> String {
    sort.elements()
        .filter(|e| e.is(FES, "SortProperty"))
        .filter_map(|property| {
            let reference = property.find(FES, "ValueReference")?.text_content();
            let order = property
                .find(FES, "SortOrder")
                .map(|o| o.text_content())
                .unwrap_or_else(|| "ASC".to_string());
            Some(format!("{} {}", reference, order))
        })
        .collect::<Vec<_>>()
        .join(",")
}
