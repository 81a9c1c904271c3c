use super::Operation;
use crate::filter::{FilterExpression, SpatialJoin};
use crate::filter::encode;
use crate::xml::namespaces::{OWS, WFS};
use crate::xml::{Element, QName};

/// Binding-independent request: the operation, root attributes and XML content.
///
/// The XML and SOAP bindings serialize it as-is; the KVP binding maps the root
/// attributes and the well-known child elements onto query parameters.
#[derive(Debug, Clone)]
pub struct WfsRequest {
    pub operation: Operation,
    pub version: String,
    pub attributes: Vec<(String, String)>,
    pub body: Vec<Element>,
}

impl WfsRequest {
    pub fn new(operation: Operation, version: impl Into<String>) -> Self {
        Self {
            operation,
            version: version.into(),
            attributes: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(mut self, element: Element) -> Self {
        self.body.push(element);
        self
    }

    pub fn get_feature(version: &str, type_name: &QName, filter: Option<&FilterExpression>) -> Self {
        Self::new(Operation::GetFeature, version).child(query_element(type_name, filter))
    }

    pub fn join(version: &str, join: &SpatialJoin) -> Self {
        Self::new(Operation::GetFeature, version).child(join_query_element(join))
    }

    pub fn stored_query(version: &str, id: &str, parameters: &[(String, String)]) -> Self {
        Self::new(Operation::GetFeature, version).child(stored_query_element(id, parameters))
    }

    pub fn to_element(&self) -> Element {
        let mut root = Element::new(WFS, self.operation.as_str()).attr("service", "WFS");
        if self.operation == Operation::GetCapabilities {
            root.push(
                Element::new(OWS, "AcceptVersions")
                    .child(Element::new(OWS, "Version").text(self.version.clone())),
            );
        } else {
            root.set_attr("version", self.version.clone());
        }
        for (name, value) in &self.attributes {
            root.set_attr(name, value.clone());
        }
        for element in &self.body {
            root.push(element.clone());
        }
        root
    }
}

/// `wfs:Query` for one feature type with an optional filter.
pub fn query_element(type_name: &QName, filter: Option<&FilterExpression>) -> Element {
    let mut query = Element::new(WFS, "Query")
        .declare_name(type_name)
        .attr("typeNames", type_name.prefixed());
    if let Some(filter) = filter {
        query.push(encode::filter_element(filter));
    }
    query
}

/// `wfs:Query` over both joined types, aliased when they are the same type.
pub fn join_query_element(join: &SpatialJoin) -> Element {
    let operands = [&join.left, &join.right];
    let mut query = Element::new(WFS, "Query");
    for operand in operands {
        query = query.declare_name(&operand.type_name);
    }
    let type_names = operands
        .iter()
        .map(|o| o.type_name.prefixed())
        .collect::<Vec<_>>()
        .join(" ");
    query.set_attr("typeNames", type_names);
    let aliases: Vec<&str> = operands.iter().filter_map(|o| o.alias.as_deref()).collect();
    if aliases.len() == operands.len() {
        query.set_attr("aliases", aliases.join(" "));
    }
    query.child(encode::join_filter_element(join))
}

/// `wfs:StoredQuery` invocation with literal parameter values.
pub fn stored_query_element(id: &str, parameters: &[(String, String)]) -> Element {
    Element::new(WFS, "StoredQuery")
        .attr("id", id)
        .children_from(parameters.iter().map(|(name, value)| {
            Element::new(WFS, "Parameter")
                .attr("name", name.as_str())
                .text(value.clone())
        }))
}
