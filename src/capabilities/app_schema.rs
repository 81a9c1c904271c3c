//! Property descriptors from a DescribeFeatureType response (a GML application schema).

use roxmltree::{Document, Node};

use super::feature_type::{PropertyDescriptor, PropertyType};
use crate::error::{ConformanceError, ConformanceResult};
use crate::xml::namespaces::{GML, XSD};
use crate::xml::{QName, reader};

struct Schema<'a, 'i> {
    node: Node<'a, 'i>,
    target_namespace: &'a str,
}

pub fn properties_for(source: &str, type_name: &QName) -> ConformanceResult<Vec<PropertyDescriptor>> {
    let doc = Document::parse(source)?;
    let schemas = collect_schemas(&doc);
    if schemas.is_empty() {
        return Err(ConformanceError::schema(format!(
            "DescribeFeatureType response for {} contains no xsd:schema",
            type_name.prefixed()
        )));
    }

    let element = schemas
        .iter()
        .filter(|s| s.target_namespace == type_name.namespace)
        .find_map(|s| {
            reader::children(s.node, XSD, "element")
                .find(|e| e.attribute("name") == Some(type_name.local_name.as_str()))
        })
        .ok_or_else(|| {
            ConformanceError::schema(format!(
                "No element declaration for feature type {}",
                type_name.prefixed()
            ))
        })?;

    let complex_type = match element.attribute("type") {
        Some(type_attr) => {
            let qname = reader::resolve_qname(element, type_attr).ok_or_else(|| {
                ConformanceError::schema(format!("Unresolvable type reference '{}'", type_attr))
            })?;
            find_named(&schemas, "complexType", &qname).ok_or_else(|| {
                ConformanceError::schema(format!("Complex type {} not declared", qname.prefixed()))
            })?
        }
        None => reader::child(element, XSD, "complexType").ok_or_else(|| {
            ConformanceError::schema(format!(
                "Feature type {} has neither a type attribute nor an inline complexType",
                type_name.prefixed()
            ))
        })?,
    };

    let mut declarations = Vec::new();
    collect_elements(complex_type, &mut declarations);

    Ok(declarations
        .into_iter()
        .filter_map(|decl| describe(&schemas, decl, type_name))
        .collect())
}

fn collect_schemas<'a, 'i>(doc: &'a Document<'i>) -> Vec<Schema<'a, 'i>> {
    doc.descendants()
        .filter(|n| reader::is(*n, XSD, "schema"))
        .map(|node| Schema {
            node,
            target_namespace: node.attribute("targetNamespace").unwrap_or(""),
        })
        .collect()
}

fn find_named<'a, 'i>(schemas: &[Schema<'a, 'i>], kind: &str, name: &QName) -> Option<Node<'a, 'i>> {
    schemas
        .iter()
        .filter(|s| s.target_namespace == name.namespace)
        .find_map(|s| {
            s.node
                .children()
                .find(|c| {
                    reader::is(*c, XSD, kind) && c.attribute("name") == Some(name.local_name.as_str())
                })
        })
}

/// Walk content models down to the local element declarations, without entering them.
fn collect_elements<'a, 'i>(node: Node<'a, 'i>, out: &mut Vec<Node<'a, 'i>>) {
    for child in reader::elements(node) {
        if child.tag_name().namespace() != Some(XSD) {
            continue;
        }
        match child.tag_name().name() {
            "element" => out.push(child),
            "complexContent" | "extension" | "restriction" | "sequence" | "choice" | "all" => {
                collect_elements(child, out)
            }
            _ => {}
        }
    }
}

fn describe(schemas: &[Schema<'_, '_>], decl: Node<'_, '_>, owner: &QName) -> Option<PropertyDescriptor> {
    let name = match (decl.attribute("name"), decl.attribute("ref")) {
        (Some(local), _) => {
            let prefix = owner.prefix.clone().unwrap_or_default();
            QName::new(&owner.namespace, local).with_prefix(prefix)
        }
        (None, Some(reference)) => reader::resolve_qname(decl, reference)?,
        (None, None) => return None,
    };

    let (property_type, enumerations) = classify(schemas, decl);
    let min_occurs = decl
        .attribute("minOccurs")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let nillable = decl.attribute("nillable") == Some("true");

    Some(PropertyDescriptor {
        name,
        property_type,
        nillable,
        min_occurs,
        enumerations,
    })
}

fn classify(schemas: &[Schema<'_, '_>], decl: Node<'_, '_>) -> (PropertyType, Vec<String>) {
    if let Some(type_attr) = decl.attribute("type") {
        return match reader::resolve_qname(decl, type_attr) {
            Some(qname) => classify_name(schemas, &qname, 0),
            None => (PropertyType::Other(type_attr.to_string()), Vec::new()),
        };
    }
    if let Some(simple) = reader::child(decl, XSD, "simpleType") {
        return classify_simple(schemas, simple, 0);
    }
    if let Some(base) = reader::child(decl, XSD, "complexType")
        .and_then(|c| reader::child(c, XSD, "simpleContent"))
        .and_then(|s| reader::first_element(s))
        .and_then(|ext| ext.attribute("base").and_then(|b| reader::resolve_qname(ext, b)))
    {
        return classify_name(schemas, &base, 0);
    }
    (PropertyType::Other("anyType".to_string()), Vec::new())
}

const MAX_DERIVATION_DEPTH: usize = 8;

fn classify_name(schemas: &[Schema<'_, '_>], name: &QName, depth: usize) -> (PropertyType, Vec<String>) {
    if name.namespace == XSD {
        return (PropertyType::from_xsd(&name.local_name), Vec::new());
    }
    if name.namespace == GML {
        return (PropertyType::from_gml(&name.local_name), Vec::new());
    }
    if depth < MAX_DERIVATION_DEPTH
        && let Some(simple) = find_named(schemas, "simpleType", name)
    {
        return classify_simple(schemas, simple, depth + 1);
    }
    (PropertyType::Other(name.local_name.clone()), Vec::new())
}

fn classify_simple(
    schemas: &[Schema<'_, '_>],
    simple: Node<'_, '_>,
    depth: usize,
) -> (PropertyType, Vec<String>) {
    let Some(restriction) = reader::child(simple, XSD, "restriction") else {
        return (PropertyType::String, Vec::new());
    };
    let enumerations: Vec<String> = reader::children(restriction, XSD, "enumeration")
        .filter_map(|e| e.attribute("value").map(str::to_string))
        .collect();
    let base = restriction
        .attribute("base")
        .and_then(|b| reader::resolve_qname(restriction, b));
    let (property_type, inherited) = match base {
        Some(base) => classify_name(schemas, &base, depth),
        None => (PropertyType::String, Vec::new()),
    };
    let enumerations = if enumerations.is_empty() { inherited } else { enumerations };
    (property_type, enumerations)
}
