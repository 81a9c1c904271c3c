use roxmltree::Node;

use super::namespaces::QName;

pub fn is(node: Node<'_, '_>, namespace: &str, local_name: &str) -> bool {
    node.is_element() && node.has_tag_name((namespace, local_name))
}

pub fn child<'a, 'i>(node: Node<'a, 'i>, namespace: &str, local_name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|c| is(*c, namespace, local_name))
}

pub fn children<'a, 'i>(
    node: Node<'a, 'i>,
    namespace: &'a str,
    local_name: &'a str,
) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(move |c| is(*c, namespace, local_name))
}

pub fn elements<'a, 'i>(node: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(|c| c.is_element())
}

pub fn first_element<'a, 'i>(node: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
    node.children().find(|c| c.is_element())
}

pub fn descendants<'a, 'i>(
    node: Node<'a, 'i>,
    namespace: &'a str,
    local_name: &'a str,
) -> impl Iterator<Item = Node<'a, 'i>> {
    node.descendants().filter(move |c| is(*c, namespace, local_name))
}

/// Concatenated, trimmed text content of an element.
pub fn text(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn child_text(node: Node<'_, '_>, namespace: &str, local_name: &str) -> Option<String> {
    child(node, namespace, local_name).map(text)
}

/// Resolve a prefixed value such as `tns:Place` against the namespaces in scope at `node`.
pub fn resolve_qname(node: Node<'_, '_>, value: &str) -> Option<QName> {
    let value = value.trim();
    match value.split_once(':') {
        Some((prefix, local)) => {
            let namespace = node.lookup_namespace_uri(Some(prefix))?;
            Some(QName::new(namespace, local).with_prefix(prefix))
        }
        None => {
            let namespace = node.lookup_namespace_uri(None).unwrap_or("");
            Some(QName::new(namespace, value))
        }
    }
}

pub fn element_qname(node: Node<'_, '_>) -> QName {
    let tag = node.tag_name();
    let namespace = tag.namespace().unwrap_or("");
    let name = QName::new(namespace, tag.name());
    match node.lookup_prefix(namespace) {
        Some(prefix) if !namespace.is_empty() => name.with_prefix(prefix),
        _ => name,
    }
}
