//! Owned XML element tree used to build request messages.
//!
//! Prefixes are resolved at serialization time: an element or attribute in a
//! namespace gets the prefix already in scope for that namespace, otherwise a
//! declaration is written on the spot. Explicit declarations (`declare`) are
//! only needed when a prefix is referenced from text or attribute values, as
//! with `typeNames="tns:Place"`.

use std::fmt;

use super::namespaces::{QName, preferred_prefix};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub declarations: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            prefix: preferred_prefix(namespace).map(str::to_string),
            name: name.to_string(),
            attributes: Vec::new(),
            declarations: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn unqualified(name: &str) -> Self {
        Self {
            namespace: None,
            prefix: None,
            name: name.to_string(),
            attributes: Vec::new(),
            declarations: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn qualified(name: &QName) -> Self {
        if name.namespace.is_empty() {
            return Self::unqualified(&name.local_name);
        }
        let mut element = Self::new(&name.namespace, &name.local_name);
        element.prefix = Some(name.effective_prefix().to_string());
        element
    }

    pub fn qname(&self) -> QName {
        let name = QName::new(self.namespace.clone().unwrap_or_default(), &self.name);
        match &self.prefix {
            Some(prefix) => name.with_prefix(prefix.clone()),
            None => name,
        }
    }

    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn attr_ns(mut self, namespace: &str, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name == name && a.namespace.as_deref() == Some(namespace))
        {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute {
                namespace: Some(namespace.to_string()),
                prefix: preferred_prefix(namespace).map(str::to_string),
                name: name.to_string(),
                value,
            }),
        }
        self
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name == name && a.namespace.is_none())
        {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute {
                namespace: None,
                prefix: None,
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn declare(mut self, prefix: &str, namespace: &str) -> Self {
        if !self
            .declarations
            .iter()
            .any(|(p, ns)| p == prefix && ns == namespace)
        {
            self.declarations
                .push((prefix.to_string(), namespace.to_string()));
        }
        self
    }

    /// Declare the namespace of a qualified name so its prefixed form can be used in values.
    pub fn declare_name(self, name: &QName) -> Self {
        if name.namespace.is_empty() {
            return self;
        }
        let prefix = name.effective_prefix().to_string();
        self.declare(&prefix, &name.namespace)
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn children_from(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children
            .extend(children.into_iter().map(Node::Element));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.namespace.is_none())
            .map(|a| a.value.as_str())
    }

    pub fn attribute_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.namespace.as_deref() == Some(namespace))
            .map(|a| a.value.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|c| match c {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn find(&self, namespace: &str, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(namespace, name))
    }

    /// First child element with the given local name, in any namespace.
    pub fn find_local_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.name == name)
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out.trim().to_string()
    }

    /// Replace all content of this element with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![Node::Text(text.into())];
    }

    /// Copy an element subtree out of a parsed document, carrying its in-scope
    /// namespace declarations so the copy serializes standalone.
    pub fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let tag = node.tag_name();
        let namespace = tag.namespace().map(str::to_string);
        let prefix = tag
            .namespace()
            .and_then(|ns| node.lookup_prefix(ns))
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        let declarations = node
            .namespaces()
            .filter_map(|ns| ns.name().map(|p| (p.to_string(), ns.uri().to_string())))
            .filter(|(p, _)| p != "xml")
            .collect();

        let attributes = node
            .attributes()
            .map(|a| Attribute {
                namespace: a.namespace().map(str::to_string),
                prefix: a
                    .namespace()
                    .and_then(|ns| node.lookup_prefix(ns))
                    .map(str::to_string),
                name: a.name().to_string(),
                value: a.value().to_string(),
            })
            .collect();

        let children = node
            .children()
            .filter_map(|child| {
                if child.is_element() {
                    Some(Node::Element(Element::from_node(child)))
                } else if child.is_text() {
                    child
                        .text()
                        .filter(|t| !t.trim().is_empty())
                        .map(|t| Node::Text(t.to_string()))
                } else {
                    None
                }
            })
            .collect();

        Self {
            namespace,
            prefix,
            name: tag.name().to_string(),
            attributes,
            declarations,
            children,
        }
    }

    /// Serialize with an XML declaration.
    pub fn to_document(&self) -> String {
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", self)
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for child in &element.children {
        match child {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = Writer {
            scope: vec![("xml".to_string(), XML_NS.to_string())],
            generated: 0,
            out: String::new(),
        };
        writer.write(self);
        f.write_str(&writer.out)
    }
}

struct Writer {
    scope: Vec<(String, String)>,
    generated: usize,
    out: String,
}

impl Writer {
    fn resolve(&self, prefix: &str) -> Option<&str> {
        self.scope
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, ns)| ns.as_str())
    }

    fn prefix_for(&self, namespace: &str) -> Option<String> {
        self.scope
            .iter()
            .rev()
            .find(|(p, ns)| ns == namespace && self.resolve(p) == Some(namespace))
            .map(|(p, _)| p.clone())
    }

    /// Find or bind a prefix for `namespace`, recording any new declaration.
    fn bind(
        &mut self,
        namespace: &str,
        hint: Option<&str>,
        declared: &mut Vec<(String, String)>,
    ) -> String {
        if let Some(hint) = hint
            && self.resolve(hint) == Some(namespace)
        {
            return hint.to_string();
        }
        if let Some(prefix) = self.prefix_for(namespace) {
            return prefix;
        }
        let mut candidate = hint
            .map(str::to_string)
            .or_else(|| preferred_prefix(namespace).map(str::to_string));
        loop {
            match candidate {
                Some(ref p) if !p.is_empty() && self.resolve(p).is_none() => break,
                _ => {
                    self.generated += 1;
                    candidate = Some(format!("ns{}", self.generated));
                }
            }
        }
        let prefix = candidate.unwrap_or_default();
        self.scope.push((prefix.clone(), namespace.to_string()));
        declared.push((prefix.clone(), namespace.to_string()));
        prefix
    }

    fn write(&mut self, element: &Element) {
        let mark = self.scope.len();
        let mut declared = Vec::new();

        for (prefix, namespace) in &element.declarations {
            if self.resolve(prefix) != Some(namespace.as_str()) {
                self.scope.push((prefix.clone(), namespace.clone()));
                declared.push((prefix.clone(), namespace.clone()));
            }
        }

        let tag = match &element.namespace {
            Some(ns) => {
                let prefix = self.bind(ns, element.prefix.as_deref(), &mut declared);
                format!("{}:{}", prefix, element.name)
            }
            None => element.name.clone(),
        };

        let mut attributes = Vec::with_capacity(element.attributes.len());
        for attribute in &element.attributes {
            let name = match &attribute.namespace {
                Some(ns) => {
                    let prefix = self.bind(ns, attribute.prefix.as_deref(), &mut declared);
                    format!("{}:{}", prefix, attribute.name)
                }
                None => attribute.name.clone(),
            };
            attributes.push((name, escape(&attribute.value, true)));
        }

        self.out.push('<');
        self.out.push_str(&tag);
        for (prefix, namespace) in &declared {
            self.out.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape(namespace, true)));
        }
        for (name, value) in &attributes {
            self.out.push_str(&format!(" {}=\"{}\"", name, value));
        }

        if element.children.is_empty() {
            self.out.push_str("/>");
        } else {
            self.out.push('>');
            for child in &element.children {
                match child {
                    Node::Element(e) => self.write(e),
                    Node::Text(t) => self.out.push_str(&escape(t, false)),
                }
            }
            self.out.push_str("</");
            self.out.push_str(&tag);
            self.out.push('>');
        }

        self.scope.truncate(mark);
    }
}

pub fn escape(value: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
