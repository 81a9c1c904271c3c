use geo::{Coord, Rect};
use indexmap::IndexMap;
use roxmltree::{Document, Node};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use url::Url;

use super::feature_type::FeatureTypeInfo;
use crate::binding::{BindingKind, Operation};
use crate::error::{ConformanceError, ConformanceResult};
use crate::xml::namespaces::{self, FES, OWS, WFS, XLINK};
use crate::xml::{QName, reader};

/// Conformance classes a service can claim in its capabilities document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ConformanceClass {
    Simple,
    Basic,
    Transactional,
    Locking,
    Kvp,
    Xml,
    Soap,
    ManageStoredQueries,
    ResultPaging,
    FeatureVersioning,
}

impl ConformanceClass {
    /// Name of the `ows:Constraint` declaring the class.
    pub fn constraint_name(&self) -> Option<&'static str> {
        match self {
            Self::Simple => None,
            Self::Basic => Some("ImplementsBasicWFS"),
            Self::Transactional => Some("ImplementsTransactionalWFS"),
            Self::Locking => Some("ImplementsLockingWFS"),
            Self::Kvp => Some("KVPEncoding"),
            Self::Xml => Some("XMLEncoding"),
            Self::Soap => Some("SOAPEncoding"),
            Self::ManageStoredQueries => Some("ManageStoredQueries"),
            Self::ResultPaging => Some("ImplementsResultPaging"),
            Self::FeatureVersioning => Some("ImplementsFeatureVersioning"),
        }
    }

    pub fn all() -> [ConformanceClass; 10] {
        [
            Self::Simple,
            Self::Basic,
            Self::Transactional,
            Self::Locking,
            Self::Kvp,
            Self::Xml,
            Self::Soap,
            Self::ManageStoredQueries,
            Self::ResultPaging,
            Self::FeatureVersioning,
        ]
    }
}

impl fmt::Display for ConformanceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Simple => "Simple WFS",
            Self::Basic => "Basic WFS",
            Self::Transactional => "Transactional WFS",
            Self::Locking => "Locking WFS",
            Self::Kvp => "HTTP GET (KVP)",
            Self::Xml => "HTTP POST (XML)",
            Self::Soap => "SOAP",
            Self::ManageStoredQueries => "Manage stored queries",
            Self::ResultPaging => "Response paging",
            Self::FeatureVersioning => "Feature versions",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperationInfo {
    pub name: String,
    pub get: Option<Url>,
    pub post: Option<Url>,
    pub constraints: IndexMap<String, String>,
    pub parameters: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct FilterCapabilities {
    pub conformance: IndexMap<String, String>,
    pub comparison_operators: Vec<String>,
    pub spatial_operators: Vec<String>,
    pub temporal_operators: Vec<String>,
    pub logical_operators: bool,
    pub resource_identifiers: bool,
}

impl FilterCapabilities {
    pub fn implements(&self, constraint: &str) -> bool {
        self.conformance
            .get(constraint)
            .is_some_and(|v| is_true(v))
    }

    pub fn supports_comparison(&self, operator: &str) -> bool {
        contains_ignore_case(&self.comparison_operators, operator)
    }

    pub fn supports_spatial(&self, operator: &str) -> bool {
        contains_ignore_case(&self.spatial_operators, operator)
    }

    pub fn supports_temporal(&self, operator: &str) -> bool {
        contains_ignore_case(&self.temporal_operators, operator)
    }

    pub fn supports_logical(&self) -> bool {
        self.logical_operators || self.implements("ImplementsStandardFilter")
    }

    pub fn supports_resource_id(&self) -> bool {
        self.resource_identifiers || self.implements("ImplementsResourceId")
    }

    pub fn supports_version_navigation(&self) -> bool {
        self.implements("ImplementsVersionNav")
    }
}

fn contains_ignore_case(list: &[String], value: &str) -> bool {
    list.iter().any(|v| v.eq_ignore_ascii_case(value))
}

fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Parsed capabilities of the service under test.
#[derive(Debug, Clone)]
pub struct CapabilityModel {
    pub version: String,
    pub operations: IndexMap<String, OperationInfo>,
    pub constraints: IndexMap<String, String>,
    pub conformance: BTreeSet<ConformanceClass>,
    pub filter: FilterCapabilities,
    pub output_formats: Vec<String>,
    pub feature_types: IndexMap<QName, FeatureTypeInfo>,
}

impl CapabilityModel {
    pub fn parse(source: &str) -> ConformanceResult<Self> {
        let doc = Document::parse(source)?;
        let root = doc.root_element();

        if root.tag_name().name() == "ExceptionReport"
            && namespaces::is_ows(root.tag_name().namespace())
        {
            return Err(ConformanceError::business_rule(
                "GetCapabilities returned an exception report",
            ));
        }
        if !reader::is(root, WFS, "WFS_Capabilities") {
            return Err(ConformanceError::schema(format!(
                "Expected wfs:WFS_Capabilities but found {}",
                reader::element_qname(root)
            )));
        }

        let version = root
            .attribute("version")
            .ok_or_else(|| ConformanceError::schema("WFS_Capabilities has no version attribute"))?
            .to_string();

        let mut operations = IndexMap::new();
        let mut constraints = IndexMap::new();
        let mut global_parameters = IndexMap::new();
        if let Some(metadata) = reader::child(root, OWS, "OperationsMetadata") {
            for op in reader::children(metadata, OWS, "Operation") {
                let info = parse_operation(op);
                operations.insert(info.name.clone(), info);
            }
            constraints = parse_constraints(metadata);
            global_parameters = parse_parameters(metadata);
        }

        let filter = reader::child(root, FES, "Filter_Capabilities")
            .map(parse_filter_capabilities)
            .unwrap_or_default();

        let mut output_formats = operations
            .get(Operation::GetFeature.as_str())
            .and_then(|op| op.parameters.get("outputFormat"))
            .or_else(|| global_parameters.get("outputFormat"))
            .cloned()
            .unwrap_or_default();
        output_formats.dedup();

        let mut feature_types = IndexMap::new();
        if let Some(list) = reader::child(root, WFS, "FeatureTypeList") {
            for node in reader::children(list, WFS, "FeatureType") {
                if let Some(info) = parse_feature_type(node) {
                    feature_types.insert(info.name.clone(), info);
                }
            }
        }

        let mut model = Self {
            version,
            operations,
            constraints,
            conformance: BTreeSet::new(),
            filter,
            output_formats,
            feature_types,
        };
        model.conformance = model.derive_conformance();
        Ok(model)
    }

    fn derive_conformance(&self) -> BTreeSet<ConformanceClass> {
        let mut claimed: BTreeSet<ConformanceClass> = ConformanceClass::all()
            .into_iter()
            .filter(|class| {
                class
                    .constraint_name()
                    .is_some_and(|name| self.constraint_is_true(name))
            })
            .collect();

        let simple_ops = [
            Operation::GetCapabilities,
            Operation::DescribeFeatureType,
            Operation::ListStoredQueries,
            Operation::DescribeStoredQueries,
            Operation::GetFeature,
        ];
        if simple_ops.iter().all(|op| self.supports_operation(*op)) {
            claimed.insert(ConformanceClass::Simple);
        }
        claimed
    }

    pub fn claims(&self, class: ConformanceClass) -> bool {
        self.conformance.contains(&class)
    }

    pub fn is_wfs_200(&self) -> bool {
        self.version == "2.0.0"
    }

    pub fn supports_operation(&self, operation: Operation) -> bool {
        self.operations.contains_key(operation.as_str())
    }

    pub fn constraint(&self, name: &str) -> Option<&str> {
        self.constraints.get(name).map(String::as_str)
    }

    pub fn constraint_is_true(&self, name: &str) -> bool {
        self.constraint(name).is_some_and(is_true)
    }

    pub fn endpoint(&self, operation: Operation, binding: BindingKind) -> Option<&Url> {
        let op = self.operations.get(operation.as_str())?;
        match binding {
            BindingKind::Kvp => op.get.as_ref(),
            BindingKind::Xml | BindingKind::Soap => op.post.as_ref(),
        }
    }

    /// Encodings the service accepts globally, in KVP, XML, SOAP order.
    pub fn global_bindings(&self) -> Vec<BindingKind> {
        BindingKind::all()
            .into_iter()
            .filter(|b| self.constraint_is_true(b.constraint_name()))
            .collect()
    }

    /// Encodings usable for an operation: operation-level constraints plus the
    /// global ones, restricted to those with an advertised endpoint.
    pub fn operation_bindings(&self, operation: Operation) -> Vec<BindingKind> {
        let Some(op) = self.operations.get(operation.as_str()) else {
            return Vec::new();
        };
        BindingKind::all()
            .into_iter()
            .filter(|b| {
                op.constraints
                    .get(b.constraint_name())
                    .is_some_and(|v| is_true(v))
                    || self.constraint_is_true(b.constraint_name())
            })
            .filter(|b| !(*b == BindingKind::Kvp && !operation.is_kvp_encodable()))
            .filter(|b| self.endpoint(operation, *b).is_some())
            .collect()
    }

    pub fn paging_is_transaction_safe(&self) -> bool {
        self.constraint_is_true("PagingIsTransactionSafe")
    }

    pub fn count_default(&self) -> Option<u64> {
        self.constraint("CountDefault").and_then(|v| v.trim().parse().ok())
    }

    pub fn response_cache_timeout(&self) -> Option<u64> {
        self.constraint("ResponseCacheTimeout")
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn implements_sorting(&self) -> bool {
        self.filter.implements("ImplementsSorting")
    }

    pub fn feature_type(&self, name: &QName) -> Option<&FeatureTypeInfo> {
        self.feature_types.get(name)
    }

    /// Identifier of the mandatory GetFeatureById stored query for this service version.
    pub fn get_feature_by_id_query(&self) -> &'static str {
        if self.is_wfs_200() {
            "urn:ogc:def:query:OGC-WFS::GetFeatureById"
        } else {
            "GetFeatureById"
        }
    }
}

fn parse_operation(node: Node<'_, '_>) -> OperationInfo {
    let name = node.attribute("name").unwrap_or_default().to_string();
    let mut info = OperationInfo {
        name,
        ..Default::default()
    };
    for http in reader::children(node, OWS, "DCP").filter_map(|dcp| reader::child(dcp, OWS, "HTTP")) {
        if info.get.is_none() {
            info.get = reader::child(http, OWS, "Get").and_then(endpoint_href);
        }
        if info.post.is_none() {
            info.post = reader::child(http, OWS, "Post").and_then(endpoint_href);
        }
    }
    info.constraints = parse_constraints(node);
    info.parameters = parse_parameters(node);
    info
}

fn endpoint_href(node: Node<'_, '_>) -> Option<Url> {
    let href = node.attribute((XLINK, "href"))?;
    match Url::parse(href.trim()) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            Some(url)
        }
        Err(e) => {
            tracing::warn!("Ignoring unparsable endpoint '{}': {}", href, e);
            None
        }
    }
}

/// Direct `ows:Constraint` children, name to default (or first allowed) value.
fn parse_constraints(node: Node<'_, '_>) -> IndexMap<String, String> {
    reader::children(node, OWS, "Constraint")
        .filter_map(|c| {
            let name = c.attribute("name")?.to_string();
            let value = reader::child_text(c, OWS, "DefaultValue").or_else(|| {
                reader::child(c, OWS, "AllowedValues")
                    .and_then(|a| reader::child_text(a, OWS, "Value"))
            })?;
            Some((name, value))
        })
        .collect()
}

fn parse_parameters(node: Node<'_, '_>) -> IndexMap<String, Vec<String>> {
    reader::children(node, OWS, "Parameter")
        .filter_map(|p| {
            let name = p.attribute("name")?.to_string();
            let values = reader::descendants(p, OWS, "Value")
                .map(reader::text)
                .collect();
            Some((name, values))
        })
        .collect()
}

fn parse_filter_capabilities(node: Node<'_, '_>) -> FilterCapabilities {
    let conformance = reader::child(node, FES, "Conformance")
        .map(|c| {
            reader::children(c, FES, "Constraint")
                .filter_map(|constraint| {
                    let name = constraint.attribute("name")?.to_string();
                    let value = reader::child_text(constraint, OWS, "DefaultValue")?;
                    Some((name, value))
                })
                .collect()
        })
        .unwrap_or_default();

    let operator_names = |container: &str, operator: &str| -> Vec<String> {
        reader::descendants(node, FES, container)
            .flat_map(|c| reader::descendants(c, FES, operator).collect::<Vec<_>>())
            .filter_map(|op| op.attribute("name").map(str::to_string))
            .collect()
    };

    FilterCapabilities {
        conformance,
        comparison_operators: operator_names("ComparisonOperators", "ComparisonOperator"),
        spatial_operators: operator_names("SpatialOperators", "SpatialOperator"),
        temporal_operators: operator_names("TemporalOperators", "TemporalOperator"),
        logical_operators: reader::descendants(node, FES, "LogicalOperators")
            .next()
            .is_some(),
        resource_identifiers: reader::descendants(node, FES, "ResourceIdentifier")
            .next()
            .is_some(),
    }
}

fn parse_feature_type(node: Node<'_, '_>) -> Option<FeatureTypeInfo> {
    let name_node = reader::child(node, WFS, "Name")?;
    let text = reader::text(name_node);
    let name = match reader::resolve_qname(name_node, &text) {
        Some(name) => name,
        None => {
            tracing::warn!("Feature type name '{}' has an undeclared prefix", text);
            QName::new("", text.rsplit(':').next().unwrap_or(&text))
        }
    };

    let mut info = FeatureTypeInfo::new(name);
    info.title = reader::child_text(node, WFS, "Title");
    info.default_crs = reader::child_text(node, WFS, "DefaultCRS");
    info.other_crs = reader::children(node, WFS, "OtherCRS")
        .map(reader::text)
        .collect();
    info.extent = reader::child(node, OWS, "WGS84BoundingBox").and_then(|bbox| {
        let lower = parse_corner(&reader::child_text(bbox, OWS, "LowerCorner")?)?;
        let upper = parse_corner(&reader::child_text(bbox, OWS, "UpperCorner")?)?;
        Some(Rect::new(lower, upper))
    });
    Some(info)
}

fn parse_corner(text: &str) -> Option<Coord<f64>> {
    let mut values = text.split_whitespace().filter_map(|v| v.parse::<f64>().ok());
    Some(Coord {
        x: values.next()?,
        y: values.next()?,
    })
}
