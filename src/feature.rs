//! Feature instances as read back from a feature collection.

use geo::{BoundingRect, Coord, MultiPoint, Point, Rect};
use indexmap::IndexMap;
use roxmltree::Node;

use crate::xml::namespaces::{GML, WFS, XSI};
use crate::xml::{QName, reader};

/// A geometry-valued property, reduced to its envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryValue {
    pub envelope: Rect<f64>,
    pub srs_name: Option<String>,
}

/// Flattened view of one feature: identifier, scalar property text and geometry envelopes.
#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub id: String,
    pub type_name: QName,
    /// Local property name to its first value; `None` when the value is nil.
    pub values: IndexMap<String, Option<String>>,
    pub geometries: IndexMap<String, GeometryValue>,
}

impl FeatureRecord {
    pub fn from_node(node: Node<'_, '_>) -> Self {
        let mut values = IndexMap::new();
        let mut geometries = IndexMap::new();

        for property in reader::elements(node) {
            if property.tag_name().namespace() == Some(GML) {
                continue;
            }
            let name = property.tag_name().name().to_string();
            if values.contains_key(&name) || geometries.contains_key(&name) {
                continue;
            }

            if let Some(geometry) = reader::first_element(property)
                .filter(|g| g.tag_name().namespace() == Some(GML))
            {
                if let Some(envelope) = envelope_of(geometry) {
                    geometries.insert(
                        name,
                        GeometryValue {
                            envelope,
                            srs_name: srs_name_of(geometry).map(str::to_string),
                        },
                    );
                }
                continue;
            }

            let nil = property
                .attribute((XSI, "nil"))
                .is_some_and(|v| v.trim() == "true" || v.trim() == "1");
            let value = (!nil).then(|| reader::text(property));
            values.insert(name, value);
        }

        Self {
            id: feature_id(node).unwrap_or_default().to_string(),
            type_name: reader::element_qname(node),
            values,
            geometries,
        }
    }

    pub fn value(&self, property: &str) -> Option<&str> {
        self.values.get(property).and_then(|v| v.as_deref())
    }

    pub fn is_nil(&self, property: &str) -> bool {
        matches!(self.values.get(property), Some(None))
    }

    pub fn is_absent(&self, property: &str) -> bool {
        !self.values.contains_key(property) && !self.geometries.contains_key(property)
    }

    /// Envelope covering every geometry property of the feature.
    pub fn envelope(&self) -> Option<Rect<f64>> {
        self.geometries
            .values()
            .map(|g| g.envelope)
            .reduce(union)
    }
}

pub fn feature_id<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.attribute((GML, "id"))
}

/// Feature elements of a `wfs:FeatureCollection`, including nested collections.
pub fn features<'a, 'i>(collection: Node<'a, 'i>) -> Vec<Node<'a, 'i>> {
    let mut found = Vec::new();
    collect_features(collection, &mut found);
    found
}

fn collect_features<'a, 'i>(collection: Node<'a, 'i>, found: &mut Vec<Node<'a, 'i>>) {
    for member in reader::children(collection, WFS, "member") {
        for item in reader::elements(member) {
            if reader::is(item, WFS, "FeatureCollection") || reader::is(item, WFS, "Tuple") {
                collect_features(item, found);
            } else {
                found.push(item);
            }
        }
    }
}

/// Features of each `wfs:Tuple` member of a join response, in member order.
pub fn tuples<'a, 'i>(collection: Node<'a, 'i>) -> Vec<Vec<Node<'a, 'i>>> {
    reader::children(collection, WFS, "member")
        .filter_map(|member| reader::child(member, WFS, "Tuple"))
        .map(|tuple| {
            reader::children(tuple, WFS, "member")
                .filter_map(reader::first_element)
                .collect()
        })
        .collect()
}

pub fn feature_ids(collection: Node<'_, '_>) -> Vec<String> {
    features(collection)
        .into_iter()
        .filter_map(|f| feature_id(f).map(str::to_string))
        .collect()
}

fn srs_name_of<'a>(geometry: Node<'a, '_>) -> Option<&'a str> {
    geometry
        .ancestors()
        .chain(geometry.descendants())
        .find_map(|n| n.attribute("srsName"))
}

/// Bounding rectangle of every coordinate found under a GML geometry or envelope.
pub fn envelope_of(geometry: Node<'_, '_>) -> Option<Rect<f64>> {
    let mut points: Vec<Point<f64>> = Vec::new();

    for node in geometry.descendants().filter(|n| n.is_element()) {
        if node.tag_name().namespace() != Some(GML) {
            continue;
        }
        match node.tag_name().name() {
            "pos" | "lowerCorner" | "upperCorner" => {
                points.extend(parse_positions(&reader::text(node), 0));
            }
            "posList" => {
                let dimension = node
                    .attribute("srsDimension")
                    .or_else(|| {
                        node.ancestors()
                            .find_map(|a| a.attribute("srsDimension"))
                    })
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(2);
                points.extend(parse_positions(&reader::text(node), dimension));
            }
            "coordinates" => {
                let cs = node.attribute("cs").unwrap_or(",");
                let ts = node.attribute("ts").unwrap_or(" ");
                for tuple in reader::text(node).split(ts).filter(|t| !t.trim().is_empty()) {
                    let mut values = tuple.split(cs).filter_map(|v| v.trim().parse::<f64>().ok());
                    if let (Some(x), Some(y)) = (values.next(), values.next()) {
                        points.push(Point::new(x, y));
                    }
                }
            }
            _ => {}
        }
    }

    MultiPoint::new(points).bounding_rect()
}

/// Parse whitespace-separated ordinates; `dimension` 0 means a single position.
fn parse_positions(text: &str, dimension: usize) -> Vec<Point<f64>> {
    let ordinates: Vec<f64> = text
        .split_whitespace()
        .filter_map(|v| v.parse().ok())
        .collect();
    let stride = if dimension == 0 { ordinates.len().max(2) } else { dimension.max(2) };
    ordinates
        .chunks(stride)
        .filter(|c| c.len() >= 2)
        .map(|c| Point::new(c[0], c[1]))
        .collect()
}

pub fn union(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}
