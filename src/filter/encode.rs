//! FES 2.0 / GML 3.2 encoding of filter expressions.

use geo::Rect;

use super::expression::{FilterExpression, SpatialJoin, TemporalValue, TimePosition};
use crate::xml::namespaces::{FES, GML};
use crate::xml::{Element, QName};

/// `fes:Filter` wrapping the expression, with every referenced property
/// namespace declared on the root.
pub fn filter_element(expression: &FilterExpression) -> Element {
    let mut ids = 0usize;
    let mut filter = Element::new(FES, "Filter");
    for property in expression.properties() {
        filter = filter.declare_name(property);
    }
    filter.children_from(predicates(expression, &mut ids))
}

/// `fes:Filter` holding a join predicate between two value references.
pub fn join_filter_element(join: &SpatialJoin) -> Element {
    let mut filter = Element::new(FES, "Filter");
    for operand in [&join.left, &join.right] {
        filter = filter.declare_name(&operand.type_name).declare_name(&operand.property);
    }
    filter.child(
        Element::new(FES, join.op.element_name())
            .child(Element::new(FES, "ValueReference").text(join.left.path()))
            .child(Element::new(FES, "ValueReference").text(join.right.path())),
    )
}

fn next_gml_id(ids: &mut usize, kind: &str) -> String {
    *ids += 1;
    format!("filter.{}.{}", kind, ids)
}

fn value_reference(property: &QName) -> Element {
    Element::new(FES, "ValueReference").text(property.prefixed())
}

fn literal(value: &str) -> Element {
    Element::new(FES, "Literal").text(value)
}

/// Resource id predicates expand to one element each; every other node to exactly one.
fn predicates(expression: &FilterExpression, ids: &mut usize) -> Vec<Element> {
    match expression {
        FilterExpression::ResourceId(predicates) => predicates
            .iter()
            .map(|p| {
                let mut rid = Element::new(FES, "ResourceId").attr("rid", p.rid.as_str());
                if let Some(version) = &p.version {
                    rid.set_attr("version", version.as_str());
                }
                rid
            })
            .collect(),
        other => vec![predicate(other, ids)],
    }
}

fn operands(children: &[FilterExpression], ids: &mut usize) -> Vec<Element> {
    children.iter().flat_map(|c| predicates(c, ids)).collect()
}

fn predicate(expression: &FilterExpression, ids: &mut usize) -> Element {
    match expression {
        FilterExpression::Comparison {
            op,
            property,
            literal: value,
            match_case,
        } => Element::new(FES, op.element_name())
            .attr("matchCase", match_case.to_string())
            .child(value_reference(property))
            .child(literal(value)),
        FilterExpression::Between { property, lower, upper } => {
            Element::new(FES, "PropertyIsBetween")
                .child(value_reference(property))
                .child(Element::new(FES, "LowerBoundary").child(literal(lower)))
                .child(Element::new(FES, "UpperBoundary").child(literal(upper)))
        }
        FilterExpression::Like {
            property,
            pattern,
            wild_card,
            single_char,
            escape_char,
        } => Element::new(FES, "PropertyIsLike")
            .attr("wildCard", wild_card.to_string())
            .attr("singleChar", single_char.to_string())
            .attr("escapeChar", escape_char.to_string())
            .child(value_reference(property))
            .child(literal(pattern)),
        FilterExpression::IsNull { property } => {
            Element::new(FES, "PropertyIsNull").child(value_reference(property))
        }
        FilterExpression::IsNil { property } => {
            Element::new(FES, "PropertyIsNil").child(value_reference(property))
        }
        FilterExpression::Spatial {
            op,
            property,
            envelope,
            srs_name,
        } => {
            let operand = match op {
                super::SpatialOp::Bbox => envelope_element(envelope, srs_name.as_deref()),
                _ => polygon_element(envelope, srs_name.as_deref(), &next_gml_id(ids, "geom")),
            };
            Element::new(FES, op.element_name())
                .child(value_reference(property))
                .child(operand)
        }
        FilterExpression::Temporal { op, property, value } => {
            let operand = match value {
                TemporalValue::Instant(at) => time_instant(at, &next_gml_id(ids, "time")),
                TemporalValue::Period(begin, end) => {
                    time_period(begin, end, &next_gml_id(ids, "time"))
                }
            };
            Element::new(FES, op.element_name())
                .child(value_reference(property))
                .child(operand)
        }
        FilterExpression::And(children) => {
            Element::new(FES, "And").children_from(operands(children, ids))
        }
        FilterExpression::Or(children) => {
            Element::new(FES, "Or").children_from(operands(children, ids))
        }
        FilterExpression::Not(inner) => {
            Element::new(FES, "Not").children_from(predicates(inner, ids))
        }
        // `predicates` expands resource ids before they get here.
        FilterExpression::ResourceId(_) => predicates(expression, ids)
            .into_iter()
            .next()
            .unwrap_or_else(|| Element::new(FES, "ResourceId")),
    }
}

pub fn envelope_element(envelope: &Rect<f64>, srs_name: Option<&str>) -> Element {
    let mut element = Element::new(GML, "Envelope");
    if let Some(srs) = srs_name {
        element.set_attr("srsName", srs);
    }
    element
        .child(
            Element::new(GML, "lowerCorner")
                .text(format!("{} {}", envelope.min().x, envelope.min().y)),
        )
        .child(
            Element::new(GML, "upperCorner")
                .text(format!("{} {}", envelope.max().x, envelope.max().y)),
        )
}

pub fn polygon_element(envelope: &Rect<f64>, srs_name: Option<&str>, gml_id: &str) -> Element {
    let (min, max) = (envelope.min(), envelope.max());
    let ring = format!(
        "{x0} {y0} {x1} {y0} {x1} {y1} {x0} {y1} {x0} {y0}",
        x0 = min.x,
        y0 = min.y,
        x1 = max.x,
        y1 = max.y
    );
    let mut polygon = Element::new(GML, "Polygon").attr_ns(GML, "id", gml_id);
    if let Some(srs) = srs_name {
        polygon.set_attr("srsName", srs);
    }
    polygon.child(
        Element::new(GML, "exterior").child(
            Element::new(GML, "LinearRing").child(Element::new(GML, "posList").text(ring)),
        ),
    )
}

pub fn time_instant(at: &TimePosition, gml_id: &str) -> Element {
    Element::new(GML, "TimeInstant")
        .attr_ns(GML, "id", gml_id)
        .child(Element::new(GML, "timePosition").text(at.to_string()))
}

pub fn time_period(begin: &TimePosition, end: &TimePosition, gml_id: &str) -> Element {
    Element::new(GML, "TimePeriod")
        .attr_ns(GML, "id", gml_id)
        .child(Element::new(GML, "beginPosition").text(begin.to_string()))
        .child(Element::new(GML, "endPosition").text(end.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ComparisonOp, SpatialOp, TemporalOp};
    use geo::Coord;

    fn name() -> QName {
        QName::new("http://example.org/tns", "name").with_prefix("tns")
    }

    #[test]
    fn test_comparison_encoding() {
        let filter = FilterExpression::Comparison {
            op: ComparisonOp::EqualTo,
            property: QName::new("http://example.org/tns", "population").with_prefix("tns"),
            literal: "42".into(),
            match_case: true,
        };
        let xml = filter_element(&filter).to_string();
        assert!(xml.starts_with("<fes:Filter"));
        assert!(xml.contains("xmlns:tns=\"http://example.org/tns\""));
        assert!(xml.contains("<fes:PropertyIsEqualTo matchCase=\"true\">"));
        assert!(xml.contains("<fes:ValueReference>tns:population</fes:ValueReference>"));
        assert!(xml.contains("<fes:Literal>42</fes:Literal>"));
    }

    #[test]
    fn test_resource_ids_are_direct_children() {
        let filter = FilterExpression::resource_ids(["a", "b"]);
        let xml = filter_element(&filter).to_string();
        assert!(xml.contains("<fes:ResourceId rid=\"a\"/><fes:ResourceId rid=\"b\"/>"));
    }

    #[test]
    fn test_spatial_operands() {
        let envelope = Rect::new(Coord { x: 0.0, y: 1.0 }, Coord { x: 2.0, y: 3.0 });
        let bbox = FilterExpression::Spatial {
            op: SpatialOp::Bbox,
            property: name(),
            envelope,
            srs_name: Some("urn:ogc:def:crs:EPSG::4326".into()),
        };
        let xml = filter_element(&bbox).to_string();
        assert!(xml.contains("<gml:lowerCorner>0 1</gml:lowerCorner>"));
        assert!(xml.contains("srsName=\"urn:ogc:def:crs:EPSG::4326\""));

        let within = FilterExpression::Spatial {
            op: SpatialOp::Within,
            property: name(),
            envelope,
            srs_name: None,
        };
        let xml = filter_element(&within).to_string();
        assert!(xml.contains("<gml:posList>0 1 2 1 2 3 0 3 0 1</gml:posList>"));
    }

    #[test]
    fn test_join_predicate_has_two_value_references() {
        let place = QName::new("http://example.org/tns", "Place").with_prefix("tns");
        let operand = |alias: &str| crate::filter::JoinOperand {
            type_name: place.clone(),
            alias: Some(alias.to_string()),
            property: QName::new("http://example.org/tns", "geom").with_prefix("tns"),
        };
        let join = SpatialJoin {
            op: SpatialOp::Intersects,
            left: operand("a"),
            right: operand("b"),
        };
        let xml = join_filter_element(&join).to_string();
        assert!(xml.contains(
            "<fes:Intersects><fes:ValueReference>a/tns:geom</fes:ValueReference><fes:ValueReference>b/tns:geom</fes:ValueReference></fes:Intersects>"
        ));
        assert!(xml.contains("xmlns:tns=\"http://example.org/tns\""));
    }

    #[test]
    fn test_temporal_period() {
        let begin = TimePosition::parse("2020-01-01").unwrap();
        let end = TimePosition::parse("2020-01-03").unwrap();
        let during = FilterExpression::Temporal {
            op: TemporalOp::During,
            property: name(),
            value: TemporalValue::Period(begin, end),
        };
        let xml = filter_element(&during).to_string();
        assert!(xml.contains("<fes:During>"));
        assert!(xml.contains("<gml:beginPosition>2020-01-01</gml:beginPosition>"));
    }
}
