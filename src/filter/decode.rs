//! Reads `fes:Filter` elements back into filter expressions.

use roxmltree::Node;

use super::expression::{
    ComparisonOp, FilterExpression, ResourceIdPredicate, SpatialOp, TemporalOp, TemporalValue,
    TimePosition, VersionAction,
};
use crate::error::{ConformanceError, ConformanceResult};
use crate::feature::envelope_of;
use crate::xml::namespaces::{FES, GML};
use crate::xml::{QName, reader};

/// Decode a `fes:Filter` element. Several sibling predicates (only legal for
/// resource ids) are combined into one expression.
pub fn decode_filter(filter: Node<'_, '_>) -> ConformanceResult<FilterExpression> {
    let children: Vec<Node> = reader::elements(filter).collect();
    if children.is_empty() {
        return Err(ConformanceError::schema("fes:Filter has no predicate"));
    }
    if children.iter().all(|c| reader::is(*c, FES, "ResourceId")) {
        return Ok(FilterExpression::ResourceId(
            children.into_iter().map(resource_id).collect::<ConformanceResult<_>>()?,
        ));
    }
    if children.len() > 1 {
        return Err(ConformanceError::schema(
            "fes:Filter holds several predicates that are not resource ids",
        ));
    }
    decode_predicate(children[0])
}

fn resource_id(node: Node<'_, '_>) -> ConformanceResult<ResourceIdPredicate> {
    let rid = node
        .attribute("rid")
        .ok_or_else(|| ConformanceError::schema("fes:ResourceId without rid"))?;
    Ok(ResourceIdPredicate {
        rid: rid.to_string(),
        version: node.attribute("version").map(VersionAction::parse),
    })
}

fn value_reference(node: Node<'_, '_>) -> ConformanceResult<QName> {
    let reference = reader::child(node, FES, "ValueReference").ok_or_else(|| {
        ConformanceError::schema(format!("fes:{} has no ValueReference", node.tag_name().name()))
    })?;
    let text = reader::text(reference);
    // XPath steps beyond the first and attribute axes are not interpreted.
    let step = text
        .trim_start_matches("./")
        .split('/')
        .next_back()
        .unwrap_or(&text)
        .to_string();
    Ok(reader::resolve_qname(reference, &step).unwrap_or_else(|| {
        let local = step.rsplit(':').next().unwrap_or(&step);
        QName::new("", local)
    }))
}

fn literal_in(node: Node<'_, '_>) -> ConformanceResult<String> {
    reader::child(node, FES, "Literal")
        .map(reader::text)
        .ok_or_else(|| {
            ConformanceError::schema(format!("fes:{} has no Literal", node.tag_name().name()))
        })
}

fn single_char(node: Node<'_, '_>, name: &str, default: char) -> char {
    node.attribute(name)
        .and_then(|v| v.chars().next())
        .unwrap_or(default)
}

fn time_position(node: Node<'_, '_>) -> ConformanceResult<TimePosition> {
    let text = reader::text(node);
    TimePosition::parse(&text)
        .ok_or_else(|| ConformanceError::schema(format!("Unparsable time position '{}'", text)))
}

fn temporal_operand(node: Node<'_, '_>) -> ConformanceResult<TemporalValue> {
    if let Some(instant) = reader::child(node, GML, "TimeInstant") {
        let position = reader::child(instant, GML, "timePosition")
            .ok_or_else(|| ConformanceError::schema("gml:TimeInstant without timePosition"))?;
        return Ok(TemporalValue::Instant(time_position(position)?));
    }
    if let Some(period) = reader::child(node, GML, "TimePeriod") {
        let begin = reader::child(period, GML, "beginPosition")
            .ok_or_else(|| ConformanceError::schema("gml:TimePeriod without beginPosition"))?;
        let end = reader::child(period, GML, "endPosition")
            .ok_or_else(|| ConformanceError::schema("gml:TimePeriod without endPosition"))?;
        return Ok(TemporalValue::Period(time_position(begin)?, time_position(end)?));
    }
    if let Some(literal) = reader::child(node, FES, "Literal") {
        return Ok(TemporalValue::Instant(time_position(literal)?));
    }
    Err(ConformanceError::schema(format!(
        "fes:{} has no temporal operand",
        node.tag_name().name()
    )))
}

pub fn decode_predicate(node: Node<'_, '_>) -> ConformanceResult<FilterExpression> {
    if node.tag_name().namespace() != Some(FES) {
        return Err(ConformanceError::schema(format!(
            "Unexpected {} inside fes:Filter",
            reader::element_qname(node)
        )));
    }
    let name = node.tag_name().name();

    if let Some(op) = ComparisonOp::from_element_name(name) {
        return Ok(FilterExpression::Comparison {
            op,
            property: value_reference(node)?,
            literal: literal_in(node)?,
            match_case: node.attribute("matchCase") != Some("false"),
        });
    }
    if let Some(op) = SpatialOp::from_element_name(name) {
        let operand = reader::elements(node)
            .find(|c| c.tag_name().namespace() == Some(GML))
            .ok_or_else(|| ConformanceError::schema(format!("fes:{} has no geometry", name)))?;
        let envelope = envelope_of(operand).ok_or_else(|| {
            ConformanceError::schema(format!("fes:{} geometry has no coordinates", name))
        })?;
        return Ok(FilterExpression::Spatial {
            op,
            property: value_reference(node)?,
            envelope,
            srs_name: operand.attribute("srsName").map(str::to_string),
        });
    }
    if let Some(op) = TemporalOp::from_element_name(name) {
        return Ok(FilterExpression::Temporal {
            op,
            property: value_reference(node)?,
            value: temporal_operand(node)?,
        });
    }

    match name {
        "PropertyIsBetween" => {
            let lower = reader::child(node, FES, "LowerBoundary")
                .ok_or_else(|| ConformanceError::schema("PropertyIsBetween without LowerBoundary"))?;
            let upper = reader::child(node, FES, "UpperBoundary")
                .ok_or_else(|| ConformanceError::schema("PropertyIsBetween without UpperBoundary"))?;
            Ok(FilterExpression::Between {
                property: value_reference(node)?,
                lower: literal_in(lower)?,
                upper: literal_in(upper)?,
            })
        }
        "PropertyIsLike" => Ok(FilterExpression::Like {
            property: value_reference(node)?,
            pattern: literal_in(node)?,
            wild_card: single_char(node, "wildCard", '*'),
            single_char: single_char(node, "singleChar", '.'),
            escape_char: single_char(node, "escapeChar", '\\'),
        }),
        "PropertyIsNull" => Ok(FilterExpression::IsNull {
            property: value_reference(node)?,
        }),
        "PropertyIsNil" => Ok(FilterExpression::IsNil {
            property: value_reference(node)?,
        }),
        "And" | "Or" => {
            let operands = reader::elements(node)
                .map(decode_predicate)
                .collect::<ConformanceResult<Vec<_>>>()?;
            if operands.len() < 2 {
                return Err(ConformanceError::schema(format!(
                    "fes:{} needs at least two operands",
                    name
                )));
            }
            Ok(if name == "And" {
                FilterExpression::And(operands)
            } else {
                FilterExpression::Or(operands)
            })
        }
        "Not" => {
            let inner = reader::first_element(node)
                .ok_or_else(|| ConformanceError::schema("fes:Not without operand"))?;
            Ok(FilterExpression::Not(Box::new(decode_predicate(inner)?)))
        }
        "ResourceId" => Ok(FilterExpression::ResourceId(vec![resource_id(node)?])),
        other => Err(ConformanceError::UnsupportedPredicate(other.to_string())),
    }
}
