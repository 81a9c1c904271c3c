//! Client-side evaluation of filters against returned features.

use geo::{Intersects, Rect};
use std::cmp::Ordering;

use super::expression::{
    ComparisonOp, FilterExpression, SpatialJoin, SpatialOp, TemporalOp, TemporalValue,
    TimePosition,
};
use crate::feature::FeatureRecord;

pub fn matches(expression: &FilterExpression, feature: &FeatureRecord) -> bool {
    match expression {
        FilterExpression::Comparison {
            op,
            property,
            literal,
            match_case,
        } => {
            let Some(value) = feature.value(&property.local_name) else {
                return false;
            };
            let Some(ordering) = compare(value, literal, *match_case) else {
                return false;
            };
            match op {
                ComparisonOp::EqualTo => ordering == Ordering::Equal,
                ComparisonOp::NotEqualTo => ordering != Ordering::Equal,
                ComparisonOp::LessThan => ordering == Ordering::Less,
                ComparisonOp::GreaterThan => ordering == Ordering::Greater,
                ComparisonOp::LessThanOrEqualTo => ordering != Ordering::Greater,
                ComparisonOp::GreaterThanOrEqualTo => ordering != Ordering::Less,
            }
        }
        FilterExpression::Between { property, lower, upper } => {
            let Some(value) = feature.value(&property.local_name) else {
                return false;
            };
            matches!(compare(value, lower, true), Some(Ordering::Greater | Ordering::Equal))
                && matches!(compare(value, upper, true), Some(Ordering::Less | Ordering::Equal))
        }
        FilterExpression::Like {
            property,
            pattern,
            wild_card,
            single_char,
            escape_char,
        } => feature.value(&property.local_name).is_some_and(|value| {
            like(
                &value.chars().collect::<Vec<_>>(),
                &pattern.chars().collect::<Vec<_>>(),
                *wild_card,
                *single_char,
                *escape_char,
            )
        }),
        FilterExpression::IsNull { property } => feature.is_absent(&property.local_name),
        FilterExpression::IsNil { property } => feature.is_nil(&property.local_name),
        FilterExpression::Spatial {
            op,
            property,
            envelope,
            ..
        } => {
            let Some(geometry) = feature.geometries.get(&property.local_name) else {
                return false;
            };
            let intersects = geometry.envelope.intersects(envelope);
            match op {
                SpatialOp::Bbox | SpatialOp::Intersects => intersects,
                SpatialOp::Within => contains(envelope, &geometry.envelope),
                SpatialOp::Disjoint => !intersects,
            }
        }
        FilterExpression::Temporal { op, property, value } => {
            let Some(at) = feature
                .value(&property.local_name)
                .and_then(TimePosition::parse)
                .map(|t| t.to_utc())
            else {
                return false;
            };
            match (op, value) {
                (TemporalOp::After, TemporalValue::Instant(t)) => at > t.to_utc(),
                (TemporalOp::Before, TemporalValue::Instant(t)) => at < t.to_utc(),
                (TemporalOp::TEquals, TemporalValue::Instant(t)) => at == t.to_utc(),
                (TemporalOp::During, TemporalValue::Period(b, e)) => {
                    at > b.to_utc() && at < e.to_utc()
                }
                (TemporalOp::After, TemporalValue::Period(_, e)) => at > e.to_utc(),
                (TemporalOp::Before, TemporalValue::Period(b, _)) => at < b.to_utc(),
                _ => false,
            }
        }
        FilterExpression::And(children) => children.iter().all(|c| matches(c, feature)),
        FilterExpression::Or(children) => children.iter().any(|c| matches(c, feature)),
        FilterExpression::Not(inner) => !matches(inner, feature),
        FilterExpression::ResourceId(predicates) => {
            predicates.iter().any(|p| p.rid == feature.id)
        }
    }
}

/// Whether a joined pair satisfies `join`, judged on geometry envelopes.
pub fn join_matches(join: &SpatialJoin, left: &FeatureRecord, right: &FeatureRecord) -> bool {
    let (Some(a), Some(b)) = (
        left.geometries.get(&join.left.property.local_name),
        right.geometries.get(&join.right.property.local_name),
    ) else {
        return false;
    };
    let intersects = a.envelope.intersects(&b.envelope);
    match join.op {
        SpatialOp::Bbox | SpatialOp::Intersects => intersects,
        SpatialOp::Within => contains(&b.envelope, &a.envelope),
        SpatialOp::Disjoint => !intersects,
    }
}

fn contains(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    outer.min().x <= inner.min().x
        && outer.min().y <= inner.min().y
        && outer.max().x >= inner.max().x
        && outer.max().y >= inner.max().y
}

/// Numbers compare numerically, time values chronologically, anything else as text.
pub fn compare(value: &str, literal: &str, match_case: bool) -> Option<Ordering> {
    let (value, literal) = (value.trim(), literal.trim());
    if let (Ok(a), Ok(b)) = (value.parse::<i64>(), literal.parse::<i64>()) {
        return Some(a.cmp(&b));
    }
    if let (Ok(a), Ok(b)) = (value.parse::<f64>(), literal.parse::<f64>()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (TimePosition::parse(value), TimePosition::parse(literal)) {
        return Some(a.to_utc().cmp(&b.to_utc()));
    }
    if match_case {
        Some(value.cmp(literal))
    } else {
        Some(value.to_lowercase().cmp(&literal.to_lowercase()))
    }
}

fn like(value: &[char], pattern: &[char], wild: char, single: char, escape: char) -> bool {
    match pattern.split_first() {
        None => value.is_empty(),
        Some((&c, rest)) if c == escape => match rest.split_first() {
            Some((&literal, rest)) => {
                value.first() == Some(&literal) && like(&value[1..], rest, wild, single, escape)
            }
            None => false,
        },
        Some((&c, rest)) if c == wild => {
            (0..=value.len()).any(|skip| like(&value[skip..], rest, wild, single, escape))
        }
        Some((&c, rest)) if c == single => {
            !value.is_empty() && like(&value[1..], rest, wild, single, escape)
        }
        Some((&c, rest)) => {
            value.first() == Some(&c) && like(&value[1..], rest, wild, single, escape)
        }
    }
}
