use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use geo::Rect;
use std::fmt;

use crate::xml::QName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    EqualTo,
    NotEqualTo,
    LessThan,
    GreaterThan,
    LessThanOrEqualTo,
    GreaterThanOrEqualTo,
}

impl ComparisonOp {
    pub fn element_name(&self) -> &'static str {
        match self {
            Self::EqualTo => "PropertyIsEqualTo",
            Self::NotEqualTo => "PropertyIsNotEqualTo",
            Self::LessThan => "PropertyIsLessThan",
            Self::GreaterThan => "PropertyIsGreaterThan",
            Self::LessThanOrEqualTo => "PropertyIsLessThanOrEqualTo",
            Self::GreaterThanOrEqualTo => "PropertyIsGreaterThanOrEqualTo",
        }
    }

    pub fn from_element_name(name: &str) -> Option<Self> {
        [
            Self::EqualTo,
            Self::NotEqualTo,
            Self::LessThan,
            Self::GreaterThan,
            Self::LessThanOrEqualTo,
            Self::GreaterThanOrEqualTo,
        ]
        .into_iter()
        .find(|op| op.element_name() == name)
    }

    /// Equality tests apply to any scalar; the others need an ordered type.
    pub fn needs_order(&self) -> bool {
        !matches!(self, Self::EqualTo | Self::NotEqualTo)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialOp {
    Bbox,
    Intersects,
    Within,
    Disjoint,
}

impl SpatialOp {
    pub fn element_name(&self) -> &'static str {
        match self {
            Self::Bbox => "BBOX",
            Self::Intersects => "Intersects",
            Self::Within => "Within",
            Self::Disjoint => "Disjoint",
        }
    }

    pub fn from_element_name(name: &str) -> Option<Self> {
        [Self::Bbox, Self::Intersects, Self::Within, Self::Disjoint]
            .into_iter()
            .find(|op| op.element_name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalOp {
    After,
    Before,
    During,
    TEquals,
}

impl TemporalOp {
    pub fn element_name(&self) -> &'static str {
        match self {
            Self::After => "After",
            Self::Before => "Before",
            Self::During => "During",
            Self::TEquals => "TEquals",
        }
    }

    pub fn from_element_name(name: &str) -> Option<Self> {
        [Self::After, Self::Before, Self::During, Self::TEquals]
            .into_iter()
            .find(|op| op.element_name() == name)
    }
}

/// A `gml:timePosition` value at day or second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePosition {
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl TimePosition {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(Self::DateTime(dt.with_timezone(&Utc)));
        }
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(Self::DateTime(naive.and_utc()));
        }
        // xsd:date may carry a zone suffix; the zone does not move the calendar day.
        let date_part = text.get(..10).unwrap_or(text);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .ok()
            .map(Self::Date)
    }

    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            Self::Date(d) => d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
            Self::DateTime(dt) => *dt,
        }
    }

    /// Shift by whole days, keeping the resolution.
    pub fn shifted_days(&self, days: i64) -> Self {
        let delta = chrono::Duration::days(days);
        match self {
            Self::Date(d) => Self::Date(*d + delta),
            Self::DateTime(dt) => Self::DateTime(*dt + delta),
        }
    }
}

impl fmt::Display for TimePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemporalValue {
    Instant(TimePosition),
    Period(TimePosition, TimePosition),
}

/// `fes:ResourceId@version` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionAction {
    First,
    Last,
    Previous,
    Next,
    All,
    Label(String),
}

impl VersionAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::First => "FIRST",
            Self::Last => "LAST",
            Self::Previous => "PREVIOUS",
            Self::Next => "NEXT",
            Self::All => "ALL",
            Self::Label(label) => label,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "FIRST" => Self::First,
            "LAST" => Self::Last,
            "PREVIOUS" => Self::Previous,
            "NEXT" => Self::Next,
            "ALL" => Self::All,
            _ => Self::Label(value.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceIdPredicate {
    pub rid: String,
    pub version: Option<VersionAction>,
}

/// One side of a join predicate: a geometry property of a queried type.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOperand {
    pub type_name: QName,
    /// Set for self-joins, where the type name alone is ambiguous
    pub alias: Option<String>,
    pub property: QName,
}

impl JoinOperand {
    /// `fes:ValueReference` path, qualified by alias or type name.
    pub fn path(&self) -> String {
        let head = match &self.alias {
            Some(alias) => alias.clone(),
            None => self.type_name.prefixed(),
        };
        format!("{}/{}", head, self.property.prefixed())
    }
}

/// Spatial predicate relating geometry properties of two joined types.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialJoin {
    pub op: SpatialOp,
    pub left: JoinOperand,
    pub right: JoinOperand,
}

impl SpatialJoin {
    pub fn is_self_join(&self) -> bool {
        self.left.type_name == self.right.type_name
    }

    pub fn describe(&self) -> String {
        format!("{}({}, {})", self.op.element_name(), self.left.path(), self.right.path())
    }
}

/// A filter tree. Leaves reference a property and a literal taken from sampled data.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    Comparison {
        op: ComparisonOp,
        property: QName,
        literal: String,
        match_case: bool,
    },
    Between {
        property: QName,
        lower: String,
        upper: String,
    },
    Like {
        property: QName,
        pattern: String,
        wild_card: char,
        single_char: char,
        escape_char: char,
    },
    IsNull {
        property: QName,
    },
    IsNil {
        property: QName,
    },
    Spatial {
        op: SpatialOp,
        property: QName,
        envelope: Rect<f64>,
        srs_name: Option<String>,
    },
    Temporal {
        op: TemporalOp,
        property: QName,
        value: TemporalValue,
    },
    And(Vec<FilterExpression>),
    Or(Vec<FilterExpression>),
    Not(Box<FilterExpression>),
    ResourceId(Vec<ResourceIdPredicate>),
}

impl FilterExpression {
    pub fn equal_to(property: QName, literal: impl Into<String>) -> Self {
        Self::Comparison {
            op: ComparisonOp::EqualTo,
            property,
            literal: literal.into(),
            match_case: true,
        }
    }

    pub fn resource_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ResourceId(
            ids.into_iter()
                .map(|rid| ResourceIdPredicate {
                    rid: rid.into(),
                    version: None,
                })
                .collect(),
        )
    }

    pub fn versioned_resource_id(rid: impl Into<String>, version: VersionAction) -> Self {
        Self::ResourceId(vec![ResourceIdPredicate {
            rid: rid.into(),
            version: Some(version),
        }])
    }

    /// Every property referenced by the tree, in first-use order.
    pub fn properties(&self) -> Vec<&QName> {
        let mut out = Vec::new();
        self.collect_properties(&mut out);
        out
    }

    fn collect_properties<'a>(&'a self, out: &mut Vec<&'a QName>) {
        match self {
            Self::Comparison { property, .. }
            | Self::Between { property, .. }
            | Self::Like { property, .. }
            | Self::IsNull { property }
            | Self::IsNil { property }
            | Self::Spatial { property, .. }
            | Self::Temporal { property, .. } => {
                if !out.contains(&property) {
                    out.push(property);
                }
            }
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_properties(out);
                }
            }
            Self::Not(inner) => inner.collect_properties(out),
            Self::ResourceId(_) => {}
        }
    }

    /// Short label used in logs and skip reasons.
    pub fn describe(&self) -> String {
        match self {
            Self::Comparison { op, property, literal, .. } => {
                format!("{}({}, {})", op.element_name(), property.prefixed(), literal)
            }
            Self::Between { property, lower, upper } => {
                format!("PropertyIsBetween({}, {}, {})", property.prefixed(), lower, upper)
            }
            Self::Like { property, pattern, .. } => {
                format!("PropertyIsLike({}, {})", property.prefixed(), pattern)
            }
            Self::IsNull { property } => format!("PropertyIsNull({})", property.prefixed()),
            Self::IsNil { property } => format!("PropertyIsNil({})", property.prefixed()),
            Self::Spatial { op, property, envelope, .. } => format!(
                "{}({}, [{} {}, {} {}])",
                op.element_name(),
                property.prefixed(),
                envelope.min().x,
                envelope.min().y,
                envelope.max().x,
                envelope.max().y
            ),
            Self::Temporal { op, property, value } => match value {
                TemporalValue::Instant(t) => {
                    format!("{}({}, {})", op.element_name(), property.prefixed(), t)
                }
                TemporalValue::Period(b, e) => {
                    format!("{}({}, {}/{})", op.element_name(), property.prefixed(), b, e)
                }
            },
            Self::And(children) => format!(
                "And({})",
                children.iter().map(|c| c.describe()).collect::<Vec<_>>().join(", ")
            ),
            Self::Or(children) => format!(
                "Or({})",
                children.iter().map(|c| c.describe()).collect::<Vec<_>>().join(", ")
            ),
            Self::Not(inner) => format!("Not({})", inner.describe()),
            Self::ResourceId(ids) => format!(
                "ResourceId({})",
                ids.iter().map(|p| p.rid.as_str()).collect::<Vec<_>>().join(", ")
            ),
        }
    }
}
