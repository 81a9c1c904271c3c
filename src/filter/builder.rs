use geo::{Coord, Rect};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;

use super::eval::compare;
use super::expression::{
    ComparisonOp, FilterExpression, SpatialOp, TemporalOp, TemporalValue, TimePosition,
    VersionAction,
};
use crate::capabilities::{CapabilityModel, FeatureTypeInfo, PropertyDescriptor, PropertyType};
use crate::error::{ConformanceError, ConformanceResult};
use crate::services::sampler::{FeatureSample, SampledFeature};
use crate::xml::QName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Comparison(ComparisonOp),
    Between,
    Like,
    IsNull,
    IsNil,
    Spatial(SpatialOp),
    Temporal(TemporalOp),
    And,
    Or,
    Not,
    ResourceId,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::Comparison(op) => f.write_str(op.element_name()),
            FilterKind::Between => f.write_str("PropertyIsBetween"),
            FilterKind::Like => f.write_str("PropertyIsLike"),
            FilterKind::IsNull => f.write_str("PropertyIsNull"),
            FilterKind::IsNil => f.write_str("PropertyIsNil"),
            FilterKind::Spatial(op) => f.write_str(op.element_name()),
            FilterKind::Temporal(op) => f.write_str(op.element_name()),
            FilterKind::And => f.write_str("And"),
            FilterKind::Or => f.write_str("Or"),
            FilterKind::Not => f.write_str("Not"),
            FilterKind::ResourceId => f.write_str("ResourceId"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Use this property (local name) instead of the default choice
    pub property: Option<String>,
    /// Pick the property at random with this seed
    pub random_seed: Option<u64>,
    /// Identifiers for resource id filters; defaults to sampled ones
    pub resource_ids: Vec<String>,
    pub version: Option<VersionAction>,
}

/// A filter plus the sampled feature its literals came from. That feature is
/// expected in the result set whenever `source_id` is set.
#[derive(Debug, Clone)]
pub struct BuiltFilter {
    pub expression: FilterExpression,
    pub source_id: Option<String>,
    pub property: Option<QName>,
}

#[derive(Debug, Clone, Copy)]
enum Need {
    Value,
    Geometry,
    Absent,
    Nil,
}

pub struct FilterBuilder<'a> {
    capabilities: &'a CapabilityModel,
}

impl<'a> FilterBuilder<'a> {
    pub fn new(capabilities: &'a CapabilityModel) -> Self {
        Self { capabilities }
    }

    pub fn build(
        &self,
        kind: FilterKind,
        sample: &FeatureSample,
        options: &FilterOptions,
    ) -> ConformanceResult<BuiltFilter> {
        self.ensure_supported(kind, options)?;
        if sample.is_empty() {
            return Err(ConformanceError::Inapplicable(format!(
                "SUT reports zero instances of type {}",
                sample.type_name.prefixed()
            )));
        }
        let info = self
            .capabilities
            .feature_type(&sample.type_name)
            .ok_or_else(|| {
                ConformanceError::Inapplicable(format!(
                    "Feature type {} is not described",
                    sample.type_name.prefixed()
                ))
            })?;

        let built = match kind {
            FilterKind::Comparison(op) => self.comparison(op, info, sample, options)?,
            FilterKind::Between => self.between(info, sample, options)?,
            FilterKind::Like => self.like(info, sample, options)?,
            FilterKind::IsNull => self.null_check(false, info, sample, options)?,
            FilterKind::IsNil => self.null_check(true, info, sample, options)?,
            FilterKind::Spatial(op) => self.spatial(op, info, sample, options)?,
            FilterKind::Temporal(op) => self.temporal(op, info, sample, options)?,
            FilterKind::And | FilterKind::Or | FilterKind::Not => {
                self.logical(kind, info, sample, options)?
            }
            FilterKind::ResourceId => self.resource_id(sample, options),
        };
        tracing::debug!(
            kind = %kind,
            type_name = %sample.type_name.prefixed(),
            filter = %built.expression.describe(),
            "Built filter"
        );
        Ok(built)
    }

    fn ensure_supported(&self, kind: FilterKind, options: &FilterOptions) -> ConformanceResult<()> {
        let filter = &self.capabilities.filter;
        let supported = match kind {
            FilterKind::Comparison(op) => filter.supports_comparison(op.element_name()),
            FilterKind::Spatial(op) => filter.supports_spatial(op.element_name()),
            FilterKind::Temporal(op) => filter.supports_temporal(op.element_name()),
            FilterKind::And | FilterKind::Or | FilterKind::Not => {
                filter.supports_logical()
                    && filter.supports_comparison(ComparisonOp::EqualTo.element_name())
            }
            FilterKind::ResourceId => {
                filter.supports_resource_id()
                    && (options.version.is_none() || filter.supports_version_navigation())
            }
            other => filter.supports_comparison(&other.to_string()),
        };
        if supported {
            Ok(())
        } else {
            Err(ConformanceError::UnsupportedPredicate(kind.to_string()))
        }
    }

    /// Properties accepted by `accept` whose sampled values satisfy `need`,
    /// non-nillable ones first, each group in declaration order.
    fn candidates<'i>(
        &self,
        info: &'i FeatureTypeInfo,
        sample: &FeatureSample,
        accept: impl Fn(&PropertyType) -> bool,
        need: Need,
    ) -> Vec<&'i PropertyDescriptor> {
        let usable = |p: &&PropertyDescriptor| {
            let name = p.local_name();
            accept(&p.property_type)
                && match need {
                    Need::Value => sample.representative(name).is_some(),
                    Need::Geometry => sample.features.iter().any(|f| f.record.geometries.contains_key(name)),
                    Need::Absent => sample.features.iter().any(|f| f.record.is_absent(name)),
                    Need::Nil => sample.features.iter().any(|f| f.record.is_nil(name)),
                }
        };
        let (mut required, nillable): (Vec<_>, Vec<_>) = info
            .properties
            .iter()
            .filter(usable)
            .partition(|p| !p.nillable);
        required.extend(nillable);
        required
    }

    fn select<'i>(
        &self,
        kind: FilterKind,
        type_name: &QName,
        candidates: Vec<&'i PropertyDescriptor>,
        options: &FilterOptions,
    ) -> ConformanceResult<&'i PropertyDescriptor> {
        if let Some(wanted) = &options.property {
            return candidates
                .into_iter()
                .find(|p| p.local_name() == wanted)
                .ok_or_else(|| {
                    ConformanceError::Inapplicable(format!(
                        "Property {} of {} is not usable for {}",
                        wanted,
                        type_name.prefixed(),
                        kind
                    ))
                });
        }
        if candidates.is_empty() {
            return Err(ConformanceError::Inapplicable(format!(
                "No property of {} with sampled values fits {}",
                type_name.prefixed(),
                kind
            )));
        }
        if let Some(seed) = options.random_seed {
            let mut rng = StdRng::seed_from_u64(seed);
            let chosen = candidates[rng.gen_range(0..candidates.len())];
            tracing::info!(
                seed,
                kind = %kind,
                property = %chosen.name.prefixed(),
                "Randomized property selection"
            );
            return Ok(chosen);
        }
        Ok(candidates[0])
    }

    fn comparison(
        &self,
        op: ComparisonOp,
        info: &FeatureTypeInfo,
        sample: &FeatureSample,
        options: &FilterOptions,
    ) -> ConformanceResult<BuiltFilter> {
        let accept = |t: &PropertyType| {
            if op.needs_order() { t.is_ordered() } else { t.is_scalar() }
        };
        let candidates = self.candidates(info, sample, accept, Need::Value);
        let property = self.select(FilterKind::Comparison(op), &info.name, candidates, options)?;
        let (source, value) = representative(sample, property)?;

        let literal = match op {
            ComparisonOp::EqualTo
            | ComparisonOp::LessThanOrEqualTo
            | ComparisonOp::GreaterThanOrEqualTo => value.to_string(),
            ComparisonOp::NotEqualTo => different_value(sample, property, value),
            ComparisonOp::LessThan => step(&property.property_type, value, 1)
                .ok_or_else(|| unsteppable(property, value))?,
            ComparisonOp::GreaterThan => step(&property.property_type, value, -1)
                .ok_or_else(|| unsteppable(property, value))?,
        };

        Ok(BuiltFilter {
            expression: FilterExpression::Comparison {
                op,
                property: property.name.clone(),
                literal,
                match_case: true,
            },
            source_id: Some(source.record.id.clone()),
            property: Some(property.name.clone()),
        })
    }

    fn between(
        &self,
        info: &FeatureTypeInfo,
        sample: &FeatureSample,
        options: &FilterOptions,
    ) -> ConformanceResult<BuiltFilter> {
        let candidates = self.candidates(info, sample, PropertyType::is_ordered, Need::Value);
        let property = self.select(FilterKind::Between, &info.name, candidates, options)?;
        let (source, value) = representative(sample, property)?;

        let values = sample.values_of(property.local_name());
        let pick = |wanted: std::cmp::Ordering| {
            values.iter().copied().fold(value, |best, v| {
                if compare(v, best, true) == Some(wanted) { v } else { best }
            })
        };
        let lower = pick(std::cmp::Ordering::Less).to_string();
        let upper = pick(std::cmp::Ordering::Greater).to_string();

        Ok(BuiltFilter {
            expression: FilterExpression::Between {
                property: property.name.clone(),
                lower,
                upper,
            },
            source_id: Some(source.record.id.clone()),
            property: Some(property.name.clone()),
        })
    }

    fn like(
        &self,
        info: &FeatureTypeInfo,
        sample: &FeatureSample,
        options: &FilterOptions,
    ) -> ConformanceResult<BuiltFilter> {
        let candidates = self.candidates(
            info,
            sample,
            |t| matches!(t, PropertyType::String),
            Need::Value,
        );
        let property = self.select(FilterKind::Like, &info.name, candidates, options)?;
        let (source, value) = representative(sample, property)?;

        let (wild_card, single_char, escape_char) = ('*', '.', '\\');
        let mut pattern = String::new();
        for c in value.chars().take(3) {
            if c == wild_card || c == single_char || c == escape_char {
                pattern.push(escape_char);
            }
            pattern.push(c);
        }
        pattern.push(wild_card);

        Ok(BuiltFilter {
            expression: FilterExpression::Like {
                property: property.name.clone(),
                pattern,
                wild_card,
                single_char,
                escape_char,
            },
            source_id: Some(source.record.id.clone()),
            property: Some(property.name.clone()),
        })
    }

    fn null_check(
        &self,
        nil: bool,
        info: &FeatureTypeInfo,
        sample: &FeatureSample,
        options: &FilterOptions,
    ) -> ConformanceResult<BuiltFilter> {
        let (kind, need) = if nil {
            (FilterKind::IsNil, Need::Nil)
        } else {
            (FilterKind::IsNull, Need::Absent)
        };
        let accept = |t: &PropertyType| !t.is_geometry();
        let candidates = self.candidates(info, sample, accept, need);
        let property = self.select(kind, &info.name, candidates, options)?;
        let name = property.local_name();
        let source = sample.features.iter().find(|f| {
            if nil { f.record.is_nil(name) } else { f.record.is_absent(name) }
        });

        let expression = if nil {
            FilterExpression::IsNil {
                property: property.name.clone(),
            }
        } else {
            FilterExpression::IsNull {
                property: property.name.clone(),
            }
        };
        Ok(BuiltFilter {
            expression,
            source_id: source.map(|f| f.record.id.clone()),
            property: Some(property.name.clone()),
        })
    }

    fn spatial(
        &self,
        op: SpatialOp,
        info: &FeatureTypeInfo,
        sample: &FeatureSample,
        options: &FilterOptions,
    ) -> ConformanceResult<BuiltFilter> {
        let candidates = self.candidates(info, sample, PropertyType::is_geometry, Need::Geometry);
        let property = self.select(FilterKind::Spatial(op), &info.name, candidates, options)?;
        let name = property.local_name();
        let (source, geometry) = sample
            .features
            .iter()
            .find_map(|f| f.record.geometries.get(name).map(|g| (f, g)))
            .ok_or_else(|| {
                ConformanceError::Inapplicable(format!("No sampled geometry for {}", name))
            })?;
        let extent = sample
            .features
            .iter()
            .filter_map(|f| f.record.geometries.get(name).map(|g| g.envelope))
            .reduce(crate::feature::union)
            .unwrap_or(geometry.envelope);

        let (envelope, source_id) = match op {
            SpatialOp::Bbox | SpatialOp::Intersects => {
                (expand(&geometry.envelope), Some(source.record.id.clone()))
            }
            SpatialOp::Within => (expand(&extent), Some(source.record.id.clone())),
            SpatialOp::Disjoint => (beyond(&extent), None),
        };

        Ok(BuiltFilter {
            expression: FilterExpression::Spatial {
                op,
                property: property.name.clone(),
                envelope,
                srs_name: geometry.srs_name.clone(),
            },
            source_id,
            property: Some(property.name.clone()),
        })
    }

    fn temporal(
        &self,
        op: TemporalOp,
        info: &FeatureTypeInfo,
        sample: &FeatureSample,
        options: &FilterOptions,
    ) -> ConformanceResult<BuiltFilter> {
        let candidates = self.candidates(info, sample, PropertyType::is_temporal, Need::Value);
        let property = self.select(FilterKind::Temporal(op), &info.name, candidates, options)?;
        let (source, value) = representative(sample, property)?;
        let at = TimePosition::parse(value).ok_or_else(|| {
            ConformanceError::Inapplicable(format!(
                "Sampled value '{}' of {} is not a time position",
                value,
                property.name.prefixed()
            ))
        })?;

        let value = match op {
            TemporalOp::After => TemporalValue::Instant(at.shifted_days(-1)),
            TemporalOp::Before => TemporalValue::Instant(at.shifted_days(1)),
            TemporalOp::During => TemporalValue::Period(at.shifted_days(-1), at.shifted_days(1)),
            TemporalOp::TEquals => TemporalValue::Instant(at),
        };

        Ok(BuiltFilter {
            expression: FilterExpression::Temporal {
                op,
                property: property.name.clone(),
                value,
            },
            source_id: Some(source.record.id.clone()),
            property: Some(property.name.clone()),
        })
    }

    fn logical(
        &self,
        kind: FilterKind,
        info: &FeatureTypeInfo,
        sample: &FeatureSample,
        options: &FilterOptions,
    ) -> ConformanceResult<BuiltFilter> {
        let candidates = self.candidates(info, sample, PropertyType::is_scalar, Need::Value);
        let others: Vec<&PropertyDescriptor> = candidates.clone();
        let property = self.select(kind, &info.name, candidates, options)?;
        let (source, value) = representative(sample, property)?;
        let equal = FilterExpression::equal_to(property.name.clone(), value);

        let expression = match kind {
            FilterKind::And => {
                let second = others
                    .iter()
                    .filter(|p| p.name != property.name)
                    .find_map(|p| {
                        source
                            .record
                            .value(p.local_name())
                            .map(|v| FilterExpression::equal_to(p.name.clone(), v))
                    })
                    .unwrap_or_else(|| equal.clone());
                FilterExpression::And(vec![equal, second])
            }
            FilterKind::Or => {
                let other = different_value(sample, property, value);
                FilterExpression::Or(vec![
                    equal,
                    FilterExpression::equal_to(property.name.clone(), other),
                ])
            }
            _ => {
                let other = different_value(sample, property, value);
                FilterExpression::Not(Box::new(FilterExpression::equal_to(
                    property.name.clone(),
                    other,
                )))
            }
        };

        Ok(BuiltFilter {
            expression,
            source_id: Some(source.record.id.clone()),
            property: Some(property.name.clone()),
        })
    }

    fn resource_id(&self, sample: &FeatureSample, options: &FilterOptions) -> BuiltFilter {
        let ids = if !options.resource_ids.is_empty() {
            options.resource_ids.clone()
        } else {
            sample.select_feature_ids(3, options.random_seed)
        };
        let source_id = ids.first().cloned();
        let expression = match &options.version {
            Some(version) => FilterExpression::ResourceId(
                ids.into_iter()
                    .map(|rid| super::ResourceIdPredicate {
                        rid,
                        version: Some(version.clone()),
                    })
                    .collect(),
            ),
            None => FilterExpression::resource_ids(ids),
        };
        BuiltFilter {
            expression,
            source_id,
            property: None,
        }
    }
}

fn representative<'s>(
    sample: &'s FeatureSample,
    property: &PropertyDescriptor,
) -> ConformanceResult<(&'s SampledFeature, &'s str)> {
    sample.representative(property.local_name()).ok_or_else(|| {
        ConformanceError::Inapplicable(format!(
            "No sampled value for {}",
            property.name.prefixed()
        ))
    })
}

fn unsteppable(property: &PropertyDescriptor, value: &str) -> ConformanceError {
    ConformanceError::Inapplicable(format!(
        "Cannot derive a neighbouring value of '{}' for {}",
        value,
        property.name.prefixed()
    ))
}

/// A value one unit above or below `value` in the property's order.
fn step(property_type: &PropertyType, value: &str, direction: i64) -> Option<String> {
    match property_type {
        PropertyType::Integer => value
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|v| v.checked_add(direction))
            .map(|v| v.to_string()),
        PropertyType::Decimal | PropertyType::Double => value
            .trim()
            .parse::<f64>()
            .ok()
            .map(|v| (v + direction as f64).to_string()),
        PropertyType::Date | PropertyType::DateTime => {
            TimePosition::parse(value).map(|t| t.shifted_days(direction).to_string())
        }
        _ => None,
    }
}

/// Another sampled value of the property, or a derived one, that differs from `value`.
fn different_value(sample: &FeatureSample, property: &PropertyDescriptor, value: &str) -> String {
    if let Some(other) = sample
        .values_of(property.local_name())
        .into_iter()
        .find(|v| compare(v, value, true) != Some(std::cmp::Ordering::Equal))
    {
        return other.to_string();
    }
    match &property.property_type {
        PropertyType::Boolean => (!matches!(value.trim(), "true" | "1")).to_string(),
        t => step(t, value, 1).unwrap_or_else(|| format!("{}_not_sampled", value)),
    }
}

fn margin(envelope: &Rect<f64>) -> f64 {
    (envelope.width().max(envelope.height()) * 0.05).max(1e-4)
}

fn expand(envelope: &Rect<f64>) -> Rect<f64> {
    let m = margin(envelope);
    Rect::new(
        Coord {
            x: envelope.min().x - m,
            y: envelope.min().y - m,
        },
        Coord {
            x: envelope.max().x + m,
            y: envelope.max().y + m,
        },
    )
}

/// A box of the same size placed just past the extent along x.
fn beyond(extent: &Rect<f64>) -> Rect<f64> {
    let m = margin(extent);
    let width = extent.width().max(m);
    let min_x = extent.max().x + m;
    Rect::new(
        Coord {
            x: min_x,
            y: extent.min().y,
        },
        Coord {
            x: min_x + width,
            y: extent.max().y.max(extent.min().y + m),
        },
    )
}
