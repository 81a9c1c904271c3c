//! Join queries: a GetFeature over two type names related by a spatial
//! predicate answers with `wfs:Tuple` members that satisfy it.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::binding::WfsRequest;
use crate::capabilities::ConformanceClass;
use crate::error::{ConformanceError, ConformanceResult};
use crate::filter::eval::join_matches;
use crate::filter::{JoinOperand, SpatialJoin, SpatialOp};
use crate::services::FeatureSample;
use crate::suite::runner::ConformanceTest;
use crate::suite::SuiteContext;
use crate::validation::checks::{contains_tuple, tuples_satisfy};
use crate::validation::{Expectations, SchemaRef};
use crate::xml::QName;

pub fn tests() -> Vec<ConformanceTest> {
    vec![ConformanceTest::reading(
        "joins::join_with_intersects",
        ConformanceClass::Basic,
        join_with_intersects,
    )]
}

/// A sampled type with a geometry property its sampled features carry.
struct JoinSide {
    type_name: QName,
    property: QName,
    sample: std::sync::Arc<FeatureSample>,
}

fn join_with_intersects(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let capabilities = ctx.capabilities();
        if !capabilities.constraint_is_true("ImplementsSpatialJoins") {
            return Err(ConformanceError::Inapplicable(
                "ImplementsSpatialJoins is not advertised".to_string(),
            ));
        }
        if !capabilities.filter.supports_spatial("Intersects") {
            return Err(ConformanceError::UnsupportedPredicate("Intersects".to_string()));
        }

        let mut sides = joinable_sides(ctx).await?;
        let join = match sides.len() {
            0 => {
                return Err(ConformanceError::Inapplicable(
                    "no sampled type carries geometry".to_string(),
                ));
            }
            1 => {
                let side = &sides[0];
                SpatialJoin {
                    op: SpatialOp::Intersects,
                    left: operand(side, Some("a")),
                    right: operand(side, Some("b")),
                }
            }
            _ => {
                sides.truncate(2);
                SpatialJoin {
                    op: SpatialOp::Intersects,
                    left: operand(&sides[0], None),
                    right: operand(&sides[1], None),
                }
            }
        };
        let (left, right) = (&sides[0], sides.get(1).unwrap_or(&sides[0]));
        tracing::debug!(join = %join.describe(), "Built join");

        let request = WfsRequest::join(ctx.client.version(), &join);
        let response = ctx.client.send(&request).await?;

        let mut expectations = Expectations::success().check(tuples_satisfy(join.clone()));
        if let Some((a, b)) = expected_pair(&join, &left.sample, &right.sample) {
            expectations = expectations.check(contains_tuple(a, b));
        }
        ctx.validator
            .require(&response, SchemaRef::FeatureCollection, &expectations)
    }
    .boxed()
}

async fn joinable_sides(ctx: &SuiteContext) -> ConformanceResult<Vec<JoinSide>> {
    let mut sides = Vec::new();
    for (type_name, sample) in ctx.sampled_types().await? {
        let Some(info) = ctx.capabilities().feature_type(&type_name) else {
            continue;
        };
        let property = info.geometry_properties().find(|p| {
            sample
                .features
                .iter()
                .any(|f| f.record.geometries.contains_key(&p.name.local_name))
        });
        if let Some(property) = property {
            sides.push(JoinSide {
                type_name: type_name.clone(),
                property: property.name.clone(),
                sample,
            });
        }
    }
    Ok(sides)
}

fn operand(side: &JoinSide, alias: Option<&str>) -> JoinOperand {
    JoinOperand {
        type_name: side.type_name.clone(),
        alias: alias.map(str::to_string),
        property: side.property.clone(),
    }
}

/// First pair of sampled features the join must return.
fn expected_pair(
    join: &SpatialJoin,
    left: &FeatureSample,
    right: &FeatureSample,
) -> Option<(String, String)> {
    left.features.iter().find_map(|a| {
        right
            .features
            .iter()
            .find(|b| join_matches(join, &a.record, &b.record))
            .map(|b| (a.record.id.clone(), b.record.id.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{FeatureRecord, GeometryValue};
    use crate::services::SampledFeature;
    use crate::xml::Element;
    use geo::{Coord, Rect};
    use indexmap::IndexMap;

    const TNS: &str = "http://example.com/tns";

    fn feature(type_name: &str, id: &str, x: f64, y: f64) -> SampledFeature {
        let mut geometries = IndexMap::new();
        geometries.insert(
            "site".to_string(),
            GeometryValue {
                envelope: Rect::new(Coord { x, y }, Coord { x, y }),
                srs_name: None,
            },
        );
        SampledFeature {
            record: FeatureRecord {
                id: id.to_string(),
                type_name: QName::new(TNS, type_name),
                values: IndexMap::new(),
                geometries,
            },
            element: Element::new(TNS, type_name),
        }
    }

    fn operand_of(type_name: &str, alias: Option<&str>) -> JoinOperand {
        JoinOperand {
            type_name: QName::new(TNS, type_name),
            alias: alias.map(str::to_string),
            property: QName::new(TNS, "site"),
        }
    }

    #[test]
    fn test_expected_pair_needs_intersecting_sites() {
        let join = SpatialJoin {
            op: SpatialOp::Intersects,
            left: operand_of("Place", None),
            right: operand_of("Landmark", None),
        };
        let places = FeatureSample::new(
            QName::new(TNS, "Place"),
            vec![feature("Place", "p2", 5.0, 5.0), feature("Place", "p1", 1.0, 2.0)],
        );
        let landmarks = FeatureSample::new(
            QName::new(TNS, "Landmark"),
            vec![feature("Landmark", "l2", 8.0, 8.0), feature("Landmark", "l1", 1.0, 2.0)],
        );
        assert_eq!(
            expected_pair(&join, &places, &landmarks),
            Some(("p1".to_string(), "l1".to_string()))
        );

        let far = FeatureSample::new(
            QName::new(TNS, "Landmark"),
            vec![feature("Landmark", "l2", 8.0, 8.0)],
        );
        assert_eq!(expected_pair(&join, &places, &far), None);
    }

    #[test]
    fn test_self_join_pairs_a_feature_with_itself() {
        let places = FeatureSample::new(
            QName::new(TNS, "Place"),
            vec![feature("Place", "p1", 1.0, 2.0)],
        );
        let side = JoinSide {
            type_name: QName::new(TNS, "Place"),
            property: QName::new(TNS, "site"),
            sample: std::sync::Arc::new(places.clone()),
        };
        let join = SpatialJoin {
            op: SpatialOp::Intersects,
            left: operand(&side, Some("a")),
            right: operand(&side, Some("b")),
        };
        assert!(join.is_self_join());
        assert_eq!(join.left, operand_of("Place", Some("a")));
        assert_eq!(
            expected_pair(&join, &places, &places),
            Some(("p1".to_string(), "p1".to_string()))
        );
    }
}
