//! Query filters: every predicate built from sampled data must select its
//! source feature and only features satisfying it.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashSet;

use crate::binding::WfsRequest;
use crate::capabilities::ConformanceClass;
use crate::error::{ConformanceError, ConformanceResult};
use crate::filter::{ComparisonOp, FilterKind, FilterOptions, SpatialOp, TemporalOp};
use crate::services::FeatureSample;
use crate::suite::runner::ConformanceTest;
use crate::suite::SuiteContext;
use crate::validation::checks::{
    all_satisfy, contains_id, ids_subset_of, no_duplicate_ids, number_matched_at_most,
    srs_name_consistent,
};
use crate::validation::{Expectations, SchemaRef, ValidationResult};
use crate::xml::QName;

macro_rules! filter_tests {
    ($($name:ident => $kind:expr),* $(,)?) => {
        $(
            fn $name(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
                run_filter(ctx, $kind).boxed()
            }
        )*

        pub fn tests() -> Vec<ConformanceTest> {
            vec![
                $(ConformanceTest::reading(
                    concat!("filters::", stringify!($name)),
                    ConformanceClass::Basic,
                    $name,
                )),*
            ]
        }
    };
}

filter_tests! {
    property_is_equal_to => FilterKind::Comparison(ComparisonOp::EqualTo),
    property_is_not_equal_to => FilterKind::Comparison(ComparisonOp::NotEqualTo),
    property_is_less_than => FilterKind::Comparison(ComparisonOp::LessThan),
    property_is_greater_than => FilterKind::Comparison(ComparisonOp::GreaterThan),
    property_is_less_than_or_equal_to => FilterKind::Comparison(ComparisonOp::LessThanOrEqualTo),
    property_is_greater_than_or_equal_to => FilterKind::Comparison(ComparisonOp::GreaterThanOrEqualTo),
    property_is_between => FilterKind::Between,
    property_is_like => FilterKind::Like,
    property_is_null => FilterKind::IsNull,
    property_is_nil => FilterKind::IsNil,
    bbox => FilterKind::Spatial(SpatialOp::Bbox),
    intersects => FilterKind::Spatial(SpatialOp::Intersects),
    within => FilterKind::Spatial(SpatialOp::Within),
    disjoint => FilterKind::Spatial(SpatialOp::Disjoint),
    after => FilterKind::Temporal(TemporalOp::After),
    before => FilterKind::Temporal(TemporalOp::Before),
    during => FilterKind::Temporal(TemporalOp::During),
    t_equals => FilterKind::Temporal(TemporalOp::TEquals),
    and => FilterKind::And,
    or => FilterKind::Or,
    not => FilterKind::Not,
    resource_id => FilterKind::ResourceId,
}

/// Apply the filter to every feature type holding data and report the
/// violations of all of them together.
async fn run_filter(ctx: &SuiteContext, kind: FilterKind) -> ConformanceResult<()> {
    let mut violations = Vec::new();
    let mut exercised = 0usize;
    let mut skipped = None;
    for (type_name, sample) in ctx.sampled_types().await? {
        match filter_type(ctx, kind, &type_name, &sample).await {
            Ok(result) => {
                exercised += 1;
                violations.extend(result.violations.into_iter().map(|mut v| {
                    v.message = format!("{}: {}", type_name.prefixed(), v.message);
                    v
                }));
            }
            Err(e) if e.is_skip() => {
                tracing::debug!(type_name = %type_name.prefixed(), "Filter not applicable: {}", e);
                skipped = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    if exercised == 0 {
        return Err(skipped.unwrap_or_else(|| {
            ConformanceError::Inapplicable(format!("{} applies to no sampled type", kind))
        }));
    }
    ValidationResult::from_violations(violations).into_result()
}

async fn filter_type(
    ctx: &SuiteContext,
    kind: FilterKind,
    type_name: &QName,
    sample: &FeatureSample,
) -> ConformanceResult<ValidationResult> {
    let options: FilterOptions = ctx.filter_options();
    let built = ctx.filter_builder().build(kind, sample, &options)?;
    tracing::debug!(filter = %built.expression.describe(), "Built filter");

    let request = WfsRequest::get_feature(ctx.client.version(), type_name, Some(&built.expression));
    let response = ctx.client.send(&request).await?;

    let mut expectations = Expectations::success()
        .check(no_duplicate_ids())
        .check(all_satisfy(built.expression.clone()));
    if let Some(source) = &built.source_id {
        expectations = expectations.check(contains_id(source.clone()));
    }
    if matches!(kind, FilterKind::Spatial(_)) {
        expectations = expectations.check(srs_name_consistent(sample.srs_name.clone()));
    }
    // Filtered results stay within the unfiltered extent of the type
    if let Some(total) = ctx.capabilities().feature_type(type_name).and_then(|info| info.count_estimate) {
        expectations = expectations.check(number_matched_at_most(total));
        if total == sample.len() as u64 {
            let extent: HashSet<String> = sample.features.iter().map(|f| f.record.id.clone()).collect();
            expectations = expectations.check(ids_subset_of(extent));
        }
    }
    Ok(ctx.validator.validate(&response, SchemaRef::FeatureCollection, &expectations))
}
