//! Conformance tests grouped by the class that requires them.

pub mod basic;
pub mod filters;
pub mod joins;
pub mod locking;
pub mod paging;
pub mod stored_queries;
pub mod transactions;
pub mod versioning;

use std::cmp::Ordering;
use std::sync::Arc;

use super::SuiteContext;
use super::runner::ConformanceTest;
use crate::capabilities::FeatureTypeInfo;
use crate::error::{ConformanceError, ConformanceResult};
use crate::filter::eval::compare;
use crate::services::transaction::fresh_copy;
use crate::services::{FeatureSample, TransactionPayload, TransactionScope};
use crate::xml::namespaces::GML;
use crate::xml::{Element, QName};

/// Every registered test.
pub fn all() -> Vec<ConformanceTest> {
    [
        basic::tests(),
        filters::tests(),
        joins::tests(),
        transactions::tests(),
        locking::tests(),
        versioning::tests(),
        stored_queries::tests(),
        paging::tests(),
    ]
    .concat()
}

/// Sampled type with its description, for tests that build features.
pub(crate) async fn described_sample(
    ctx: &SuiteContext,
) -> ConformanceResult<(QName, Arc<FeatureSample>, FeatureTypeInfo)> {
    let (type_name, sample) = ctx.sampled_type().await?;
    let info = ctx
        .capabilities()
        .feature_type(&type_name)
        .filter(|info| !info.properties.is_empty())
        .cloned()
        .ok_or_else(|| {
            ConformanceError::Inapplicable(format!("{} has no described properties", type_name.prefixed()))
        })?;
    Ok((type_name, sample, info))
}

/// Insert a copy of the first sampled feature; returns its new identifier.
pub(crate) async fn insert_copy(
    scope: &mut TransactionScope<'_>,
    sample: &FeatureSample,
) -> ConformanceResult<String> {
    let source = sample
        .features
        .first()
        .ok_or_else(|| ConformanceError::Inapplicable("empty sample".to_string()))?;
    let record = scope
        .submit(
            TransactionPayload::Insert {
                features: vec![fresh_copy(source)],
                use_existing_ids: false,
            },
            None,
        )
        .await?;
    record
        .affected
        .into_iter()
        .next()
        .ok_or_else(|| ConformanceError::business_rule("Insert reported no identifier"))
}

pub(crate) fn set_gml_id(element: &mut Element, id: &str) {
    for attribute in &mut element.attributes {
        if attribute.namespace.as_deref() == Some(GML) && attribute.name == "id" {
            attribute.value = id.to_string();
        }
    }
}

/// Assert the stored representation of `id` now holds `expected` for `property`.
pub(crate) async fn expect_value(
    ctx: &SuiteContext,
    type_name: &QName,
    id: &str,
    property: &QName,
    expected: &str,
) -> ConformanceResult<()> {
    let feature = ctx
        .transactions
        .current_feature(type_name, id)
        .await?
        .ok_or_else(|| ConformanceError::business_rule(format!("Feature {} no longer resolves", id)))?;
    let found = feature
        .find(&property.namespace, &property.local_name)
        .map(Element::text_content);
    match found {
        Some(found) if compare(&found, expected, true) == Some(Ordering::Equal) => Ok(()),
        other => Err(ConformanceError::business_rule(format!(
            "Expected {} of {} to be {}, found {:?}",
            property.prefixed(),
            id,
            expected,
            other
        ))),
    }
}
