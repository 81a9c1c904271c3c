//! Manage stored queries: create, describe, invoke, drop and their failure modes.

use futures::future::BoxFuture;
use futures::FutureExt;
use uuid::Uuid;

use crate::capabilities::{ConformanceClass, PropertyType};
use crate::error::{ConformanceError, ConformanceResult};
use crate::filter::FilterExpression;
use crate::services::StoredQueryDescriptor;
use crate::suite::runner::ConformanceTest;
use crate::suite::SuiteContext;
use crate::validation::checks::{all_satisfy, contains_id};
use crate::validation::{Expectations, SchemaRef};
use crate::xml::QName;

pub fn tests() -> Vec<ConformanceTest> {
    vec![
        ConformanceTest::reading("stored_queries::create_describe_invoke_drop", ConformanceClass::ManageStoredQueries, create_describe_invoke_drop),
        ConformanceTest::reading("stored_queries::duplicate_id_rejected", ConformanceClass::ManageStoredQueries, duplicate_id_rejected),
        ConformanceTest::reading("stored_queries::unsupported_language_rejected", ConformanceClass::ManageStoredQueries, unsupported_language_rejected),
        ConformanceTest::reading("stored_queries::drop_unknown_rejected", ConformanceClass::ManageStoredQueries, drop_unknown_rejected),
        ConformanceTest::reading("stored_queries::drop_built_in_rejected", ConformanceClass::ManageStoredQueries, drop_built_in_rejected),
    ]
}

fn query_id() -> String {
    format!("urn:example:wfsconform:{}", Uuid::new_v4())
}

/// A string property of the sampled type with a sampled value.
async fn string_property(ctx: &SuiteContext) -> ConformanceResult<(QName, QName, String, String)> {
    let (type_name, sample) = ctx.sampled_type().await?;
    let info = ctx.capabilities().feature_type(&type_name).ok_or_else(|| {
        ConformanceError::Inapplicable(format!("{} is not described", type_name.prefixed()))
    })?;
    info.properties
        .iter()
        .filter(|p| p.property_type == PropertyType::String)
        .find_map(|p| {
            sample
                .representative(p.local_name())
                .map(|(feature, value)| (p.name.clone(), feature.record.id.clone(), value.to_string()))
        })
        .map(|(property, id, value)| (type_name.clone(), property, id, value))
        .ok_or_else(|| ConformanceError::Inapplicable("no sampled string property".to_string()))
}

fn create_describe_invoke_drop(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, property, feature_id, value) = string_property(ctx).await?;
        let descriptor = StoredQueryDescriptor::equal_to(query_id(), &type_name, &property);
        ctx.stored_queries.create(&descriptor).await?;

        let checked = async {
            ctx.stored_queries.verify_description(&descriptor).await?;
            let response = ctx
                .stored_queries
                .invoke(&descriptor.id, &[("value".to_string(), value.clone())])
                .await?;
            ctx.validator.require(
                &response,
                SchemaRef::FeatureCollection,
                &Expectations::success()
                    .check(contains_id(feature_id))
                    .check(all_satisfy(FilterExpression::equal_to(property, value))),
            )
        }
        .await;

        ctx.stored_queries.drop(&descriptor.id).await?;
        checked
    }
    .boxed()
}

fn duplicate_id_rejected(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, property, _, _) = string_property(ctx).await?;
        let descriptor = StoredQueryDescriptor::equal_to(query_id(), &type_name, &property);
        ctx.stored_queries.create(&descriptor).await?;
        let rejected = ctx
            .stored_queries
            .create_expecting(&descriptor, &Expectations::exception("DuplicateStoredQueryIdValue"))
            .await;
        ctx.stored_queries.drop(&descriptor.id).await?;
        rejected
    }
    .boxed()
}

fn unsupported_language_rejected(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, property, _, _) = string_property(ctx).await?;
        let descriptor = StoredQueryDescriptor::equal_to(query_id(), &type_name, &property)
            .with_language("urn:example:query-language:unsupported");
        ctx.stored_queries
            .create_expecting(
                &descriptor,
                &Expectations::exception("InvalidParameterValue").with_locator("language"),
            )
            .await
    }
    .boxed()
}

fn drop_unknown_rejected(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        ctx.stored_queries
            .drop_expecting(
                &query_id(),
                &Expectations::exception("InvalidParameterValue").with_locator("id"),
            )
            .await
    }
    .boxed()
}

fn drop_built_in_rejected(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let built_in = ctx.capabilities().get_feature_by_id_query();
        ctx.stored_queries
            .drop_expecting(built_in, &Expectations::any_exception())
            .await
    }
    .boxed()
}
