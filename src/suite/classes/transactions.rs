//! Transactional WFS: insert, update, replace and delete, each undone afterwards.

use futures::future::BoxFuture;
use futures::FutureExt;

use super::{described_sample, expect_value, insert_copy, set_gml_id};
use crate::capabilities::ConformanceClass;
use crate::error::{ConformanceError, ConformanceResult};
use crate::services::transaction::{fresh_copy, update_candidate};
use crate::services::TransactionPayload;
use crate::suite::runner::ConformanceTest;
use crate::suite::SuiteContext;
use crate::validation::Expectations;

pub fn tests() -> Vec<ConformanceTest> {
    vec![
        ConformanceTest::mutating("transactions::insert_then_delete", ConformanceClass::Transactional, insert_then_delete),
        ConformanceTest::mutating("transactions::update_property", ConformanceClass::Transactional, update_property),
        ConformanceTest::mutating("transactions::replace_feature", ConformanceClass::Transactional, replace_feature),
        ConformanceTest::mutating("transactions::delete_existing", ConformanceClass::Transactional, delete_existing),
    ]
}

/// Insert a copy, delete it, then check it is gone for queries and mutations alike.
fn insert_then_delete(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, sample, info) = described_sample(ctx).await?;
        let mut scope = ctx.transactions.begin();
        let id = insert_copy(&mut scope, &sample).await?;
        if ctx.transactions.current_feature(&type_name, &id).await?.is_none() {
            return Err(ConformanceError::business_rule(format!(
                "Inserted feature {} does not resolve",
                id
            )));
        }

        scope
            .submit(
                TransactionPayload::Delete {
                    type_name: type_name.clone(),
                    ids: vec![id.clone()],
                },
                None,
            )
            .await?;

        // Not found: any further mutation of the deleted feature must be refused.
        if let Some(source) = sample.features.first()
            && let Some(property) = update_candidate(&info, source)
        {
            ctx.transactions
                .submit_expecting_rejection(
                    TransactionPayload::Update {
                        type_name,
                        id,
                        properties: vec![property],
                    },
                    None,
                    &Expectations::any_exception(),
                )
                .await?;
        }
        scope.close().await
    }
    .boxed()
}

fn update_property(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, sample, info) = described_sample(ctx).await?;
        let source = sample
            .features
            .first()
            .ok_or_else(|| ConformanceError::Inapplicable("empty sample".to_string()))?;
        let (property, value) = update_candidate(&info, source).ok_or_else(|| {
            ConformanceError::Inapplicable("no updatable scalar property".to_string())
        })?;

        let mut scope = ctx.transactions.begin();
        let id = insert_copy(&mut scope, &sample).await?;
        scope
            .submit(
                TransactionPayload::Update {
                    type_name: type_name.clone(),
                    id: id.clone(),
                    properties: vec![(property.clone(), value.clone())],
                },
                None,
            )
            .await?;
        let checked = expect_value(ctx, &type_name, &id, &property, &value).await;
        scope.close().await?;
        checked
    }
    .boxed()
}

fn replace_feature(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, sample, info) = described_sample(ctx).await?;
        let source = sample
            .features
            .first()
            .ok_or_else(|| ConformanceError::Inapplicable("empty sample".to_string()))?;
        let (property, value) = update_candidate(&info, source).ok_or_else(|| {
            ConformanceError::Inapplicable("no replaceable scalar property".to_string())
        })?;

        let mut scope = ctx.transactions.begin();
        let id = insert_copy(&mut scope, &sample).await?;
        let mut replacement = fresh_copy(source);
        set_gml_id(&mut replacement, &id);
        if let Some(element) = replacement.find_local_mut(&property.local_name) {
            element.set_text(value.clone());
        }
        scope
            .submit(
                TransactionPayload::Replace {
                    id: id.clone(),
                    feature: replacement,
                },
                None,
            )
            .await?;
        let checked = expect_value(ctx, &type_name, &id, &property, &value).await;
        scope.close().await?;
        checked
    }
    .boxed()
}

/// Delete a pre-existing feature; closing the scope restores it with its identifier.
fn delete_existing(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, sample, _) = described_sample(ctx).await?;
        let id = sample
            .ids()
            .pop()
            .ok_or_else(|| ConformanceError::Inapplicable("empty sample".to_string()))?;
        let mut scope = ctx.transactions.begin();
        scope
            .submit(
                TransactionPayload::Delete {
                    type_name: type_name.clone(),
                    ids: vec![id.clone()],
                },
                None,
            )
            .await?;
        scope.close().await?;
        match ctx.transactions.current_feature(&type_name, &id).await? {
            Some(_) => Ok(()),
            None => Err(ConformanceError::CompensationFailure(format!(
                "Deleted feature {} was not restored",
                id
            ))),
        }
    }
    .boxed()
}
