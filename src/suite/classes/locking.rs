//! Locking WFS: locks block foreign mutations and are released by their holder.

use futures::future::BoxFuture;
use futures::FutureExt;
use uuid::Uuid;

use super::{described_sample, expect_value, insert_copy};
use crate::capabilities::ConformanceClass;
use crate::error::{ConformanceError, ConformanceResult};
use crate::services::transaction::update_candidate;
use crate::services::TransactionPayload;
use crate::suite::runner::ConformanceTest;
use crate::suite::SuiteContext;

pub fn tests() -> Vec<ConformanceTest> {
    vec![
        ConformanceTest::mutating("locking::lock_blocks_foreign_update", ConformanceClass::Locking, lock_blocks_foreign_update),
        ConformanceTest::mutating("locking::get_feature_with_lock", ConformanceClass::Locking, get_feature_with_lock),
        ConformanceTest::mutating("locking::release_lock", ConformanceClass::Locking, release_lock),
        ConformanceTest::reading("locking::unknown_lock_expired", ConformanceClass::Locking, unknown_lock_expired),
    ]
}

/// An update without the lock token is refused; with it the update applies.
fn lock_blocks_foreign_update(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
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
        let lock = ctx
            .transactions
            .lock_features(&type_name, std::slice::from_ref(&id), None)
            .await?;
        if !lock.locked.contains(&id) {
            scope.close().await?;
            return Err(ConformanceError::business_rule(format!(
                "LockFeature did not lock {}",
                id
            )));
        }

        let update = TransactionPayload::Update {
            type_name: type_name.clone(),
            id: id.clone(),
            properties: vec![(property.clone(), value.clone())],
        };
        match ctx.transactions.submit(update.clone(), None).await {
            Err(ConformanceError::ConcurrencyViolation { .. }) => {}
            Err(e) => {
                ctx.transactions.release(&lock.lock_id).await?;
                scope.close().await?;
                return Err(e);
            }
            Ok(_) => {
                ctx.transactions.release(&lock.lock_id).await?;
                scope.close().await?;
                return Err(ConformanceError::concurrency(format!(
                    "Update of {} succeeded without lock {}",
                    id, lock.lock_id
                )));
            }
        }

        scope.submit(update, Some(&lock.lock_id)).await?;
        let checked = expect_value(ctx, &type_name, &id, &property, &value).await;
        scope.close().await?;
        checked
    }
    .boxed()
}

fn get_feature_with_lock(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, sample, _) = described_sample(ctx).await?;
        let mut scope = ctx.transactions.begin();
        let id = insert_copy(&mut scope, &sample).await?;
        let (lock_id, returned) = ctx
            .transactions
            .get_feature_with_lock(&type_name, std::slice::from_ref(&id), None)
            .await?;
        let locked = ctx.transactions.states().lock_of(&id);
        ctx.transactions.release(&lock_id).await?;
        scope.close().await?;
        if !returned.contains(&id) {
            return Err(ConformanceError::business_rule(format!(
                "GetFeatureWithLock did not return {}",
                id
            )));
        }
        if locked.as_deref() != Some(lock_id.as_str()) {
            return Err(ConformanceError::business_rule(format!(
                "{} is not held by lock {}",
                id, lock_id
            )));
        }
        Ok(())
    }
    .boxed()
}

/// After release, an update without any token succeeds.
fn release_lock(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
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
        let lock = ctx
            .transactions
            .lock_features(&type_name, std::slice::from_ref(&id), None)
            .await?;
        ctx.transactions.release(&lock.lock_id).await?;
        let updated = scope
            .submit(
                TransactionPayload::Update {
                    type_name,
                    id,
                    properties: vec![(property, value)],
                },
                None,
            )
            .await;
        scope.close().await?;
        updated.map(|_| ())
    }
    .boxed()
}

fn unknown_lock_expired(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let lock_id = format!("lock-{}", Uuid::new_v4());
        ctx.transactions.reset_lock(&lock_id).await
    }
    .boxed()
}
