//! Feature versions: navigation with `fes:ResourceId@version` and member states.

use futures::future::BoxFuture;
use futures::FutureExt;

use super::{described_sample, insert_copy};
use crate::capabilities::ConformanceClass;
use crate::error::{ConformanceError, ConformanceResult};
use crate::filter::VersionAction;
use crate::services::transaction::update_candidate;
use crate::services::TransactionPayload;
use crate::suite::runner::ConformanceTest;
use crate::suite::SuiteContext;

pub fn tests() -> Vec<ConformanceTest> {
    vec![
        ConformanceTest::mutating("versioning::update_creates_version", ConformanceClass::FeatureVersioning, update_creates_version),
        ConformanceTest::mutating("versioning::delete_retires_feature", ConformanceClass::FeatureVersioning, delete_retires_feature),
    ]
}

/// After one update: ALL lists two versions, the older superseded; LAST returns one.
fn update_creates_version(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, sample, info) = described_sample(ctx).await?;
        let source = sample
            .features
            .first()
            .ok_or_else(|| ConformanceError::Inapplicable("empty sample".to_string()))?;
        let property = update_candidate(&info, source).ok_or_else(|| {
            ConformanceError::Inapplicable("no updatable scalar property".to_string())
        })?;

        let mut scope = ctx.transactions.begin();
        let id = insert_copy(&mut scope, &sample).await?;
        scope
            .submit(
                TransactionPayload::Update {
                    type_name: type_name.clone(),
                    id: id.clone(),
                    properties: vec![property],
                },
                None,
            )
            .await?;

        let all = ctx
            .transactions
            .resolve_version(&type_name, &id, VersionAction::All)
            .await;
        let last = ctx
            .transactions
            .resolve_version(&type_name, &id, VersionAction::Last)
            .await;
        scope.close().await?;

        let all = all?;
        if all.len() < 2 {
            return Err(ConformanceError::business_rule(format!(
                "Expected at least 2 versions of {}, found {}",
                id,
                all.len()
            )));
        }
        if !all
            .iter()
            .any(|m| m.state.as_deref() == Some("superseded"))
        {
            return Err(ConformanceError::business_rule(format!(
                "No superseded version of {} reported",
                id
            )));
        }
        match last?.len() {
            1 => Ok(()),
            n => Err(ConformanceError::business_rule(format!(
                "LAST returned {} versions of {}",
                n, id
            ))),
        }
    }
    .boxed()
}

fn delete_retires_feature(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, sample, _) = described_sample(ctx).await?;
        let mut scope = ctx.transactions.begin();
        let id = insert_copy(&mut scope, &sample).await?;
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

        let history = ctx
            .transactions
            .resolve_version(&type_name, &id, VersionAction::All)
            .await?;
        if history.iter().any(|m| m.state.as_deref() == Some("retired")) {
            Ok(())
        } else {
            Err(ConformanceError::business_rule(format!(
                "History of deleted feature {} holds no retired version",
                id
            )))
        }
    }
    .boxed()
}
