//! Response paging: exhaustive non-overlapping coverage and link navigation.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::capabilities::ConformanceClass;
use crate::error::{ConformanceError, ConformanceResult};
use crate::services::{QueryTemplate, SortOrder};
use crate::suite::runner::ConformanceTest;
use crate::suite::SuiteContext;

pub fn tests() -> Vec<ConformanceTest> {
    vec![
        ConformanceTest::reading("paging::coverage_single_feature_pages", ConformanceClass::ResultPaging, coverage_single_feature_pages),
        ConformanceTest::reading("paging::coverage_half_pages", ConformanceClass::ResultPaging, coverage_half_pages),
        ConformanceTest::reading("paging::sorted_coverage", ConformanceClass::ResultPaging, sorted_coverage),
        ConformanceTest::reading("paging::hits_page", ConformanceClass::ResultPaging, hits_page),
        ConformanceTest::reading("paging::next_then_previous", ConformanceClass::ResultPaging, next_then_previous),
    ]
}

fn coverage_single_feature_pages(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, _) = ctx.sampled_type().await?;
        ctx.paging
            .verify_coverage(&QueryTemplate::new(type_name), 1)
            .await
    }
    .boxed()
}

fn coverage_half_pages(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, sample) = ctx.sampled_type().await?;
        let page_size = (sample.len() as u64).div_ceil(2).max(1);
        ctx.paging
            .verify_coverage(&QueryTemplate::new(type_name), page_size)
            .await
    }
    .boxed()
}

fn sorted_coverage(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        if !ctx.capabilities().implements_sorting() {
            return Err(ConformanceError::Inapplicable(
                "ImplementsSorting is not advertised".to_string(),
            ));
        }
        let (type_name, sample) = ctx.sampled_type().await?;
        let property = ctx
            .capabilities()
            .feature_type(&type_name)
            .and_then(|info| {
                info.properties
                    .iter()
                    .filter(|p| p.property_type.is_scalar() && !p.nillable)
                    .find(|p| sample.representative(p.local_name()).is_some())
                    .map(|p| p.name.clone())
            })
            .ok_or_else(|| ConformanceError::Inapplicable("no sortable property".to_string()))?;
        let template = QueryTemplate::new(type_name).sort(property, SortOrder::Asc);
        ctx.paging.verify_coverage(&template, 2).await
    }
    .boxed()
}

fn hits_page(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, _) = ctx.sampled_type().await?;
        ctx.paging
            .verify_hits_page(&QueryTemplate::new(type_name), 1)
            .await
    }
    .boxed()
}

fn next_then_previous(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, sample) = ctx.sampled_type().await?;
        if sample.len() < 2 {
            return Err(ConformanceError::Inapplicable(
                "fewer than two features to page through".to_string(),
            ));
        }
        ctx.paging
            .verify_link_round_trip(&QueryTemplate::new(type_name), 1)
            .await
    }
    .boxed()
}
