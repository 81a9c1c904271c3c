//! Simple and Basic WFS: discovery, plain queries and query failures.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::binding::request::query_element;
use crate::binding::{Operation, WfsRequest};
use crate::capabilities::ConformanceClass;
use crate::error::{ConformanceError, ConformanceResult};
use crate::suite::runner::ConformanceTest;
use crate::suite::SuiteContext;
use crate::validation::checks::{
    feature_count, no_duplicate_ids, number_returned_consistent, root_is,
};
use crate::validation::{Check, Expectations, SchemaRef};
use crate::xml::namespaces::{GML, WFS};
use crate::xml::{Element, QName, reader};

pub fn tests() -> Vec<ConformanceTest> {
    vec![
        ConformanceTest::reading("basic::get_capabilities", ConformanceClass::Simple, get_capabilities),
        ConformanceTest::reading("basic::describe_feature_type", ConformanceClass::Simple, describe_feature_type),
        ConformanceTest::reading("basic::get_feature", ConformanceClass::Simple, get_feature),
        ConformanceTest::reading("basic::get_feature_by_id", ConformanceClass::Simple, get_feature_by_id),
        ConformanceTest::reading("basic::get_feature_by_unknown_id", ConformanceClass::Simple, get_feature_by_unknown_id),
        ConformanceTest::reading("basic::list_stored_queries", ConformanceClass::Simple, list_stored_queries),
        ConformanceTest::reading("basic::unknown_type_name", ConformanceClass::Simple, unknown_type_name),
        ConformanceTest::reading("basic::get_property_value", ConformanceClass::Basic, get_property_value),
    ]
}

fn get_capabilities(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let request = WfsRequest::new(Operation::GetCapabilities, ctx.client.version());
        let response = ctx.client.send(&request).await?;
        ctx.validator.require(
            &response,
            SchemaRef::Capabilities,
            &Expectations::success().check(root_is(WFS, "WFS_Capabilities")),
        )
    }
    .boxed()
}

fn describe_feature_type(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let undescribed: Vec<String> = ctx
            .capabilities()
            .feature_types
            .values()
            .filter(|info| info.properties.is_empty())
            .map(|info| info.name.prefixed())
            .collect();
        if undescribed.is_empty() {
            Ok(())
        } else {
            Err(ConformanceError::business_rule(format!(
                "DescribeFeatureType yielded no properties for {}",
                undescribed.join(", ")
            )))
        }
    }
    .boxed()
}

fn get_feature(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, sample) = ctx.sampled_type().await?;
        let request = WfsRequest::get_feature(ctx.client.version(), &type_name, None)
            .attr("count", sample.len());
        let response = ctx.client.send(&request).await?;
        ctx.validator.require(
            &response,
            SchemaRef::FeatureCollection,
            &Expectations::success()
                .check(feature_count(sample.len()))
                .check(number_returned_consistent())
                .check(no_duplicate_ids()),
        )
    }
    .boxed()
}

fn get_feature_by_id(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (_, sample) = ctx.sampled_type().await?;
        let id = sample.ids().into_iter().next().ok_or_else(|| {
            ConformanceError::Inapplicable("no sampled identifier".to_string())
        })?;
        let query_id = ctx.capabilities().get_feature_by_id_query();
        let response = ctx
            .stored_queries
            .invoke(query_id, &[("id".to_string(), id.clone())])
            .await?;
        let wanted = id.clone();
        let is_feature = Check::new(format!("response is feature {}", id), move |root| {
            match root.attribute((GML, "id")) {
                Some(found) if found == wanted => Ok(()),
                found => Err(format!("Expected feature {}, got {:?}", wanted, found)),
            }
        });
        ctx.validator
            .require(&response, SchemaRef::Any, &Expectations::success().check(is_feature))
    }
    .boxed()
}

/// An unknown id yields 404; WFS 2.0.0 maps the failure to 403 instead.
fn get_feature_by_unknown_id(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let id = format!("uuid-{}", uuid::Uuid::new_v4());
        let query_id = ctx.capabilities().get_feature_by_id_query();
        let response = ctx
            .stored_queries
            .invoke(query_id, &[("id".to_string(), id)])
            .await?;
        let allowed: &[u16] = if ctx.capabilities().is_wfs_200() {
            &[403, 404]
        } else {
            &[404]
        };
        if allowed.contains(&response.status) {
            Ok(())
        } else {
            Err(ConformanceError::business_rule(format!(
                "Expected status {:?} for an unknown feature id, got {}",
                allowed, response.status
            ))
            .with_exchange(&response.exchange))
        }
    }
    .boxed()
}

fn list_stored_queries(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let wanted = ctx.capabilities().get_feature_by_id_query();
        let listed = ctx.stored_queries.list().await?;
        if listed.iter().any(|q| q.id == wanted) {
            Ok(())
        } else {
            Err(ConformanceError::business_rule(format!(
                "ListStoredQueries does not offer {}",
                wanted
            )))
        }
    }
    .boxed()
}

fn unknown_type_name(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let unknown = QName::new("http://example.invalid/wfsconform", "Unknown").with_prefix("unk");
        let request = WfsRequest::get_feature(ctx.client.version(), &unknown, None);
        let response = ctx.client.send(&request).await?;
        ctx.validator.require(
            &response,
            SchemaRef::ExceptionReport,
            &Expectations::exception("InvalidParameterValue").with_locator("typeNames"),
        )
    }
    .boxed()
}

fn get_property_value(ctx: &SuiteContext) -> BoxFuture<'_, ConformanceResult<()>> {
    async move {
        let (type_name, sample) = ctx.sampled_type().await?;
        let info = ctx.capabilities().feature_type(&type_name).ok_or_else(|| {
            ConformanceError::Inapplicable(format!("{} is not described", type_name.prefixed()))
        })?;
        let (property, value) = info
            .properties
            .iter()
            .filter(|p| p.property_type.is_scalar())
            .find_map(|p| sample.representative(p.local_name()).map(|(_, v)| (p.name.clone(), v.to_string())))
            .ok_or_else(|| ConformanceError::Inapplicable("no sampled scalar value".to_string()))?;

        let query: Element = query_element(&type_name, None).declare_name(&property);
        let request = WfsRequest::new(Operation::GetPropertyValue, ctx.client.version())
            .attr("valueReference", property.prefixed())
            .child(query);
        let response = ctx.client.send(&request).await?;
        let holds_value = Check::new(format!("a member holds {}", value), move |root| {
            let found = reader::children(root, WFS, "member").any(|m| reader::text(m) == value);
            if found {
                Ok(())
            } else {
                Err(format!("No wfs:member holds the sampled value {}", value))
            }
        });
        ctx.validator.require(
            &response,
            SchemaRef::ValueCollection,
            &Expectations::success().check(holds_value),
        )
    }
    .boxed()
}
