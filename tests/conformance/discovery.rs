//! Simple and Basic WFS: capabilities, descriptions, queries and filters

use crate::common::{Defects, MockWfs, assert_verdict, run_suite};
use wfsconform::error::Verdict;

#[tokio::test]
async fn test_simple_wfs_passes() {
    let mock = MockWfs::start().await;
    let report = run_suite(mock.config()).await;

    for name in [
        "basic::get_capabilities",
        "basic::describe_feature_type",
        "basic::get_feature",
        "basic::get_feature_by_id",
        "basic::get_feature_by_unknown_id",
        "basic::list_stored_queries",
        "basic::unknown_type_name",
    ] {
        assert_verdict(&report, name, Verdict::Pass);
    }
    assert_eq!(report.version.as_deref(), Some("2.0.2"));
}

#[tokio::test]
async fn test_get_property_value_passes() {
    let mock = MockWfs::start().await;
    let report = run_suite(mock.config()).await;

    assert_verdict(&report, "basic::get_property_value", Verdict::Pass);
}

#[tokio::test]
async fn test_sampled_filters_pass() {
    let mock = MockWfs::start().await;
    let report = run_suite(mock.config()).await;

    assert_verdict(&report, "filters::property_is_equal_to", Verdict::Pass);
    assert_verdict(&report, "filters::resource_id", Verdict::Pass);
    assert_verdict(&report, "filters::bbox", Verdict::Pass);
}

/// Filters run on every sampled type, not only the first one.
#[tokio::test]
async fn test_filter_ignored_by_second_type_is_reported() {
    let mock = MockWfs::with_defects(Defects {
        unfiltered_type: Some("Landmark"),
        ..Defects::default()
    })
    .await;
    let report = run_suite(mock.config()).await;

    assert_verdict(&report, "filters::property_is_equal_to", Verdict::Fail);
    let outcome = report.outcome("filters::property_is_equal_to").unwrap();
    assert!(
        !outcome.violations.is_empty()
            && outcome.violations.iter().all(|v| v.message.contains("Landmark: ")),
        "{:?}",
        outcome.violations
    );
}

#[tokio::test]
async fn test_spatial_join_passes() {
    let mock = MockWfs::start().await;
    let report = run_suite(mock.config()).await;

    assert_verdict(&report, "joins::join_with_intersects", Verdict::Pass);
}

#[tokio::test]
async fn test_report_accounts_for_every_test() {
    let mock = MockWfs::start().await;
    let report = run_suite(mock.config()).await;

    let total = wfsconform::suite::classes::all().len();
    assert_eq!(report.outcomes.len(), total);
    assert_eq!(report.passed + report.failed + report.skipped, total);
    assert!(report.finished_at >= report.started_at);
}

#[tokio::test]
async fn test_unreachable_service_fails_initialization() {
    crate::common::init_logging();
    let config = std::sync::Arc::new(wfsconform::config::Config::for_endpoint(
        "http://127.0.0.1:9/wfs",
    ));
    let suite = std::sync::Arc::new(wfsconform::suite::Suite::new(config.clone()));
    let result = wfsconform::suite::Runner::new(suite, config.concurrency)
        .run(wfsconform::suite::classes::all())
        .await;

    assert!(result.is_err(), "a service without capabilities cannot be tested");
}
