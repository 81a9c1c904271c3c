//! Manage stored queries

use crate::common::{Defects, MockWfs, assert_verdict, run_suite};
use wfsconform::error::Verdict;

#[tokio::test]
async fn test_stored_query_management_passes() {
    let mock = MockWfs::start().await;
    let report = run_suite(mock.config()).await;

    for name in [
        "stored_queries::create_describe_invoke_drop",
        "stored_queries::duplicate_id_rejected",
        "stored_queries::unsupported_language_rejected",
        "stored_queries::drop_unknown_rejected",
        "stored_queries::drop_built_in_rejected",
    ] {
        assert_verdict(&report, name, Verdict::Pass);
    }
    assert!(mock.stored_query_ids().is_empty());
}

#[tokio::test]
async fn test_late_listing_is_awaited() {
    let mock = MockWfs::with_defects(Defects {
        delayed_listing: 2,
        ..Defects::default()
    })
    .await;
    let report = run_suite(mock.config()).await;

    assert_verdict(&report, "stored_queries::create_describe_invoke_drop", Verdict::Pass);
    assert!(mock.stored_query_ids().is_empty());
}

#[tokio::test]
async fn test_query_never_listed_is_reported() {
    let mock = MockWfs::with_defects(Defects {
        delayed_listing: 50,
        ..Defects::default()
    })
    .await;
    let report = run_suite(mock.config()).await;

    assert_verdict(&report, "stored_queries::create_describe_invoke_drop", Verdict::Fail);
}
