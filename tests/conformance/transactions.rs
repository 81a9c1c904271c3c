//! Transactional WFS and feature versioning

use crate::common::{Defects, MockWfs, assert_verdict, run_suite};
use wfsconform::error::Verdict;

#[tokio::test]
async fn test_transactions_pass() {
    let mock = MockWfs::start().await;
    let report = run_suite(mock.config()).await;

    for name in [
        "transactions::insert_then_delete",
        "transactions::update_property",
        "transactions::replace_feature",
        "transactions::delete_existing",
    ] {
        assert_verdict(&report, name, Verdict::Pass);
    }
}

#[tokio::test]
async fn test_versioning_passes() {
    let mock = MockWfs::start().await;
    let report = run_suite(mock.config()).await;

    assert_verdict(&report, "versioning::update_creates_version", Verdict::Pass);
    assert_verdict(&report, "versioning::delete_retires_feature", Verdict::Pass);
}

/// Features inserted by the suite are gone and deleted originals are back.
#[tokio::test]
async fn test_teardown_restores_service() {
    let mock = MockWfs::start().await;
    let report = run_suite(mock.config()).await;

    assert!(report.errors.is_empty(), "teardown errors: {:?}", report.errors);
    assert_eq!(mock.live_ids(), vec!["p1", "p2", "p3", "l1", "l2"]);
    assert!(mock.stored_query_ids().is_empty());
    assert_eq!(mock.lock_count(), 0);
}

#[tokio::test]
async fn test_delete_that_keeps_the_feature_is_reported() {
    let mock = MockWfs::with_defects(Defects {
        keep_deleted: true,
        ..Defects::default()
    })
    .await;
    let report = run_suite(mock.config()).await;

    assert_verdict(&report, "transactions::insert_then_delete", Verdict::Fail);
}

#[tokio::test]
async fn test_update_without_new_version_is_reported() {
    let mock = MockWfs::with_defects(Defects {
        stale_versions: true,
        ..Defects::default()
    })
    .await;
    let report = run_suite(mock.config()).await;

    assert_verdict(&report, "versioning::update_creates_version", Verdict::Fail);
}
