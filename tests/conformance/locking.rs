//! Locking WFS

use crate::common::{Defects, MockWfs, assert_verdict, run_suite};
use wfsconform::error::Verdict;

#[tokio::test]
async fn test_locking_passes() {
    let mock = MockWfs::start().await;
    let report = run_suite(mock.config()).await;

    for name in [
        "locking::lock_blocks_foreign_update",
        "locking::get_feature_with_lock",
        "locking::release_lock",
        "locking::unknown_lock_expired",
    ] {
        assert_verdict(&report, name, Verdict::Pass);
    }
}

#[tokio::test]
async fn test_update_of_locked_feature_is_reported() {
    let mock = MockWfs::with_defects(Defects {
        ignore_locks: true,
        ..Defects::default()
    })
    .await;
    let report = run_suite(mock.config()).await;

    assert_verdict(&report, "locking::lock_blocks_foreign_update", Verdict::Fail);
    assert!(report.has_failures());
    // The copy updated without the token is still cleaned up
    assert_eq!(mock.live_ids(), vec!["p1", "p2", "p3", "l1", "l2"]);
}
