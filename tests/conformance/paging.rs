//! Response paging

use crate::common::{Defects, MockWfs, assert_verdict, run_suite};
use wfsconform::error::Verdict;

#[tokio::test]
async fn test_paging_passes() {
    let mock = MockWfs::start().await;
    let report = run_suite(mock.config()).await;

    for name in [
        "paging::coverage_single_feature_pages",
        "paging::coverage_half_pages",
        "paging::sorted_coverage",
        "paging::hits_page",
        "paging::next_then_previous",
    ] {
        assert_verdict(&report, name, Verdict::Pass);
    }
}

/// A service that ignores startIndex repeats the first feature on every page.
#[tokio::test]
async fn test_ignored_start_index_fails_coverage() {
    let mock = MockWfs::with_defects(Defects {
        ignore_start_index: true,
        ..Defects::default()
    })
    .await;
    let report = run_suite(mock.config()).await;

    assert_verdict(&report, "paging::coverage_single_feature_pages", Verdict::Fail);
    assert!(report.has_failures());
}
