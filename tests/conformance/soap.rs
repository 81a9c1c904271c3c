//! The suite over the SOAP binding

use crate::common::{MockWfs, assert_verdict, run_suite};
use wfsconform::binding::BindingKind;
use wfsconform::error::Verdict;

#[tokio::test]
async fn test_suite_over_soap() {
    let mock = MockWfs::start().await;
    let mut config = mock.config();
    config.preferred_binding = Some(BindingKind::Soap);
    let report = run_suite(config).await;

    assert_verdict(&report, "basic::get_feature", Verdict::Pass);
    assert_verdict(&report, "transactions::insert_then_delete", Verdict::Pass);
}

/// Exception reports arrive inside SOAP faults with their HTTP status.
#[tokio::test]
async fn test_soap_faults_carry_exceptions() {
    let mock = MockWfs::start().await;
    let mut config = mock.config();
    config.preferred_binding = Some(BindingKind::Soap);
    let report = run_suite(config).await;

    assert_verdict(&report, "basic::unknown_type_name", Verdict::Pass);
    assert_verdict(&report, "basic::get_feature_by_unknown_id", Verdict::Pass);
    assert_verdict(&report, "stored_queries::duplicate_id_rejected", Verdict::Pass);
}
