//! Suite runs against an external service named by `TEST_WFS_URL`

use crate::common::run_suite;
use wfsconform::config::Config;

fn external_config() -> Config {
    let endpoint = std::env::var("TEST_WFS_URL").expect("TEST_WFS_URL must be set");
    Config::for_endpoint(endpoint)
}

#[tokio::test]
#[ignore]
async fn test_external_service_conforms() {
    let report = run_suite(external_config()).await;
    println!("{}", serde_json::to_string_pretty(&report).expect("report serializes"));

    let failures: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| o.verdict == wfsconform::error::Verdict::Fail)
        .map(|o| (o.name.as_str(), o.reason.as_deref()))
        .collect();
    assert!(failures.is_empty(), "failed: {:?}", failures);
    assert!(report.errors.is_empty(), "teardown errors: {:?}", report.errors);
}

#[tokio::test]
#[ignore]
async fn test_external_service_advertises_simple_class() {
    let report = run_suite(external_config()).await;
    let outcome = report
        .outcome("basic::get_capabilities")
        .expect("capabilities test ran");
    assert_eq!(outcome.verdict, wfsconform::error::Verdict::Pass);
}
