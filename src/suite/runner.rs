use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;

use super::context::{Suite, SuiteContext};
use super::report::{RunReport, TestOutcome};
use crate::capabilities::ConformanceClass;
use crate::error::ConformanceResult;

pub type TestFn = for<'a> fn(&'a SuiteContext) -> BoxFuture<'a, ConformanceResult<()>>;

/// One named conformance test.
#[derive(Clone, Copy)]
pub struct ConformanceTest {
    pub name: &'static str,
    pub class: ConformanceClass,
    /// Changes service state, so it needs a clean baseline
    pub mutates: bool,
    pub run: TestFn,
}

impl ConformanceTest {
    pub const fn reading(name: &'static str, class: ConformanceClass, run: TestFn) -> Self {
        Self {
            name,
            class,
            mutates: false,
            run,
        }
    }

    pub const fn mutating(name: &'static str, class: ConformanceClass, run: TestFn) -> Self {
        Self {
            name,
            class,
            mutates: true,
            run,
        }
    }
}

pub struct Runner {
    suite: Arc<Suite>,
    concurrency: usize,
}

impl Runner {
    pub fn new(suite: Arc<Suite>, concurrency: usize) -> Self {
        Self {
            suite,
            concurrency: concurrency.max(1),
        }
    }

    /// Initialize the suite, run every test and tear down once all have finished.
    pub async fn run(&self, tests: Vec<ConformanceTest>) -> ConformanceResult<RunReport> {
        let context = self.suite.context().await?;
        let started_at = Utc::now();
        tracing::info!(tests = tests.len(), concurrency = self.concurrency, "Running conformance tests");

        // Mutations run after every reading test so sampled data stays valid for them.
        let (mutating, reading): (Vec<_>, Vec<_>) = tests.into_iter().partition(|t| t.mutates);
        let mut outcomes: Vec<TestOutcome> = Vec::new();
        for batch in [reading, mutating] {
            let finished: Vec<TestOutcome> = stream::iter(batch)
                .map(|test| run_one(&context, test))
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
            outcomes.extend(finished);
        }

        let mut report = RunReport::new(
            context.config.endpoint.clone(),
            Some(context.capabilities().version.clone()),
            started_at,
            outcomes,
        );
        if let Err(e) = self.suite.shutdown().await {
            tracing::error!("Teardown failed: {}", e);
            report.errors.push(e.to_string());
        }
        tracing::info!(
            passed = report.passed,
            failed = report.failed,
            skipped = report.skipped,
            "Conformance run finished"
        );
        Ok(report)
    }
}

async fn run_one(context: &SuiteContext, test: ConformanceTest) -> TestOutcome {
    if !context.capabilities().claims(test.class) {
        tracing::debug!(test = test.name, class = %test.class, "Class not claimed");
        return TestOutcome::skipped(test.name, test.class, format!("{} is not claimed", test.class));
    }
    if test.mutates
        && let Err(e) = context.require_clean_baseline()
    {
        return TestOutcome::from_error(test.name, test.class, &e, 0);
    }

    let started = Instant::now();
    let result = (test.run)(context).await;
    let duration_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(()) => {
            tracing::info!(test = test.name, duration_ms, "Passed");
            TestOutcome::passed(test.name, test.class, duration_ms)
        }
        Err(e) if e.is_skip() => {
            tracing::info!(test = test.name, "Skipped: {}", e);
            TestOutcome::from_error(test.name, test.class, &e, duration_ms)
        }
        Err(e) => {
            tracing::warn!(test = test.name, "Failed: {}", e);
            TestOutcome::from_error(test.name, test.class, &e, duration_ms)
        }
    }
}
