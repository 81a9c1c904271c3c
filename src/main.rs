use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wfsconform::{
    config::Config,
    suite::{Runner, Suite, classes},
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr; stdout carries the JSON report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wfsconform=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load()?;
    tracing::info!("Testing {} ({:?})", config.endpoint, config);

    let suite = Arc::new(Suite::new(config.clone()));
    let runner = Runner::new(suite, config.concurrency);
    let report = runner.run(classes::all()).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.has_failures() {
        tracing::warn!(failed = report.failed, "Service is not conformant");
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
