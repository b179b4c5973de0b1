use std::process::ExitCode;
use std::sync::Arc;

use geotrack_mock::settings::Settings;
use geotrack_mock::{exit_status, run};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let settings = Arc::new(Settings::new().expect("Failed to load settings."));

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let app_name = env!("CARGO_PKG_NAME").replace('-', "_");
        let level = settings.logger.level.as_str();

        format!("{app_name}={level},geotrack_store={level}").into()
    });

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let result = run(&settings).await;
    match &result {
        Ok(summary) => tracing::info!(
            "Simulation stopped: {} updates sent, {} failed",
            summary.sent,
            summary.failed
        ),
        Err(e) => tracing::error!("{}", e),
    }

    ExitCode::from(exit_status(&result))
}
