//! Picks Server - daily top-picks report service.

use anyhow::Result;
use picks_common::config::Config;
use picks_common::logging::init_logging_with_exclusions;
use picks_server::PicksService;

#[tokio::main]
async fn main() -> Result<()> {
    // Start timing immediately for cold-start measurement
    let startup_start = std::time::Instant::now();

    // Load configuration (file, then PICKS_* overrides, then validation)
    let config = Config::load_with_env()?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Picks Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(markets = ?config.picks.markets, "Configured markets");

    let service = PicksService::new(config).await?;

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
