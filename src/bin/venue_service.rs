//! # Venue Service
//!
//! Runs the venue microservice until interrupted. Configuration is read from
//! `config/configuration.*`, or the file named by `VENUE_CONFIG_PATH`, with
//! `VENUE__*` environment overrides.

use anyhow::Context;
use tracing::info;
use venue_service::bootstrap::{BootstrapConfig, VenueServiceBootstrap};
use venue_service::logging::init_structured_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let mut service = VenueServiceBootstrap::bootstrap(BootstrapConfig::default())
        .await
        .context("failed to start the venue service")?;

    info!(status = ?service.status(), "🏁 Venue service running, press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for the shutdown signal")?;

    info!(health = ?service.tracker.traits(), "Shutdown signal received");
    service.stop().context("failed to stop the venue service")?;
    Ok(())
}
