//! Coastal API - Main entry point.

use anyhow::Result;
use coastal_common::config::Config;
use coastal_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Coastal API v{}", env!("CARGO_PKG_VERSION"));

    // Start the API server
    coastal_api::start_server(&config).await
}
