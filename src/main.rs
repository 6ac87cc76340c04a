//! epiwatch - public health surveillance data aggregation service.
//!
//! Aggregates disease surveillance, wastewater, vaccination, and news data
//! from public open-data sources into a local dashboard.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epiwatch::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "epiwatch=info"
    } else {
        "epiwatch=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run CLI
    cli::run().await
}
