//! `weather-server` binary: HTTP API, background refresher, and one-shot
//! lookups from the command line.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod api;
mod cli;
mod error;

const DEFAULT_LOG_FILTER: &str = "weather_server=info,weather_aggregator=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(false)
        .init();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
