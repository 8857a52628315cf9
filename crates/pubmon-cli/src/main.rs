//! pubmon - synthetic publish load generator.

mod config;
mod error;
mod session;
mod transport;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Args;
use crate::session::Session;

const DEFAULT_LOG_FILTER: &str = "pubmon=info,pubmon_core=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize tracing
    let filter = match args.log_level.as_deref() {
        Some(level) => tracing_subscriber::EnvFilter::try_new(level)?,
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting pubmon");

    let config = args.into_config()?;
    let print_metrics = config.print_metrics;
    let json = config.json;

    tracing::info!(
        scenarios = ?config.scenarios.iter().map(|s| s.name.to_string()).collect::<Vec<_>>(),
        status_frequency_ms = config.monitor.status_frequency.as_millis() as u64,
        max_series = ?config.monitor.max_series,
        "configuration loaded"
    );

    // Set up graceful shutdown
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    // Spawn shutdown signal handler
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx_clone.send(());
    });

    let summary = match Session::new(config)?.run(shutdown_tx).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(error = %e, "session failed");
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary.status)?);
    }
    if print_metrics {
        print!("{}", summary.prometheus);
    }

    tracing::info!("session complete");
    Ok(())
}
