//! Entry point for the system alerter process.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use node_alerter::config::{AlertsConfig, RuntimeSettings};
use node_alerter::messaging::memory_bus::InMemoryMessageBus;
use node_alerter::SystemAlerter;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "system-alerter", about = "Threshold alerting core for monitored blockchain nodes")]
struct Cli {
    /// Path to the alerts.toml threshold configuration.
    #[arg(long, env = "ALERTER_CONFIG_PATH", default_value = "alerts.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let settings = RuntimeSettings::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AlertsConfig::load_from_toml(&cli.config)?;
    info!(parent_id = %config.parent_id, "loaded alerts configuration");

    // In-memory bus: swap for a real broker-backed MessageBus once one exists.
    let bus = Arc::new(InMemoryMessageBus::new());
    let mut alerter = SystemAlerter::new(
        "system_alerter",
        config,
        bus,
        settings.publisher_buffer_capacity,
    );
    alerter.initialize().await?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let run_result = tokio::select! {
        result = alerter.run() => result,
        _ = sigterm.recv() => { info!("received SIGTERM, shutting down"); Ok(()) }
        _ = sigint.recv() => { info!("received SIGINT, shutting down"); Ok(()) }
        _ = sighup.recv() => { info!("received SIGHUP, shutting down"); Ok(()) }
    };

    alerter.shutdown().await?;

    if let Err(e) = run_result {
        error!(error = %e, "alerter terminated with an unrecoverable error");
        return Err(e.into());
    }

    Ok(())
}
