//! Entry point for the transformer manager process.

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use node_alerter::config::RuntimeSettings;
use node_alerter::manager::child::{ChildHandle, OsChildHandle};
use node_alerter::messaging::memory_bus::InMemoryMessageBus;
use node_alerter::TransformerManager;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "transformer-manager", about = "Supervises the data transformer worker processes")]
struct Cli {
    #[arg(long, env = "SYSTEM_TRANSFORMER_BIN", default_value = "system_data_transformer")]
    system_transformer_bin: String,
    #[arg(long, env = "GITHUB_TRANSFORMER_BIN", default_value = "github_data_transformer")]
    github_transformer_bin: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let settings = RuntimeSettings::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut children: HashMap<String, Box<dyn ChildHandle>> = HashMap::new();
    children.insert(
        "system_data_transformer".to_string(),
        Box::new(OsChildHandle::new(cli.system_transformer_bin, Vec::new())),
    );
    children.insert(
        "github_data_transformer".to_string(),
        Box::new(OsChildHandle::new(cli.github_transformer_bin, Vec::new())),
    );

    let bus = Arc::new(InMemoryMessageBus::new());
    let mut manager = TransformerManager::new("transformer_manager", children, bus);
    manager.initialize().await?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        result = manager.run() => {
            if let Err(e) = result {
                error!(error = %e, "manager terminated with an unrecoverable error");
                return Err(e.into());
            }
        }
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
        _ = sighup.recv() => info!("received SIGHUP, shutting down"),
    }

    manager.shutdown().await?;
    Ok(())
}
