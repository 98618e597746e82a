//! Chronicle HTTP server
//!
//! Run with: chronicle-server --port 3000

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chronicle::config::ChronicleConfig;
use chronicle::error::Result;
use chronicle::remote::Collaborators;
use chronicle::server::ChronicleServer;
use chronicle::session::SessionManager;

#[derive(Parser, Debug)]
#[command(name = "chronicle-server")]
#[command(about = "Mirror local folders to GitHub with a summarized change log")]
#[command(version)]
struct Args {
    /// HTTP port
    #[arg(long, env = "CHRONICLE_PORT", default_value = "3000")]
    port: u16,

    /// Config file (defaults to ~/.config/chronicle/config.toml)
    #[arg(long, env = "CHRONICLE_CONFIG")]
    config: Option<String>,

    /// Override the sync interval in seconds
    #[arg(long, env = "CHRONICLE_SYNC_INTERVAL")]
    sync_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = args
        .config
        .map(|p| PathBuf::from(shellexpand::tilde(&p).as_ref()));
    let mut config = ChronicleConfig::load(config_path.as_deref())?;
    if let Some(secs) = args.sync_interval {
        config.sync_interval_secs = secs;
    }
    config.validate()?;

    let collaborators = Collaborators::from_env(&config)?;
    let manager = SessionManager::new(collaborators, config);

    ChronicleServer::new(manager, args.port)
        .serve(shutdown_signal())
        .await?;

    tracing::info!("Chronicle server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down, flushing sessions");
}
