use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use replica_healthcheck::config;
use replica_healthcheck::server::Fleet;

const DEFAULT_CONFIG_PATH: &str = "/etc/replica-healthcheck-agent/replicas.yml";

#[derive(Debug, Parser)]
#[command(version, about = "HTTP health checks for MySQL replicas")]
struct Args {
    /// Replica config file (.yml, .yaml or .toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = config::load_config(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let fleet = Fleet::from_config(&config).context("invalid replica config")?;

    info!(
        path = %args.config.display(),
        replicas = fleet.len(),
        "Starting replica health checks"
    );

    fleet.run_until_signal().await?;
    info!("Shutdown complete");
    Ok(())
}
