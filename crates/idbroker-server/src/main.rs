use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use idbroker_server::Daemon;
use idbroker_server::config::{loader::load_config, resolve_config_path};
use idbroker_server::observability;

#[derive(Debug, Parser)]
#[command(name = "idbroker", version, about = "Identity broker daemon")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    let cli = Cli::parse();
    observability::init_tracing();

    let (config_path, source) = resolve_config_path(cli.config);
    let cfg = load_config(&config_path, source)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    tracing::info!(
        path = %config_path.display(),
        source = %source,
        storage = cfg.storage.backend_name(),
        connectors = cfg.connectors.len(),
        "Configuration loaded"
    );
    observability::apply_logging_level(&cfg.logging.level);

    if cli.check_config {
        println!("configuration OK");
        return Ok(());
    }

    let daemon = Daemon::start(cfg).await.context("starting idbroker")?;
    daemon
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
            }
        })
        .await
        .context("running idbroker")?;

    Ok(())
}
