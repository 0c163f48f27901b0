//! `signalwatch` command-line runner.

use anyhow::Context;
use clap::Parser;
use signalwatch_core::AppConfig;

mod cli;
mod commands;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("signalwatch error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing()?;

    tracing::info!("Starting SignalWatch v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load_with_env(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(path) = &cli.checkpoint {
        config.scan.checkpoint_path.clone_from(path);
    }
    let database = cli.database.as_deref();

    match &cli.command {
        cli::Commands::Start(args) => {
            commands::apply_start_args(&mut config, args);
            config.validate().context("invalid configuration")?;
            commands::start(config, database).await
        }
        cli::Commands::Resume => commands::resume(config, database).await,
        cli::Commands::Status => commands::status(&config),
        cli::Commands::Reset => commands::reset(config).await,
    }
}

/// Logs go to stderr so stdout carries only reports.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,signalwatch=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
