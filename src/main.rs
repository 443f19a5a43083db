//! tictactoe_sync - command-line entry point.

#![warn(missing_docs)]

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tictactoe_sync::{ClientConfig, DEFAULT_LOG_FILTER, run_demo, run_tui};
use tracing::{info, instrument};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Play {
            config,
            left_name,
            right_name,
        } => {
            let config = ClientConfig::load(&config)?;
            run_tui(config, [left_name, right_name]).await
        }
        Command::Demo { config } => {
            initialize_tracing();
            let config = ClientConfig::load(&config)?;
            run_scripted_demo(config).await
        }
    }
}

/// Logs to stderr, honouring `RUST_LOG`.
fn initialize_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[instrument(skip_all, fields(namespace = %config.namespace()))]
async fn run_scripted_demo(config: ClientConfig) -> Result<()> {
    let report = run_demo(&config).await?;
    info!(
        first_match = %report.first_match(),
        second_match = %report.second_match(),
        out_of_turn_blocked = *report.out_of_turn_blocked(),
        deletion_observed = *report.deletion_observed(),
        "Demo finished"
    );
    Ok(())
}
