//! LearnCrafter CLI Binary
//!
//! Serves the publishing job API or runs a single course spec from the command line.

use anyhow::Context;
use clap::Parser;
use learncrafter::cli::{Cli, RunContext};
use learncrafter::logging::init_logging;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let context = RunContext::new(&cli.workspace, cli.config.as_deref())
        .context("Failed to load configuration")?;

    let logging = context.logging_config(&cli)?;
    init_logging(&logging).context("Failed to initialize logging")?;

    info!(command = ?cli.command, "LearnCrafter starting");

    match context.execute(&cli.command).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(e.into())
        }
    }
}
