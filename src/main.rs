/*!
 * foldhost - Main Entry Point
 *
 * Subcommands:
 * - fold: one job through the pipeline
 * - watch: poll a directory and fold every input
 * - reap / status / init: maintenance
 */

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use foldhost::{init_tracing, TracingOptions};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    init_tracing(&TracingOptions {
        verbosity: cli.verbose,
        quiet: cli.quiet,
        log_file: cli.log_file.clone(),
    })
    .map_err(foldhost::FoldhostError::from)?;

    info!(version = env!("CARGO_PKG_VERSION"), "foldhost starting");
    debug!(?cli, "Parsed arguments");

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Fold(args) => commands::fold::run(args, config).await,
        Commands::Watch(args) => commands::watch::run(args, config).await,
        Commands::Reap => commands::reap::run(config).await,
        Commands::Status => commands::status::run(config).await,
        Commands::Init(args) => commands::init::run(args, config).await,
    };

    result.map_err(Into::into)
}
