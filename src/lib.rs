pub mod cli;
pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod io_utils;
pub mod join;
pub mod load;
pub mod logging;
pub mod preview;
pub mod process;
pub mod schema;
pub mod table;
pub mod transform;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};

use crate::{
    cli::{Cli, Commands, RunArgs},
    config::PipelineConfig,
};

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let run_args = match &cli.command {
        Commands::Run(args) => args,
        Commands::Preview(args) => &args.run,
    };
    let config = resolve_config(&cli, run_args)?;
    let _guard = logging::init(&config.logging).context("Initializing logging")?;
    debug!("Resolved configuration: {config:?}");

    let outcome = match &cli.command {
        Commands::Run(_) => handle_run(&config),
        Commands::Preview(args) => preview::execute(&config, args.category, args.rows),
    };
    if let Err(err) = &outcome {
        error!("ETL process failed: {err:#}");
    }
    outcome
}

fn resolve_config(cli: &Cli, run_args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::resolve(cli.config.as_deref())?;
    config.apply_run_args(run_args);
    if let Some(dir) = &cli.log_dir {
        config.logging.directory = dir.clone();
    }
    Ok(config)
}

fn handle_run(config: &PipelineConfig) -> Result<()> {
    info!(
        "Reading sources under {:?}, writing {:?} ({:?})",
        config.data_dir, config.output.path, config.output.mode
    );
    let summary = process::execute(config)?;
    debug!(
        "{} invoice(s), {} file(s) written, {} failed, {:?}",
        summary.invoices,
        summary.written.len(),
        summary.failed,
        summary.elapsed
    );
    Ok(())
}
