//! Subcommands

mod config;
mod overlay;
mod run;

use crate::cli::{Cli, Commands};
use crate::output::OutputWriter;
use anyhow::Result;

pub async fn execute(cli: Cli) -> Result<()> {
    let output = OutputWriter::new(cli.json);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run(args) => run::execute(args, cli.storage, config_path, &output).await,
        Commands::Overlay(args) => overlay::execute(args, config_path, &output),
        Commands::Config => config::execute(config_path, &output),
    }
}
