//! InfraRisk CLI - Command-line interface
//!
//! Runs hazard/element studies against the risk database.

mod cli;
mod commands;
mod config_loader;
mod output;
mod storage;

use clap::Parser;
use cli::Cli;
use console::style;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} Failed to start async runtime: {}", style("✗").red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(commands::execute(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("✗").red().bold(), e);
            for cause in e.chain().skip(1) {
                eprintln!("  {} {}", style("caused by:").dim(), cause);
            }
            ExitCode::FAILURE
        }
    }
}
