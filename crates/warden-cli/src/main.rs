//! `warden` binary entry point.

use anyhow::Result;
use clap::Parser;
use warden_cli::Cli;
use warden_cli::runner::{execute_command, exit_code_for, init_logging, load_config};
use warden_core::cli::OutputFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format)?;

    let output_format = cli
        .format
        .parse::<OutputFormat>()
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let outcome = match load_config(cli.config.as_deref()) {
        Ok(config) => execute_command(cli.command, config, output_format).await,
        Err(e) => Err(e),
    };

    let exit_code = match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code_for(&e)
        }
    };

    std::process::exit(exit_code.as_i32());
}
