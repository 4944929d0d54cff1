//! conffu
//!
//! Inspect, query and convert layered configuration files.

use anyhow::Result;
use clap::Parser;
use conffu::cli::convert::run_convert;
use conffu::cli::inspect::{run_get, run_keys, run_show};
use conffu::cli::{Cli, Command};
use conffu::config::ProcessEnvironment;
use conffu::logging::{self, LogTarget};
use tracing::debug;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let target: LogTarget = cli.log.parse()?;
    logging::init(&target, cli.verbose)?;
    debug!(command = ?cli.command, "starting");

    let output = match &cli.command {
        Command::Show(args) => run_show(args, &ProcessEnvironment)?,
        Command::Get(args) => run_get(args, &ProcessEnvironment)?,
        Command::Keys(args) => run_keys(args)?,
        Command::Convert(args) => run_convert(args)?,
    };
    println!("{}", output);
    Ok(())
}
