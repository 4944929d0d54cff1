//! Convert subcommand
//!
//! Reads a configuration in one format and writes it in the format implied
//! by the output file's extension.

use crate::config::{ConfigNode, LoadOptions, SaveOptions};
use crate::error::ConfigResult;
use clap::Args;
use std::path::PathBuf;
use tracing::debug;

/// Arguments for the convert subcommand
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Source file (json, yaml/yml, or xml)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Destination file; its extension selects the output format
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Drop the `_globals` table from the output
    #[arg(long)]
    pub no_globals: bool,
}

pub fn run_convert(args: &ConvertArgs) -> ConfigResult<String> {
    let load = LoadOptions::new().with_file(&args.input).parse_args(false);
    let cfg = ConfigNode::load(&load)?;
    debug!(input = %args.input.display(), keys = cfg.len(), "converting configuration");

    let save = SaveOptions::new().include_globals(!args.no_globals);
    let written = cfg.save(Some(args.output.as_path()), &save)?;
    Ok(format!("wrote {}", written.display()))
}
