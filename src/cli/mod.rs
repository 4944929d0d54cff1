//! CLI command definitions for the `conffu` inspection tool.
//!
//! Configuration tokens for the library's own argument merge are passed after
//! `--`, so they never collide with the tool's flags.

pub mod convert;
pub mod inspect;

use clap::{Parser, Subcommand};
use convert::ConvertArgs;
use inspect::{GetArgs, KeysArgs, ShowArgs};

/// Inspect and convert conffu configuration files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the merged configuration
    Show(ShowArgs),

    /// Print one value by compound key
    Get(GetArgs),

    /// List every compound key in a file
    Keys(KeysArgs),

    /// Re-encode a configuration file in another format
    Convert(ConvertArgs),
}
