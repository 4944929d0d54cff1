//! `show`, `get` and `keys` subcommands.

use crate::config::{ConfigNode, EnvOptions, Environment, LoadOptions, SaveOptions, UpdateOptions};
use crate::error::{ConfigError, ConfigResult};
use crate::format::FileFormat;
use clap::Args;
use std::path::PathBuf;

/// Where the configuration comes from and what is merged over it.
#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Configuration file (optional; `-cfg` in the trailing tokens also works)
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Environment variable prefix
    #[arg(short, long, value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Tokens merged as command line arguments
    #[arg(last = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

impl SourceArgs {
    /// Load the file and run the full update against `env`.
    pub fn build(&self, env: &dyn Environment) -> ConfigResult<ConfigNode> {
        let mut tokens = vec![env!("CARGO_PKG_NAME").to_string()];
        tokens.extend(self.args.iter().cloned());

        let mut load = LoadOptions::new().with_args(tokens.clone()).require_file(false);
        if let Some(file) = &self.file {
            load = load.with_file(file);
        }
        let mut cfg = ConfigNode::load(&load)?;

        let mut env_options = EnvOptions::new();
        if let Some(prefix) = &self.prefix {
            env_options = env_options.with_prefix(prefix);
        }
        let update = UpdateOptions::new().with_args(tokens).with_env(env_options);
        cfg.full_update_with(env, &update)?;
        Ok(cfg)
    }
}

/// Arguments for the show subcommand
#[derive(Args, Debug)]
pub struct ShowArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Output format: json (default), yaml, or xml
    #[arg(short, long, default_value = "json", value_name = "FORMAT")]
    pub format: FileFormat,

    /// Print values as stored, with placeholders and the globals table
    #[arg(long)]
    pub raw: bool,
}

/// Arguments for the get subcommand
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Compound key, e.g. `db.host`
    pub key: String,

    #[command(flatten)]
    pub source: SourceArgs,
}

/// Arguments for the keys subcommand
#[derive(Args, Debug)]
pub struct KeysArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

pub fn run_show(args: &ShowArgs, env: &dyn Environment) -> ConfigResult<String> {
    let cfg = args.source.build(env)?;
    if args.raw {
        cfg.to_string_as(args.format, &SaveOptions::new())
    } else {
        cfg.subst_globals()
            .to_string_as(args.format, &SaveOptions::new().include_globals(false))
    }
}

pub fn run_get(args: &GetArgs, env: &dyn Environment) -> ConfigResult<String> {
    let cfg = args.source.build(env)?;
    match cfg.get(args.key.as_str())? {
        Some(value) => Ok(value.to_text()),
        None => Err(ConfigError::key_not_found(args.key.as_str())),
    }
}

pub fn run_keys(args: &KeysArgs) -> ConfigResult<String> {
    let load = LoadOptions::new().with_file(&args.file).parse_args(false);
    let cfg = ConfigNode::load(&load)?;
    let keys: Vec<String> = cfg.recursive_keys().into_keys().collect();
    Ok(keys.join("\n"))
}
