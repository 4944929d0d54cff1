//! The three-stage source merge.
//!
//! Arguments are parsed first so the environment stage can see `-evp`, the
//! environment is overlaid next, and explicit arguments are overlaid last so
//! they win over environment values for the same key.

use super::args::Aliases;
use super::env::{EnvOptions, Environment, ProcessEnvironment};
use super::node::ConfigNode;
use crate::error::ConfigResult;
use tracing::info;

/// Settings for [`ConfigNode::full_update`].
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Tokens to parse; the process arguments when `None`.
    pub args: Option<Vec<String>>,
    pub aliases: Aliases,
    pub env: EnvOptions,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>, name: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), name.into());
        self
    }

    pub fn with_env(mut self, env: EnvOptions) -> Self {
        self.env = env;
        self
    }
}

impl ConfigNode {
    /// Parse arguments, overlay the process environment, then overlay arguments.
    pub fn full_update(&mut self, options: &UpdateOptions) -> ConfigResult<&mut Self> {
        self.full_update_with(&ProcessEnvironment, options)
    }

    pub fn full_update_with(
        &mut self,
        env: &dyn Environment,
        options: &UpdateOptions,
    ) -> ConfigResult<&mut Self> {
        match &options.args {
            Some(args) => self.parse_arguments_from(args, &options.aliases)?,
            None => self.parse_arguments_from(std::env::args(), &options.aliases)?,
        };
        self.update_from_environment_with(env, &options.env)?;
        self.update_from_arguments()?;

        info!(
            keys = self.len(),
            created = self.from_arguments().len(),
            "configuration updated from environment and arguments"
        );
        Ok(self)
    }
}
