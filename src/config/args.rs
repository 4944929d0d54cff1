//! Command line tokenizing and the argument merge stage.
//!
//! Switches start with `-`, `--` or `/` and collect every following token
//! until the next switch. Tokens before the first switch, the program name
//! included, are collected under the empty key.

use super::coerce::{RawValue, coerce};
use super::key::CompoundKey;
use super::node::ConfigNode;
use crate::error::{ConfigError, ConfigResult};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::debug;

/// Switch name to the values that followed it.
pub type ArgumentMap = IndexMap<String, Vec<String>>;

/// Alternate switch name to canonical switch name.
pub type Aliases = HashMap<String, String>;

/// Switch naming the configuration file.
pub const CFG_KEY: &str = "cfg";

/// Switch naming the environment variable prefix.
pub const EVP_KEY: &str = "evp";

/// Aliases every parse applies before caller-supplied ones.
pub fn default_aliases() -> Aliases {
    [
        ("config", CFG_KEY),
        ("configuration", CFG_KEY),
        ("environment_variable_prefix", EVP_KEY),
        ("env_var_prefix", EVP_KEY),
    ]
    .into_iter()
    .map(|(alias, name)| (alias.to_string(), name.to_string()))
    .collect()
}

/// Tokenize command line arguments into an [`ArgumentMap`].
///
/// # Example
/// ```
/// use conffu::config::{Aliases, parse_argv};
///
/// let args = parse_argv(["prog.py", "file.txt", "-x", "y", "/z", "--help"], &Aliases::new()).unwrap();
/// assert_eq!(args[""], vec!["prog.py", "file.txt"]);
/// assert_eq!(args["x"], vec!["y"]);
/// assert!(args["z"].is_empty());
/// assert!(args["help"].is_empty());
/// ```
pub fn parse_argv<I, S>(args: I, aliases: &Aliases) -> ConfigResult<ArgumentMap>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result = ArgumentMap::new();
    let mut key = String::new();

    for arg in args {
        let arg = arg.as_ref();
        if arg.starts_with(['-', '/']) {
            if arg.len() == 1 {
                return Err(ConfigError::ArgumentSyntax {
                    token: arg.to_string(),
                });
            }
            let name = arg
                .strip_prefix("--")
                .unwrap_or(&arg[1..]);
            key = aliases.get(name).cloned().unwrap_or_else(|| name.to_string());
            // a switch without values still shows up
            result.entry(key.clone()).or_default();
        } else {
            result.entry(key.clone()).or_default().push(arg.to_string());
        }
    }

    Ok(result)
}

/// `{name}` addresses a global rather than a key.
pub(crate) fn global_name(key: &str) -> Option<&str> {
    key.strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

impl ConfigNode {
    /// Parse the process arguments into this node's argument map.
    pub fn parse_arguments(&mut self) -> ConfigResult<&mut Self> {
        self.parse_arguments_from(std::env::args(), &Aliases::new())
    }

    /// Parse `args`, merging the result into previously parsed arguments.
    ///
    /// The built-in aliases (`config`, `configuration` to `cfg`;
    /// `environment_variable_prefix`, `env_var_prefix` to `evp`) apply first,
    /// overridden by `aliases`.
    pub fn parse_arguments_from<I, S>(&mut self, args: I, aliases: &Aliases) -> ConfigResult<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut all_aliases = default_aliases();
        all_aliases.extend(aliases.iter().map(|(k, v)| (k.clone(), v.clone())));

        let parsed = parse_argv(args, &all_aliases)?;
        debug!(switches = parsed.len(), "parsed command line arguments");

        match self.provenance.arguments.as_mut() {
            Some(existing) => existing.extend(parsed),
            None => self.provenance.arguments = Some(parsed),
        }
        Ok(self)
    }

    /// Forget previously parsed arguments.
    pub fn clear_arguments(&mut self) {
        self.provenance.arguments = None;
    }

    /// Overlay parsed arguments onto the tree.
    ///
    /// Existing values keep their type; new keys are created as a string, a
    /// list or `true` and recorded in [`ConfigNode::from_arguments`]. The
    /// process arguments are parsed first if nothing was parsed yet.
    pub fn update_from_arguments(&mut self) -> ConfigResult<&mut Self> {
        if self.provenance.arguments.is_none() {
            self.parse_arguments()?;
        }
        let arguments = self.provenance.arguments.clone().unwrap_or_default();

        for (key, values) in &arguments {
            if key.is_empty() {
                // the first unnamed value is the program name
                self.provenance.parameters = values.iter().skip(1).cloned().collect();
                continue;
            }
            if key == CFG_KEY || key == EVP_KEY {
                continue;
            }

            let raw = RawValue::from_values(values);
            if let Some(name) = global_name(key) {
                self.overlay_global_argument(key, name, raw)?;
            } else {
                self.overlay_key_argument(key, raw)?;
            }
        }
        Ok(self)
    }

    fn overlay_key_argument(&mut self, key: &str, raw: RawValue) -> ConfigResult<()> {
        let key = if self.options().no_compound_keys {
            CompoundKey::literal(key)
        } else {
            CompoundKey::parse(key)
        };
        let segments = key.segments();

        if self.contains(&key) {
            let existing = self.lookup(segments)?.cloned();
            let value = coerce(raw, existing.as_ref())?;
            debug!(key = %key, "argument overrides existing value");
            self.set_segments(segments, value)
        } else {
            debug!(key = %key, "argument creates new key");
            self.set_segments(segments, raw.untyped())?;
            self.record_from_arguments(key.to_string());
            Ok(())
        }
    }

    fn overlay_global_argument(&mut self, key: &str, name: &str, raw: RawValue) -> ConfigResult<()> {
        let existing = self.globals().get(name);
        let created = existing.is_none();
        let value = coerce(raw, existing.as_ref())?;
        self.globals().insert(name, value);
        if created {
            debug!(global = name, "argument creates new global");
            self.record_from_arguments(key.to_string());
        }
        Ok(())
    }

    fn record_from_arguments(&mut self, key: String) {
        if !self.provenance.from_arguments.contains(&key) {
            self.provenance.from_arguments.push(key);
        }
    }
}
