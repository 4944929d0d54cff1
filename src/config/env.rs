//! Environment variable overlay.
//!
//! Without a prefix, only variables named exactly like an existing compound
//! key (or `{name}` for an existing global) are applied. With a prefix, every
//! variable starting with it is applied: `PREFIX{name}` sets a global,
//! `PREFIXkey.path` overlays an existing key or creates a new top-level key.
//!
//! Name matching is case-insensitive only where the [`Environment`] says the
//! platform's environment is.

use super::args::{EVP_KEY, global_name};
use super::coerce::{RawValue, coerce};
use super::node::ConfigNode;
use super::value::Value;
use crate::error::ConfigResult;
use indexmap::IndexMap;
use tracing::debug;

/// Read access to a set of environment variables.
pub trait Environment {
    /// Look up one variable.
    fn var(&self, name: &str) -> Option<String>;

    /// Every variable, names in their original case.
    fn vars(&self) -> Vec<(String, String)>;

    /// Whether variable names compare case-insensitively.
    fn case_insensitive(&self) -> bool;
}

/// The environment of the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        std::env::vars_os()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }

    fn case_insensitive(&self) -> bool {
        cfg!(windows)
    }
}

/// A fixed set of variables, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapEnvironment {
    vars: IndexMap<String, String>,
    case_insensitive: bool,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare names the way a case-insensitive platform does.
    pub fn case_insensitive(mut self, enabled: bool) -> Self {
        self.case_insensitive = enabled;
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnvironment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            case_insensitive: false,
        }
    }
}

impl Environment for MapEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        if self.case_insensitive {
            self.vars
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        } else {
            self.vars.get(name).cloned()
        }
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

/// Settings for [`ConfigNode::update_from_environment`].
#[derive(Debug, Clone, Default)]
pub struct EnvOptions {
    /// Explicit prefix; falls back to the `evp` argument, then the prefix
    /// of the previous environment merge.
    pub prefix: Option<String>,
    /// Only consider these names (after the prefix) instead of scanning.
    pub env_vars: Option<Vec<String>>,
    /// Never apply these names.
    pub exclude_vars: Vec<String>,
}

impl EnvOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_vars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_vars = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn excluding<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_vars.extend(names.into_iter().map(Into::into));
        self
    }
}

/// What an overlay writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Key(Vec<String>),
    Global { name: String, create: bool },
}

#[derive(Debug, Clone)]
struct Overlay {
    target: Target,
    value: String,
    source: String,
}

fn names_match(a: &str, b: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

fn strip_prefix_matching<'a>(name: &'a str, prefix: &str, case_insensitive: bool) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    if names_match(head, prefix, case_insensitive) {
        name.get(prefix.len()..)
    } else {
        None
    }
}

impl ConfigNode {
    /// Overlay variables from the process environment.
    pub fn update_from_environment(&mut self, options: &EnvOptions) -> ConfigResult<&mut Self> {
        self.update_from_environment_with(&ProcessEnvironment, options)
    }

    /// Overlay variables from `env`.
    ///
    /// Existing values keep their type; see the module docs for matching.
    pub fn update_from_environment_with(
        &mut self,
        env: &dyn Environment,
        options: &EnvOptions,
    ) -> ConfigResult<&mut Self> {
        let prefix = self.resolve_prefix(options);
        let overlays = if prefix.is_empty() {
            self.unprefixed_overlays(env, options)
        } else {
            self.prefixed_overlays(env, options, &prefix)
        };
        debug!(prefix = %prefix, overlays = overlays.len(), "applying environment");

        for overlay in overlays {
            self.apply_overlay(overlay)?;
        }
        self.provenance.env_var_prefix = Some(prefix);
        Ok(self)
    }

    fn resolve_prefix(&self, options: &EnvOptions) -> String {
        options
            .prefix
            .clone()
            .or_else(|| {
                self.arguments()
                    .and_then(|args| args.get(EVP_KEY))
                    .and_then(|values| values.first().cloned())
            })
            .or_else(|| self.provenance.env_var_prefix.clone())
            .unwrap_or_default()
    }

    fn is_excluded(&self, names: &[&str], options: &EnvOptions, case_insensitive: bool) -> bool {
        options.exclude_vars.iter().any(|excluded| {
            names
                .iter()
                .any(|name| names_match(excluded, name, case_insensitive))
        })
    }

    fn unprefixed_overlays(&self, env: &dyn Environment, options: &EnvOptions) -> Vec<Overlay> {
        let ci = env.case_insensitive();
        let mut overlays = Vec::new();

        let known = self.recursive_keys();
        let key_target = |name: &str| match known.get(name) {
            Some(path) => Target::Key(path.clone()),
            None => Target::Key(self.key_segments(name)),
        };
        // plain-name matching never creates globals
        let global_target = |name: &str| Target::Global {
            name: name.to_string(),
            create: false,
        };

        let candidates: Vec<(String, Target)> = match &options.env_vars {
            Some(names) => names
                .iter()
                .map(|name| match global_name(name) {
                    Some(global) => (name.clone(), global_target(global)),
                    None => (name.clone(), key_target(name)),
                })
                .collect(),
            None => {
                // leaf keys keep their stored segments, so a literal dot stays one key
                let mut names: Vec<(String, Target)> = known
                    .iter()
                    .filter(|(_, path)| {
                        !matches!(self.lookup(path), Ok(Some(Value::Node(_))))
                    })
                    .map(|(key, path)| (key.clone(), Target::Key(path.clone())))
                    .collect();
                names.extend(
                    self.globals()
                        .names()
                        .into_iter()
                        .map(|g| (format!("{{{}}}", g), global_target(&g))),
                );
                names
            }
        };

        for (name, target) in candidates {
            if self.is_excluded(&[&name], options, ci) {
                continue;
            }
            let Some(value) = env.var(&name) else {
                continue;
            };
            overlays.push(Overlay {
                target,
                value,
                source: name,
            });
        }
        overlays
    }

    fn prefixed_overlays(&self, env: &dyn Environment, options: &EnvOptions, prefix: &str) -> Vec<Overlay> {
        let ci = env.case_insensitive();
        let mut overlays = Vec::new();

        let candidates: Vec<(String, String, String)> = match &options.env_vars {
            Some(names) => names
                .iter()
                .filter_map(|rest| {
                    let name = format!("{}{}", prefix, rest);
                    env.var(&name).map(|value| (name, rest.clone(), value))
                })
                .collect(),
            None => env
                .vars()
                .into_iter()
                .filter_map(|(name, value)| {
                    let rest = strip_prefix_matching(&name, prefix, ci)?.to_string();
                    Some((name, rest, value))
                })
                .collect(),
        };

        let known = self.recursive_keys();
        for (name, rest, value) in candidates {
            if rest.is_empty() || self.is_excluded(&[&name, &rest], options, ci) {
                continue;
            }
            let target = if let Some(global) = global_name(&rest) {
                Target::Global {
                    name: global.to_string(),
                    create: true,
                }
            } else if let Some((_, path)) = known
                .iter()
                .find(|(key, _)| names_match(key, &rest, ci))
            {
                Target::Key(path.clone())
            } else {
                Target::Key(vec![rest.clone()])
            };
            overlays.push(Overlay {
                target,
                value,
                source: name,
            });
        }
        overlays
    }

    fn key_segments(&self, key: &str) -> Vec<String> {
        if self.options().no_compound_keys {
            vec![key.to_string()]
        } else {
            super::key::split_key(key)
        }
    }

    fn apply_overlay(&mut self, overlay: Overlay) -> ConfigResult<()> {
        let raw = RawValue::Text(overlay.value);
        match overlay.target {
            Target::Key(path) => {
                let existing = if self.contains_segments(&path) {
                    self.lookup(&path)?.cloned()
                } else {
                    None
                };
                let value = coerce(raw, existing.as_ref())?;
                debug!(key = %path.join("."), source = %overlay.source, "environment overlay");
                self.set_segments(&path, value)
            }
            Target::Global { name, create } => {
                let existing = self.globals().get(&name);
                if existing.is_none() && !create {
                    debug!(global = %name, "skipping environment value for undefined global");
                    return Ok(());
                }
                let value = coerce(raw, existing.as_ref())?;
                debug!(global = %name, source = %overlay.source, "environment global");
                self.globals().insert(name, value);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompoundKey;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn config() -> ConfigNode {
        ConfigNode::from_json(json!({
            "_globals": {"root": "/opt"},
            "x": "a",
            "y": 5.0,
            "debug": false,
            "db": {"host": "db.local", "port": 5432},
            "dir": "{root}/data"
        }))
        .unwrap()
    }

    #[test]
    fn test_prefixed_sets_nested_key_only() {
        let mut cfg = config();
        let env = MapEnvironment::new()
            .with_var("APP_db.host", "localhost")
            .with_var("OTHER_db.host", "elsewhere");
        cfg.update_from_environment_with(&env, &EnvOptions::new().with_prefix("APP_"))
            .unwrap();
        assert_eq!(cfg.get("db.host").unwrap(), Some(Value::from("localhost")));
        assert_eq!(cfg.get("db.port").unwrap(), Some(Value::Int(5432)));
        assert_eq!(cfg.env_var_prefix(), Some("APP_"));
    }

    #[test]
    fn test_prefixed_coerces_and_creates() {
        let mut cfg = config();
        let env = MapEnvironment::new()
            .with_var("ec_y", "10.0")
            .with_var("ec_debug", "1")
            .with_var("ec_db.port", "6000")
            .with_var("ec_new", "fresh");
        cfg.update_from_environment_with(&env, &EnvOptions::new().with_prefix("ec_"))
            .unwrap();
        assert_eq!(cfg.get("y").unwrap(), Some(Value::Float(10.0)));
        assert_eq!(cfg.get("debug").unwrap(), Some(Value::Bool(true)));
        assert_eq!(cfg.get("db.port").unwrap(), Some(Value::Int(6000)));
        assert_eq!(cfg.get("new").unwrap(), Some(Value::from("fresh")));
        // environment-created keys are not argument provenance
        assert!(cfg.from_arguments().is_empty());
    }

    #[test]
    fn test_prefixed_new_compound_name_is_single_key() {
        let mut cfg = config();
        let env = MapEnvironment::new().with_var("ec_a.b", "1");
        cfg.update_from_environment_with(&env, &EnvOptions::new().with_prefix("ec_"))
            .unwrap();
        assert_eq!(
            cfg.get_raw(CompoundKey::literal("a.b")).unwrap(),
            Some(&Value::from("1"))
        );
        assert!(!cfg.contains("a"));
    }

    #[test]
    fn test_prefixed_braces_create_global() {
        let mut cfg = config();
        let env = MapEnvironment::new()
            .with_var("ec_{root}", "/tmp")
            .with_var("ec_{other}", "o");
        cfg.update_from_environment_with(&env, &EnvOptions::new().with_prefix("ec_"))
            .unwrap();
        assert_eq!(cfg.get("dir").unwrap(), Some(Value::from("/tmp/data")));
        assert_eq!(cfg.globals().get("other"), Some(Value::from("o")));
    }

    #[test]
    fn test_unprefixed_matches_existing_keys_only() {
        let mut cfg = config();
        let env = MapEnvironment::new()
            .with_var("y", "7")
            .with_var("db.host", "h")
            .with_var("unrelated", "u")
            .with_var("db", "not a node");
        cfg.update_from_environment_with(&env, &EnvOptions::new())
            .unwrap();
        assert_eq!(cfg.get("y").unwrap(), Some(Value::Float(7.0)));
        assert_eq!(cfg.get("db.host").unwrap(), Some(Value::from("h")));
        assert!(!cfg.contains("unrelated"));
        assert!(cfg.node("db").unwrap().is_some());
    }

    #[test]
    fn test_unprefixed_globals_need_prior_value() {
        let mut cfg = config();
        let env = MapEnvironment::new().with_var("{root}", "/env");
        cfg.update_from_environment_with(&env, &EnvOptions::new())
            .unwrap();
        assert_eq!(cfg.get("dir").unwrap(), Some(Value::from("/env/data")));

        let mut cfg = config();
        let env = MapEnvironment::new().with_var("{missing}", "m");
        cfg.update_from_environment_with(&env, &EnvOptions::new().with_vars(["{missing}"]))
            .unwrap();
        assert!(!cfg.globals().contains("missing"));
    }

    #[test]
    fn test_exclude_and_explicit_vars() {
        let mut cfg = config();
        let env = MapEnvironment::new().with_var("x", "X").with_var("y", "2");
        cfg.update_from_environment_with(&env, &EnvOptions::new().excluding(["x"]))
            .unwrap();
        assert_eq!(cfg.get("x").unwrap(), Some(Value::from("a")));
        assert_eq!(cfg.get("y").unwrap(), Some(Value::Float(2.0)));

        let mut cfg = config();
        cfg.update_from_environment_with(&env, &EnvOptions::new().with_vars(["x"]))
            .unwrap();
        assert_eq!(cfg.get("x").unwrap(), Some(Value::from("X")));
        assert_eq!(cfg.get("y").unwrap(), Some(Value::Float(5.0)));
    }

    #[test]
    fn test_prefix_from_arguments_and_previous_merge() {
        let mut cfg = config();
        cfg.parse_arguments_from(["p", "-evp", "ec_"], &Default::default())
            .unwrap();
        let env = MapEnvironment::new().with_var("ec_x", "from-env");
        cfg.update_from_environment_with(&env, &EnvOptions::new())
            .unwrap();
        assert_eq!(cfg.get("x").unwrap(), Some(Value::from("from-env")));

        cfg.clear_arguments();
        let env = MapEnvironment::new().with_var("ec_x", "again");
        cfg.update_from_environment_with(&env, &EnvOptions::new())
            .unwrap();
        assert_eq!(cfg.get("x").unwrap(), Some(Value::from("again")));
    }

    #[test]
    fn test_case_sensitivity_follows_environment() {
        let env = MapEnvironment::new().with_var("APP_DB.HOST", "upper");

        let mut cfg = config();
        cfg.update_from_environment_with(&env, &EnvOptions::new().with_prefix("app_"))
            .unwrap();
        assert_eq!(cfg.get("db.host").unwrap(), Some(Value::from("db.local")));

        let mut cfg = config();
        let ci_env = env.clone().case_insensitive(true);
        cfg.update_from_environment_with(&ci_env, &EnvOptions::new().with_prefix("app_"))
            .unwrap();
        assert_eq!(cfg.get("db.host").unwrap(), Some(Value::from("upper")));
    }

    #[test]
    fn test_case_insensitive_exclusion() {
        let env = MapEnvironment::new()
            .with_var("APP_X", "blocked")
            .case_insensitive(true);
        let mut cfg = config();
        cfg.update_from_environment_with(
            &env,
            &EnvOptions::new().with_prefix("APP_").excluding(["app_x"]),
        )
        .unwrap();
        assert_eq!(cfg.get("x").unwrap(), Some(Value::from("a")));
    }

    #[test]
    fn test_prefixed_explicit_vars() {
        let mut cfg = config();
        let env = MapEnvironment::new()
            .with_var("ec_x", "listed")
            .with_var("ec_debug", "1")
            .with_var("x", "bare");
        cfg.update_from_environment_with(&env, &EnvOptions::new().with_prefix("ec_").with_vars(["x"]))
            .unwrap();
        assert_eq!(cfg.get("x").unwrap(), Some(Value::from("listed")));
        assert_eq!(cfg.get("debug").unwrap(), Some(Value::Bool(false)));
    }

    #[test]
    fn test_prefixed_intermediate_node_is_coercion_error() {
        let mut cfg = config();
        let env = MapEnvironment::new().with_var("APP_db", "flat");
        let err = cfg
            .update_from_environment_with(&env, &EnvOptions::new().with_prefix("APP_"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Coercion);
        assert_eq!(cfg.get("db.port").unwrap(), Some(Value::Int(5432)));
    }

    #[test]
    fn test_unprefixed_literal_dot_key() {
        let mut cfg = ConfigNode::from_json(json!({"file.txt": 1})).unwrap();
        let env = MapEnvironment::new().with_var("file.txt", "2");
        cfg.update_from_environment_with(&env, &EnvOptions::new())
            .unwrap();
        assert_eq!(cfg.get_raw(CompoundKey::literal("file.txt")).unwrap(), Some(&Value::Int(2)));
        assert!(!cfg.contains("file"));
        assert_eq!(cfg.len(), 1);
    }

    #[test]
    fn test_unprefixed_escaped_dot_key() {
        let mut cfg = config();
        cfg.set(r"host\.name", "h").unwrap();
        cfg.set("db.a.b", "nested").unwrap();
        let env = MapEnvironment::new()
            .with_var(r"host\.name", "renamed")
            .with_var("db.a.b", "deep");
        cfg.update_from_environment_with(&env, &EnvOptions::new())
            .unwrap();
        assert_eq!(
            cfg.get_raw(CompoundKey::literal(r"host\.name")).unwrap(),
            Some(&Value::from("renamed"))
        );
        assert!(!cfg.contains("host"));
        assert_eq!(cfg.get("db.a.b").unwrap(), Some(Value::from("deep")));
    }

    #[test]
    fn test_coercion_error_surfaces() {
        let mut cfg = config();
        let env = MapEnvironment::new().with_var("db.port", "many");
        let err = cfg
            .update_from_environment_with(&env, &EnvOptions::new())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Coercion);
    }
}
