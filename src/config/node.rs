//! The hierarchical configuration container.
//!
//! A [`ConfigNode`] maps simple keys to [`Value`]s and is addressed with
//! [`CompoundKey`]s. Nested mappings are themselves nodes sharing the tree's
//! [`Globals`] and [`NodeOptions`]. Scalar and list reads pass through the
//! globals substitution; stored values are never rewritten.

use super::args::ArgumentMap;
use super::globals::Globals;
use super::key::CompoundKey;
use super::value::Value;
use crate::error::{ConfigError, ConfigResult};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::path::{Path, PathBuf};

/// Reserved key holding the globals table in the plain mapping form.
pub const GLOBALS_KEY: &str = "_globals";

/// Behaviour switches inherited by every node of a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeOptions {
    /// Absent keys read as `None` instead of failing with `KeyNotFound`.
    pub no_key_error: bool,
    /// Keys are single literal segments, dots included.
    pub no_compound_keys: bool,
    /// Keep `_globals` as an ordinary entry instead of extracting it.
    pub no_globals: bool,
}

impl NodeOptions {
    pub fn no_key_error(mut self, enabled: bool) -> Self {
        self.no_key_error = enabled;
        self
    }

    pub fn no_compound_keys(mut self, enabled: bool) -> Self {
        self.no_compound_keys = enabled;
        self
    }

    pub fn no_globals(mut self, enabled: bool) -> Self {
        self.no_globals = enabled;
        self
    }
}

/// Where the contents of a node came from.
#[derive(Debug, Clone, Default)]
pub(crate) struct Provenance {
    pub filename: Option<PathBuf>,
    pub arguments: Option<ArgumentMap>,
    pub parameters: Vec<String>,
    pub env_var_prefix: Option<String>,
    pub from_arguments: Vec<String>,
}

/// A mapping node of the configuration tree.
#[derive(Debug, Clone, Default)]
pub struct ConfigNode {
    entries: IndexMap<String, Value>,
    globals: Globals,
    options: NodeOptions,
    pub(crate) provenance: Provenance,
}

impl ConfigNode {
    /// Create an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: NodeOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Build a node from entries, extracting `_globals` unless disabled.
    pub fn from_entries(entries: IndexMap<String, Value>, options: NodeOptions) -> Self {
        let mut node = Self::with_options(options);
        let mut entries = entries;

        if !options.no_globals
            && matches!(entries.get(GLOBALS_KEY), Some(Value::Node(_)))
            && let Some(Value::Node(table)) = entries.shift_remove(GLOBALS_KEY)
        {
            node.globals = Globals::new(table.entries);
        }

        for (key, mut value) in entries {
            adopt(&mut value, &node.globals, options);
            node.entries.insert(key, value);
        }
        node
    }

    /// Wrap a JSON object; every nested object becomes a node.
    pub fn from_json(json: serde_json::Value) -> ConfigResult<Self> {
        Self::from_json_with(json, NodeOptions::default())
    }

    pub fn from_json_with(json: serde_json::Value, options: NodeOptions) -> ConfigResult<Self> {
        match json {
            serde_json::Value::Object(map) => {
                let entries = map
                    .into_iter()
                    .map(|(key, value)| json_to_value(value).map(|value| (key, value)))
                    .collect::<ConfigResult<_>>()?;
                Ok(Self::from_entries(entries, options))
            }
            // An empty document reads as an empty configuration
            serde_json::Value::Null => Ok(Self::with_options(options)),
            other => Err(ConfigError::InvalidSource(format!(
                "expected a mapping at the top level, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// A fresh empty child sharing this node's globals and options.
    pub fn child(&self) -> Self {
        Self {
            entries: IndexMap::new(),
            globals: self.globals.clone(),
            options: self.options,
            provenance: Provenance::default(),
        }
    }

    pub fn options(&self) -> NodeOptions {
        self.options
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Set a global on the tree's shared table.
    pub fn set_global(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.insert(name, value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Direct entries without substitution.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub(crate) fn resolve_key(&self, key: impl Into<CompoundKey>) -> CompoundKey {
        let key = key.into();
        if self.options.no_compound_keys {
            key.flattened()
        } else {
            key
        }
    }

    /// Whether the compound key addresses a value in this node or its children.
    pub fn contains(&self, key: impl Into<CompoundKey>) -> bool {
        let key = self.resolve_key(key);
        self.contains_segments(key.segments())
    }

    pub(crate) fn contains_segments(&self, segments: &[String]) -> bool {
        let Some((first, rest)) = segments.split_first() else {
            return false;
        };
        match self.entries.get(first) {
            None => false,
            Some(_) if rest.is_empty() => true,
            Some(Value::Node(child)) => child.contains_segments(rest),
            Some(_) => false,
        }
    }

    pub(crate) fn lookup(&self, segments: &[String]) -> ConfigResult<Option<&Value>> {
        let Some((first, rest)) = segments.split_first() else {
            return self.missing("");
        };
        match self.entries.get(first) {
            None => self.missing(first),
            Some(value) if rest.is_empty() => Ok(Some(value)),
            Some(Value::Node(child)) => child.lookup(rest),
            Some(_) => self.mismatch(first),
        }
    }

    fn lookup_mut(&mut self, segments: &[String]) -> ConfigResult<Option<&mut Value>> {
        let options = self.options;
        let Some((first, rest)) = segments.split_first() else {
            return missing(options, "");
        };
        match self.entries.get_mut(first) {
            None => missing(options, first),
            Some(value) if rest.is_empty() => Ok(Some(value)),
            Some(Value::Node(child)) => child.lookup_mut(rest),
            Some(_) => mismatch(options, first),
        }
    }

    fn missing<T>(&self, key: &str) -> ConfigResult<Option<T>> {
        missing(self.options, key)
    }

    fn mismatch<T>(&self, key: &str) -> ConfigResult<Option<T>> {
        mismatch(self.options, key)
    }

    /// Read a value with globals substituted.
    ///
    /// A nested node is returned as a deep copy sharing this tree's globals;
    /// use [`ConfigNode::node`] or [`ConfigNode::node_mut`] to borrow it
    /// instead. `Ok(None)` only occurs when `no_key_error` is set.
    pub fn get(&self, key: impl Into<CompoundKey>) -> ConfigResult<Option<Value>> {
        let key = self.resolve_key(key);
        Ok(self.lookup(key.segments())?.map(|value| match value {
            Value::Node(node) => Value::Node(node.clone()),
            other => self.globals.substitute(other),
        }))
    }

    /// Read a value as stored, without substitution.
    pub fn get_raw(&self, key: impl Into<CompoundKey>) -> ConfigResult<Option<&Value>> {
        let key = self.resolve_key(key);
        self.lookup(key.segments())
    }

    /// Borrow the nested node at `key`.
    pub fn node(&self, key: impl Into<CompoundKey>) -> ConfigResult<Option<&ConfigNode>> {
        let key = self.resolve_key(key);
        match self.lookup(key.segments())? {
            None => Ok(None),
            Some(Value::Node(node)) => Ok(Some(node)),
            Some(_) => self.mismatch(&key.to_string()),
        }
    }

    pub fn node_mut(&mut self, key: impl Into<CompoundKey>) -> ConfigResult<Option<&mut ConfigNode>> {
        let key = self.resolve_key(key);
        let options = self.options;
        match self.lookup_mut(key.segments())? {
            None => Ok(None),
            Some(Value::Node(node)) => Ok(Some(node)),
            Some(_) => mismatch(options, &key.to_string()),
        }
    }

    /// Set a value, creating intermediate nodes as needed.
    pub fn set(&mut self, key: impl Into<CompoundKey>, value: impl Into<Value>) -> ConfigResult<()> {
        let key = self.resolve_key(key);
        self.set_segments(key.segments(), value.into())
    }

    pub(crate) fn set_segments(&mut self, segments: &[String], value: Value) -> ConfigResult<()> {
        let Some((last, parents)) = segments.split_last() else {
            return Err(ConfigError::key_not_found(""));
        };

        let mut node: &mut ConfigNode = self;
        for segment in parents {
            let fresh = node.child();
            node = match node
                .entries
                .entry(segment.clone())
                .or_insert_with(|| Value::Node(fresh))
            {
                Value::Node(child) => child,
                _ => return Err(ConfigError::key_mismatch(segment.as_str())),
            };
        }

        let mut value = value;
        adopt(&mut value, &node.globals, node.options);
        node.entries.insert(last.clone(), value);
        Ok(())
    }

    /// Remove and return the value at `key`.
    pub fn remove(&mut self, key: impl Into<CompoundKey>) -> ConfigResult<Option<Value>> {
        let key = self.resolve_key(key);
        let Some((last, parents)) = key.segments().split_last() else {
            return Ok(None);
        };
        if parents.is_empty() {
            return Ok(self.entries.shift_remove(last));
        }
        let options = self.options;
        match self.lookup_mut(parents)? {
            None => Ok(None),
            Some(Value::Node(parent)) => Ok(parent.entries.shift_remove(last)),
            Some(_) => mismatch(options, &parents.join(".")),
        }
    }

    /// Every reachable key, as its dotted form mapped to its segments.
    ///
    /// Intermediate nodes are listed before their children.
    pub fn recursive_keys(&self) -> IndexMap<String, Vec<String>> {
        let mut keys = IndexMap::new();
        for (key, value) in &self.entries {
            keys.insert(key.clone(), vec![key.clone()]);
            if let Value::Node(child) = value {
                for (child_key, child_path) in child.recursive_keys() {
                    let mut path = Vec::with_capacity(child_path.len() + 1);
                    path.push(key.clone());
                    path.extend(child_path);
                    keys.insert(format!("{}.{}", key, child_key), path);
                }
            }
        }
        keys
    }

    /// Plain JSON mapping of the tree, optionally with `_globals` first.
    pub fn dict_copy(&self, with_globals: bool) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        if with_globals && !self.globals.is_empty() {
            map.insert(
                GLOBALS_KEY.to_string(),
                serde_json::Value::Object(self.globals_to_json()),
            );
        }
        map.extend(self.entries_to_json());
        serde_json::Value::Object(map)
    }

    pub(crate) fn entries_to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.entries
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect()
    }

    pub(crate) fn globals_to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.globals
            .snapshot()
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect()
    }

    /// Deep copy with every placeholder resolved.
    ///
    /// The copy owns a detached copy of the globals table.
    pub fn subst_globals(&self) -> ConfigNode {
        let mut resolved = self.map_values(&|value| self.globals.substitute(value));
        let detached = self.globals.detached();
        resolved.globals = detached.clone();
        for value in resolved.entries.values_mut() {
            adopt(value, &detached, resolved.options);
        }
        resolved
    }

    /// Shallow map over entries, keeping keys, globals and options.
    pub(crate) fn map_values(&self, f: &dyn Fn(&Value) -> Value) -> ConfigNode {
        ConfigNode {
            entries: self
                .entries
                .iter()
                .map(|(key, value)| (key.clone(), f(value)))
                .collect(),
            globals: self.globals.clone(),
            options: self.options,
            provenance: self.provenance.clone(),
        }
    }

    // Provenance

    pub fn filename(&self) -> Option<&Path> {
        self.provenance.filename.as_deref()
    }

    pub fn set_filename(&mut self, filename: Option<PathBuf>) {
        self.provenance.filename = filename;
    }

    /// Arguments from the last parse, if any.
    pub fn arguments(&self) -> Option<&ArgumentMap> {
        self.provenance.arguments.as_ref()
    }

    /// Positional command line tokens after the program name.
    pub fn parameters(&self) -> &[String] {
        &self.provenance.parameters
    }

    pub fn env_var_prefix(&self) -> Option<&str> {
        self.provenance.env_var_prefix.as_deref()
    }

    /// Keys that did not exist before an argument merge created them.
    pub fn from_arguments(&self) -> &[String] {
        &self.provenance.from_arguments
    }
}

impl PartialEq for ConfigNode {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Serialize for ConfigNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl TryFrom<serde_json::Value> for ConfigNode {
    type Error = ConfigError;

    fn try_from(json: serde_json::Value) -> ConfigResult<Self> {
        Self::from_json(json)
    }
}

fn missing<T>(options: NodeOptions, key: &str) -> ConfigResult<Option<T>> {
    if options.no_key_error {
        Ok(None)
    } else {
        Err(ConfigError::key_not_found(key))
    }
}

fn mismatch<T>(options: NodeOptions, key: &str) -> ConfigResult<Option<T>> {
    if options.no_key_error {
        Ok(None)
    } else {
        Err(ConfigError::key_mismatch(key))
    }
}

/// Bind nested nodes of `value` to a tree's globals and options.
fn adopt(value: &mut Value, globals: &Globals, options: NodeOptions) {
    match value {
        Value::Node(node) => {
            node.globals = globals.clone();
            node.options = options;
            for child in node.entries.values_mut() {
                adopt(child, globals, options);
            }
        }
        Value::List(items) => {
            for item in items {
                adopt(item, globals, options);
            }
        }
        _ => {}
    }
}

/// Integers outside the `i64` range are rejected rather than rounded.
pub(crate) fn json_to_value(json: serde_json::Value) -> ConfigResult<Value> {
    let value = match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None if n.is_u64() => {
                return Err(ConfigError::InvalidSource(format!(
                    "integer {} does not fit in 64 signed bits",
                    n
                )));
            }
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(json_to_value)
                .collect::<ConfigResult<_>>()?,
        ),
        serde_json::Value::Object(map) => {
            let mut node = ConfigNode::new();
            for (key, value) in map {
                node.entries.insert(key, json_to_value(value)?);
            }
            Value::Node(node)
        }
    };
    Ok(value)
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "a mapping",
    }
}
