//! Shared globals table and `{name}` placeholder substitution.
//!
//! Every node of one tree holds a clone of the same [`Globals`] handle, so a
//! global added anywhere is visible from every node. Substitution is lazy and
//! best-effort: stored values are never rewritten and a placeholder without a
//! matching global is left as `{name}`.

use super::value::Value;
use arc_swap::ArcSwap;
use indexmap::IndexMap;
use regex_lite::{Captures, Regex};
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Flat name to value table used for template substitution.
pub type GlobalsMap = IndexMap<String, Value>;

/// Shared handle to a tree's globals table.
#[derive(Clone)]
pub struct Globals(Arc<ArcSwap<GlobalsMap>>);

impl Globals {
    pub fn new(map: GlobalsMap) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(map)))
    }

    /// Current contents of the table.
    pub fn snapshot(&self) -> Arc<GlobalsMap> {
        self.0.load_full()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.load().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.load().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.0.load().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.load().is_empty()
    }

    /// Insert or replace a global; visible through every handle.
    pub fn insert(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.0.rcu(|current| {
            let mut next = GlobalsMap::clone(current);
            next.insert(name.clone(), value.clone());
            next
        });
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        let previous = self.get(name)?;
        self.0.rcu(|current| {
            let mut next = GlobalsMap::clone(current);
            next.shift_remove(name);
            next
        });
        Some(previous)
    }

    /// A new, independent table with the same contents.
    pub fn detached(&self) -> Self {
        Self::new(GlobalsMap::clone(&self.snapshot()))
    }

    /// Whether two handles share the same table.
    pub fn ptr_eq(&self, other: &Globals) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Replace `{name}` placeholders in `text`.
    pub fn format(&self, text: &str) -> String {
        let table = self.0.load();
        substitute_str(text, &table)
    }

    /// Substitute recursively through lists and nodes; keys are untouched.
    pub fn substitute(&self, value: &Value) -> Value {
        let table = self.0.load();
        substitute_value(value, &table)
    }
}

impl Default for Globals {
    fn default() -> Self {
        Self::new(GlobalsMap::new())
    }
}

impl fmt::Debug for Globals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.load().iter()).finish()
    }
}

fn substitute_value(value: &Value, table: &GlobalsMap) -> Value {
    match value {
        Value::Str(s) => Value::Str(substitute_str(s, table)),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| substitute_value(item, table))
                .collect(),
        ),
        Value::Node(node) => Value::Node(node.map_values(&|v| substitute_value(v, table))),
        other => other.clone(),
    }
}

/// `{name}` with no nested braces; `{{x}` matches only its inner `{x}`.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([^{}]*)\}").expect("placeholder pattern is valid")
});

fn substitute_str(text: &str, table: &GlobalsMap) -> String {
    if table.is_empty() || !text.contains('{') {
        return text.to_string();
    }
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| match table.get(&caps[1]) {
            Some(value) => value.to_text(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
