//! Loading configurations from files and writing them back.
//!
//! A file given with the `-cfg` switch overrides the one passed in
//! [`LoadOptions`]. The format is taken from the options or detected from
//! the file extension.

use super::args::{Aliases, CFG_KEY, default_aliases, global_name, parse_argv};
use super::key::CompoundKey;
use super::node::{ConfigNode, NodeOptions};
use super::value::Value;
use super::xml;
use crate::error::{ConfigError, ConfigResult};
use crate::format::FileFormat;
use serde_json::{Map, Value as Json};
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Settings for [`ConfigNode::load`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub file: Option<PathBuf>,
    /// Overrides detection from the extension.
    pub format: Option<FileFormat>,
    /// Parse arguments and store them on the loaded node.
    pub parse_args: bool,
    /// Tokens to parse; the process arguments when `None`.
    pub args: Option<Vec<String>>,
    pub aliases: Aliases,
    /// Fail with [`ConfigError::MissingSource`] when no file is named.
    pub require_file: bool,
    pub node: NodeOptions,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            file: None,
            format: None,
            parse_args: true,
            args: None,
            aliases: Aliases::new(),
            require_file: true,
            node: NodeOptions::default(),
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn parse_args(mut self, enabled: bool) -> Self {
        self.parse_args = enabled;
        self
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

    pub fn require_file(mut self, required: bool) -> Self {
        self.require_file = required;
        self
    }

    pub fn with_node_options(mut self, node: NodeOptions) -> Self {
        self.node = node;
        self
    }
}

/// Settings for [`ConfigNode::save`] and [`ConfigNode::to_string_as`].
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Overrides detection from the extension.
    pub format: Option<FileFormat>,
    /// Write the globals table under `_globals`.
    pub include_globals: bool,
    /// Keep keys and globals that an argument merge created.
    pub include_from_arguments: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            format: None,
            include_globals: true,
            include_from_arguments: true,
        }
    }
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn include_globals(mut self, enabled: bool) -> Self {
        self.include_globals = enabled;
        self
    }

    pub fn include_from_arguments(mut self, enabled: bool) -> Self {
        self.include_from_arguments = enabled;
        self
    }
}

impl ConfigNode {
    /// Load a configuration, honoring a `-cfg` argument.
    pub fn load(options: &LoadOptions) -> ConfigResult<Self> {
        let arguments = if options.parse_args {
            let mut aliases = default_aliases();
            aliases.extend(options.aliases.clone());
            let parsed = match &options.args {
                Some(args) => parse_argv(args, &aliases)?,
                None => parse_argv(std::env::args(), &aliases)?,
            };
            Some(parsed)
        } else {
            None
        };

        let from_args = arguments
            .as_ref()
            .and_then(|args| args.get(CFG_KEY))
            .and_then(|values| values.first())
            .map(PathBuf::from);
        if let Some(path) = &from_args {
            debug!(path = %path.display(), "configuration file named on the command line");
        }

        let mut cfg = match from_args.or_else(|| options.file.clone()) {
            Some(path) => Self::from_path(&path, options.format, options.node)?,
            None if options.require_file => return Err(ConfigError::MissingSource),
            None => Self::with_options(options.node),
        };
        cfg.provenance.arguments = arguments;
        Ok(cfg)
    }

    /// Read a file, detecting the format from its extension unless given.
    pub fn from_path(
        path: &Path,
        format: Option<FileFormat>,
        options: NodeOptions,
    ) -> ConfigResult<Self> {
        if !path.is_file() {
            return Err(ConfigError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        let format = match format {
            Some(format) => format,
            None => FileFormat::from_path(path)?,
        };

        let text = std::fs::read_to_string(path)?;
        let mut cfg = Self::from_str_as(&text, format, options)?;
        cfg.provenance.filename = Some(path.to_path_buf());

        info!(path = %path.display(), %format, keys = cfg.len(), "configuration loaded");
        Ok(cfg)
    }

    /// Parse a document in the given format.
    pub fn from_str_as(text: &str, format: FileFormat, options: NodeOptions) -> ConfigResult<Self> {
        let json = match format {
            FileFormat::Json => serde_json::from_str::<Json>(text)?,
            FileFormat::Yaml => serde_yaml::from_str::<Json>(text)?,
            FileFormat::Xml => xml::from_xml(text)?,
        };
        Self::from_json_with(json, options)
    }

    pub fn from_reader<R: Read>(
        mut reader: R,
        format: FileFormat,
        options: NodeOptions,
    ) -> ConfigResult<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::from_str_as(&text, format, options)
    }

    /// Encode the configuration; globals are written first under `_globals`.
    pub fn to_string_as(&self, format: FileFormat, options: &SaveOptions) -> ConfigResult<String> {
        let (entries, globals) = self.persisted_view(options)?;
        let text = match format {
            FileFormat::Json => serde_json::to_string_pretty(&with_globals(entries, globals))?,
            FileFormat::Yaml => serde_yaml::to_string(&with_globals(entries, globals))?,
            FileFormat::Xml => xml::to_xml(&entries, globals.as_ref())?,
        };
        Ok(text)
    }

    /// Write to `path`, or to the file the configuration was loaded from.
    pub fn save(&self, path: Option<&Path>, options: &SaveOptions) -> ConfigResult<PathBuf> {
        let path = match path.or(self.filename()) {
            Some(path) => path.to_path_buf(),
            None => return Err(ConfigError::MissingSource),
        };
        let format = match options.format {
            Some(format) => format,
            None => FileFormat::from_path(&path)?,
        };

        std::fs::write(&path, self.to_string_as(format, options)?)?;
        info!(path = %path.display(), %format, "configuration saved");
        Ok(path)
    }

    fn persisted_view(
        &self,
        options: &SaveOptions,
    ) -> ConfigResult<(Map<String, Json>, Option<Map<String, Json>>)> {
        if options.include_from_arguments || self.from_arguments().is_empty() {
            let globals = options.include_globals.then(|| self.globals_to_json());
            return Ok((self.entries_to_json(), globals));
        }

        let mut view = self.clone();
        let mut dropped_globals = HashSet::new();
        for key in self.from_arguments() {
            match global_name(key) {
                Some(name) => {
                    dropped_globals.insert(name);
                }
                None => {
                    let key = view.resolve_key(key.as_str());
                    view.remove(&key)?;
                    prune_empty_parents(&mut view, key.segments())?;
                }
            }
        }

        let globals = options.include_globals.then(|| {
            self.globals_to_json()
                .into_iter()
                .filter(|(name, _)| !dropped_globals.contains(name.as_str()))
                .collect()
        });
        Ok((view.entries_to_json(), globals))
    }
}

/// Drop the nodes left empty above a removed key, deepest first.
fn prune_empty_parents(view: &mut ConfigNode, segments: &[String]) -> ConfigResult<()> {
    for depth in (1..segments.len()).rev() {
        let parent = &segments[..depth];
        let empty = matches!(view.lookup(parent), Ok(Some(Value::Node(node))) if node.is_empty());
        if !empty {
            break;
        }
        view.remove(CompoundKey::from(parent))?;
    }
    Ok(())
}

fn with_globals(entries: Map<String, Json>, globals: Option<Map<String, Json>>) -> Json {
    let mut map = Map::new();
    if let Some(globals) = globals.filter(|g| !g.is_empty()) {
        map.insert(super::node::GLOBALS_KEY.to_string(), Json::Object(globals));
    }
    map.extend(entries);
    Json::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_json_file() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "app.json", r#"{"_globals": {"root": "/srv"}, "data": "{root}/data"}"#);

        let options = LoadOptions::new().with_file(&path).parse_args(false);
        let cfg = ConfigNode::load(&options).unwrap();
        assert_eq!(cfg.get("data").unwrap(), Some(Value::from("/srv/data")));
        assert_eq!(cfg.filename(), Some(path.as_path()));
        assert!(cfg.arguments().is_none());
    }

    #[test]
    fn test_load_yaml_file() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "app.yml", "server:\n  port: 8080\n  hosts: [a, b]\n");

        let cfg = ConfigNode::load(&LoadOptions::new().with_file(&path).parse_args(false)).unwrap();
        assert_eq!(cfg.get("server.port").unwrap(), Some(Value::Int(8080)));
        assert_eq!(
            cfg.get("server.hosts").unwrap(),
            Some(Value::List(vec![Value::from("a"), Value::from("b")]))
        );
    }

    /// A path that does not start with `/`, so the tokenizer keeps it a value.
    fn relative(path: &Path) -> PathBuf {
        let cwd = std::env::current_dir().unwrap();
        path.strip_prefix(&cwd).unwrap_or(path).to_path_buf()
    }

    #[test]
    fn test_cfg_argument_overrides_file() {
        let temp = TempDir::new_in(".").unwrap();
        let default = write(&temp, "default.json", r#"{"name": "default"}"#);
        let chosen = relative(&write(&temp, "chosen.json", r#"{"name": "chosen"}"#));

        let options = LoadOptions::new()
            .with_file(&default)
            .with_args(["prog", "-config", chosen.to_str().unwrap()]);
        let cfg = ConfigNode::load(&options).unwrap();
        assert_eq!(cfg.get("name").unwrap(), Some(Value::from("chosen")));
        assert!(cfg.arguments().unwrap().contains_key(CFG_KEY));
    }

    #[test]
    fn test_missing_file_errors() {
        let temp = TempDir::new().unwrap();
        let options = LoadOptions::new()
            .with_file(temp.path().join("absent.json"))
            .parse_args(false);
        let err = ConfigNode::load(&options).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SourceNotFound);
    }

    #[test]
    fn test_no_file_named() {
        let err = ConfigNode::load(&LoadOptions::new().with_args(["prog"])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingSource);

        let cfg = ConfigNode::load(&LoadOptions::new().with_args(["prog"]).require_file(false)).unwrap();
        assert!(cfg.is_empty());
    }

    #[test]
    fn test_explicit_format_overrides_extension() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "settings.conf", "a: 1\n");
        let options = LoadOptions::new()
            .with_file(&path)
            .with_format(FileFormat::Yaml)
            .parse_args(false);
        let cfg = ConfigNode::load(&options).unwrap();
        assert_eq!(cfg.get("a").unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn test_from_reader() {
        let cfg = ConfigNode::from_reader(
            r#"{"a": {"b": 1}}"#.as_bytes(),
            FileFormat::Json,
            NodeOptions::default(),
        )
        .unwrap();
        assert_eq!(cfg.get("a.b").unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn test_save_defaults_to_loaded_file() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "app.json", r#"{"a": 1}"#);
        let mut cfg = ConfigNode::load(&LoadOptions::new().with_file(&path).parse_args(false)).unwrap();
        cfg.set("b", "two").unwrap();

        let saved = cfg.save(None, &SaveOptions::new()).unwrap();
        assert_eq!(saved, path);
        let reread: Json = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reread, json!({"a": 1, "b": "two"}));
    }

    #[test]
    fn test_save_without_destination() {
        let cfg = ConfigNode::new();
        let err = cfg.save(None, &SaveOptions::new()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingSource);
    }

    #[test]
    fn test_save_excludes_argument_created_keys() {
        let mut cfg = ConfigNode::from_json(json!({"_globals": {"root": "/srv"}, "port": 1})).unwrap();
        cfg.parse_arguments_from(["prog", "-port", "2", "-extra", "x", "-{home}", "h"], &Aliases::new())
            .unwrap();
        cfg.update_from_arguments().unwrap();

        let kept = cfg
            .to_string_as(FileFormat::Json, &SaveOptions::new().include_from_arguments(false))
            .unwrap();
        let kept: Json = serde_json::from_str(&kept).unwrap();
        assert_eq!(kept, json!({"_globals": {"root": "/srv"}, "port": 2}));

        let all: Json = serde_json::from_str(
            &cfg.to_string_as(FileFormat::Json, &SaveOptions::new()).unwrap(),
        )
        .unwrap();
        assert_eq!(all["extra"], json!("x"));
        assert_eq!(all["_globals"]["home"], json!("h"));
    }

    #[test]
    fn test_save_drops_parents_created_for_argument_keys() {
        let mut cfg = ConfigNode::from_json(json!({"port": 1, "db": {"host": "h"}})).unwrap();
        cfg.parse_arguments_from(["prog", "-new.sub", "x", "-db.extra", "y"], &Aliases::new())
            .unwrap();
        cfg.update_from_arguments().unwrap();
        assert_eq!(cfg.get("new.sub").unwrap(), Some(Value::from("x")));

        let kept: Json = serde_json::from_str(
            &cfg.to_string_as(FileFormat::Json, &SaveOptions::new().include_from_arguments(false))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(kept, json!({"port": 1, "db": {"host": "h"}}));
        assert!(cfg.contains("new.sub"));
    }

    #[test]
    fn test_save_without_globals() {
        let cfg = ConfigNode::from_json(json!({"_globals": {"x": 1}, "a": "{x}"})).unwrap();
        let text = cfg
            .to_string_as(FileFormat::Yaml, &SaveOptions::new().include_globals(false))
            .unwrap();
        let reread: Json = serde_yaml::from_str(&text).unwrap();
        assert_eq!(reread, json!({"a": "{x}"}));
    }

    #[test]
    fn test_xml_round_trip_through_file() {
        let temp = TempDir::new().unwrap();
        let source = ConfigNode::from_json(json!({
            "_globals": {"root": "/srv"},
            "db": {"port": 5432, "hosts": ["a", "b"], "ssl": false},
            "ratio": 1.5
        }))
        .unwrap();
        let path = temp.path().join("out.xml");
        source.save(Some(path.as_path()), &SaveOptions::new()).unwrap();

        let loaded = ConfigNode::load(&LoadOptions::new().with_file(&path).parse_args(false)).unwrap();
        assert_eq!(loaded, source);
        assert_eq!(loaded.globals().get("root"), Some(Value::from("/srv")));
    }
}
