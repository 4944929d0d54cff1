//! Hierarchical configuration with globals, environment and argument overlays.
//!
//! A [`ConfigNode`] tree is built from JSON, YAML or XML and addressed with
//! dotted [`CompoundKey`]s. String values may reference entries of a shared
//! [`Globals`] table as `{name}`; references resolve lazily on read.
//!
//! ## Sources
//! - Files: [`ConfigNode::load`], with `-cfg` on the command line taking precedence
//! - Environment: [`ConfigNode::update_from_environment`], optionally prefixed via `-evp`
//! - Arguments: [`ConfigNode::update_from_arguments`], coerced to the type of existing values
//!
//! [`ConfigNode::full_update`] runs the three merge stages in order.

mod args;
mod coerce;
mod env;
mod globals;
mod key;
mod loader;
mod node;
mod pipeline;
mod value;
mod xml;

pub use args::{Aliases, ArgumentMap, CFG_KEY, EVP_KEY, default_aliases, parse_argv};
pub use coerce::{Coercer, RawValue, coerce, coercer};
pub use env::{EnvOptions, Environment, MapEnvironment, ProcessEnvironment};
pub use globals::{Globals, GlobalsMap};
pub use key::{CompoundKey, split_key};
pub use loader::{LoadOptions, SaveOptions};
pub use node::{ConfigNode, GLOBALS_KEY, NodeOptions};
pub use pipeline::UpdateOptions;
pub use value::{Value, ValueKind};
pub use xml::ROOT_TAG as XML_ROOT_TAG;
