//! Hierarchical configuration from files, environment variables and
//! command line arguments.
//!
//! See [`config::ConfigNode`] for the entry point.

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
