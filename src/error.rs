//! Structured error types for configuration operations.

use crate::config::ValueKind;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Addressing errors
    KeyNotFound,
    KeyMismatch,

    // Input errors
    ArgumentSyntax,
    Coercion,

    // Source errors
    SourceNotFound,
    MissingSource,
    UnsupportedFormat,
    InvalidSource,

    // Codec / IO errors
    IoError,
    ParseError,
}

/// Errors raised while building, addressing or merging a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A bare `-` or `/` token on the command line.
    #[error("syntax error in argument: {token}")]
    ArgumentSyntax { token: String },

    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    /// A compound key tried to descend into a scalar or list.
    #[error("multi-part key, but `{key}` is not a dictionary")]
    KeyMismatch { key: String },

    #[error("cannot cast {value:?} to {target}")]
    Coercion { value: String, target: ValueKind },

    #[error("config file {} not found", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("a configuration file is required, pass one explicitly or with -cfg")]
    MissingSource,

    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid configuration source: {0}")]
    InvalidSource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("XML error: {0}")]
    Xml(String),
}

impl ConfigError {
    // Convenience constructors

    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    pub fn key_mismatch(key: impl Into<String>) -> Self {
        Self::KeyMismatch { key: key.into() }
    }

    pub fn coercion(value: impl Into<String>, target: ValueKind) -> Self {
        Self::Coercion {
            value: value.into(),
            target,
        }
    }

    pub fn xml(err: impl std::fmt::Display) -> Self {
        Self::Xml(err.to_string())
    }

    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ArgumentSyntax { .. } => ErrorCode::ArgumentSyntax,
            Self::KeyNotFound { .. } => ErrorCode::KeyNotFound,
            Self::KeyMismatch { .. } => ErrorCode::KeyMismatch,
            Self::Coercion { .. } => ErrorCode::Coercion,
            Self::SourceNotFound { .. } => ErrorCode::SourceNotFound,
            Self::MissingSource => ErrorCode::MissingSource,
            Self::UnsupportedFormat(_) => ErrorCode::UnsupportedFormat,
            Self::InvalidSource(_) => ErrorCode::InvalidSource,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) | Self::Yaml(_) | Self::Xml(_) => ErrorCode::ParseError,
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_coercion() {
        let err = ConfigError::coercion("abc", ValueKind::Int);
        assert_eq!(err.to_string(), "cannot cast \"abc\" to int");
        assert_eq!(err.code(), ErrorCode::Coercion);
    }

    #[test]
    fn test_error_display_key_mismatch() {
        let err = ConfigError::key_mismatch("port");
        assert_eq!(
            err.to_string(),
            "multi-part key, but `port` is not a dictionary"
        );
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let code = serde_json::to_string(&ErrorCode::SourceNotFound).unwrap();
        assert_eq!(code, "\"SOURCE_NOT_FOUND\"");
    }
}
