use core::result::Result as CoreResult;
use std::io::Error as IoError;

use regex::Error as RegexError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;
use toml::ser::Error as TomlSerializeError;

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// TOML serialization failed.
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] TomlSerializeError),

    /// A rule-table regular expression failed to compile.
    #[error("Invalid pattern: {0}")]
    Regex(#[from] RegexError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rule table failed validation.
    #[error("Invalid rule set: {0}")]
    InvalidRules(String),

    /// An external collaborator could not serve the request.
    #[error("Collaborator unavailable: {0}")]
    Collaborator(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Determines whether this error may succeed if retried.
    ///
    /// Only collaborator failures are transient; configuration and rule
    /// errors will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Collaborator(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let config_error = Error::Config("weights must sum to 1".to_owned());
        assert_eq!(
            config_error.to_string(),
            "Configuration error: weights must sum to 1"
        );

        let rules_error = Error::InvalidRules("no domains".to_owned());
        assert_eq!(rules_error.to_string(), "Invalid rule set: no domains");
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::Collaborator("registry offline".to_owned()).is_retryable());
        assert!(Error::Io(io::Error::other("disk")).is_retryable());
        assert!(!Error::Config("bad".to_owned()).is_retryable());
        assert!(!Error::InvalidRules("bad".to_owned()).is_retryable());
    }

    #[test]
    fn test_error_from_toml() {
        let parse_error = toml::from_str::<toml::Value>("version = ").unwrap_err();
        let error: Error = parse_error.into();
        assert!(matches!(error, Error::Toml(_)), "expected Toml variant");
    }
}
