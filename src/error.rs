//! Error types for registry operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during registry operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Archive packing/unpacking failed.
    #[error("archive error: {0}")]
    Archive(String),

    /// Malformed identifier, reserved subgroup, or invalid alias name.
    /// Raised before any network or cache access.
    #[error("{0}")]
    Validation(String),

    /// No repository contains the requested model.
    #[error("a model with ID '{uid}' does not exist")]
    NotFound {
        /// Formatted uid, including the version when one was requested.
        uid: String,
    },

    /// No repository contains the requested alias.
    #[error("an alias with name '{alias}' does not exist")]
    AliasNotFound {
        /// Alias name.
        alias: String,
    },

    /// Publish target already present; republish must fail, not overwrite.
    #[error("a model with ID '{uid}' exists already")]
    AlreadyExists {
        /// Formatted uid, including the version.
        uid: String,
    },

    /// A header or metadata value cannot be encoded as a YAML document.
    /// Detected before any upload.
    #[error("cannot serialize the following object to a YAML file: {repr}")]
    Serialization {
        /// Debug representation of the offending value.
        repr: String,
    },

    /// A cache-path lock could not be obtained within the configured budget.
    #[error("could not acquire lock on '{}' within {seconds} s", path.display())]
    LockTimeout {
        /// Path the lock protects.
        path: PathBuf,
        /// Total time budget that was exhausted.
        seconds: u64,
    },

    /// Publish root (or another required path) is missing.
    #[error("no such directory: '{}'", .0.display())]
    NoSuchPath(PathBuf),
}

impl Error {
    /// Format a uid from its parts for error messages.
    #[must_use]
    pub fn format_uid(short_id: &str, version: Option<&str>) -> String {
        match version {
            Some(version) => format!("{short_id}-{version}"),
            None => short_id.to_string(),
        }
    }

    /// `NotFound` for a short id plus optional version.
    #[must_use]
    pub fn not_found(short_id: &str, version: Option<&str>) -> Self {
        Self::NotFound {
            uid: Self::format_uid(short_id, version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("5fbbaf38", Some("3.0.0"));
        assert_eq!(
            err.to_string(),
            "a model with ID '5fbbaf38-3.0.0' does not exist"
        );

        let err = Error::not_found("5fbbaf38", None);
        assert_eq!(err.to_string(), "a model with ID '5fbbaf38' does not exist");
    }

    #[test]
    fn test_already_exists_display() {
        let err = Error::AlreadyExists {
            uid: "5fbbaf38-1.0.0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "a model with ID '5fbbaf38-1.0.0' exists already"
        );
    }

    #[test]
    fn test_lock_timeout_display() {
        let err = Error::LockTimeout {
            path: PathBuf::from("/cache/5fbbaf38/1.0.0"),
            seconds: 10,
        };
        assert!(err.to_string().contains("/cache/5fbbaf38/1.0.0"));
        assert!(err.to_string().contains("10 s"));
    }
}
