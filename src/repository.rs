//! Repository descriptions and backend construction.

use crate::backend::{Backend, FileSystem};
use crate::error::{Error, Result};
use std::fmt;

/// Backend kind name of the built-in filesystem backend.
pub const FILE_SYSTEM: &str = "file-system";

/// One configured remote storage endpoint.
///
/// Holds everything needed to address a repository: its name, host and
/// backend kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Repository name, e.g. `models-public-local`.
    pub name: String,
    /// Host address; a directory for the filesystem backend.
    pub host: String,
    /// Registered backend kind name.
    pub backend: String,
}

impl Repository {
    /// Create a repository description.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        backend: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            backend: backend.into(),
        }
    }

    /// Instantiate the backend for this repository.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown backend kind.
    pub fn create_backend(&self) -> Result<Box<dyn Backend>> {
        match self.backend.as_str() {
            FILE_SYSTEM => Ok(Box::new(FileSystem::new(&self.host, &self.name))),
            other => Err(Error::Validation(format!(
                "unknown backend kind '{other}' for repository '{}'",
                self.name
            ))),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository('{}', '{}', '{}')",
            self.name, self.host, self.backend
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let repository = Repository::new("data-local", "/data", FILE_SYSTEM);
        assert_eq!(
            repository.to_string(),
            "Repository('data-local', '/data', 'file-system')"
        );
    }

    #[test]
    fn test_create_backend_file_system() {
        let repository = Repository::new("data-local", "/data", FILE_SYSTEM);
        assert!(repository.create_backend().is_ok());
    }

    #[test]
    fn test_create_backend_unknown_kind() {
        let repository = Repository::new("data-local", "https://host", "artifactory");
        let err = repository.create_backend().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("artifactory"));
    }
}
