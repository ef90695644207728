//! Registry configuration and fixed layout names.
//!
//! All state is carried by an explicit [`Config`] value passed into the
//! registry; there is no process-wide mutable configuration. Independent
//! configurations can coexist in one process (and in parallel tests).

use crate::repository::Repository;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Extension of header files.
pub const HEADER_EXT: &str = "header.yaml";

/// Extension of metadata files.
pub const META_EXT: &str = "meta.yaml";

/// Extension of alias files.
pub const ALIAS_EXT: &str = "alias.yaml";

/// Extension of per-model alias list files.
pub const ALIASES_EXT: &str = "aliases.yaml";

/// Name of the repository folder holding headers and metadata.
pub const UID_FOLDER: &str = "_uid";

/// Name of the repository folder holding aliases.
pub const ALIAS_FOLDER: &str = "_alias";

/// Environment variable overriding the default cache root.
pub const CACHE_ROOT_ENV: &str = "QUIPU_CACHE_ROOT";

/// Generic fallback environment variable for the cache root.
pub const CACHE_ROOT_ENV_FALLBACK: &str = "CACHE_ROOT";

/// Registry configuration.
///
/// Holds the local cache root, the group id under which artifacts are
/// stored, and the ordered list of repositories searched on reads.
/// Writes target one repository, chosen explicitly per call.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local cache directory mirroring remote headers, metadata and archives.
    pub cache_root: PathBuf,
    /// Dot-delimited group id, e.g. `com.example.models`. Mapped to a
    /// directory hierarchy on the repository.
    pub group: String,
    /// Ordered repository list; reads search in this order.
    pub repositories: Vec<Repository>,
    /// Total time budget for acquiring a cache-path lock.
    pub lock_timeout: Duration,
    /// Time after which a still-pending lock acquisition logs a warning.
    pub lock_warning_timeout: Duration,
}

impl Config {
    /// Create a configuration with default lock timeouts (24 h budget,
    /// 2 s warning threshold).
    #[must_use]
    pub fn new(
        cache_root: impl Into<PathBuf>,
        group: impl Into<String>,
        repositories: Vec<Repository>,
    ) -> Self {
        Self {
            cache_root: cache_root.into(),
            group: group.into(),
            repositories,
            lock_timeout: Duration::from_secs(86_400),
            lock_warning_timeout: Duration::from_secs(2),
        }
    }

    /// Set the lock acquisition time budget.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the lock warning threshold.
    #[must_use]
    pub fn with_lock_warning_timeout(mut self, timeout: Duration) -> Self {
        self.lock_warning_timeout = timeout;
        self
    }

    /// Group id split into repository path segments.
    #[must_use]
    pub fn group_segments(&self) -> Vec<&str> {
        self.group.split('.').filter(|s| !s.is_empty()).collect()
    }
}

/// Default path under which models are cached.
///
/// Resolution order: the `QUIPU_CACHE_ROOT` environment variable, the
/// `CACHE_ROOT` environment variable, then `~/.quipu`.
#[must_use]
pub fn default_cache_root() -> PathBuf {
    if let Ok(root) = env::var(CACHE_ROOT_ENV) {
        if !root.is_empty() {
            return PathBuf::from(root);
        }
    }
    if let Ok(root) = env::var(CACHE_ROOT_ENV_FALLBACK) {
        if !root.is_empty() {
            return PathBuf::from(root);
        }
    }
    home_path().join(".quipu")
}

fn home_path() -> PathBuf {
    env::var("HOME").map_or_else(|_| PathBuf::from("."), PathBuf::from)
}
