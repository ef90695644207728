//! Backend capability and the built-in versioned filesystem backend.
//!
//! A backend stores versioned artifacts under repository-relative paths
//! with `/` separators. The registry core never talks to storage directly;
//! everything goes through this trait so Artifactory-style services plug
//! in without touching the naming, caching or locking layers.

use crate::error::{Error, Result};
use md5::{Digest, Md5};
use semver::Version;
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Capability expected from a remote artifact store.
///
/// `path` arguments are repository-relative with `/` separators; `version`
/// selects one entry of the backend's native version dimension.
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Whether the artifact exists in the given version.
    fn exists(&self, path: &str, version: &str) -> Result<bool>;

    /// Download an artifact to a local file.
    fn get_file(&self, src: &str, dst: &Path, version: &str) -> Result<()>;

    /// Upload a local file as an artifact.
    fn put_file(&self, src: &Path, dst: &str, version: &str) -> Result<()>;

    /// Delete an artifact.
    fn remove_file(&self, path: &str, version: &str) -> Result<()>;

    /// All versions of an artifact, ascending by semantic ordering.
    fn versions(&self, path: &str) -> Result<Vec<String>>;

    /// Checksum (MD5 hex) of an artifact.
    fn checksum(&self, path: &str, version: &str) -> Result<String>;

    /// Public locator of an artifact, for display purposes.
    fn url(&self, path: &str, version: &str) -> String;
}

/// Join repository path segments with `/`, skipping empty segments.
#[must_use]
pub fn join(segments: &[&str]) -> String {
    segments
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

/// MD5 hex digest of a local file.
pub(crate) fn md5_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compare version strings, semantic when both parse, lexical otherwise.
pub(crate) fn compare_versions(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Sort version strings ascending by [`compare_versions`].
pub(crate) fn sort_versions(versions: &mut [String]) {
    versions.sort_by(|a, b| compare_versions(a, b));
}

/// Versioned directory-tree backend.
///
/// An artifact `dir/stem.ext` in version `v` lives at
/// `{host}/{repository}/dir/stem/v/stem-v.ext`; the extension is everything
/// after the first dot of the basename, so compound extensions like
/// `header.yaml` survive. The version directories are the backend's
/// version dimension.
#[derive(Debug)]
pub struct FileSystem {
    root: PathBuf,
}

impl FileSystem {
    /// Create a backend rooted at `{host}/{repository}`.
    #[must_use]
    pub fn new(host: impl Into<PathBuf>, repository: &str) -> Self {
        Self {
            root: host.into().join(repository),
        }
    }

    fn resolve(&self, path: &str, version: &str) -> PathBuf {
        let (dir, stem, ext) = split_path(path);
        let mut resolved = self.root.clone();
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            resolved.push(segment);
        }
        resolved.push(stem);
        resolved.push(version);
        resolved.push(format!("{stem}-{version}.{ext}"));
        resolved
    }

    fn version_root(&self, path: &str) -> PathBuf {
        let (dir, stem, _) = split_path(path);
        let mut resolved = self.root.clone();
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            resolved.push(segment);
        }
        resolved.push(stem);
        resolved
    }
}

fn split_path(path: &str) -> (&str, &str, &str) {
    let (dir, base) = match path.rsplit_once('/') {
        Some((dir, base)) => (dir, base),
        None => ("", path),
    };
    let (stem, ext) = match base.split_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (base, ""),
    };
    (dir, stem, ext)
}

impl Backend for FileSystem {
    fn exists(&self, path: &str, version: &str) -> Result<bool> {
        Ok(self.resolve(path, version).is_file())
    }

    fn get_file(&self, src: &str, dst: &Path, version: &str) -> Result<()> {
        let resolved = self.resolve(src, version);
        if !resolved.is_file() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no artifact at '{}'", resolved.display()),
            )));
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(resolved, dst)?;
        Ok(())
    }

    fn put_file(&self, src: &Path, dst: &str, version: &str) -> Result<()> {
        let resolved = self.resolve(dst, version);
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)?;
        }
        // Stage next to the target so the final rename is atomic.
        let staged = resolved.with_extension("upload");
        fs::copy(src, &staged)?;
        fs::rename(&staged, &resolved)?;
        Ok(())
    }

    fn remove_file(&self, path: &str, version: &str) -> Result<()> {
        let resolved = self.resolve(path, version);
        fs::remove_file(&resolved)?;
        // Drop the now-empty version directory, leave anything else alone.
        if let Some(parent) = resolved.parent() {
            let _ = fs::remove_dir(parent);
        }
        Ok(())
    }

    fn versions(&self, path: &str) -> Result<Vec<String>> {
        let root = self.version_root(path);
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let version = entry.file_name().to_string_lossy().to_string();
            if self.resolve(path, &version).is_file() {
                versions.push(version);
            }
        }
        sort_versions(&mut versions);
        Ok(versions)
    }

    fn checksum(&self, path: &str, version: &str) -> Result<String> {
        md5_file(&self.resolve(path, version))
    }

    fn url(&self, path: &str, version: &str) -> String {
        format!("file://{}", self.resolve(path, version).display())
    }
}
