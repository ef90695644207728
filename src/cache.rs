//! Local cache manager.
//!
//! Mirrors remote headers, metadata and extracted archives below the cache
//! root, keyed by short id and version:
//!
//! ```text
//! {cache_root}/{short_id}/{version}.header.yaml
//! {cache_root}/{short_id}/{version}.meta.yaml
//! {cache_root}/{short_id}/{version}/...extracted model files...
//! {cache_root}/{short_id}/{version}~   (transient, mid-extraction)
//! ```
//!
//! Documents are re-validated against the remote checksum on every read;
//! extracted archives are presence-checked only. New entries always
//! materialize through a build-then-rename step, so a reader can never
//! observe a half-written final path.

use crate::backend::{self, Backend};
use crate::config::Config;
use crate::error::Result;
use crate::lock::Lock;
use crate::{archive, document};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Local path of a cached document.
#[must_use]
pub fn document_path(cache_root: &Path, short_id: &str, version: &str, ext: &str) -> PathBuf {
    cache_root.join(short_id).join(format!("{version}.{ext}"))
}

/// Local extraction directory of a cached archive.
#[must_use]
pub fn archive_root(cache_root: &Path, short_id: &str, version: &str) -> PathBuf {
    cache_root.join(short_id).join(version)
}

/// Ensure a cached document matches the remote object.
///
/// A stale local copy (checksum mismatch) is deleted and re-downloaded.
/// Downloads land in a temporary sibling file first and move into place
/// with an atomic rename.
pub fn refresh_document(
    backend: &dyn Backend,
    remote: &str,
    version: &str,
    local: &Path,
) -> Result<()> {
    if local.is_file() {
        let local_checksum = backend::md5_file(local)?;
        let remote_checksum = backend.checksum(remote, version)?;
        if local_checksum != remote_checksum {
            debug!(path = %local.display(), "cached document is stale, refreshing");
            fs::remove_file(local)?;
        }
    }

    if !local.is_file() {
        let parent = local.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let staged = tempfile::NamedTempFile::new_in(parent)?;
        backend.get_file(remote, staged.path(), version)?;
        staged
            .persist(local)
            .map_err(|err| std::io::Error::from(err.error))?;
        debug!(path = %local.display(), "cached document downloaded");
    }

    Ok(())
}

/// Ensure an extracted archive is present under `target` and return it.
///
/// An existing non-empty directory is trusted as-is. Otherwise the
/// download+extract sequence runs under a cache-path lock into the
/// transient `{target}~` directory, which is renamed to `target` as the
/// last step; a crash mid-extraction leaves only the transient name
/// behind and a later call redoes the fill cleanly.
pub fn fill_archive(
    config: &Config,
    backend: &dyn Backend,
    remote: &str,
    version: &str,
    target: &Path,
) -> Result<PathBuf> {
    if is_filled(target) {
        return Ok(target.to_path_buf());
    }

    let _lock = Lock::acquire(
        &[target.to_path_buf()],
        config.lock_timeout,
        config.lock_warning_timeout,
    )?;

    // Another writer may have filled the entry while we waited.
    if is_filled(target) {
        return Ok(target.to_path_buf());
    }

    let transient = transient_path(target);
    if transient.exists() {
        // Debris from an interrupted fill.
        fs::remove_dir_all(&transient)?;
    }
    fs::create_dir_all(&transient)?;

    let archive_file = transient.join("model.zip");
    backend.get_file(remote, &archive_file, version)?;
    archive::extract(&archive_file, &transient)?;
    fs::remove_file(&archive_file)?;

    if target.exists() {
        fs::remove_dir(target)?;
    }
    fs::rename(&transient, target)?;
    debug!(path = %target.display(), "cached archive extracted");

    Ok(target.to_path_buf())
}

/// Overwrite a cached document with freshly serialized content.
///
/// Used after a metadata update so the next read does not have to
/// re-download what this process just uploaded.
pub fn store_document(local: &Path, content: &str) -> Result<()> {
    let parent = local.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let staged = tempfile::NamedTempFile::new_in(parent)?;
    fs::write(staged.path(), content)?;
    staged
        .persist(local)
        .map_err(|err| std::io::Error::from(err.error))?;
    Ok(())
}

/// Version of a cached legacy model, derived from its header file name.
///
/// Legacy ids do not encode their version; once a header has been cached
/// the version can be read back from `{cache}/{uid}/{version}.header.yaml`
/// without a backend round-trip.
#[must_use]
pub fn cached_legacy_version(cache_root: &Path, uid: &str) -> Option<String> {
    let root = cache_root.join(uid);
    let suffix = format!(".{}", crate::config::HEADER_EXT);
    let entries = fs::read_dir(root).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(version) = name.strip_suffix(&suffix) {
            return Some(version.to_string());
        }
    }
    None
}

fn is_filled(target: &Path) -> bool {
    fs::read_dir(target)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn transient_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map_or_else(String::new, |name| name.to_string_lossy().to_string());
    name.push('~');
    target.with_file_name(name)
}

/// Parse a cached header document.
pub fn read_header(local: &Path) -> Result<document::Header> {
    document::read_yaml(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileSystem;
    use crate::repository::Repository;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        Config::new(
            dir.path().join("cache"),
            "com.example.models",
            vec![Repository::new(
                "models-local",
                dir.path().join("host").to_string_lossy().to_string(),
                crate::repository::FILE_SYSTEM,
            )],
        )
        .with_lock_timeout(Duration::from_secs(10))
        .with_lock_warning_timeout(Duration::from_secs(1))
    }

    fn remote_with(dir: &TempDir, path: &str, version: &str, content: &[u8]) -> FileSystem {
        let backend = FileSystem::new(dir.path().join("host"), "models-local");
        let src = dir.path().join("stage.tmp");
        fs::write(&src, content).unwrap();
        backend.put_file(&src, path, version).unwrap();
        backend
    }

    #[test]
    fn test_document_path_layout() {
        let path = document_path(Path::new("/cache"), "5fbbaf38", "1.0.0", "header.yaml");
        assert_eq!(path, PathBuf::from("/cache/5fbbaf38/1.0.0.header.yaml"));
    }

    #[test]
    fn test_refresh_document_downloads_once() {
        let dir = TempDir::new().unwrap();
        let backend = remote_with(&dir, "g/_uid/x.meta.yaml", "1.0.0", b"a: 1\n");
        let local = dir.path().join("cache/x/1.0.0.meta.yaml");

        refresh_document(&backend, "g/_uid/x.meta.yaml", "1.0.0", &local).unwrap();
        assert_eq!(fs::read_to_string(&local).unwrap(), "a: 1\n");

        let modified = fs::metadata(&local).unwrap().modified().unwrap();
        refresh_document(&backend, "g/_uid/x.meta.yaml", "1.0.0", &local).unwrap();
        assert_eq!(fs::metadata(&local).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn test_refresh_document_replaces_stale_copy() {
        let dir = TempDir::new().unwrap();
        let backend = remote_with(&dir, "g/_uid/x.meta.yaml", "1.0.0", b"a: 1\n");
        let local = dir.path().join("cache/x/1.0.0.meta.yaml");

        refresh_document(&backend, "g/_uid/x.meta.yaml", "1.0.0", &local).unwrap();

        // Re-publish with different content.
        let _ = remote_with(&dir, "g/_uid/x.meta.yaml", "1.0.0", b"a: 2\n");
        refresh_document(&backend, "g/_uid/x.meta.yaml", "1.0.0", &local).unwrap();

        assert_eq!(fs::read_to_string(&local).unwrap(), "a: 2\n");
        assert_eq!(
            backend::md5_file(&local).unwrap(),
            backend.checksum("g/_uid/x.meta.yaml", "1.0.0").unwrap()
        );
    }

    #[test]
    fn test_fill_archive_extracts_and_renames() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        // Build a small zip to serve as the remote archive.
        let tree = dir.path().join("tree");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("weights.bin"), b"w").unwrap();
        let zipped = dir.path().join("model.zip");
        let files = archive::scan_files(&tree).unwrap();
        archive::create(&tree, &files, &zipped).unwrap();

        let backend = FileSystem::new(dir.path().join("host"), "models-local");
        backend
            .put_file(&zipped, "g/m/x.zip", "1.0.0")
            .unwrap();

        let target = archive_root(&config.cache_root, "x", "1.0.0");
        let returned = fill_archive(&config, &backend, "g/m/x.zip", "1.0.0", &target).unwrap();

        assert_eq!(returned, target);
        assert!(target.join("weights.bin").is_file());
        assert!(!target.join("model.zip").exists());
        assert!(!transient_path(&target).exists());
    }

    #[test]
    fn test_fill_archive_recovers_from_debris() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let tree = dir.path().join("tree");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("weights.bin"), b"w").unwrap();
        let zipped = dir.path().join("model.zip");
        let files = archive::scan_files(&tree).unwrap();
        archive::create(&tree, &files, &zipped).unwrap();

        let backend = FileSystem::new(dir.path().join("host"), "models-local");
        backend.put_file(&zipped, "g/m/x.zip", "1.0.0").unwrap();

        // Simulate an interrupted fill: truncated download under `~`.
        let target = archive_root(&config.cache_root, "x", "1.0.0");
        let transient = transient_path(&target);
        fs::create_dir_all(&transient).unwrap();
        fs::write(transient.join("model.zip"), b"trunc").unwrap();
        assert!(!target.exists());

        fill_archive(&config, &backend, "g/m/x.zip", "1.0.0", &target).unwrap();
        assert!(target.join("weights.bin").is_file());
        assert!(!transient.exists());
    }

    #[test]
    fn test_fill_archive_trusts_existing_entry() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let backend = FileSystem::new(dir.path().join("host"), "models-local");

        let target = archive_root(&config.cache_root, "x", "1.0.0");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("weights.bin"), b"w").unwrap();

        // No remote artifact exists; the presence check must short-circuit.
        fill_archive(&config, &backend, "g/m/x.zip", "1.0.0", &target).unwrap();
        assert!(target.join("weights.bin").is_file());
    }

    #[test]
    fn test_cached_legacy_version() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("cache");
        let uid = "98ccb530-b162-11ea-8427-ac1f6bac2502";
        fs::create_dir_all(cache.join(uid)).unwrap();
        fs::write(cache.join(uid).join("1.0.0.header.yaml"), "x").unwrap();

        assert_eq!(
            cached_legacy_version(&cache, uid),
            Some("1.0.0".to_string())
        );
        assert_eq!(cached_legacy_version(&cache, "missing0"), None);
    }
}
