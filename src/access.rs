//! Backend access layer.
//!
//! Locates and transfers headers, metadata, archives and aliases between
//! the process and the configured repositories. Reads search the
//! repository list in order; writes go to one explicitly chosen
//! repository. Everything downloaded is served through the local cache
//! manager. No retries happen here; backend errors propagate to the
//! orchestrator.

use crate::archive;
use crate::backend::{self, Backend};
use crate::cache;
use crate::config::{
    Config, ALIASES_EXT, ALIAS_EXT, ALIAS_FOLDER, HEADER_EXT, META_EXT, UID_FOLDER,
};
use crate::document::{self, Header, Meta};
use crate::error::{Error, Result};
use crate::uid::{self, UidKind};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;

/// Aliases carry no meaningful version of their own; the backend's version
/// dimension is pinned to this value for them.
pub(crate) const ALIAS_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize, Deserialize)]
struct AliasDocument {
    uid: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AliasesDocument {
    aliases: Vec<String>,
}

/// Repository path of a model header.
#[must_use]
pub fn header_remote_path(config: &Config, short_id: &str) -> String {
    uid_folder_path(config, short_id, HEADER_EXT)
}

/// Repository path of a model metadata document.
#[must_use]
pub fn meta_remote_path(config: &Config, short_id: &str) -> String {
    uid_folder_path(config, short_id, META_EXT)
}

/// Repository path of a model's alias list.
#[must_use]
pub fn aliases_remote_path(config: &Config, short_id: &str) -> String {
    uid_folder_path(config, short_id, ALIASES_EXT)
}

/// Repository path of an alias document.
#[must_use]
pub fn alias_remote_path(config: &Config, alias: &str) -> String {
    let mut segments = config.group_segments();
    segments.push(ALIAS_FOLDER);
    let basename = format!("{alias}.{ALIAS_EXT}");
    segments.push(&basename);
    backend::join(&segments)
}

/// Repository path of a model archive.
#[must_use]
pub fn archive_remote_path(
    config: &Config,
    subgroup: &str,
    name: &str,
    short_id: &str,
) -> String {
    let mut segments = config.group_segments();
    segments.extend(subgroup.split('.').filter(|s| !s.is_empty()));
    segments.push(name);
    let basename = format!("{short_id}.zip");
    segments.push(&basename);
    backend::join(&segments)
}

fn uid_folder_path(config: &Config, short_id: &str, ext: &str) -> String {
    let mut segments = config.group_segments();
    segments.push(UID_FOLDER);
    let basename = format!("{short_id}.{ext}");
    segments.push(&basename);
    backend::join(&segments)
}

/// Locate the repository holding the header of `short_id` in `version`.
///
/// With exactly one configured repository presence is assumed without a
/// round-trip; otherwise each repository is checked in order and the
/// first hit wins.
///
/// # Errors
///
/// [`Error::NotFound`] carrying the formatted uid when no repository
/// contains the header.
pub fn locate_header(
    config: &Config,
    short_id: &str,
    version: &str,
) -> Result<(Box<dyn Backend>, String)> {
    let path = header_remote_path(config, short_id);
    if let [repository] = config.repositories.as_slice() {
        return Ok((repository.create_backend()?, path));
    }
    for repository in &config.repositories {
        let backend = repository.create_backend()?;
        if backend.exists(&path, version)? {
            return Ok((backend, path));
        }
    }
    Err(Error::not_found(short_id, Some(version)))
}

/// Whether any configured repository holds the header of `short_id` in
/// `version`. Always performs the existence round-trip, also for a
/// single-repository configuration.
pub fn header_exists(config: &Config, short_id: &str, version: &str) -> Result<bool> {
    let path = header_remote_path(config, short_id);
    for repository in &config.repositories {
        let backend = repository.create_backend()?;
        if backend.exists(&path, version)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// All published versions of `short_id` across all repositories.
///
/// The same short id may have different versions in different
/// repositories, so results are unioned: ascending per repository,
/// concatenated in repository order.
pub fn header_versions(
    config: &Config,
    short_id: &str,
) -> Result<Vec<(Box<dyn Backend>, String, String)>> {
    let path = header_remote_path(config, short_id);
    let mut matches = Vec::new();
    for repository in &config.repositories {
        let backend = repository.create_backend()?;
        for version in backend.versions(&path)? {
            matches.push((repository.create_backend()?, path.clone(), version));
        }
    }
    Ok(matches)
}

/// All versions of `short_id`, globally sorted by semantic version and
/// de-duplicated.
pub fn sorted_versions(config: &Config, short_id: &str) -> Result<Vec<String>> {
    let mut versions: Vec<String> = header_versions(config, short_id)?
        .into_iter()
        .map(|(_, _, version)| version)
        .collect();
    backend::sort_versions(&mut versions);
    versions.dedup();
    Ok(versions)
}

/// Latest version of `short_id` by global semantic ordering.
pub fn latest_version(config: &Config, short_id: &str) -> Result<Option<String>> {
    Ok(sorted_versions(config, short_id)?.pop())
}

/// Fetch a model header, serving from the cache when fresh.
pub fn get_header(
    config: &Config,
    short_id: &str,
    version: &str,
) -> Result<(Box<dyn Backend>, Header)> {
    let (backend, remote) = locate_header(config, short_id, version)?;
    let local = cache::document_path(&config.cache_root, short_id, version, HEADER_EXT);
    cache::refresh_document(backend.as_ref(), &remote, version, &local)
        .map_err(|err| into_not_found(err, short_id, version))?;
    let header = cache::read_header(&local)?;
    Ok((backend, header))
}

/// Fetch a model's metadata, serving from the cache when fresh.
pub fn get_meta(
    config: &Config,
    short_id: &str,
    version: &str,
) -> Result<(Box<dyn Backend>, Meta)> {
    let (backend, _) = locate_header(config, short_id, version)?;
    let remote = meta_remote_path(config, short_id);
    let local = cache::document_path(&config.cache_root, short_id, version, META_EXT);
    cache::refresh_document(backend.as_ref(), &remote, version, &local)
        .map_err(|err| into_not_found(err, short_id, version))?;
    let meta = document::read_meta(&local)?;
    Ok((backend, meta))
}

/// Fetch and extract a model archive, returning the local model folder.
pub fn get_archive(config: &Config, short_id: &str, version: &str) -> Result<PathBuf> {
    let (backend, header) = get_header(config, short_id, version)?;
    let remote = archive_remote_path(config, &header.subgroup, &header.name, short_id);
    let target = cache::archive_root(&config.cache_root, short_id, version);
    cache::fill_archive(config, backend.as_ref(), &remote, version, &target)
        .map_err(|err| into_not_found(err, short_id, version))
}

/// Upload a model header; returns the remote path written.
pub fn put_header(
    backend: &dyn Backend,
    config: &Config,
    short_id: &str,
    version: &str,
    header: &Header,
) -> Result<String> {
    let content = document::to_yaml_string(header)?;
    put_document(backend, &header_remote_path(config, short_id), version, &content)
}

/// Upload a model metadata document; returns the remote path written.
pub fn put_meta(
    backend: &dyn Backend,
    config: &Config,
    short_id: &str,
    version: &str,
    meta: &Meta,
) -> Result<String> {
    document::check_meta(meta)?;
    let content = document::to_yaml_string(meta)?;
    put_document(backend, &meta_remote_path(config, short_id), version, &content)
}

/// Zip a model folder and upload it; returns the remote path written.
pub fn put_archive(
    backend: &dyn Backend,
    config: &Config,
    short_id: &str,
    version: &str,
    name: &str,
    subgroup: &str,
    root: &std::path::Path,
) -> Result<String> {
    let remote = archive_remote_path(config, subgroup, name, short_id);
    let staging = tempfile::tempdir()?;
    let archive_file = staging.path().join("model.zip");
    let files = archive::scan_files(root)?;
    archive::create(root, &files, &archive_file)?;
    backend.put_file(&archive_file, &remote, version)?;
    Ok(remote)
}

/// Resolve an alias to the uid it names.
///
/// # Errors
///
/// [`Error::AliasNotFound`] when no repository holds the alias.
pub fn get_alias(config: &Config, alias: &str) -> Result<(Box<dyn Backend>, String)> {
    let remote = alias_remote_path(config, alias);
    for repository in &config.repositories {
        let backend = repository.create_backend()?;
        if backend.exists(&remote, ALIAS_VERSION)? {
            let local = config
                .cache_root
                .join(ALIAS_FOLDER)
                .join(format!("{alias}.{ALIAS_EXT}"));
            cache::refresh_document(backend.as_ref(), &remote, ALIAS_VERSION, &local)?;
            let document: AliasDocument = document::read_yaml(&local)?;
            return Ok((backend, document.uid));
        }
    }
    Err(Error::AliasNotFound {
        alias: alias.to_string(),
    })
}

/// Publish an alias document pointing at `uid`; returns the remote path.
pub fn put_alias(
    backend: &dyn Backend,
    config: &Config,
    alias: &str,
    uid: &str,
) -> Result<String> {
    let document = AliasDocument {
        uid: uid.to_string(),
    };
    let content = document::to_yaml_string(&document)?;
    put_document(backend, &alias_remote_path(config, alias), ALIAS_VERSION, &content)
}

/// Aliases registered for `short_id` in `version`; empty when none.
pub fn get_aliases(
    config: &Config,
    backend: &dyn Backend,
    short_id: &str,
    version: &str,
) -> Result<Vec<String>> {
    let remote = aliases_remote_path(config, short_id);
    if !backend.exists(&remote, version)? {
        return Ok(Vec::new());
    }
    let local = cache::document_path(&config.cache_root, short_id, version, ALIASES_EXT);
    cache::refresh_document(backend, &remote, version, &local)?;
    let document: AliasesDocument = document::read_yaml(&local)?;
    Ok(document.aliases)
}

/// Upload the alias list of `short_id`; returns the remote path written.
pub fn put_aliases(
    backend: &dyn Backend,
    config: &Config,
    short_id: &str,
    version: &str,
    aliases: Vec<String>,
) -> Result<String> {
    let document = AliasesDocument { aliases };
    let content = document::to_yaml_string(&document)?;
    put_document(backend, &aliases_remote_path(config, short_id), version, &content)
}

/// Resolve any model reference (full, short, legacy, alias) to
/// `(short_id, version)`.
///
/// Classification happens first, before any network or cache access, so
/// malformed input fails fast. A short id resolves to its latest version
/// by global semantic ordering; a legacy id resolves its single version
/// from the cache when possible and from the backend otherwise.
pub fn resolve_uid(config: &Config, candidate: &str) -> Result<(String, String)> {
    match uid::classify(candidate)? {
        UidKind::Full { short_id, version } => Ok((short_id, version)),
        UidKind::Short => {
            let version = latest_version(config, candidate)?
                .ok_or_else(|| Error::not_found(candidate, None))?;
            Ok((candidate.to_string(), version))
        }
        UidKind::Legacy => {
            let version = legacy_version(config, candidate)?;
            Ok((candidate.to_string(), version))
        }
        UidKind::Alias => {
            let (_, resolved) = get_alias(config, candidate)?;
            resolve_uid(config, &resolved)
        }
    }
}

/// Resolve the single version of a legacy uid.
///
/// Legacy ids encode at most one version. A cached header answers
/// without a round-trip; otherwise the repositories are asked in order.
fn legacy_version(config: &Config, uid: &str) -> Result<String> {
    if let Some(version) = cache::cached_legacy_version(&config.cache_root, uid) {
        return Ok(version);
    }
    let path = header_remote_path(config, uid);
    for repository in &config.repositories {
        let backend = repository.create_backend()?;
        let versions = backend.versions(&path)?;
        if let Some(version) = versions.into_iter().next() {
            return Ok(version);
        }
    }
    Err(Error::not_found(uid, None))
}

fn put_document(
    backend: &dyn Backend,
    remote: &str,
    version: &str,
    content: &str,
) -> Result<String> {
    let staging = tempfile::tempdir()?;
    let staged = staging.path().join("document.yaml");
    std::fs::write(&staged, content)?;
    backend.put_file(&staged, remote, version)?;
    Ok(remote.to_string())
}

// A backend-level file-not-found becomes the domain error carrying the
// formatted uid; everything else passes through untouched.
fn into_not_found(err: Error, short_id: &str, version: &str) -> Error {
    match err {
        Error::Io(io) if io.kind() == ErrorKind::NotFound => {
            Error::not_found(short_id, Some(version))
        }
        other => other,
    }
}
