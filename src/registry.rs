//! Publish/fetch orchestrator.
//!
//! [`Registry`] sequences the identifier scheme, the backend access layer
//! and the local cache manager into the public operations. Multi-step
//! publishes roll back on partial failure; nothing in this module retries.

use crate::access;
use crate::cache;
use crate::config::{Config, ALIAS_FOLDER, META_EXT, UID_FOLDER};
use crate::document::{self, Header, Meta};
use crate::error::{Error, Result};
use crate::params::Params;
use crate::uid::{self, UidKind};
use chrono::NaiveDate;
use std::env;
use std::path::{Path, PathBuf};
use tracing::error;

/// Optional arguments of [`Registry::publish`].
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Author recorded in the header; defaults to the OS user name.
    pub author: Option<String>,
    /// Publication date; defaults to today.
    pub date: Option<NaiveDate>,
    /// Free-form metadata published alongside the header.
    pub meta: Meta,
    /// Dot-delimited subgroup extending the group id.
    pub subgroup: Option<String>,
    /// Name of the repository to publish to; defaults to the first
    /// configured one.
    pub repository: Option<String>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            author: None,
            date: None,
            meta: Meta::Mapping(serde_yaml::Mapping::new()),
            subgroup: None,
            repository: None,
        }
    }
}

impl PublishOptions {
    /// Create default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Set the publication date.
    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the metadata document.
    #[must_use]
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// Set the subgroup.
    #[must_use]
    pub fn with_subgroup(mut self, subgroup: impl Into<String>) -> Self {
        self.subgroup = Some(subgroup.into());
        self
    }

    /// Set the target repository by name.
    #[must_use]
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }
}

/// Client for one registry configuration.
///
/// Carries its [`Config`] explicitly; independent registries with
/// different caches and repository lists coexist freely in one process.
#[derive(Debug)]
pub struct Registry {
    config: Config,
}

impl Registry {
    /// Create a registry client.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// The configuration this registry operates on.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Unique model id for the given identity.
    #[must_use]
    pub fn uid(
        &self,
        name: &str,
        params: &Params,
        version: Option<&str>,
        subgroup: Option<&str>,
    ) -> String {
        uid::uid(name, params, version, subgroup)
    }

    /// Zip the model folder at `root` and publish it as a new artifact.
    ///
    /// The header is uploaded first, then metadata, then the archive
    /// (metadata and archive paths derive from header fields). On any
    /// failure every object already written is deleted again; cleanup
    /// failures are logged and the original error is returned.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchPath`] when `root` is not a directory,
    /// [`Error::Validation`] for a reserved subgroup or unknown
    /// repository, [`Error::AlreadyExists`] when this uid and version is
    /// already published, [`Error::Serialization`] when the header or
    /// metadata cannot be encoded (detected before anything is uploaded).
    pub fn publish(
        &self,
        root: impl AsRef<Path>,
        name: &str,
        params: &Params,
        version: &str,
        options: PublishOptions,
    ) -> Result<String> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::NoSuchPath(root.to_path_buf()));
        }
        if version.is_empty() {
            return Err(Error::Validation("version must not be empty".to_string()));
        }
        let subgroup = options.subgroup.unwrap_or_default();
        validate_subgroup(&subgroup)?;

        let short_id = uid::short_id(name, params, Some(&subgroup));
        let full_uid = format!("{short_id}-{version}");

        if access::header_exists(&self.config, &short_id, version)? {
            return Err(Error::AlreadyExists { uid: full_uid });
        }

        let header = Header {
            author: options.author.unwrap_or_else(os_username),
            date: options.date.unwrap_or_else(today),
            name: name.to_string(),
            parameters: params.clone(),
            subgroup,
            version: version.to_string(),
        };

        // Reject unserializable documents before the first upload, so a
        // doomed publish leaves no partial remote state behind.
        document::to_yaml_string(&header)?;
        document::check_meta(&options.meta)?;
        document::to_yaml_string(&options.meta)?;

        let repository = match &options.repository {
            Some(name) => self
                .config
                .repositories
                .iter()
                .find(|repository| repository.name == *name)
                .ok_or_else(|| Error::Validation(format!("unknown repository '{name}'")))?,
            None => self
                .config
                .repositories
                .first()
                .ok_or_else(|| Error::Validation("no repositories configured".to_string()))?,
        };
        let backend = repository.create_backend()?;

        let mut written: Vec<String> = Vec::new();
        let outcome = upload_sequence(
            backend.as_ref(),
            &self.config,
            &short_id,
            version,
            &header,
            &options.meta,
            root,
            &mut written,
        );
        if let Err(err) = outcome {
            // Compensating deletes, best effort; a cleanup failure is
            // reported but never masks the publish error.
            for path in &written {
                if let Err(cleanup) = backend.remove_file(path, version) {
                    error!(
                        path = %path,
                        error = %cleanup,
                        "cleanup after failed publish could not remove artifact"
                    );
                }
            }
            return Err(err);
        }

        Ok(full_uid)
    }

    /// Download a model and return the local folder with its files.
    ///
    /// Served from the cache when already present. A uid without a
    /// version resolves to the latest published version.
    pub fn load(&self, uid: &str) -> Result<PathBuf> {
        let (short_id, version) = access::resolve_uid(&self.config, uid)?;
        access::get_archive(&self.config, &short_id, &version)
    }

    /// Header of a model.
    pub fn header(&self, uid: &str) -> Result<Header> {
        let (short_id, version) = access::resolve_uid(&self.config, uid)?;
        let (_, header) = access::get_header(&self.config, &short_id, &version)?;
        Ok(header)
    }

    /// Metadata of a model.
    pub fn meta(&self, uid: &str) -> Result<Meta> {
        let (short_id, version) = access::resolve_uid(&self.config, uid)?;
        let (_, meta) = access::get_meta(&self.config, &short_id, &version)?;
        Ok(meta)
    }

    /// Update the metadata of a published model.
    ///
    /// With `replace` the given document substitutes the current one;
    /// otherwise it merges recursively (mappings key by key, everything
    /// else overwrites). The local cache copy is overwritten afterwards
    /// so the next read does not re-download.
    pub fn update_meta(&self, uid: &str, update: &Meta, replace: bool) -> Result<Meta> {
        let (short_id, version) = access::resolve_uid(&self.config, uid)?;
        let (backend, current) = access::get_meta(&self.config, &short_id, &version)?;

        let merged = if replace {
            update.clone()
        } else {
            let mut merged = current;
            document::merge(&mut merged, update);
            merged
        };

        document::check_meta(&merged)?;
        let content = document::to_yaml_string(&merged)?;
        access::put_meta(backend.as_ref(), &self.config, &short_id, &version, &merged)?;

        let local = cache::document_path(&self.config.cache_root, &short_id, &version, META_EXT);
        cache::store_document(&local, &content)?;

        Ok(merged)
    }

    /// Remove a published model version from its repository.
    ///
    /// Deletes the archive, plus metadata and header where present. The
    /// local cache is deliberately left untouched: stale entries expire
    /// through checksum validation on a later read or through external
    /// cache tooling, never here.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] naming the uid when this version is not
    /// published (also on a repeated `remove`).
    pub fn remove(&self, uid: &str, version: &str) -> Result<()> {
        let short_id = self.short_id_of(uid)?;
        if !access::header_exists(&self.config, &short_id, version)? {
            return Err(Error::not_found(&short_id, Some(version)));
        }
        let (backend, header) = access::get_header(&self.config, &short_id, version)?;

        let archive_path =
            access::archive_remote_path(&self.config, &header.subgroup, &header.name, &short_id);
        if backend.exists(&archive_path, version)? {
            backend.remove_file(&archive_path, version)?;
        }
        let meta_path = access::meta_remote_path(&self.config, &short_id);
        if backend.exists(&meta_path, version)? {
            backend.remove_file(&meta_path, version)?;
        }
        let header_path = access::header_remote_path(&self.config, &short_id);
        backend.remove_file(&header_path, version)?;

        Ok(())
    }

    /// Whether a model with this id (or alias) is published.
    ///
    /// Malformed ids and missing models answer `false`; only transport
    /// failures propagate.
    pub fn exists(&self, uid: &str) -> Result<bool> {
        match access::resolve_uid(&self.config, uid) {
            Ok((short_id, version)) => access::header_exists(&self.config, &short_id, &version),
            Err(Error::NotFound { .. } | Error::AliasNotFound { .. } | Error::Validation(_)) => {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// All published versions of a model, ascending by semantic ordering,
    /// de-duplicated across repositories.
    pub fn versions(&self, uid: &str) -> Result<Vec<String>> {
        let short_id = self.short_id_of(uid)?;
        access::sorted_versions(&self.config, &short_id)
    }

    /// Latest published version of a model.
    pub fn latest_version(&self, uid: &str) -> Result<String> {
        let short_id = self.short_id_of(uid)?;
        access::latest_version(&self.config, &short_id)?
            .ok_or_else(|| Error::not_found(&short_id, None))
    }

    /// Author recorded for a model.
    pub fn author(&self, uid: &str) -> Result<String> {
        Ok(self.header(uid)?.author)
    }

    /// Publication date recorded for a model.
    pub fn date(&self, uid: &str) -> Result<NaiveDate> {
        Ok(self.header(uid)?.date)
    }

    /// Name of a model.
    pub fn name(&self, uid: &str) -> Result<String> {
        Ok(self.header(uid)?.name)
    }

    /// Parameters of a model.
    pub fn parameters(&self, uid: &str) -> Result<Params> {
        Ok(self.header(uid)?.parameters)
    }

    /// Subgroup of a model.
    pub fn subgroup(&self, uid: &str) -> Result<String> {
        Ok(self.header(uid)?.subgroup)
    }

    /// Version a model reference resolves to.
    pub fn version(&self, uid: &str) -> Result<String> {
        let (_, version) = access::resolve_uid(&self.config, uid)?;
        Ok(version)
    }

    /// Public locator of a model archive, for display.
    pub fn url(&self, uid: &str) -> Result<String> {
        let (short_id, version) = access::resolve_uid(&self.config, uid)?;
        let (backend, header) = access::get_header(&self.config, &short_id, &version)?;
        let path =
            access::archive_remote_path(&self.config, &header.subgroup, &header.name, &short_id);
        Ok(backend.url(&path, &version))
    }

    /// Public locator of a model header, for display.
    pub fn header_url(&self, uid: &str) -> Result<String> {
        let (short_id, version) = access::resolve_uid(&self.config, uid)?;
        let (backend, path) = access::locate_header(&self.config, &short_id, &version)?;
        Ok(backend.url(&path, &version))
    }

    /// Register an alias for a published model.
    ///
    /// The alias resolves to the exact version `uid` resolves to now.
    /// Alias names must stay out of the uid grammar; anything shaped like
    /// a model id is rejected.
    pub fn set_alias(&self, alias: &str, uid: &str) -> Result<()> {
        match uid::classify(alias)? {
            UidKind::Alias => {}
            _ => {
                return Err(Error::Validation(format!(
                    "'{alias}' is not a valid alias name"
                )))
            }
        }
        let (short_id, version) = access::resolve_uid(&self.config, uid)?;
        let (backend, _) = access::get_header(&self.config, &short_id, &version)?;

        let resolved = format!("{short_id}-{version}");
        access::put_alias(backend.as_ref(), &self.config, alias, &resolved)?;

        let mut aliases =
            access::get_aliases(&self.config, backend.as_ref(), &short_id, &version)?;
        if !aliases.iter().any(|existing| existing == alias) {
            aliases.push(alias.to_string());
            access::put_aliases(backend.as_ref(), &self.config, &short_id, &version, aliases)?;
        }
        Ok(())
    }

    /// Aliases registered for a model.
    pub fn aliases(&self, uid: &str) -> Result<Vec<String>> {
        let (short_id, version) = access::resolve_uid(&self.config, uid)?;
        let (backend, _) = access::locate_header(&self.config, &short_id, &version)?;
        access::get_aliases(&self.config, backend.as_ref(), &short_id, &version)
    }

    // Short id of any model reference, resolving aliases but leaving the
    // version alone.
    fn short_id_of(&self, candidate: &str) -> Result<String> {
        match uid::classify(candidate)? {
            UidKind::Full { short_id, .. } => Ok(short_id),
            UidKind::Short | UidKind::Legacy => Ok(candidate.to_string()),
            UidKind::Alias => {
                let (_, resolved) = access::get_alias(&self.config, candidate)?;
                let (short_id, _) = uid::split(&resolved);
                Ok(short_id.to_string())
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn upload_sequence(
    backend: &dyn crate::backend::Backend,
    config: &Config,
    short_id: &str,
    version: &str,
    header: &Header,
    meta: &Meta,
    root: &Path,
    written: &mut Vec<String>,
) -> Result<()> {
    written.push(access::put_header(backend, config, short_id, version, header)?);
    written.push(access::put_meta(backend, config, short_id, version, meta)?);
    written.push(access::put_archive(
        backend,
        config,
        short_id,
        version,
        &header.name,
        &header.subgroup,
        root,
    )?);
    Ok(())
}

fn validate_subgroup(subgroup: &str) -> Result<()> {
    let first = subgroup.split('.').next().unwrap_or_default();
    if first == UID_FOLDER || first == ALIAS_FOLDER {
        return Err(Error::Validation(format!(
            "subgroup must not start with the reserved folder '{first}'"
        )));
    }
    Ok(())
}

fn os_username() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_subgroup_reserved() {
        assert!(validate_subgroup("_uid").is_err());
        assert!(validate_subgroup("_alias").is_err());
        assert!(validate_subgroup("_uid.nested").is_err());
        assert!(validate_subgroup("").is_ok());
        assert!(validate_subgroup("gender.cnn").is_ok());
        // Reserved names below the first segment do not shadow the
        // header folder.
        assert!(validate_subgroup("a._uid").is_ok());
    }

    #[test]
    fn test_os_username_nonempty() {
        assert!(!os_username().is_empty());
    }

    #[test]
    fn test_publish_options_builder() {
        let options = PublishOptions::new()
            .with_author("calvin")
            .with_subgroup("gender")
            .with_repository("models-public-local");
        assert_eq!(options.author.as_deref(), Some("calvin"));
        assert_eq!(options.subgroup.as_deref(), Some("gender"));
        assert_eq!(options.repository.as_deref(), Some("models-public-local"));
    }
}
