#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

//! Quipu: versioned model artifact registry client
//!
//! Quipu publishes, versions and retrieves machine-learning model
//! artifacts against one or more remote repositories. Models get a
//! deterministic short id derived from their semantic identity (name,
//! parameters, subgroup), downloads land in a checksum-validated local
//! cache, and concurrent processes sharing that cache are coordinated
//! through per-path file locks.
//!
//! # Quick Start
//!
//! ```no_run
//! use quipu::prelude::*;
//!
//! let config = Config::new(
//!     quipu::config::default_cache_root(),
//!     "com.example.models",
//!     vec![Repository::new("models-local", "/data/repository", "file-system")],
//! );
//! let registry = Registry::new(config);
//!
//! // Publish a model folder
//! let params = Params::from([
//!     ("sampling_rate".to_string(), ParamValue::from(16_000)),
//! ]);
//! let uid = registry.publish(
//!     "./model",
//!     "gender",
//!     &params,
//!     "1.0.0",
//!     PublishOptions::new().with_subgroup("voice"),
//! )?;
//!
//! // Retrieve it anywhere the cache is shared
//! let root = registry.load(&uid)?;
//! println!("model files at {}", root.display());
//! # Ok::<(), quipu::Error>(())
//! ```
//!
//! # Architecture
//!
//! - **Identifier scheme** - content-derived 8-character short ids,
//!   `short_id-version` full uids, legacy UUID detection, aliases
//! - **Backend access layer** - ordered multi-repository search for
//!   reads, explicit repository choice for writes
//! - **Local cache manager** - checksum-refreshed documents, extracted
//!   archives materialized via build-then-rename
//! - **Lock manager** - sidecar file locks serializing cache writers
//!   across processes
//!
//! # Cache layout
//!
//! ```text
//! {cache_root}/{short_id}/{version}.header.yaml
//! {cache_root}/{short_id}/{version}.meta.yaml
//! {cache_root}/{short_id}/{version}/...extracted model files...
//! ```

pub mod access;
pub mod archive;
pub mod backend;
pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod lock;
pub mod params;
pub mod prelude;
pub mod registry;
pub mod repository;
pub mod uid;

pub use config::Config;
pub use document::{Header, Meta};
pub use error::{Error, Result};
pub use params::{ParamValue, Params};
pub use registry::{PublishOptions, Registry};
pub use repository::Repository;
pub use uid::UidKind;
