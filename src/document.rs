//! Header and metadata documents.
//!
//! The header is the immutable provenance record written once at publish
//! time; metadata is a free-form YAML mapping that stays mutable through
//! [`merge`]-based updates. Both travel as YAML files between the cache
//! and the repositories.

use crate::error::{Error, Result};
use crate::params::Params;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fs;
use std::path::Path;

/// Free-form metadata document.
pub type Meta = Value;

/// Immutable provenance record for one published uid and version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Publisher, defaults to the OS user name.
    pub author: String,
    /// Publication date.
    pub date: NaiveDate,
    /// Model name.
    pub name: String,
    /// Semantic model parameters.
    pub parameters: Params,
    /// Dot-delimited subgroup, empty when unset.
    pub subgroup: String,
    /// Version this header belongs to.
    pub version: String,
}

/// Serialize a document to its YAML text.
///
/// # Errors
///
/// Returns [`Error::Serialization`] carrying the offending value's
/// representation when the document cannot be encoded.
pub fn to_yaml_string<T: Serialize + std::fmt::Debug>(document: &T) -> Result<String> {
    serde_yaml::to_string(document).map_err(|_| Error::Serialization {
        repr: format!("{document:?}"),
    })
}

/// Check that a metadata value can be represented as a YAML document.
///
/// The document format requires string keys and plain (untagged) nodes.
/// Called eagerly before any upload so a doomed publish never leaves
/// partial remote state behind.
///
/// # Errors
///
/// Returns [`Error::Serialization`] naming the first offending node.
pub fn check_meta(meta: &Meta) -> Result<()> {
    match meta {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(()),
        Value::Sequence(items) => items.iter().try_for_each(check_meta),
        Value::Mapping(mapping) => {
            for (key, value) in mapping {
                if !key.is_string() {
                    return Err(Error::Serialization {
                        repr: format!("{key:?}"),
                    });
                }
                check_meta(value)?;
            }
            Ok(())
        }
        Value::Tagged(tagged) => Err(Error::Serialization {
            repr: format!("{tagged:?}"),
        }),
    }
}

/// Recursively merge `update` into `base`.
///
/// Mappings merge key by key; every other node kind, and any new key,
/// overwrites or inserts.
pub fn merge(base: &mut Meta, update: &Meta) {
    match (base, update) {
        (Value::Mapping(base), Value::Mapping(update)) => {
            for (key, value) in update {
                match base.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, update) => *base = update.clone(),
    }
}

/// Read a YAML document from a local file.
pub fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

/// Read a metadata document, treating an empty file as an empty mapping.
pub fn read_meta(path: &Path) -> Result<Meta> {
    let text = fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(Meta::Mapping(serde_yaml::Mapping::new()));
    }
    Ok(serde_yaml::from_str(&text)?)
}
