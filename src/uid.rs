//! Identifier scheme: deterministic short ids, uid composition and
//! classification.
//!
//! A model's short id is derived from its semantic identity (subgroup,
//! name, parameters) and never from its version. The full uid appends the
//! version: `5fbbaf38-3.0.0`. Pre-migration models carry 36-character
//! UUID-formatted ids whose version has to be resolved via the backend.

use crate::error::{Error, Result};
use crate::params::{self, Params};
use md5::{Digest, Md5};
use uuid::Uuid;

/// Classified shape of a model reference string.
///
/// Produced by [`classify`] and consumed via exhaustive matching; no other
/// code inspects identifier strings directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidKind {
    /// 36-character UUID-formatted pre-migration id.
    Legacy,
    /// 8-character short id without a version.
    Short,
    /// Short id plus version.
    Full {
        /// 8-character short id.
        short_id: String,
        /// Version part; may itself contain dashes.
        version: String,
    },
    /// Human-readable alias name.
    Alias,
}

/// Derive the 8-character short id from a model's semantic identity.
///
/// The subgroup canonicalizes to `""` when absent. The hashed string is
/// `"{subgroup}.{name}"` followed by the canonical parameter encoding with
/// keys sorted, so the result is independent of parameter insertion order
/// and stable across processes.
#[must_use]
pub fn short_id(name: &str, params: &Params, subgroup: Option<&str>) -> String {
    let subgroup = subgroup.unwrap_or("");
    let unique = format!("{subgroup}.{name}{}", params::canonical(params));
    let digest = hex::encode(Md5::digest(unique.as_bytes()));
    digest[digest.len() - 8..].to_string()
}

/// Unique model id for the given identity, with the version appended when
/// one is supplied.
#[must_use]
pub fn uid(name: &str, params: &Params, version: Option<&str>, subgroup: Option<&str>) -> String {
    let short = short_id(name, params, subgroup);
    match version {
        Some(version) => format!("{short}-{version}"),
        None => short,
    }
}

/// Split a full uid into short id and version at the first dash only.
///
/// The version may contain further dashes (`1.0.0-rc1`) and is returned
/// re-joined, never split.
#[must_use]
pub fn split(uid: &str) -> (&str, &str) {
    match uid.split_once('-') {
        Some((short_id, version)) => (short_id, version),
        None => (uid, ""),
    }
}

/// Classify a candidate model reference.
///
/// # Errors
///
/// Returns [`Error::Validation`] for strings that are neither a valid uid
/// shape nor a permissible alias name. Hex-only strings that fail the uid
/// grammar are rejected rather than treated as aliases, so a typo in an id
/// cannot silently resolve through the alias namespace.
pub fn classify(candidate: &str) -> Result<UidKind> {
    if is_legacy(candidate) {
        return Ok(UidKind::Legacy);
    }
    if is_short(candidate) {
        return Ok(UidKind::Short);
    }
    if let Some((short_id, version)) = candidate.split_once('-') {
        if is_short(short_id) && !version.is_empty() {
            return Ok(UidKind::Full {
                short_id: short_id.to_string(),
                version: version.to_string(),
            });
        }
    }
    if is_alias(candidate) {
        return Ok(UidKind::Alias);
    }
    Err(Error::Validation(format!(
        "'{candidate}' is not a valid model ID or alias"
    )))
}

fn is_legacy(candidate: &str) -> bool {
    candidate.len() == 36 && Uuid::try_parse(candidate).is_ok()
}

fn is_short(candidate: &str) -> bool {
    candidate.len() == 8
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn is_alias(candidate: &str) -> bool {
    if candidate.is_empty() {
        return false;
    }
    let charset_ok = candidate
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-');
    if !charset_ok {
        return false;
    }
    // A hex-only string (dashes stripped) is a malformed uid attempt,
    // not an alias.
    let stripped: String = candidate.chars().filter(|c| *c != '-').collect();
    let hex_only = !stripped.is_empty()
        && stripped
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    !hex_only
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;
    use proptest::prelude::*;

    fn reference_params() -> Params {
        Params::from([
            ("sampling_rate".to_string(), ParamValue::from(16_000)),
            ("feature".to_string(), ParamValue::from("melspec64")),
            ("model".to_string(), ParamValue::from("cnn10")),
        ])
    }

    #[test]
    fn test_short_id_reference_vector() {
        let short = short_id("test", &reference_params(), Some("audmodel.docstring"));
        assert_eq!(short, "5fbbaf38");
    }

    #[test]
    fn test_uid_with_version() {
        let uid = uid(
            "test",
            &reference_params(),
            Some("3.0.0"),
            Some("audmodel.docstring"),
        );
        assert_eq!(uid, "5fbbaf38-3.0.0");
    }

    #[test]
    fn test_uid_without_version() {
        let uid = uid("test", &reference_params(), None, Some("audmodel.docstring"));
        assert_eq!(uid, "5fbbaf38");
    }

    #[test]
    fn test_short_id_depends_on_subgroup() {
        let params = reference_params();
        let with = short_id("test", &params, Some("audmodel.docstring"));
        let without = short_id("test", &params, None);
        assert_ne!(with, without);
    }

    #[test]
    fn test_short_id_shape() {
        let short = short_id("m", &Params::new(), None);
        assert_eq!(short.len(), 8);
        assert!(short.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_split_plain() {
        assert_eq!(split("5fbbaf38-3.0.0"), ("5fbbaf38", "3.0.0"));
    }

    #[test]
    fn test_split_version_with_dashes() {
        assert_eq!(split("5fbbaf38-1.0.0-rc1"), ("5fbbaf38", "1.0.0-rc1"));
    }

    #[test]
    fn test_classify_legacy() {
        let kind = classify("98ccb530-b162-11ea-8427-ac1f6bac2502").unwrap();
        assert_eq!(kind, UidKind::Legacy);
    }

    #[test]
    fn test_classify_short() {
        assert_eq!(classify("5fbbaf38").unwrap(), UidKind::Short);
    }

    #[test]
    fn test_classify_full() {
        let kind = classify("5fbbaf38-1.0.0-rc1").unwrap();
        assert_eq!(
            kind,
            UidKind::Full {
                short_id: "5fbbaf38".to_string(),
                version: "1.0.0-rc1".to_string(),
            }
        );
    }

    #[test]
    fn test_classify_alias() {
        assert_eq!(classify("my-model").unwrap(), UidKind::Alias);
        assert_eq!(classify("prod.gender_v2").unwrap(), UidKind::Alias);
    }

    #[test]
    fn test_classify_hex_only_is_malformed() {
        // Looks like a mistyped uid; must not resolve through aliases.
        assert!(classify("abc123").is_err());
        assert!(classify("deadbeef12").is_err());
        assert!(classify("abcd-12").is_err());
    }

    #[test]
    fn test_classify_rejects_bad_charset() {
        assert!(classify("no spaces").is_err());
        assert!(classify("").is_err());
        assert!(classify("slash/name").is_err());
    }

    proptest! {
        #[test]
        fn prop_short_id_deterministic(
            name in "[a-z]{1,12}",
            key_a in "[a-z]{1,8}",
            key_b in "[a-z]{1,8}",
            value in -1000i64..1000,
        ) {
            prop_assume!(key_a != key_b);
            let mut forward = Params::new();
            forward.insert(key_a.clone(), ParamValue::from(value));
            forward.insert(key_b.clone(), ParamValue::from("x"));

            let mut backward = Params::new();
            backward.insert(key_b, ParamValue::from("x"));
            backward.insert(key_a, ParamValue::from(value));

            prop_assert_eq!(
                short_id(&name, &forward, None),
                short_id(&name, &backward, None)
            );
        }

        #[test]
        fn prop_split_join_roundtrip(version in "[0-9]\\.[0-9]\\.[0-9](-[a-z0-9.]{1,8})?") {
            let full = format!("5fbbaf38-{version}");
            let (short_id, split_version) = split(&full);
            prop_assert_eq!(short_id, "5fbbaf38");
            prop_assert_eq!(split_version, version);
        }
    }
}
