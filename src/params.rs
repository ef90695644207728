//! Typed model parameter values and their canonical encoding.
//!
//! Parameters describe the semantic identity of a model (training data,
//! sampling rate, feature set, classifier). Their canonical encoding feeds
//! the short-id derivation and must therefore be byte-stable across
//! processes and independent of map insertion order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Map of parameter names to scalar values, ordered by key.
pub type Params = BTreeMap<String, ParamValue>;

/// A scalar parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// String.
    Str(String),
}

impl ParamValue {
    /// Canonical literal form of the value.
    ///
    /// Strings are single-quoted with `\` and `'` escaped, booleans render
    /// as `True`/`False`, the absent value as `None`, and floats always
    /// carry a decimal point. This matches the historical encoding that
    /// published short ids were derived from, so it must not change.
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Self::Null => "None".to_string(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => canonical_float(*value),
            Self::Str(value) => {
                let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
                format!("'{escaped}'")
            }
        }
    }
}

fn canonical_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let repr = value.to_string();
    if repr.contains('.') || repr.contains('e') {
        repr
    } else {
        format!("{repr}.0")
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Canonical encoding of a parameter map: `{'key': value, ...}` with keys
/// in sorted order.
#[must_use]
pub fn canonical(params: &Params) -> String {
    let inner = params
        .iter()
        .map(|(key, value)| format!("'{key}': {}", value.canonical()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{inner}}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_params() -> Params {
        Params::from([
            ("sampling_rate".to_string(), ParamValue::from(16_000)),
            ("feature".to_string(), ParamValue::from("melspec64")),
            ("model".to_string(), ParamValue::from("cnn10")),
        ])
    }

    #[test]
    fn test_canonical_reference() {
        assert_eq!(
            canonical(&reference_params()),
            "{'feature': 'melspec64', 'model': 'cnn10', 'sampling_rate': 16000}"
        );
    }

    #[test]
    fn test_canonical_empty() {
        assert_eq!(canonical(&Params::new()), "{}");
    }

    #[test]
    fn test_canonical_insertion_order_independent() {
        let mut forward = Params::new();
        forward.insert("a".to_string(), ParamValue::from(1));
        forward.insert("b".to_string(), ParamValue::from(2));

        let mut backward = Params::new();
        backward.insert("b".to_string(), ParamValue::from(2));
        backward.insert("a".to_string(), ParamValue::from(1));

        assert_eq!(canonical(&forward), canonical(&backward));
    }

    #[test]
    fn test_scalar_literals() {
        assert_eq!(ParamValue::Null.canonical(), "None");
        assert_eq!(ParamValue::from(true).canonical(), "True");
        assert_eq!(ParamValue::from(false).canonical(), "False");
        assert_eq!(ParamValue::from(-3).canonical(), "-3");
        assert_eq!(ParamValue::from(0.25).canonical(), "0.25");
        assert_eq!(ParamValue::from("cnn10").canonical(), "'cnn10'");
    }

    #[test]
    fn test_float_always_carries_point() {
        assert_eq!(ParamValue::from(1.0).canonical(), "1.0");
        assert_eq!(ParamValue::from(-2.0).canonical(), "-2.0");
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(ParamValue::from("it's").canonical(), "'it\\'s'");
        assert_eq!(ParamValue::from("a\\b").canonical(), "'a\\\\b'");
    }

    #[test]
    fn test_yaml_roundtrip() {
        let params = reference_params();
        let yaml = serde_yaml::to_string(&params).unwrap();
        let parsed: Params = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn test_yaml_scalar_shapes() {
        let yaml = serde_yaml::to_string(&reference_params()).unwrap();
        assert!(yaml.contains("sampling_rate: 16000"));
        assert!(yaml.contains("feature: melspec64"));
    }
}
