//! Metadata attached to nodes
//!
//! Metadata values are a closed sum: strings, numbers, booleans, and flat
//! lists of those. The map is ordered so content hashes are deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// List elements must be scalars; nested lists are rejected
    List(Vec<MetadataValue>),
}

impl MetadataValue {
    /// Build a list value, rejecting nested lists
    pub fn list(values: Vec<MetadataValue>) -> Result<Self> {
        for v in &values {
            if matches!(v, MetadataValue::List(_)) {
                return Err(Error::Configuration(
                    "metadata lists may only contain scalar values".to_string(),
                ));
            }
        }
        Ok(MetadataValue::List(values))
    }

    /// Check that this value has an allowed shape
    pub fn validate(&self) -> Result<()> {
        if let MetadataValue::List(values) = self {
            for v in values {
                if matches!(v, MetadataValue::List(_)) {
                    return Err(Error::Configuration(
                        "metadata lists may only contain scalar values".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Numeric view of the value, when it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Integer(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String view of the value, when it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{}", s),
            MetadataValue::Integer(i) => write!(f, "{}", i),
            MetadataValue::Float(x) => write!(f, "{}", x),
            MetadataValue::Boolean(b) => write!(f, "{}", b),
            MetadataValue::List(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Integer(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(f: f64) -> Self {
        MetadataValue::Float(f)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Boolean(b)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(values: Vec<String>) -> Self {
        MetadataValue::List(values.into_iter().map(MetadataValue::String).collect())
    }
}

impl From<Vec<i64>> for MetadataValue {
    fn from(values: Vec<i64>) -> Self {
        MetadataValue::List(values.into_iter().map(MetadataValue::Integer).collect())
    }
}

/// Ordered metadata map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(pub BTreeMap<String, MetadataValue>);

impl Metadata {
    /// Create an empty metadata map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to the metadata
    pub fn add<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<MetadataValue>,
    {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Get a field by key
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    /// Whether the key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Remove a field by key
    pub fn remove(&mut self, key: &str) -> Option<MetadataValue> {
        self.0.remove(key)
    }

    /// Iterate over fields in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check that every value has an allowed shape
    pub fn validate(&self) -> Result<()> {
        for value in self.0.values() {
            value.validate()?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<MetadataValue>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_add_and_get() {
        let mut metadata = Metadata::new();
        metadata.add("author", "hugo").add("pages", 42i64);

        assert_eq!(metadata.get("author"), Some(&MetadataValue::String("hugo".to_string())));
        assert_eq!(metadata.get("pages"), Some(&MetadataValue::Integer(42)));
        assert!(metadata.get("missing").is_none());
    }

    #[test]
    fn test_nested_lists_rejected() {
        let nested = MetadataValue::List(vec![MetadataValue::List(vec![])]);
        assert!(nested.validate().is_err());
        assert!(MetadataValue::list(vec![MetadataValue::List(vec![])]).is_err());

        let flat = MetadataValue::list(vec![
            MetadataValue::String("a".to_string()),
            MetadataValue::Integer(1),
        ]);
        assert!(flat.is_ok());
    }

    #[test]
    fn test_metadata_is_ordered() {
        let mut metadata = Metadata::new();
        metadata.add("b", 2i64).add("a", 1i64).add("c", 3i64);

        let keys: Vec<&String> = metadata.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_metadata_value_display() {
        assert_eq!(MetadataValue::from("x").to_string(), "x");
        assert_eq!(MetadataValue::from(3i64).to_string(), "3");
        assert_eq!(MetadataValue::from(true).to_string(), "true");
        assert_eq!(
            MetadataValue::from(vec!["a".to_string(), "b".to_string()]).to_string(),
            "[a, b]"
        );
    }
}
