//! Metadata filters for retrieval queries

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::node::metadata::{Metadata, MetadataValue};

/// Comparison operator applied to one metadata field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    Contains,
}

/// How the individual filters combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCondition {
    And,
    Or,
}

/// A single field comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub key: String,
    pub value: MetadataValue,
    pub operator: FilterOperator,
}

impl MetadataFilter {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
        operator: FilterOperator,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            operator,
        }
    }

    /// Shorthand for an equality filter
    pub fn eq(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::new(key, value, FilterOperator::Eq)
    }

    /// Evaluate this filter against a node's metadata
    ///
    /// Comparisons on missing fields are false (`Ne`/`NotIn` are true).
    /// Operator/value combinations with no defined meaning are
    /// `Error::Unsupported`, which stores surface as filter-unsupported.
    pub fn matches(&self, metadata: &Metadata) -> Result<bool> {
        let field = metadata.get(&self.key);
        match self.operator {
            FilterOperator::Eq => Ok(field.map_or(false, |v| v == &self.value)),
            FilterOperator::Ne => Ok(field.map_or(true, |v| v != &self.value)),
            FilterOperator::Gt => self.compare_numeric(field, |a, b| a > b),
            FilterOperator::Lt => self.compare_numeric(field, |a, b| a < b),
            FilterOperator::Gte => self.compare_numeric(field, |a, b| a >= b),
            FilterOperator::Lte => self.compare_numeric(field, |a, b| a <= b),
            FilterOperator::In => match &self.value {
                MetadataValue::List(values) => Ok(field.map_or(false, |v| values.contains(v))),
                _ => Err(Error::Unsupported(format!(
                    "'in' filter on key '{}' requires a list value",
                    self.key
                ))),
            },
            FilterOperator::NotIn => match &self.value {
                MetadataValue::List(values) => Ok(field.map_or(true, |v| !values.contains(v))),
                _ => Err(Error::Unsupported(format!(
                    "'nin' filter on key '{}' requires a list value",
                    self.key
                ))),
            },
            FilterOperator::Contains => match field {
                None => Ok(false),
                Some(MetadataValue::String(s)) => {
                    let needle = self.value.as_str().ok_or_else(|| {
                        Error::Unsupported(format!(
                            "'contains' filter on string key '{}' requires a string value",
                            self.key
                        ))
                    })?;
                    Ok(s.contains(needle))
                }
                Some(MetadataValue::List(values)) => Ok(values.contains(&self.value)),
                Some(_) => Err(Error::Unsupported(format!(
                    "'contains' filter is not defined for the value under key '{}'",
                    self.key
                ))),
            },
        }
    }

    fn compare_numeric<F>(&self, field: Option<&MetadataValue>, op: F) -> Result<bool>
    where
        F: Fn(f64, f64) -> bool,
    {
        let rhs = self.value.as_f64().ok_or_else(|| {
            Error::Unsupported(format!(
                "ordering filter on key '{}' requires a numeric value",
                self.key
            ))
        })?;
        match field {
            None => Ok(false),
            Some(v) => {
                let lhs = v.as_f64().ok_or_else(|| {
                    Error::Unsupported(format!(
                        "ordering filter on non-numeric field '{}'",
                        self.key
                    ))
                })?;
                Ok(op(lhs, rhs))
            }
        }
    }
}

/// A set of filters combined with `And` or `Or`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilters {
    pub filters: Vec<MetadataFilter>,
    pub condition: FilterCondition,
}

impl MetadataFilters {
    /// Combine filters with `And`
    pub fn all(filters: Vec<MetadataFilter>) -> Self {
        Self {
            filters,
            condition: FilterCondition::And,
        }
    }

    /// Combine filters with `Or`
    pub fn any(filters: Vec<MetadataFilter>) -> Self {
        Self {
            filters,
            condition: FilterCondition::Or,
        }
    }

    /// Evaluate the whole set against a node's metadata
    pub fn matches(&self, metadata: &Metadata) -> Result<bool> {
        match self.condition {
            FilterCondition::And => {
                for filter in &self.filters {
                    if !filter.matches(metadata)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            FilterCondition::Or => {
                for filter in &self.filters {
                    if filter.matches(metadata)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> Metadata {
        let mut metadata = Metadata::new();
        metadata
            .add("lang", "en")
            .add("year", 2021i64)
            .add("tags", vec!["rust".to_string(), "rag".to_string()]);
        metadata
    }

    #[test]
    fn test_eq_ne() {
        let metadata = sample_metadata();
        assert!(MetadataFilter::eq("lang", "en").matches(&metadata).unwrap());
        assert!(!MetadataFilter::eq("lang", "fr").matches(&metadata).unwrap());
        assert!(MetadataFilter::new("lang", "fr", FilterOperator::Ne)
            .matches(&metadata)
            .unwrap());
        // Missing field: eq is false, ne is true
        assert!(!MetadataFilter::eq("missing", "x").matches(&metadata).unwrap());
        assert!(MetadataFilter::new("missing", "x", FilterOperator::Ne)
            .matches(&metadata)
            .unwrap());
    }

    #[test]
    fn test_numeric_ordering() {
        let metadata = sample_metadata();
        assert!(MetadataFilter::new("year", 2000i64, FilterOperator::Gt)
            .matches(&metadata)
            .unwrap());
        assert!(MetadataFilter::new("year", 2021i64, FilterOperator::Gte)
            .matches(&metadata)
            .unwrap());
        assert!(!MetadataFilter::new("year", 2021i64, FilterOperator::Lt)
            .matches(&metadata)
            .unwrap());
        // Ordering on a string field is unsupported
        assert!(MetadataFilter::new("lang", 1i64, FilterOperator::Gt)
            .matches(&metadata)
            .is_err());
    }

    #[test]
    fn test_in_and_contains() {
        let metadata = sample_metadata();
        let in_filter = MetadataFilter::new(
            "lang",
            MetadataValue::list(vec!["en".into(), "fr".into()]).unwrap(),
            FilterOperator::In,
        );
        assert!(in_filter.matches(&metadata).unwrap());

        let contains_list = MetadataFilter::new("tags", "rust", FilterOperator::Contains);
        assert!(contains_list.matches(&metadata).unwrap());

        let contains_str = MetadataFilter::new("lang", "e", FilterOperator::Contains);
        assert!(contains_str.matches(&metadata).unwrap());
    }

    #[test]
    fn test_and_or_conditions() {
        let metadata = sample_metadata();
        let both = MetadataFilters::all(vec![
            MetadataFilter::eq("lang", "en"),
            MetadataFilter::new("year", 2000i64, FilterOperator::Gt),
        ]);
        assert!(both.matches(&metadata).unwrap());

        let either = MetadataFilters::any(vec![
            MetadataFilter::eq("lang", "fr"),
            MetadataFilter::eq("lang", "en"),
        ]);
        assert!(either.matches(&metadata).unwrap());

        let neither = MetadataFilters::all(vec![
            MetadataFilter::eq("lang", "fr"),
            MetadataFilter::eq("lang", "en"),
        ]);
        assert!(!neither.matches(&metadata).unwrap());

        // vacuous cases: an empty conjunction matches, an empty
        // disjunction does not
        assert!(MetadataFilters::all(vec![]).matches(&metadata).unwrap());
        assert!(!MetadataFilters::any(vec![]).matches(&metadata).unwrap());
    }
}
