//! Resolver configuration.

#![allow(clippy::result_large_err)]

use ormlink_core::{Dialect, Result};
use serde::{Deserialize, Serialize};

/// Settings for a [`RelationResolver`](crate::RelationResolver).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use ormlink_relations::ResolverConfig;
///
/// let config = ResolverConfig::from_json_str(r#"{ "as_array": true }"#).unwrap();
/// assert!(config.as_array);
/// assert!(config.populate_inverse);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Populate plain attribute rows instead of records.
    pub as_array: bool,
    /// Populate declared inverse relations on linked targets.
    pub populate_inverse: bool,
    /// Warn once a relation has been lazily loaded this many times for one
    /// record type. `None` turns lazy-load tracking off.
    pub n1_threshold: Option<usize>,
    /// Dialect used when rendering SQL for logs.
    pub dialect: Dialect,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            as_array: false,
            populate_inverse: true,
            n1_threshold: Some(3),
            dialect: Dialect::Postgres,
        }
    }
}

impl ResolverConfig {
    /// Parse a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builder-style toggle for array mode.
    pub fn as_array(mut self, as_array: bool) -> Self {
        self.as_array = as_array;
        self
    }

    pub fn populate_inverse(mut self, populate: bool) -> Self {
        self.populate_inverse = populate;
        self
    }

    pub fn n1_threshold(mut self, threshold: Option<usize>) -> Self {
        self.n1_threshold = threshold;
        self
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert!(!config.as_array);
        assert!(config.populate_inverse);
        assert_eq!(config.n1_threshold, Some(3));
        assert_eq!(config.dialect, Dialect::Postgres);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            ResolverConfig::from_json_str(r#"{"n1_threshold": null, "dialect": "sqlite"}"#).unwrap();
        assert_eq!(config.n1_threshold, None);
        assert_eq!(config.dialect, Dialect::Sqlite);
        assert!(config.populate_inverse);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = ResolverConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ormlink_core::Error::Serde(_)));
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = ResolverConfig::default().as_array(true).dialect(Dialect::Mysql);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ResolverConfig::from_json_str(&json).unwrap(), config);
    }
}
