//! SQL dialects, identifier quoting and identifier validation.

#![allow(clippy::result_large_err)]

use crate::error::{ConfigErrorKind, Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// SQL dialect used when rendering queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are escaped by doubling them.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => quote_ident(name),
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
        }
    }
}

/// Quote a SQL identifier using ANSI double-quoting.
///
/// # Examples
///
/// ```
/// use ormlink_core::quote_ident;
///
/// assert_eq!(quote_ident("orders"), "\"orders\"");
/// assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn identifier_regex() -> Option<&'static Regex> {
    static IDENT: OnceLock<Option<Regex>> = OnceLock::new();
    IDENT
        .get_or_init(|| match Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$") {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(error = %e, "identifier pattern failed to compile");
                None
            }
        })
        .as_ref()
}

/// Check whether `name` is a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`).
///
/// Relation names, attribute names, path segments and join aliases all use
/// this rule.
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_regex().is_some_and(|re| re.is_match(name))
}

/// Validate an identifier, naming what it is in the error.
pub fn validate_identifier(what: &str, name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::config(
            ConfigErrorKind::InvalidIdentifier,
            format!("{what} '{name}' is not a valid identifier"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_per_dialect() {
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
        assert_eq!(Dialect::Sqlite.placeholder(2), "?2");
        assert_eq!(Dialect::Mysql.placeholder(2), "?");
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(Dialect::Postgres.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::Mysql.quote_identifier("a`b"), "`a``b`");
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("orders"));
        assert!(is_valid_identifier("_order_items2"));
        assert!(!is_valid_identifier("2orders"));
        assert!(!is_valid_identifier("orders.items"));
        assert!(!is_valid_identifier(""));

        let err = validate_identifier("alias", "bad alias").unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidIdentifier));
    }

    #[test]
    fn test_dialect_deserializes_lowercase() {
        let d: Dialect = serde_json::from_str("\"sqlite\"").unwrap();
        assert_eq!(d, Dialect::Sqlite);
    }
}
