//! Core types for ormlink.
//!
//! This crate provides the foundations shared by the query collaborator and
//! the relation engine:
//!
//! - `Value` for dynamically-typed attribute values
//! - `Row` for ordered, named result rows (the unit the query layer returns)
//! - `LinkKey` / `KeyValue` for hash-based matching of owner and target rows
//! - `Dialect` and identifier helpers
//! - `Error` / `Result`

pub mod error;
pub mod identifiers;
pub mod key;
pub mod row;
pub mod value;

pub use error::{
    ConfigError, ConfigErrorKind, ConnectionError, ConnectionErrorKind, Error, QueryError,
    QueryErrorKind, Result, TypeError,
};
pub use identifiers::{Dialect, is_valid_identifier, quote_ident, validate_identifier};
pub use key::{KeyValue, LinkKey};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
