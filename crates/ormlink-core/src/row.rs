//! Named result rows.
//!
//! A `Row` is the unit the query layer hands back: an ordered sequence of
//! named fields. Records keep their attributes in a `Row` as well, so the
//! linker can read owner and target attributes through the same type.

#![allow(clippy::result_large_err)]

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column metadata shared across all rows in a result set.
///
/// This struct is wrapped in `Arc` so all rows from the same query share
/// the same column information, saving memory for large result sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column names in order
    names: Vec<String>,
    /// Name -> index mapping for O(1) lookup
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column names.
    ///
    /// When a name repeats, lookups by name resolve to its first position.
    pub fn new(names: Vec<String>) -> Self {
        let mut name_to_index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            name_to_index.entry(name.clone()).or_insert(i);
        }
        Self {
            names,
            name_to_index,
        }
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Check if a column exists.
    pub fn contains(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// Get all column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    fn push(&mut self, name: String) -> usize {
        let idx = self.names.len();
        self.name_to_index.entry(name.clone()).or_insert(idx);
        self.names.push(name);
        idx
    }
}

/// A single row of named values.
///
/// Rows provide both index-based and name-based access to column values.
/// Column metadata is shared via `Arc`; it is copied on write only when a
/// new column is added through [`Row::set`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column values in order
    values: Vec<Value>,
    /// Shared column metadata
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given columns and values.
    ///
    /// For multiple rows from the same result set, prefer `with_columns`
    /// to share the column metadata.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Build a row from `(name, value)` pairs, preserving their order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (names, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(names, values)
    }

    /// An empty row.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Get the shared column metadata.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Get the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if this row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Check if a column exists by name.
    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    /// Set a value by column name, appending the column if it is new.
    ///
    /// Returns the previous value, if the column existed.
    pub fn set(&mut self, name: &str, value: Value) -> Option<Value> {
        if let Some(idx) = self.columns.index_of(name) {
            return Some(std::mem::replace(&mut self.values[idx], value));
        }
        Arc::make_mut(&mut self.columns).push(name.to_string());
        self.values.push(value);
        None
    }

    /// Get a typed value by column name.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get_by_name(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("column '{}' not found", name),
                column: Some(name.to_string()),
            })
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    /// Get all column names.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    /// Iterate over all values.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Iterate over (column_name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Render the row as a JSON object.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect()
    }
}

/// Trait for converting from a `Value` to a typed value.
pub trait FromValue: Sized {
    /// Convert from a Value, returning an error if the conversion fails.
    fn from_value(value: &Value) -> Result<Self>;
}

fn type_mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
    })
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| type_mismatch("bool", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| type_mismatch("i32", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| type_mismatch("i64", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| type_mismatch("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| type_mismatch("String", value))
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_by_name() {
        let row = Row::from_pairs([("id", Value::BigInt(1)), ("name", Value::from("Ann"))]);
        assert_eq!(row.get_by_name("id"), Some(&Value::BigInt(1)));
        assert_eq!(row.get_by_name("missing"), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_row_set_replaces_existing_column() {
        let mut row = Row::from_pairs([("id", 1_i64)]);
        let previous = row.set("id", Value::BigInt(2));
        assert_eq!(previous, Some(Value::BigInt(1)));
        assert_eq!(row.get_by_name("id"), Some(&Value::BigInt(2)));
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn test_row_set_appends_without_touching_shared_columns() {
        let first = Row::from_pairs([("id", 1_i64)]);
        let mut second = Row::with_columns(first.column_info(), vec![Value::BigInt(2)]);
        assert!(second.set("extra", Value::Bool(true)).is_none());
        assert!(second.contains_column("extra"));
        assert!(!first.contains_column("extra"));
    }

    #[test]
    fn test_get_named_reports_column() {
        let row = Row::from_pairs([("name", Value::from("x"))]);
        let err = row.get_named::<i64>("name").unwrap_err();
        assert!(err.to_string().contains("name"));
        let missing = row.get_named::<i64>("nope").unwrap_err();
        assert!(missing.to_string().contains("not found"));
    }

    #[test]
    fn test_get_named_optional_null() {
        let row = Row::from_pairs([("parent_id", Value::Null)]);
        let v: Option<i64> = row.get_named("parent_id").unwrap();
        assert_eq!(v, None);
    }

    #[test]
    fn test_row_to_json_preserves_names() {
        let row = Row::from_pairs([("id", Value::Int(3)), ("tag", Value::from("t"))]);
        let json = serde_json::Value::Object(row.to_json());
        assert_eq!(json, serde_json::json!({"id": 3, "tag": "t"}));
    }
}
