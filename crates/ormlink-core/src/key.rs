//! Hashable link keys.
//!
//! Owner and target rows are matched by comparing the tuple of values they
//! carry for a link's attributes. `Value` itself cannot be a hash key (it
//! holds floats), so keys are built from [`KeyValue`], which normalizes
//! numeric widths and hashes floats by their bit pattern.
//!
//! A key is never built from a tuple containing NULL: absence of a value is
//! not a wildcard and must never match anything, not even another NULL.

use crate::row::Row;
use crate::value::Value;
use std::hash::{Hash, Hasher};

/// A scalar value normalized for use as a hash key.
#[derive(Debug, Clone)]
pub struct KeyValue(Value);

impl KeyValue {
    /// Normalize a value for hashing.
    ///
    /// Integer widths collapse to `BigInt` and `Float` widens to `Double`,
    /// so the same logical number declared with different column types on
    /// the two sides of a link still matches. A finite float with no
    /// fractional part that fits in `i64` becomes `BigInt` too, so `7.0`
    /// matches `7` and `-0.0` matches `0.0`, as they do in SQL.
    pub fn new(value: Value) -> Self {
        let normalized = match value {
            Value::TinyInt(v) => Value::BigInt(i64::from(v)),
            Value::SmallInt(v) => Value::BigInt(i64::from(v)),
            Value::Int(v) => Value::BigInt(i64::from(v)),
            Value::Float(v) => normalize_float(f64::from(v)),
            Value::Double(v) => normalize_float(v),
            other => other,
        };
        Self(normalized)
    }

    /// The normalized value.
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Consume and return the normalized value.
    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// NULL and NaN never equal anything, so a key holding either matches
    /// nothing.
    pub fn is_unmatchable(&self) -> bool {
        match &self.0 {
            Value::Double(v) => v.is_nan(),
            other => other.is_null(),
        }
    }
}

// i64::MIN and 2^63 are both exact in f64.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

fn normalize_float(v: f64) -> Value {
    if v.is_finite() && v.fract() == 0.0 && (I64_LOWER..I64_UPPER).contains(&v) {
        #[allow(clippy::cast_possible_truncation)]
        Value::BigInt(v as i64)
    } else {
        Value::Double(v)
    }
}

impl From<Value> for KeyValue {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl Eq for KeyValue {}

impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

fn hash_value<H: Hasher>(v: &Value, hasher: &mut H) {
    match v {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::TinyInt(i) => {
            2u8.hash(hasher);
            i.hash(hasher);
        }
        Value::SmallInt(i) => {
            3u8.hash(hasher);
            i.hash(hasher);
        }
        Value::Int(i) => {
            4u8.hash(hasher);
            i.hash(hasher);
        }
        Value::BigInt(i) => {
            5u8.hash(hasher);
            i.hash(hasher);
        }
        Value::Float(f) => {
            6u8.hash(hasher);
            f.to_bits().hash(hasher);
        }
        Value::Double(f) => {
            7u8.hash(hasher);
            f.to_bits().hash(hasher);
        }
        Value::Decimal(s) => {
            8u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Text(s) => {
            9u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Bytes(b) => {
            10u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Date(d) => {
            11u8.hash(hasher);
            d.hash(hasher);
        }
        Value::Timestamp(ts) => {
            12u8.hash(hasher);
            ts.hash(hasher);
        }
        Value::Uuid(u) => {
            13u8.hash(hasher);
            u.hash(hasher);
        }
        Value::Json(j) => {
            14u8.hash(hasher);
            j.to_string().hash(hasher);
        }
    }
}

/// An ordered tuple of key values extracted from a row for one side of a link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkKey(Vec<KeyValue>);

impl LinkKey {
    /// Build a key from raw values.
    ///
    /// Returns `None` when the tuple is empty or any component is NULL
    /// or NaN.
    pub fn new(values: impl IntoIterator<Item = Value>) -> Option<Self> {
        let parts: Vec<KeyValue> = values.into_iter().map(KeyValue::new).collect();
        if parts.is_empty() || parts.iter().any(KeyValue::is_unmatchable) {
            return None;
        }
        Some(Self(parts))
    }

    /// Extract the key for `attributes` from a row.
    ///
    /// A missing attribute is treated like NULL.
    pub fn from_row<S: AsRef<str>>(row: &Row, attributes: &[S]) -> Option<Self> {
        let mut parts = Vec::with_capacity(attributes.len());
        for attr in attributes {
            let part = KeyValue::new(row.get_by_name(attr.as_ref())?.clone());
            if part.is_unmatchable() {
                return None;
            }
            parts.push(part);
        }
        if parts.is_empty() {
            return None;
        }
        Some(Self(parts))
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The normalized component values, in link order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().map(KeyValue::value)
    }

    /// Clone the component values out, e.g. for an `IN` filter.
    pub fn to_values(&self) -> Vec<Value> {
        self.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_integer_widths_match() {
        let a = LinkKey::new([Value::Int(1)]).unwrap();
        let b = LinkKey::new([Value::BigInt(1)]).unwrap();
        assert_eq!(a, b);

        let mut map = HashMap::new();
        map.insert(a, "hit");
        assert_eq!(map.get(&b), Some(&"hit"));
    }

    #[test]
    fn test_text_does_not_match_integer() {
        let a = LinkKey::new([Value::BigInt(42)]).unwrap();
        let b = LinkKey::new([Value::Text("42".into())]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_null_component_produces_no_key() {
        assert!(LinkKey::new([Value::Null]).is_none());
        assert!(LinkKey::new([Value::BigInt(1), Value::Null]).is_none());
        assert!(LinkKey::new(Vec::new()).is_none());
    }

    #[test]
    fn test_from_row_composite_and_missing() {
        let row = Row::from_pairs([("dept_id", 3_i64), ("emp_id", 9_i64)]);
        let key = LinkKey::from_row(&row, &["dept_id", "emp_id"]).unwrap();
        assert_eq!(key.len(), 2);
        assert_eq!(key.to_values(), vec![Value::BigInt(3), Value::BigInt(9)]);
        assert!(LinkKey::from_row(&row, &["dept_id", "missing"]).is_none());
    }

    #[test]
    fn test_composite_key_order_matters() {
        let a = LinkKey::new([Value::BigInt(1), Value::BigInt(2)]).unwrap();
        let b = LinkKey::new([Value::BigInt(2), Value::BigInt(1)]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_float_keys_compare_by_bits() {
        let a = KeyValue::new(Value::Float(1.5));
        let b = KeyValue::new(Value::Double(1.5));
        assert_eq!(a, b);
        assert_ne!(KeyValue::new(Value::Double(1.5)), KeyValue::new(Value::BigInt(1)));
    }

    #[test]
    fn test_integral_floats_match_integers() {
        let int = LinkKey::new([Value::Int(7)]).unwrap();
        let double = LinkKey::new([Value::Double(7.0)]).unwrap();
        assert_eq!(int, double);

        let mut map = HashMap::new();
        map.insert(int, "hit");
        assert_eq!(map.get(&double), Some(&"hit"));
    }

    #[test]
    fn test_signed_zero_is_one_key() {
        let pos = LinkKey::new([Value::Double(0.0)]).unwrap();
        let neg = LinkKey::new([Value::Double(-0.0)]).unwrap();
        assert_eq!(pos, neg);
    }

    #[test]
    fn test_nan_produces_no_key() {
        assert!(LinkKey::new([Value::Double(f64::NAN)]).is_none());
        let row = Row::from_pairs([("score", Value::Double(f64::NAN))]);
        assert!(LinkKey::from_row(&row, &["score"]).is_none());
    }

    #[test]
    fn test_huge_floats_stay_floats() {
        let key = KeyValue::new(Value::Double(1e300));
        assert_eq!(key.value(), &Value::Double(1e300));
    }
}
