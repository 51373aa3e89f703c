//! Records, shared record handles and the per-record relation cache.
//!
//! A [`Record`] owns its attribute row and a [`RelationCache`]. Records are
//! shared through [`RecordRef`] (an `Arc<RwLock<Record>>`), so the same
//! target record linked to several owners is one instance, and inverse
//! relations can point back at the exact owner instance.
//!
//! Inverse back-pointers are weak ([`Related::BackRef`]) so an owner and
//! its targets do not keep each other alive.

use crate::schema::RecordType;
use ormlink_core::{KeyValue, LinkKey, Row, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

// ============================================================================
// Relation values
// ============================================================================

/// One related item.
#[derive(Debug, Clone)]
pub enum Related {
    /// A record instance
    Record(RecordRef),
    /// A weak pointer to an owner, set by inverse population
    BackRef(WeakRecordRef),
    /// A plain row (array mode)
    Row(Row),
}

impl Related {
    /// The record behind this item, if it is (or still points at) one.
    pub fn record(&self) -> Option<RecordRef> {
        match self {
            Related::Record(r) => Some(r.clone()),
            Related::BackRef(w) => w.upgrade(),
            Related::Row(_) => None,
        }
    }

    /// The plain row, in array mode.
    pub fn row(&self) -> Option<&Row> {
        match self {
            Related::Row(row) => Some(row),
            _ => None,
        }
    }

    /// Attribute values of this item.
    ///
    /// A back-reference whose owner has been dropped yields an empty row.
    pub fn attributes(&self) -> Row {
        match self {
            Related::Record(r) => r.attributes(),
            Related::BackRef(w) => w.upgrade().map_or_else(Row::empty, |r| r.attributes()),
            Related::Row(row) => row.clone(),
        }
    }

    pub fn is_back_reference(&self) -> bool {
        matches!(self, Related::BackRef(_))
    }

    /// False for a back-reference whose record has been dropped.
    pub fn is_live(&self) -> bool {
        match self {
            Related::BackRef(w) => w.upgrade().is_some(),
            Related::Record(_) | Related::Row(_) => true,
        }
    }

    fn json(&self, path: &mut Vec<RecordRef>) -> serde_json::Value {
        match self {
            Related::Record(r) => r.json(path),
            // Back-references render flat; following them would cycle.
            Related::BackRef(_) | Related::Row(_) => {
                serde_json::Value::Object(self.attributes().to_json())
            }
        }
    }
}

/// A `Many` result keyed by an index attribute or function.
///
/// Keys keep first-insertion order; inserting an existing key replaces its
/// item in place (last write wins).
#[derive(Debug, Clone, Default)]
pub struct IndexedRelation {
    entries: Vec<(Value, Related)>,
    positions: HashMap<KeyValue, usize>,
}

impl IndexedRelation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item, returning the item it replaced.
    pub fn insert(&mut self, key: Value, item: Related) -> Option<Related> {
        match self.positions.get(&KeyValue::new(key.clone())) {
            Some(&idx) => Some(std::mem::replace(&mut self.entries[idx].1, item)),
            None => {
                self.positions
                    .insert(KeyValue::new(key.clone()), self.entries.len());
                self.entries.push((key, item));
                None
            }
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Related> {
        self.positions
            .get(&KeyValue::new(key.clone()))
            .map(|&idx| &self.entries[idx].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Related> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Related)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

/// The resolved value of one relation for one owner.
#[derive(Debug, Clone)]
pub enum RelationValue {
    /// `One` relation: the first match, or none
    One(Option<Related>),
    /// `Many` relation: all matches in order (empty, never missing)
    Many(Vec<Related>),
    /// `Many` relation with an index
    Indexed(IndexedRelation),
}

impl RelationValue {
    /// Items in order.
    pub fn items(&self) -> Vec<&Related> {
        match self {
            RelationValue::One(item) => item.iter().collect(),
            RelationValue::Many(items) => items.iter().collect(),
            RelationValue::Indexed(indexed) => indexed.values().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RelationValue::One(item) => usize::from(item.is_some()),
            RelationValue::Many(items) => items.len(),
            RelationValue::Indexed(indexed) => indexed.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single item of a `One` relation.
    pub fn one(&self) -> Option<&Related> {
        match self {
            RelationValue::One(item) => item.as_ref(),
            _ => None,
        }
    }

    /// The keyed view of an indexed relation.
    pub fn indexed(&self) -> Option<&IndexedRelation> {
        match self {
            RelationValue::Indexed(indexed) => Some(indexed),
            _ => None,
        }
    }

    /// Whether every back-reference in the value still points at a live
    /// record.
    pub fn is_live(&self) -> bool {
        self.items().into_iter().all(Related::is_live)
    }

    /// Record instances, in order. Plain rows are skipped.
    pub fn records(&self) -> Vec<RecordRef> {
        self.items().into_iter().filter_map(Related::record).collect()
    }

    /// Attribute rows of all items, in order.
    pub fn rows(&self) -> Vec<Row> {
        self.items().into_iter().map(Related::attributes).collect()
    }

    /// Render as JSON: `null`/object for `One`, array for `Many`, object
    /// keyed by the index for `Indexed`.
    pub fn to_json(&self) -> serde_json::Value {
        self.json(&mut Vec::new())
    }

    fn json(&self, path: &mut Vec<RecordRef>) -> serde_json::Value {
        match self {
            RelationValue::One(None) => serde_json::Value::Null,
            RelationValue::One(Some(item)) => item.json(path),
            RelationValue::Many(items) => {
                serde_json::Value::Array(items.iter().map(|i| i.json(path)).collect())
            }
            RelationValue::Indexed(indexed) => serde_json::Value::Object(
                indexed
                    .iter()
                    .map(|(k, v)| (index_key_string(k), v.json(path)))
                    .collect(),
            ),
        }
    }
}

fn index_key_string(key: &Value) -> String {
    match key.to_json() {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

// ============================================================================
// Relation cache
// ============================================================================

/// Per-record relation state. Presence of an entry means "populated",
/// whatever the value (an empty `Many` is populated).
#[derive(Debug, Clone, Default)]
pub struct RelationCache {
    entries: HashMap<String, RelationValue>,
}

impl RelationCache {
    pub fn get(&self, name: &str) -> Option<&RelationValue> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: RelationValue) -> Option<RelationValue> {
        self.entries.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<RelationValue> {
        self.entries.remove(name)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

// ============================================================================
// Record
// ============================================================================

/// A record: its type, attribute row and relation cache.
pub struct Record {
    record_type: Arc<RecordType>,
    attributes: Row,
    relations: RelationCache,
}

impl Record {
    pub fn new(record_type: Arc<RecordType>, attributes: Row) -> Self {
        Self {
            record_type,
            attributes,
            relations: RelationCache::default(),
        }
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get_by_name(attribute)
    }

    /// Primary key, or `None` when any component is NULL or missing.
    pub fn primary_key(&self) -> Option<LinkKey> {
        LinkKey::from_row(&self.attributes, self.record_type.primary_key())
    }

    pub fn relations(&self) -> &RelationCache {
        &self.relations
    }

    /// The cached value of a relation.
    ///
    /// An entry whose back-reference outlived its record counts as not
    /// populated, so the next access loads it again.
    pub fn relation(&self, name: &str) -> Option<&RelationValue> {
        self.relations.get(name).filter(|v| v.is_live())
    }

    pub fn is_populated(&self, name: &str) -> bool {
        self.relation(name).is_some()
    }

    /// Store a relation value, marking it populated.
    pub fn populate(&mut self, name: impl Into<String>, value: RelationValue) {
        self.relations.insert(name, value);
    }

    /// Clear one relation entry. Returns whether it was populated.
    pub fn unset(&mut self, name: &str) -> bool {
        self.relations.remove(name).is_some()
    }

    /// Populated relation names: declared ones in declaration order, then
    /// any others by name.
    pub fn populated_relations(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .record_type
            .relations()
            .map(|r| r.name())
            .filter(|n| self.is_populated(n))
            .map(str::to_string)
            .collect();
        let mut extra: Vec<String> = self
            .relations
            .names()
            .filter(|n| !self.record_type.has_relation(n) && self.is_populated(n))
            .map(str::to_string)
            .collect();
        extra.sort();
        names.extend(extra);
        names
    }

    /// Set an attribute. When the value actually changes, every relation
    /// whose owner-side link uses the attribute is cleared.
    ///
    /// Returns the names of the cleared relations.
    pub fn set_attribute(&mut self, attribute: &str, value: Value) -> Vec<String> {
        let old = self
            .attributes
            .get_by_name(attribute)
            .cloned()
            .unwrap_or(Value::Null);
        let changed = KeyValue::new(old) != KeyValue::new(value.clone());
        self.attributes.set(attribute, value);
        if changed {
            self.invalidate(attribute)
        } else {
            Vec::new()
        }
    }

    /// Clear every populated relation whose owner-side link uses
    /// `attribute`. Returns the names of the cleared relations.
    pub fn invalidate(&mut self, attribute: &str) -> Vec<String> {
        let cleared: Vec<String> = self
            .record_type
            .relations_depending_on(attribute)
            .into_iter()
            .filter(|name| self.relations.remove(name).is_some())
            .collect();
        if !cleared.is_empty() {
            tracing::debug!(
                record_type = self.record_type.name(),
                attribute = attribute,
                cleared = ?cleared,
                "Cleared relations after link attribute change"
            );
        }
        cleared
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type", &self.record_type.name())
            .field("attributes", &self.attributes)
            .field("populated", &self.populated_relations())
            .finish()
    }
}

// ============================================================================
// Shared handles
// ============================================================================

/// Shared handle to a record.
#[derive(Clone)]
pub struct RecordRef(Arc<RwLock<Record>>);

/// Weak handle to a record.
#[derive(Clone)]
pub struct WeakRecordRef(Weak<RwLock<Record>>);

impl RecordRef {
    pub fn new(record: Record) -> Self {
        Self(Arc::new(RwLock::new(record)))
    }

    /// Lock for reading. Poisoning is recovered; records hold plain data.
    pub fn read(&self) -> RwLockReadGuard<'_, Record> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Record> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Are both handles the same record instance?
    pub fn ptr_eq(&self, other: &RecordRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared record; equal for handles where `ptr_eq` holds.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }

    pub fn downgrade(&self) -> WeakRecordRef {
        WeakRecordRef(Arc::downgrade(&self.0))
    }

    pub fn record_type(&self) -> Arc<RecordType> {
        Arc::clone(self.read().record_type())
    }

    pub fn type_name(&self) -> String {
        self.read().record_type().name().to_string()
    }

    pub fn get(&self, attribute: &str) -> Option<Value> {
        self.read().get(attribute).cloned()
    }

    pub fn attributes(&self) -> Row {
        self.read().attributes().clone()
    }

    pub fn primary_key(&self) -> Option<LinkKey> {
        self.read().primary_key()
    }

    /// Set an attribute, clearing dependent relations if it changed.
    pub fn set_attribute(&self, attribute: &str, value: impl Into<Value>) -> Vec<String> {
        self.write().set_attribute(attribute, value.into())
    }

    /// The cached value of a relation, if populated.
    pub fn relation(&self, name: &str) -> Option<RelationValue> {
        self.read().relation(name).cloned()
    }

    pub fn is_populated(&self, name: &str) -> bool {
        self.read().is_populated(name)
    }

    pub fn populate(&self, name: &str, value: RelationValue) {
        self.write().populate(name, value);
    }

    pub fn unset(&self, name: &str) -> bool {
        self.write().unset(name)
    }

    pub fn populated_relations(&self) -> Vec<String> {
        self.read().populated_relations()
    }

    /// Render attributes plus every populated relation, recursively.
    ///
    /// A record already being rendered higher up the tree renders as its
    /// attributes only.
    pub fn to_json(&self) -> serde_json::Value {
        self.json(&mut Vec::new())
    }

    fn json(&self, path: &mut Vec<RecordRef>) -> serde_json::Value {
        let (mut object, relations) = {
            let record = self.read();
            let relations: Vec<(String, RelationValue)> = record
                .populated_relations()
                .into_iter()
                .filter_map(|name| record.relation(&name).cloned().map(|v| (name, v)))
                .collect();
            (record.attributes().to_json(), relations)
        };
        if path.iter().any(|p| p.ptr_eq(self)) {
            return serde_json::Value::Object(object);
        }
        path.push(self.clone());
        for (name, value) in relations {
            object.insert(name, value.json(path));
        }
        path.pop();
        serde_json::Value::Object(object)
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Ok(record) => fmt::Debug::fmt(&*record, f),
            Err(_) => f.write_str("RecordRef(<locked>)"),
        }
    }
}

impl WeakRecordRef {
    pub fn upgrade(&self) -> Option<RecordRef> {
        self.0.upgrade().map(RecordRef)
    }
}

impl fmt::Debug for WeakRecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(r) => write!(f, "BackRef({})", r.type_name()),
            None => f.write_str("BackRef(<dropped>)"),
        }
    }
}
