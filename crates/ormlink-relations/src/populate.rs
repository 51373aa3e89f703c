//! Turning fetched rows into relation values.

#![allow(clippy::result_large_err)]

use crate::model::Model;
use crate::record::{IndexedRelation, Record, RecordRef, Related, RelationValue};
use crate::relationship::{IndexBy, Multiplicity};
use crate::schema::RecordType;
use ormlink_core::{ConfigErrorKind, Error, Result, Row};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builds the items of a relation from raw rows.
///
/// In record mode every row becomes a fresh [`RecordRef`]; in array mode
/// the row itself is the item. Either way the original row is kept next to
/// the item so link keys can be read without locking records.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultPopulator {
    as_array: bool,
}

impl ResultPopulator {
    pub fn new(as_array: bool) -> Self {
        Self { as_array }
    }

    pub fn records() -> Self {
        Self::new(false)
    }

    pub fn arrays() -> Self {
        Self::new(true)
    }

    pub fn is_array(&self) -> bool {
        self.as_array
    }

    /// Build one item per row, in row order.
    pub fn populate(&self, record_type: &Arc<RecordType>, rows: Vec<Row>) -> Vec<(Row, Related)> {
        rows.into_iter()
            .map(|row| {
                let item = if self.as_array {
                    Related::Row(row.clone())
                } else {
                    Related::Record(RecordRef::new(Record::new(
                        Arc::clone(record_type),
                        row.clone(),
                    )))
                };
                (row, item)
            })
            .collect()
    }

    /// Shape matched items into a relation value.
    ///
    /// `One` keeps the first item and drops the rest. `Many` keeps all items
    /// in order, or keys them through `index_by` when set, later items
    /// replacing earlier ones with the same key.
    pub fn collect(
        items: Vec<Related>,
        multiplicity: Multiplicity,
        index_by: Option<&IndexBy>,
    ) -> RelationValue {
        match multiplicity {
            Multiplicity::One => {
                if items.len() > 1 {
                    tracing::trace!(
                        matches = items.len(),
                        "Single-valued relation matched several rows; keeping the first"
                    );
                }
                RelationValue::One(items.into_iter().next())
            }
            Multiplicity::Many => match index_by {
                None => RelationValue::Many(items),
                Some(index) => {
                    let mut indexed = IndexedRelation::new();
                    for item in items {
                        let key = index.key_for(&item.attributes());
                        indexed.insert(key, item);
                    }
                    RelationValue::Indexed(indexed)
                }
            },
        }
    }
}

/// Decode every item of a relation value as `M`.
pub fn models<M: Model>(value: &RelationValue) -> Result<Vec<M>> {
    value
        .items()
        .into_iter()
        .map(|item| M::from_row(&item.attributes()))
        .collect()
}

/// Point every linked target back at its owners through `inverse`.
///
/// Owners are attached as weak back-references, each owner at most once
/// per target, in owner order.
pub(crate) fn populate_inverse(
    owner_type: &RecordType,
    owners: &[RecordRef],
    per_owner: &[Vec<Related>],
    target_type: &RecordType,
    inverse: &str,
) -> Result<usize> {
    let inverse_relation = target_type.relation(inverse)?;
    if inverse_relation.target() != owner_type.name() {
        return Err(Error::config(
            ConfigErrorKind::TargetTypeMismatch,
            format!(
                "inverse relation '{}.{}' targets '{}', expected '{}'",
                target_type.name(),
                inverse,
                inverse_relation.target(),
                owner_type.name()
            ),
        ));
    }

    let mut targets: Vec<RecordRef> = Vec::new();
    let mut back_refs: HashMap<usize, Vec<Related>> = HashMap::new();
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    for (owner, items) in owners.iter().zip(per_owner) {
        for target in items.iter().filter_map(|item| match item {
            Related::Record(r) => Some(r),
            _ => None,
        }) {
            if !seen.insert((target.identity(), owner.identity())) {
                continue;
            }
            let entry = back_refs.entry(target.identity()).or_insert_with(|| {
                targets.push(target.clone());
                Vec::new()
            });
            entry.push(Related::BackRef(owner.downgrade()));
        }
    }

    for target in &targets {
        let items = back_refs.remove(&target.identity()).unwrap_or_default();
        let value = ResultPopulator::collect(
            items,
            inverse_relation.multiplicity(),
            inverse_relation.index(),
        );
        target.populate(inverse, value);
    }
    Ok(targets.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlink_core::Value;

    fn item_type() -> Arc<RecordType> {
        Arc::new(RecordType::builder("Item").build())
    }

    fn rows() -> Vec<Row> {
        vec![
            Row::from_pairs([("id", Value::BigInt(1)), ("sku", Value::from("a"))]),
            Row::from_pairs([("id", Value::BigInt(2)), ("sku", Value::from("b"))]),
            Row::from_pairs([("id", Value::BigInt(3)), ("sku", Value::from("a"))]),
        ]
    }

    fn items(populator: ResultPopulator) -> Vec<Related> {
        populator
            .populate(&item_type(), rows())
            .into_iter()
            .map(|(_, item)| item)
            .collect()
    }

    #[test]
    fn test_record_mode_builds_records() {
        let items = items(ResultPopulator::records());
        assert_eq!(items.len(), 3);
        let record = items[0].record().unwrap();
        assert_eq!(record.type_name(), "Item");
        assert_eq!(record.get("sku"), Some(Value::from("a")));
    }

    #[test]
    fn test_array_mode_keeps_rows() {
        let items = items(ResultPopulator::arrays());
        assert!(items.iter().all(|i| i.row().is_some()));
        assert!(items[0].record().is_none());
    }

    #[test]
    fn test_one_keeps_first() {
        let value = ResultPopulator::collect(items(ResultPopulator::arrays()), Multiplicity::One, None);
        assert_eq!(value.len(), 1);
        assert_eq!(
            value.one().unwrap().attributes().get_by_name("id"),
            Some(&Value::BigInt(1))
        );
    }

    #[test]
    fn test_one_without_rows_is_none() {
        let value = ResultPopulator::collect(Vec::new(), Multiplicity::One, None);
        assert!(matches!(value, RelationValue::One(None)));
    }

    #[test]
    fn test_many_without_rows_is_empty_not_missing() {
        let value = ResultPopulator::collect(Vec::new(), Multiplicity::Many, None);
        assert!(matches!(&value, RelationValue::Many(v) if v.is_empty()));
    }

    #[test]
    fn test_index_by_attribute_last_write_wins() {
        let index = IndexBy::attribute("sku");
        let value =
            ResultPopulator::collect(items(ResultPopulator::arrays()), Multiplicity::Many, Some(&index));
        let indexed = value.indexed().unwrap();
        assert_eq!(indexed.len(), 2);
        assert_eq!(
            indexed.get(&Value::from("a")).unwrap().attributes().get_by_name("id"),
            Some(&Value::BigInt(3))
        );
    }

    #[test]
    fn test_index_by_function() {
        let index = IndexBy::function(|row| {
            Value::BigInt(row.get_by_name("id").and_then(Value::as_i64).unwrap_or(0) * 10)
        });
        let value =
            ResultPopulator::collect(items(ResultPopulator::arrays()), Multiplicity::Many, Some(&index));
        let keys: Vec<_> = value.indexed().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec![Value::BigInt(10), Value::BigInt(20), Value::BigInt(30)]);
    }

    struct Item {
        id: i64,
    }

    impl Model for Item {
        const RECORD_TYPE: &'static str = "Item";

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                id: row.get_named("id")?,
            })
        }
    }

    #[test]
    fn test_models_decode_in_order() {
        let value =
            ResultPopulator::collect(items(ResultPopulator::records()), Multiplicity::Many, None);
        let ids: Vec<i64> = models::<Item>(&value).unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
