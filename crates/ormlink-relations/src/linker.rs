//! In-memory matching of fetched targets to their owners.
//!
//! Targets are indexed once by their link key; every owner (or junction
//! row) then costs one hash lookup. Keys containing NULL are never indexed
//! and never looked up, so NULL never matches NULL.

use crate::populate::ResultPopulator;
use crate::record::{Related, RelationValue};
use crate::relationship::{IndexBy, LinkPair, Multiplicity};
use ormlink_core::{LinkKey, Row};
use std::collections::HashMap;

/// A hash index over candidate targets.
#[derive(Debug)]
pub struct RelationLinker {
    candidates: Vec<(Row, Related)>,
    index: HashMap<LinkKey, Vec<usize>>,
}

impl RelationLinker {
    /// Index `candidates` by the values of `key_attributes` in their rows.
    pub fn new(candidates: Vec<(Row, Related)>, key_attributes: &[impl AsRef<str>]) -> Self {
        let mut index: HashMap<LinkKey, Vec<usize>> = HashMap::new();
        for (position, (row, _)) in candidates.iter().enumerate() {
            if let Some(key) = LinkKey::from_row(row, key_attributes) {
                index.entry(key).or_default().push(position);
            }
        }
        tracing::trace!(
            candidates = candidates.len(),
            distinct_keys = index.len(),
            "Indexed relation candidates"
        );
        Self { candidates, index }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates whose key equals the key `attributes` give in `row`, in
    /// candidate order.
    pub fn matches(&self, row: &Row, attributes: &[impl AsRef<str>]) -> Vec<Related> {
        LinkKey::from_row(row, attributes)
            .and_then(|key| self.index.get(&key))
            .map(|positions| {
                positions
                    .iter()
                    .map(|&p| self.candidates[p].1.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Match every owner row directly.
    pub fn link(&self, owners: &[Row], owner_attributes: &[impl AsRef<str>]) -> Vec<Vec<Related>> {
        owners
            .iter()
            .map(|owner| self.matches(owner, owner_attributes))
            .collect()
    }

    /// Match through junction rows.
    ///
    /// For each owner its junction rows are walked in their own order and
    /// every match is appended once per junction row, so the result follows
    /// junction order rather than the order targets were fetched in.
    pub fn link_through(
        &self,
        junctions_per_owner: &[Vec<Row>],
        junction_attributes: &[impl AsRef<str>],
    ) -> Vec<Vec<Related>> {
        junctions_per_owner
            .iter()
            .map(|junctions| {
                junctions
                    .iter()
                    .flat_map(|junction| self.matches(junction, junction_attributes))
                    .collect()
            })
            .collect()
    }
}

/// Junction rows for [`link`]: the rows plus the owner-to-junction link
/// (`local` = owner attribute, `remote` = junction attribute).
#[derive(Debug, Clone, Copy)]
pub struct Junction<'a> {
    pub rows: &'a [Row],
    pub owner_link: &'a [LinkPair],
}

/// Link already fetched targets to owners and shape one value per owner.
///
/// Without a junction, `target_link` pairs owner attributes with target
/// attributes. With one, it pairs junction attributes with target
/// attributes and the junction's own link connects owners to junction rows.
///
/// ```
/// use ormlink_core::{Row, Value};
/// use ormlink_relations::{LinkPair, Multiplicity, Related, link};
///
/// let owners = vec![Row::from_pairs([("id", 1_i64)])];
/// let targets = vec![
///     Row::from_pairs([("id", 10_i64), ("owner_id", 1_i64)]),
///     Row::from_pairs([("id", 11_i64), ("owner_id", 2_i64)]),
/// ];
/// let candidates = targets.into_iter().map(|r| (r.clone(), Related::Row(r))).collect();
/// let values = link(
///     &owners,
///     candidates,
///     &[LinkPair::new("id", "owner_id")],
///     None,
///     Multiplicity::Many,
///     None,
/// );
/// assert_eq!(values[0].len(), 1);
/// ```
pub fn link(
    owners: &[Row],
    targets: Vec<(Row, Related)>,
    target_link: &[LinkPair],
    junction: Option<Junction<'_>>,
    multiplicity: Multiplicity,
    index_by: Option<&IndexBy>,
) -> Vec<RelationValue> {
    let local: Vec<&str> = target_link.iter().map(|p| p.local.as_str()).collect();
    let remote: Vec<&str> = target_link.iter().map(|p| p.remote.as_str()).collect();
    let linker = RelationLinker::new(targets, &remote);

    let per_owner = match junction {
        None => linker.link(owners, &local),
        Some(junction) => {
            let owner_attrs: Vec<&str> = junction.owner_link.iter().map(|p| p.local.as_str()).collect();
            let junction_attrs: Vec<&str> =
                junction.owner_link.iter().map(|p| p.remote.as_str()).collect();
            let junction_linker = RelationLinker::new(
                junction
                    .rows
                    .iter()
                    .map(|r| (r.clone(), Related::Row(r.clone())))
                    .collect(),
                &junction_attrs,
            );
            let junctions: Vec<Vec<Row>> = junction_linker
                .link(owners, &owner_attrs)
                .into_iter()
                .map(|items| items.iter().map(Related::attributes).collect())
                .collect();
            linker.link_through(&junctions, &local)
        }
    };

    per_owner
        .into_iter()
        .map(|items| ResultPopulator::collect(items, multiplicity, index_by))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlink_core::Value;

    fn row(pairs: &[(&str, Value)]) -> Row {
        Row::from_pairs(pairs.iter().cloned())
    }

    fn candidates(rows: Vec<Row>) -> Vec<(Row, Related)> {
        rows.into_iter().map(|r| (r.clone(), Related::Row(r))).collect()
    }

    fn ids(value: &RelationValue) -> Vec<i64> {
        value
            .rows()
            .iter()
            .filter_map(|r| r.get_by_name("id").and_then(Value::as_i64))
            .collect()
    }

    #[test]
    fn test_direct_link_preserves_target_order() {
        let owners = vec![row(&[("id", Value::BigInt(1))]), row(&[("id", Value::BigInt(2))])];
        let targets = candidates(vec![
            row(&[("id", Value::BigInt(12)), ("owner_id", Value::BigInt(1))]),
            row(&[("id", Value::BigInt(20)), ("owner_id", Value::BigInt(2))]),
            row(&[("id", Value::BigInt(11)), ("owner_id", Value::BigInt(1))]),
        ]);
        let values = link(
            &owners,
            targets,
            &[LinkPair::new("id", "owner_id")],
            None,
            Multiplicity::Many,
            None,
        );
        assert_eq!(ids(&values[0]), vec![12, 11]);
        assert_eq!(ids(&values[1]), vec![20]);
    }

    #[test]
    fn test_null_owner_key_matches_nothing() {
        let owners = vec![row(&[("id", Value::BigInt(1)), ("group_id", Value::Null)])];
        let targets = candidates(vec![row(&[("id", Value::BigInt(5)), ("group_id", Value::Null)])]);
        let values = link(
            &owners,
            targets,
            &[LinkPair::new("group_id", "group_id")],
            None,
            Multiplicity::Many,
            None,
        );
        assert!(values[0].is_empty());
    }

    #[test]
    fn test_integer_widths_match() {
        let owners = vec![row(&[("id", Value::Int(7))])];
        let targets = candidates(vec![row(&[("id", Value::BigInt(1)), ("owner_id", Value::BigInt(7))])]);
        let values = link(
            &owners,
            targets,
            &[LinkPair::new("id", "owner_id")],
            None,
            Multiplicity::One,
            None,
        );
        assert_eq!(values[0].len(), 1);
    }

    #[test]
    fn test_text_does_not_match_integer() {
        let owners = vec![row(&[("id", Value::from("7"))])];
        let targets = candidates(vec![row(&[("id", Value::BigInt(1)), ("owner_id", Value::BigInt(7))])]);
        let values = link(
            &owners,
            targets,
            &[LinkPair::new("id", "owner_id")],
            None,
            Multiplicity::One,
            None,
        );
        assert!(matches!(values[0], RelationValue::One(None)));
    }

    #[test]
    fn test_junction_order_wins() {
        let owners = vec![row(&[("id", Value::BigInt(1))])];
        let junction_rows = vec![
            row(&[("order_id", Value::BigInt(1)), ("item_id", Value::BigInt(5))]),
            row(&[("order_id", Value::BigInt(1)), ("item_id", Value::BigInt(3))]),
            row(&[("order_id", Value::BigInt(1)), ("item_id", Value::BigInt(4))]),
        ];
        let targets = candidates(vec![
            row(&[("id", Value::BigInt(3))]),
            row(&[("id", Value::BigInt(4))]),
            row(&[("id", Value::BigInt(5))]),
        ]);
        let owner_link = [LinkPair::new("id", "order_id")];
        let values = link(
            &owners,
            targets,
            &[LinkPair::new("item_id", "id")],
            Some(Junction {
                rows: &junction_rows,
                owner_link: &owner_link,
            }),
            Multiplicity::Many,
            None,
        );
        assert_eq!(ids(&values[0]), vec![5, 3, 4]);
    }

    #[test]
    fn test_link_through_appends_per_junction_row() {
        let linker = RelationLinker::new(
            candidates(vec![row(&[("id", Value::BigInt(3))])]),
            &["id"],
        );
        let junctions = vec![vec![
            row(&[("item_id", Value::BigInt(3))]),
            row(&[("item_id", Value::BigInt(3))]),
            row(&[("item_id", Value::BigInt(9))]),
        ]];
        let linked = linker.link_through(&junctions, &["item_id"]);
        assert_eq!(linked[0].len(), 2);
    }

    #[test]
    fn test_composite_key() {
        let owners = vec![row(&[("dept_id", Value::BigInt(1)), ("emp_id", Value::BigInt(2))])];
        let targets = candidates(vec![
            row(&[("id", Value::BigInt(1)), ("dept_id", Value::BigInt(1)), ("emp_id", Value::BigInt(2))]),
            row(&[("id", Value::BigInt(2)), ("dept_id", Value::BigInt(1)), ("emp_id", Value::BigInt(3))]),
        ]);
        let values = link(
            &owners,
            targets,
            &[LinkPair::new("dept_id", "dept_id"), LinkPair::new("emp_id", "emp_id")],
            None,
            Multiplicity::Many,
            None,
        );
        assert_eq!(ids(&values[0]), vec![1]);
    }

    #[test]
    fn test_same_target_shared_between_owners() {
        let owners = vec![
            row(&[("id", Value::BigInt(1)), ("country_id", Value::BigInt(9))]),
            row(&[("id", Value::BigInt(2)), ("country_id", Value::BigInt(9))]),
        ];
        let linker = RelationLinker::new(candidates(vec![row(&[("id", Value::BigInt(9))])]), &["id"]);
        let linked = linker.link(&owners, &["country_id"]);
        assert_eq!(linked[0].len(), 1);
        assert_eq!(linked[1].len(), 1);
    }
}
