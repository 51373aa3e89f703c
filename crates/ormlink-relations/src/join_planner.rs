//! Planning relation joins for single-query loading.
//!
//! A [`JoinRequest`] names a relation path from the root record type. The
//! planner walks the path, adds one join per segment (plus one for the
//! junction of a two-hop relation) and gives every joined table an alias.
//! Requests that produce the same table, alias and ON condition share one
//! join. Eager joins select their columns as `alias__column`, so the flat
//! result rows can be split back into records.

#![allow(clippy::result_large_err)]

use crate::path::RelationPath;
use crate::populate::{ResultPopulator, populate_inverse};
use crate::record::{Record, RecordRef, Related};
use crate::relationship::{LinkPair, RelationDescriptor, ViaSpec};
use crate::schema::{RecordType, Schema};
use ormlink_core::{ConfigErrorKind, Error, LinkKey, Result, Row, Value, validate_identifier};
use ormlink_query::{Expr, Join, JoinType, RelationQuery, SelectColumn, aliased_columns};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One requested join.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    path: String,
    alias: Option<String>,
    kind: JoinType,
    eager: bool,
    on: Option<Expr>,
}

impl JoinRequest {
    /// A LEFT join whose records are populated.
    pub fn left(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            alias: None,
            kind: JoinType::Left,
            eager: true,
            on: None,
        }
    }

    /// An INNER join whose records are populated.
    pub fn inner(path: impl Into<String>) -> Self {
        Self {
            kind: JoinType::Inner,
            ..Self::left(path)
        }
    }

    /// Alias for the last segment's table.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Whether the joined rows populate the relation. Non-eager joins only
    /// filter.
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    /// Extra ON condition for the last segment. Bare columns refer to the
    /// joined table.
    pub fn on(mut self, condition: Expr) -> Self {
        self.on = Some(condition);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> JoinType {
        self.kind
    }

    pub fn is_eager(&self) -> bool {
        self.eager
    }
}

#[derive(Debug, Clone)]
struct JoinNode {
    parent: Option<usize>,
    path: String,
    relation: Arc<RelationDescriptor>,
    record_type: Arc<RecordType>,
    alias: String,
    eager: bool,
}

/// Builds a [`JoinPlan`] from join requests.
#[derive(Debug)]
pub struct JoinPlanner {
    schema: Arc<Schema>,
    root: Arc<RecordType>,
    joins: Vec<Join>,
    nodes: Vec<JoinNode>,
}

impl JoinPlanner {
    pub fn new(schema: &Arc<Schema>, root_type: &str) -> Result<Self> {
        let root = Arc::clone(schema.record_type(root_type)?);
        Ok(Self {
            schema: Arc::clone(schema),
            root,
            joins: Vec::new(),
            nodes: Vec::new(),
        })
    }

    /// Plan every request in order.
    pub fn build(schema: &Arc<Schema>, root_type: &str, requests: &[JoinRequest]) -> Result<JoinPlan> {
        let mut planner = Self::new(schema, root_type)?;
        for request in requests {
            planner.add(request)?;
        }
        planner.finish()
    }

    fn root_alias(&self) -> &str {
        self.root.table()
    }

    fn alias_of(&self, node: Option<usize>) -> String {
        match node {
            None => self.root_alias().to_string(),
            Some(i) => self.nodes[i].alias.clone(),
        }
    }

    /// Add one request.
    pub fn add(&mut self, request: &JoinRequest) -> Result<()> {
        let path = RelationPath::parse(&request.path)?;
        if let Some(alias) = &request.alias {
            validate_identifier("join alias", alias)?;
        }

        let segments = path.segments();
        let mut parent: Option<usize> = None;
        let mut parent_type = Arc::clone(&self.root);
        for (depth, segment) in segments.iter().enumerate() {
            let last = depth + 1 == segments.len();
            let relation = Arc::clone(parent_type.relation(segment)?);
            relation.validate()?;
            let target_type = Arc::clone(self.schema.record_type(relation.target())?);
            let parent_alias = self.alias_of(parent);

            let near_alias = match relation.via() {
                None => parent_alias,
                Some(ViaSpec::Relation(via)) => {
                    let via_relation = Arc::clone(
                        parent_type
                            .relation(via)
                            .map_err(|e| unresolvable(&relation, &e))?,
                    );
                    let junction_type = Arc::clone(
                        self.schema
                            .record_type(via_relation.target())
                            .map_err(|e| unresolvable(&relation, &e))?,
                    );
                    self.attach(
                        junction_type.table(),
                        |alias| {
                            link_on(
                                &parent_alias,
                                alias,
                                via_relation.link_pairs(),
                                via_relation.condition_expr(),
                            )
                        },
                        None,
                        request.kind,
                    )?
                }
                Some(ViaSpec::Table(pivot)) => self.attach(
                    &pivot.table,
                    |alias| link_on(&parent_alias, alias, &pivot.link, pivot.condition.as_ref()),
                    None,
                    request.kind,
                )?,
            };

            let extra = if last { request.on.as_ref() } else { None };
            let explicit = if last { request.alias.as_deref() } else { None };
            let alias = self.attach(
                target_type.table(),
                |alias| {
                    let on = link_on(&near_alias, alias, relation.link_pairs(), relation.condition_expr());
                    match extra {
                        Some(extra) => on.and(extra.qualify(alias)),
                        None => on,
                    }
                },
                explicit,
                request.kind,
            )?;

            let index = match self.nodes.iter().position(|n| n.alias == alias) {
                Some(index) => {
                    self.nodes[index].eager |= request.eager;
                    index
                }
                None => {
                    self.nodes.push(JoinNode {
                        parent,
                        path: segments[..=depth].join("."),
                        relation,
                        record_type: Arc::clone(&target_type),
                        alias,
                        eager: request.eager,
                    });
                    self.nodes.len() - 1
                }
            };
            parent = Some(index);
            parent_type = target_type;
        }
        Ok(())
    }

    /// Find or add a join and return its alias.
    fn attach(
        &mut self,
        table: &str,
        on: impl Fn(&str) -> Expr,
        explicit: Option<&str>,
        kind: JoinType,
    ) -> Result<String> {
        let make = |alias: &str| {
            let join = match kind {
                JoinType::Inner => Join::inner(table, on(alias)),
                JoinType::Left => Join::left(table, on(alias)),
            };
            join.alias(alias)
        };

        if let Some(alias) = explicit {
            if alias == self.root_alias() {
                return Err(alias_taken(alias));
            }
            let candidate = make(alias);
            return match self.joins.iter().position(|j| j.reference_name() == alias) {
                Some(i) if self.joins[i].same_target(&candidate) => {
                    self.merge_kind(i, kind);
                    Ok(alias.to_string())
                }
                Some(_) => Err(alias_taken(alias)),
                None => {
                    self.joins.push(candidate);
                    Ok(alias.to_string())
                }
            };
        }

        for i in 0..self.joins.len() {
            if self.joins[i].table != table {
                continue;
            }
            let alias = self.joins[i].reference_name().to_string();
            if self.joins[i].same_target(&make(&alias)) {
                self.merge_kind(i, kind);
                return Ok(alias);
            }
        }

        let alias = self.fresh_alias(table);
        self.joins.push(make(&alias));
        Ok(alias)
    }

    // INNER wins: a row filtered out by one request is filtered out for all.
    fn merge_kind(&mut self, index: usize, kind: JoinType) {
        if kind == JoinType::Inner {
            self.joins[index].join_type = JoinType::Inner;
        }
    }

    fn fresh_alias(&self, table: &str) -> String {
        let taken = |name: &str| {
            name == self.root_alias() || self.joins.iter().any(|j| j.reference_name() == name)
        };
        if !taken(table) {
            return table.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{table}_{n}");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Finish planning and choose the selected columns.
    pub fn finish(self) -> Result<JoinPlan> {
        let mut columns = Vec::new();
        if self.nodes.iter().any(|n| n.eager) {
            if self.root.attributes().is_empty() {
                return Err(undeclared(&self.root));
            }
            columns.extend(
                self.root
                    .attributes()
                    .iter()
                    .map(|a| SelectColumn::qualified(self.root.table(), a)),
            );
            for node in self.nodes.iter().filter(|n| n.eager) {
                if node.record_type.attributes().is_empty() {
                    return Err(undeclared(&node.record_type));
                }
                columns.extend(aliased_columns(&node.alias, node.record_type.attributes()));
            }
        }
        tracing::debug!(
            root = self.root.name(),
            joins = self.joins.len(),
            eager = self.nodes.iter().filter(|n| n.eager).count(),
            "Join plan built"
        );
        Ok(JoinPlan {
            root: self.root,
            joins: self.joins,
            nodes: self.nodes,
            columns,
        })
    }
}

/// A planned joined query and how to split its rows into records.
#[derive(Debug)]
pub struct JoinPlan {
    root: Arc<RecordType>,
    joins: Vec<Join>,
    nodes: Vec<JoinNode>,
    columns: Vec<SelectColumn>,
}

impl JoinPlan {
    pub fn root(&self) -> &Arc<RecordType> {
        &self.root
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn columns(&self) -> &[SelectColumn] {
        &self.columns
    }

    /// Alias of the table joined for a relation path.
    pub fn alias_for(&self, path: &str) -> Option<&str> {
        self.nodes
            .iter()
            .find(|n| n.path == path)
            .map(|n| n.alias.as_str())
    }

    /// Whether a relation path is populated from the joined rows.
    pub fn is_eager(&self, path: &str) -> bool {
        self.nodes.iter().any(|n| n.path == path && n.eager)
    }

    /// The joined query, optionally filtered.
    pub fn query(&self, filter: Option<Expr>) -> RelationQuery {
        let mut query = RelationQuery::new(self.root.table());
        if self.columns.is_empty() {
            if !self.joins.is_empty() {
                query = query.alias(self.root.table());
            }
        } else {
            query = query.select(self.columns.iter().cloned());
        }
        for join in &self.joins {
            query = query.join(join.clone());
        }
        if let Some(filter) = filter {
            query = query.filter(filter);
        }
        query
    }

    /// Split joined rows into root records with their eager relations
    /// populated.
    pub fn assemble(&self, rows: &[Row], populate_inverses: bool) -> Result<Vec<RecordRef>> {
        let eager: Vec<usize> = (0..self.nodes.len()).filter(|&i| self.nodes[i].eager).collect();
        let mut state: Vec<NodeState> = self.nodes.iter().map(|_| NodeState::default()).collect();
        let mut roots: Vec<RecordRef> = Vec::new();
        let mut root_index: HashMap<LinkKey, usize> = HashMap::new();

        for row in rows {
            let root_attrs = if self.columns.is_empty() {
                row.clone()
            } else {
                project(row, self.root.attributes(), |a| a.to_string())
            };
            let root = match LinkKey::from_row(&root_attrs, self.root.primary_key()) {
                Some(key) => match root_index.get(&key) {
                    Some(&i) => roots[i].clone(),
                    None => {
                        let record = RecordRef::new(Record::new(Arc::clone(&self.root), root_attrs));
                        root_index.insert(key, roots.len());
                        roots.push(record.clone());
                        record
                    }
                },
                None => {
                    let record = RecordRef::new(Record::new(Arc::clone(&self.root), root_attrs));
                    roots.push(record.clone());
                    record
                }
            };

            let mut row_records: Vec<Option<RecordRef>> = vec![None; self.nodes.len()];
            for &i in &eager {
                let node = &self.nodes[i];
                let parent = match node.parent {
                    None => Some(root.clone()),
                    Some(p) => row_records[p].clone(),
                };
                let Some(parent) = parent else { continue };
                state[i].see_parent(&parent);

                let attrs = project(row, node.record_type.attributes(), |a| {
                    format!("{}__{}", node.alias, a)
                });
                let Some(key) = LinkKey::from_row(&attrs, node.record_type.primary_key()) else {
                    continue;
                };
                let record = state[i]
                    .records
                    .entry(key)
                    .or_insert_with(|| RecordRef::new(Record::new(Arc::clone(&node.record_type), attrs)))
                    .clone();
                state[i].add_child(&parent, &record);
                row_records[i] = Some(record);
            }
        }

        for &i in &eager {
            let node = &self.nodes[i];
            let node_state = std::mem::take(&mut state[i]);
            let mut children = node_state.children;
            let per_parent: Vec<Vec<Related>> = node_state
                .parents
                .iter()
                .map(|p| {
                    children
                        .remove(&p.identity())
                        .map(|c| c.into_iter().map(Related::Record).collect())
                        .unwrap_or_default()
                })
                .collect();
            for (parent, items) in node_state.parents.iter().zip(&per_parent) {
                parent.populate(
                    node.relation.name(),
                    ResultPopulator::collect(
                        items.clone(),
                        node.relation.multiplicity(),
                        node.relation.index(),
                    ),
                );
            }
            if let Some(inverse) = node.relation.inverse() {
                if populate_inverses {
                    let parent_type = match node.parent {
                        None => &self.root,
                        Some(p) => &self.nodes[p].record_type,
                    };
                    populate_inverse(
                        parent_type,
                        &node_state.parents,
                        &per_parent,
                        &node.record_type,
                        inverse,
                    )?;
                }
            }
        }

        tracing::debug!(
            root = self.root.name(),
            rows = rows.len(),
            roots = roots.len(),
            "Assembled joined rows"
        );
        Ok(roots)
    }
}

#[derive(Default)]
struct NodeState {
    records: HashMap<LinkKey, RecordRef>,
    parents: Vec<RecordRef>,
    parent_seen: HashSet<usize>,
    children: HashMap<usize, Vec<RecordRef>>,
    child_seen: HashSet<(usize, usize)>,
}

impl NodeState {
    fn see_parent(&mut self, parent: &RecordRef) {
        if self.parent_seen.insert(parent.identity()) {
            self.parents.push(parent.clone());
        }
    }

    fn add_child(&mut self, parent: &RecordRef, child: &RecordRef) {
        if self.child_seen.insert((parent.identity(), child.identity())) {
            self.children
                .entry(parent.identity())
                .or_default()
                .push(child.clone());
        }
    }
}

fn project(row: &Row, attributes: &[String], column: impl Fn(&str) -> String) -> Row {
    Row::from_pairs(attributes.iter().map(|a| {
        (
            a.clone(),
            row.get_by_name(&column(a)).cloned().unwrap_or(Value::Null),
        )
    }))
}

fn link_on(near: &str, far: &str, pairs: &[LinkPair], condition: Option<&Expr>) -> Expr {
    let mut on: Option<Expr> = None;
    for pair in pairs {
        let equal = Expr::qualified(near, &pair.local).eq(Expr::qualified(far, &pair.remote));
        on = Some(Expr::and_opt(on, equal));
    }
    if let Some(condition) = condition {
        on = Some(Expr::and_opt(on, condition.qualify(far)));
    }
    on.unwrap_or_else(|| Expr::lit(true))
}

fn alias_taken(alias: &str) -> Error {
    Error::config(
        ConfigErrorKind::InvalidPath,
        format!("join alias '{alias}' is already used by a different join"),
    )
}

fn undeclared(record_type: &RecordType) -> Error {
    Error::config(
        ConfigErrorKind::UnsupportedMode,
        format!(
            "record type '{}' declares no attributes and cannot be loaded from joined columns",
            record_type.name()
        ),
    )
}

fn unresolvable(relation: &RelationDescriptor, cause: &Error) -> Error {
    Error::config(
        ConfigErrorKind::UnresolvableVia,
        format!(
            "junction of relation '{}' cannot be resolved: {}",
            relation.name(),
            cause
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlink_core::Dialect;

    fn schema() -> Arc<Schema> {
        Schema::builder()
            .register(
                RecordType::builder("Customer")
                    .table("customers")
                    .attributes(["id", "name"])
                    .relation(
                        RelationDescriptor::has_many("orders", "Order")
                            .link("id", "customer_id")
                            .inverse_of("customer"),
                    )
                    .relation(
                        RelationDescriptor::has_many("big_orders", "Order")
                            .link("id", "customer_id")
                            .condition(Expr::col("total").gt(100)),
                    )
                    .build(),
            )
            .register(
                RecordType::builder("Order")
                    .table("orders")
                    .attributes(["id", "customer_id", "total"])
                    .relation(RelationDescriptor::has_one("customer", "Customer").link("customer_id", "id"))
                    .relation(RelationDescriptor::has_many("lines", "OrderLine").link("id", "order_id"))
                    .relation(
                        RelationDescriptor::has_many("items", "Item")
                            .via_relation("lines")
                            .link("item_id", "id"),
                    )
                    .build(),
            )
            .register(
                RecordType::builder("OrderLine")
                    .table("order_lines")
                    .attributes(["order_id", "item_id"])
                    .primary_key(["order_id", "item_id"])
                    .build(),
            )
            .register(
                RecordType::builder("Item")
                    .table("items")
                    .attributes(["id", "name"])
                    .build(),
            )
            .build()
    }

    #[test]
    fn test_identical_requests_share_one_join() {
        let plan = JoinPlanner::build(
            &schema(),
            "Customer",
            &[JoinRequest::left("orders"), JoinRequest::left("orders")],
        )
        .unwrap();
        assert_eq!(plan.joins().len(), 1);
        assert_eq!(plan.alias_for("orders"), Some("orders"));
    }

    #[test]
    fn test_different_aliases_do_not_collide() {
        let plan = JoinPlanner::build(
            &schema(),
            "Customer",
            &[
                JoinRequest::left("orders").alias("cheap").on(Expr::col("total").lt(10)),
                JoinRequest::left("orders").alias("pricey").on(Expr::col("total").gt(100)),
            ],
        )
        .unwrap();
        assert_eq!(plan.joins().len(), 2);
        let names: Vec<_> = plan.columns().iter().map(|c| c.output_name().to_string()).collect();
        assert!(names.contains(&"cheap__total".to_string()));
        assert!(names.contains(&"pricey__total".to_string()));
    }

    #[test]
    fn test_same_table_gets_numbered_alias() {
        let plan = JoinPlanner::build(
            &schema(),
            "Customer",
            &[JoinRequest::left("orders"), JoinRequest::left("big_orders")],
        )
        .unwrap();
        assert_eq!(plan.alias_for("orders"), Some("orders"));
        assert_eq!(plan.alias_for("big_orders"), Some("orders_2"));
    }

    #[test]
    fn test_back_to_root_table_avoids_root_alias() {
        let plan =
            JoinPlanner::build(&schema(), "Customer", &[JoinRequest::left("orders.customer")]).unwrap();
        assert_eq!(plan.alias_for("orders.customer"), Some("customers_2"));
    }

    #[test]
    fn test_explicit_alias_clash_is_config_error() {
        let err = JoinPlanner::build(
            &schema(),
            "Customer",
            &[
                JoinRequest::left("orders").alias("o"),
                JoinRequest::left("big_orders").alias("o"),
            ],
        )
        .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidPath));
    }

    #[test]
    fn test_inner_wins_when_merging() {
        let plan = JoinPlanner::build(
            &schema(),
            "Customer",
            &[JoinRequest::left("orders"), JoinRequest::inner("orders")],
        )
        .unwrap();
        assert_eq!(plan.joins()[0].join_type, JoinType::Inner);
    }

    #[test]
    fn test_via_adds_junction_join_once() {
        let plan = JoinPlanner::build(
            &schema(),
            "Order",
            &[JoinRequest::left("items"), JoinRequest::left("lines").eager(false)],
        )
        .unwrap();
        let tables: Vec<_> = plan.joins().iter().map(|j| j.table.as_str()).collect();
        assert_eq!(tables, ["order_lines", "items"]);
        assert!(!plan.is_eager("lines"));
    }

    #[test]
    fn test_non_eager_selects_root_only() {
        let plan = JoinPlanner::build(&schema(), "Customer", &[JoinRequest::inner("orders").eager(false)])
            .unwrap();
        assert!(plan.columns().is_empty());
        let (sql, _) = plan.query(None).to_sql(Dialect::Postgres);
        assert!(sql.starts_with("SELECT \"customers\".* FROM \"customers\" AS \"customers\" INNER JOIN"));
    }

    #[test]
    fn test_unknown_relation_in_path() {
        let err = JoinPlanner::build(&schema(), "Customer", &[JoinRequest::left("orders.nope")]).unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownRelation));
    }

    #[test]
    fn test_assemble_dedups_roots_and_children() {
        let plan = JoinPlanner::build(&schema(), "Customer", &[JoinRequest::left("orders")]).unwrap();
        let row = |cid: i64, oid: Option<i64>| {
            Row::from_pairs([
                ("id", Value::BigInt(cid)),
                ("name", Value::from("c")),
                ("orders__id", Value::from(oid)),
                ("orders__customer_id", Value::from(oid.map(|_| cid))),
                ("orders__total", Value::from(oid.map(|_| 5_i64))),
            ])
        };
        let rows = vec![row(1, Some(10)), row(1, Some(11)), row(2, None), row(1, Some(10))];
        let roots = plan.assemble(&rows, true).unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].relation("orders").unwrap().len(), 2);
        assert!(roots[1].relation("orders").unwrap().is_empty());

        let first_order = &roots[0].relation("orders").unwrap().records()[0];
        let back = first_order.relation("customer").unwrap().one().unwrap().record().unwrap();
        assert!(back.ptr_eq(&roots[0]));
    }
}
