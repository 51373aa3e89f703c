//! Batched relation resolution.
//!
//! `RelationResolver` loads relations for a whole set of owner records with
//! one query per relation level (two when the relation goes through a
//! junction), links the fetched rows back to their owners in memory and
//! recurses into nested paths against the freshly linked targets.

#![allow(clippy::result_large_err)]

use crate::config::ResolverConfig;
use crate::join_planner::{JoinPlanner, JoinRequest};
use crate::linker::RelationLinker;
use crate::model::Model;
use crate::path::{PathNode, QueryCustomizer, RelationPath, build_tree};
use crate::populate::{ResultPopulator, models, populate_inverse};
use crate::record::{RecordRef, Related, RelationValue};
use crate::relationship::{PivotTable, RelationDescriptor, ViaSpec};
use crate::schema::{RecordType, Schema};
use crate::tracker::{LazyLoadStats, LazyLoadTracker};
use ormlink_core::{ConfigErrorKind, Error, LinkKey, Result, Row};
use ormlink_query::{Expr, QueryExecutor, RelationQuery};
use std::collections::HashSet;
use std::panic::Location;
use std::sync::{Arc, Mutex, MutexGuard};

/// Resolves relations of records through a [`QueryExecutor`].
///
/// # Example
///
/// ```ignore
/// let resolver = RelationResolver::new(schema, store);
/// let customers = schema.records("Customer", rows)?;
///
/// // One query for all orders, one for all their items.
/// resolver.resolve(&customers, &[RelationPath::parse("orders.items")?])?;
///
/// // Cached from now on.
/// let orders = resolver.resolve_one(&customers[0], "orders")?;
/// ```
pub struct RelationResolver<E> {
    schema: Arc<Schema>,
    executor: E,
    config: ResolverConfig,
    tracker: Mutex<LazyLoadTracker>,
}

impl<E: QueryExecutor> RelationResolver<E> {
    /// Create a resolver with the default configuration.
    pub fn new(schema: Arc<Schema>, executor: E) -> Self {
        Self::with_config(schema, executor, ResolverConfig::default())
    }

    pub fn with_config(schema: Arc<Schema>, executor: E, config: ResolverConfig) -> Self {
        let tracker = LazyLoadTracker::from_threshold(config.n1_threshold);
        Self {
            schema,
            executor,
            config,
            tracker: Mutex::new(tracker),
        }
    }

    /// Populate plain rows instead of records.
    pub fn as_array(mut self, as_array: bool) -> Self {
        self.config.as_array = as_array;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn populator(&self) -> ResultPopulator {
        ResultPopulator::new(self.config.as_array)
    }

    fn tracker(&self) -> MutexGuard<'_, LazyLoadTracker> {
        self.tracker.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ==================== Eager resolution ====================

    /// Resolve `paths` for every owner, replacing any cached values.
    ///
    /// Each relation level costs one target query for the whole owner set,
    /// plus one junction query when the relation goes through a pivot
    /// table or another relation.
    #[tracing::instrument(
        level = "debug",
        skip(self, owners, paths),
        fields(owner_count = owners.len(), path_count = paths.len())
    )]
    pub fn resolve(&self, owners: &[RecordRef], paths: &[RelationPath]) -> Result<()> {
        if owners.is_empty() || paths.is_empty() {
            return Ok(());
        }
        let tree = build_tree(paths);
        self.resolve_nodes(owners, &tree)
    }

    /// [`resolve`](Self::resolve) with dotted path strings.
    pub fn resolve_names(&self, owners: &[RecordRef], paths: &[&str]) -> Result<()> {
        let paths = paths
            .iter()
            .map(|p| RelationPath::parse(p))
            .collect::<Result<Vec<_>>>()?;
        self.resolve(owners, &paths)
    }

    fn resolve_nodes(&self, owners: &[RecordRef], nodes: &[PathNode]) -> Result<()> {
        for (owner_type, group) in group_by_type(owners) {
            for node in junctions_first(&owner_type, nodes) {
                let targets = self.resolve_relation(
                    &owner_type,
                    &group,
                    &node.relation,
                    node.customize.as_ref(),
                    !node.children.is_empty(),
                )?;
                if !node.children.is_empty() && !targets.is_empty() {
                    self.resolve_nodes(&targets, &node.children)?;
                }
            }
        }
        Ok(())
    }

    /// Load one relation for a batch of owners of one type, populate it and
    /// return the distinct target records that were linked.
    fn resolve_relation(
        &self,
        owner_type: &Arc<RecordType>,
        owners: &[RecordRef],
        name: &str,
        customize: Option<&QueryCustomizer>,
        has_children: bool,
    ) -> Result<Vec<RecordRef>> {
        let relation = Arc::clone(owner_type.relation(name)?);
        relation.validate()?;
        let target_type = Arc::clone(self.schema.record_type(relation.target())?);
        if self.config.as_array && has_children {
            return Err(Error::config(
                ConfigErrorKind::UnsupportedMode,
                format!(
                    "relation '{}.{}' cannot be resolved further in array mode",
                    owner_type.name(),
                    name
                ),
            ));
        }

        let owner_rows: Vec<Row> = owners.iter().map(RecordRef::attributes).collect();
        let per_owner = match relation.via() {
            None => self.load_direct(owner_type, &owner_rows, &relation, &target_type, customize)?,
            Some(ViaSpec::Relation(via)) => self.load_via_relation(
                owner_type,
                owners,
                &relation,
                via,
                &target_type,
                customize,
            )?,
            Some(ViaSpec::Table(pivot)) => self.load_via_table(
                owner_type,
                &owner_rows,
                &relation,
                pivot,
                &target_type,
                customize,
            )?,
        };

        for (owner, items) in owners.iter().zip(&per_owner) {
            let value =
                ResultPopulator::collect(items.clone(), relation.multiplicity(), relation.index());
            owner.populate(name, value);
        }

        if let Some(inverse) = relation.inverse() {
            if self.config.populate_inverse && !self.config.as_array {
                let populated =
                    populate_inverse(owner_type, owners, &per_owner, &target_type, inverse)?;
                tracing::trace!(relation = name, inverse, populated, "Populated inverse relation");
            }
        }

        Ok(distinct_records(per_owner.iter().flatten().filter_map(
            |item| match item {
                Related::Record(r) => Some(r.clone()),
                _ => None,
            },
        )))
    }

    fn load_direct(
        &self,
        owner_type: &RecordType,
        owner_rows: &[Row],
        relation: &RelationDescriptor,
        target_type: &Arc<RecordType>,
        customize: Option<&QueryCustomizer>,
    ) -> Result<Vec<Vec<Related>>> {
        let local = relation.local_attributes();
        let remote = relation.remote_attributes();
        check_declared(owner_type, &local, ConfigErrorKind::InvalidLink, relation.name())?;
        check_declared(target_type, &remote, ConfigErrorKind::InvalidLink, relation.name())?;

        let keys = distinct_keys(owner_rows.iter(), &local);
        tracing::info!(
            relation = relation.name(),
            owner_count = owner_rows.len(),
            key_count = keys.len(),
            "Batch loading relation"
        );
        if keys.is_empty() {
            return Ok(vec![Vec::new(); owner_rows.len()]);
        }

        let query = target_query(target_type, &remote, &keys, relation, customize);
        let rows = self.execute(relation.name(), &query)?;
        let linker = RelationLinker::new(self.populator().populate(target_type, rows), &remote);
        let linked = linker.link(owner_rows, &local);
        tracing::debug!(
            relation = relation.name(),
            query_count = 1,
            loaded_count = linker.len(),
            "Batch load complete"
        );
        Ok(linked)
    }

    fn load_via_relation(
        &self,
        owner_type: &Arc<RecordType>,
        owners: &[RecordRef],
        relation: &RelationDescriptor,
        via: &str,
        target_type: &Arc<RecordType>,
        customize: Option<&QueryCustomizer>,
    ) -> Result<Vec<Vec<Related>>> {
        let via_relation = owner_type.relation(via).map_err(|e| unresolvable(relation, &e))?;
        let junction_type = self
            .schema
            .record_type(via_relation.target())
            .map_err(|e| unresolvable(relation, &e))?;
        let local = relation.local_attributes();
        let remote = relation.remote_attributes();
        check_declared(junction_type, &local, ConfigErrorKind::UnresolvableVia, relation.name())?;
        check_declared(target_type, &remote, ConfigErrorKind::InvalidLink, relation.name())?;

        // The junction is an ordinary relation of the owners. Owners that
        // already hold it keep their value, along with whatever was
        // customized or loaded beneath it.
        let pending: Vec<RecordRef> = owners
            .iter()
            .filter(|o| !o.is_populated(via))
            .cloned()
            .collect();
        if pending.is_empty() {
            tracing::debug!(relation = relation.name(), via, "Reusing populated junction relation");
        } else {
            self.resolve_relation(owner_type, &pending, via, None, false)?;
        }
        let junctions: Vec<Vec<Row>> = owners
            .iter()
            .map(|o| o.relation(via).map(|v| v.rows()).unwrap_or_default())
            .collect();

        self.load_through(relation, &junctions, &local, &remote, target_type, customize)
    }

    fn load_via_table(
        &self,
        owner_type: &RecordType,
        owner_rows: &[Row],
        relation: &RelationDescriptor,
        pivot: &PivotTable,
        target_type: &Arc<RecordType>,
        customize: Option<&QueryCustomizer>,
    ) -> Result<Vec<Vec<Related>>> {
        let owner_attrs = pivot.owner_attributes();
        let pivot_columns = pivot.owner_columns();
        check_declared(owner_type, &owner_attrs, ConfigErrorKind::InvalidLink, relation.name())?;
        let local = relation.local_attributes();
        let remote = relation.remote_attributes();
        check_declared(target_type, &remote, ConfigErrorKind::InvalidLink, relation.name())?;

        let keys = distinct_keys(owner_rows.iter(), &owner_attrs);
        tracing::info!(
            relation = relation.name(),
            pivot = pivot.table.as_str(),
            owner_count = owner_rows.len(),
            key_count = keys.len(),
            "Batch loading pivot rows"
        );
        if keys.is_empty() {
            return Ok(vec![Vec::new(); owner_rows.len()]);
        }

        let mut query = RelationQuery::new(&pivot.table).filter(Expr::in_keys(
            None,
            &pivot_columns,
            keys.iter().map(LinkKey::to_values),
        ));
        if let Some(condition) = &pivot.condition {
            query = query.filter(condition.clone());
        }
        let pivot_rows = self.execute(relation.name(), &query)?;

        let junction_linker = RelationLinker::new(
            pivot_rows
                .into_iter()
                .map(|row| (row.clone(), Related::Row(row)))
                .collect(),
            &pivot_columns,
        );
        let junctions: Vec<Vec<Row>> = junction_linker
            .link(owner_rows, &owner_attrs)
            .into_iter()
            .map(|items| items.iter().map(Related::attributes).collect())
            .collect();

        self.load_through(relation, &junctions, &local, &remote, target_type, customize)
    }

    /// Second hop: fetch targets for the junction rows of every owner.
    fn load_through(
        &self,
        relation: &RelationDescriptor,
        junctions: &[Vec<Row>],
        local: &[&str],
        remote: &[&str],
        target_type: &Arc<RecordType>,
        customize: Option<&QueryCustomizer>,
    ) -> Result<Vec<Vec<Related>>> {
        let keys = distinct_keys(junctions.iter().flatten(), local);
        tracing::info!(
            relation = relation.name(),
            owner_count = junctions.len(),
            junction_count = junctions.iter().map(Vec::len).sum::<usize>(),
            key_count = keys.len(),
            "Batch loading relation through junction"
        );
        if keys.is_empty() {
            return Ok(vec![Vec::new(); junctions.len()]);
        }

        let query = target_query(target_type, remote, &keys, relation, customize);
        let rows = self.execute(relation.name(), &query)?;
        let linker = RelationLinker::new(self.populator().populate(target_type, rows), remote);
        let linked = linker.link_through(junctions, local);
        tracing::debug!(
            relation = relation.name(),
            query_count = 2,
            loaded_count = linker.len(),
            "Batch load complete"
        );
        Ok(linked)
    }

    fn execute(&self, relation: &str, query: &RelationQuery) -> Result<Vec<Row>> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            let (sql, params) = query.to_sql(self.config.dialect);
            tracing::debug!(relation, sql = %sql, params = params.len(), "Executing relation query");
        }
        let rows = self.executor.execute(query)?;
        tracing::trace!(relation, row_count = rows.len(), "Relation query returned");
        Ok(rows)
    }

    // ==================== Lazy resolution ====================

    /// Value of a relation for one owner, loading it on first access.
    ///
    /// A dotted path loads every level that is not yet populated (for the
    /// owner's linked targets, as one batch per level) and returns the
    /// first segment's value. Populated levels are returned as cached.
    #[track_caller]
    pub fn resolve_one(&self, owner: &RecordRef, path: &str) -> Result<RelationValue> {
        let caller = Location::caller();
        let path = RelationPath::parse(path)?;
        self.resolve_one_at(owner, &path, caller)
    }

    /// [`resolve_one`](Self::resolve_one) with a parsed (possibly
    /// customized) path. The customizer only applies when the last segment
    /// actually has to be loaded.
    #[track_caller]
    pub fn resolve_one_path(&self, owner: &RecordRef, path: &RelationPath) -> Result<RelationValue> {
        self.resolve_one_at(owner, path, Location::caller())
    }

    #[tracing::instrument(level = "debug", skip(self, owner, path, caller), fields(path = %path))]
    fn resolve_one_at(
        &self,
        owner: &RecordRef,
        path: &RelationPath,
        caller: &'static Location<'static>,
    ) -> Result<RelationValue> {
        if self.config.as_array && path.is_nested() {
            return Err(Error::config(
                ConfigErrorKind::UnsupportedMode,
                format!("nested path '{}' cannot be resolved in array mode", path),
            ));
        }

        let segments = path.segments();
        let mut level = vec![owner.clone()];
        for (depth, segment) in segments.iter().enumerate() {
            let last = depth + 1 == segments.len();
            let customize = if last { path.customizer() } else { None };
            for (owner_type, group) in group_by_type(&level) {
                let pending: Vec<RecordRef> = group
                    .iter()
                    .filter(|r| !r.is_populated(segment))
                    .cloned()
                    .collect();
                if pending.is_empty() {
                    continue;
                }
                self.tracker()
                    .record_load_at(owner_type.name(), segment, caller);
                self.resolve_relation(&owner_type, &pending, segment, customize, !last)?;
            }
            if !last {
                level = distinct_records(
                    level
                        .iter()
                        .filter_map(|r| r.relation(segment))
                        .flat_map(|v| v.records()),
                );
            }
        }

        owner.relation(path.first()).ok_or_else(|| {
            Error::Custom(format!(
                "relation '{}' was not populated on '{}'",
                path.first(),
                owner.type_name()
            ))
        })
    }

    /// Typed targets of a relation, loaded lazily.
    ///
    /// Fails with a configuration error when the relation's target record
    /// type is not `M::RECORD_TYPE`.
    #[track_caller]
    pub fn related_models<M: Model>(&self, owner: &RecordRef, relation: &str) -> Result<Vec<M>> {
        let caller = Location::caller();
        let record_type = owner.record_type();
        let descriptor = record_type.relation(relation)?;
        if descriptor.target() != M::RECORD_TYPE {
            return Err(Error::config(
                ConfigErrorKind::TargetTypeMismatch,
                format!(
                    "relation '{}.{}' yields '{}', not '{}'",
                    record_type.name(),
                    relation,
                    descriptor.target(),
                    M::RECORD_TYPE
                ),
            ));
        }
        let value = self.resolve_one_at(owner, &RelationPath::parse(relation)?, caller)?;
        models::<M>(&value)
    }

    /// The single typed target of a relation, if any.
    #[track_caller]
    pub fn related_model<M: Model>(&self, owner: &RecordRef, relation: &str) -> Result<Option<M>> {
        Ok(self.related_models::<M>(owner, relation)?.into_iter().next())
    }

    // ==================== Cache management ====================

    /// Clear every populated relation of `owner` whose owner-side link uses
    /// `attribute`, whether or not its value changed.
    pub fn invalidate(&self, owner: &RecordRef, attribute: &str) -> Vec<String> {
        owner.write().invalidate(attribute)
    }

    pub fn is_populated(&self, owner: &RecordRef, relation: &str) -> bool {
        owner.is_populated(relation)
    }

    /// Clear one relation entry without touching anything else.
    pub fn unset(&self, owner: &RecordRef, relation: &str) -> bool {
        owner.unset(relation)
    }

    pub fn lazy_stats(&self) -> LazyLoadStats {
        self.tracker().stats()
    }

    pub fn lazy_load_count(&self, record_type: &str, relation: &str) -> usize {
        self.tracker().count_for(record_type, relation)
    }

    pub fn reset_lazy_stats(&self) {
        self.tracker().reset();
    }

    // ==================== Joined loading ====================

    /// Load root records with one joined query.
    ///
    /// Joins flagged eager populate their relations from the joined
    /// columns; the others only take part in filtering. Roots come back
    /// de-duplicated by primary key in first-seen order.
    #[tracing::instrument(level = "debug", skip(self, filter, requests), fields(request_count = requests.len()))]
    pub fn find_with_joins(
        &self,
        root_type: &str,
        filter: Option<Expr>,
        requests: &[JoinRequest],
    ) -> Result<Vec<RecordRef>> {
        let plan = JoinPlanner::build(&self.schema, root_type, requests)?;
        let query = plan.query(filter);
        let rows = self.execute(root_type, &query)?;
        tracing::info!(
            root = root_type,
            join_count = plan.joins().len(),
            row_count = rows.len(),
            "Joined load"
        );
        plan.assemble(&rows, self.config.populate_inverse)
    }
}

// ==================== Helpers ====================

/// Owners grouped by record type, in first-seen order.
fn group_by_type(records: &[RecordRef]) -> Vec<(Arc<RecordType>, Vec<RecordRef>)> {
    let mut groups: Vec<(Arc<RecordType>, Vec<RecordRef>)> = Vec::new();
    for record in records {
        let record_type = record.record_type();
        match groups
            .iter_mut()
            .find(|(t, _)| Arc::ptr_eq(t, &record_type) || t.name() == record_type.name())
        {
            Some((_, group)) => group.push(record.clone()),
            None => groups.push((record_type, vec![record.clone()])),
        }
    }
    groups
}

/// Sibling path nodes, with any node that another sibling goes through
/// moved ahead of it. Requested order is kept otherwise.
fn junctions_first<'n>(owner_type: &RecordType, nodes: &'n [PathNode]) -> Vec<&'n PathNode> {
    fn visit<'n>(
        owner_type: &RecordType,
        nodes: &'n [PathNode],
        index: usize,
        emitted: &mut [bool],
        ordered: &mut Vec<&'n PathNode>,
    ) {
        if emitted[index] {
            return;
        }
        emitted[index] = true;
        if let Ok(relation) = owner_type.relation(&nodes[index].relation) {
            if let Some(ViaSpec::Relation(via)) = relation.via() {
                if let Some(junction) = nodes.iter().position(|n| n.relation == *via) {
                    visit(owner_type, nodes, junction, emitted, ordered);
                }
            }
        }
        ordered.push(&nodes[index]);
    }

    let mut emitted = vec![false; nodes.len()];
    let mut ordered = Vec::with_capacity(nodes.len());
    for index in 0..nodes.len() {
        visit(owner_type, nodes, index, &mut emitted, &mut ordered);
    }
    ordered
}

/// Distinct non-null keys in first-seen order.
fn distinct_keys<'a>(rows: impl Iterator<Item = &'a Row>, attributes: &[&str]) -> Vec<LinkKey> {
    let mut seen = HashSet::new();
    rows.filter_map(|row| LinkKey::from_row(row, attributes))
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// Distinct record instances in first-seen order.
fn distinct_records(records: impl IntoIterator<Item = RecordRef>) -> Vec<RecordRef> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.identity()))
        .collect()
}

fn target_query(
    target_type: &RecordType,
    remote: &[&str],
    keys: &[LinkKey],
    relation: &RelationDescriptor,
    customize: Option<&QueryCustomizer>,
) -> RelationQuery {
    let mut query = RelationQuery::new(target_type.table()).filter(Expr::in_keys(
        None,
        remote,
        keys.iter().map(LinkKey::to_values),
    ));
    if let Some(condition) = relation.condition_expr() {
        query = query.filter(condition.clone());
    }
    for order in relation.ordering() {
        query = query.order_by(order.clone());
    }
    match customize {
        Some(customize) => customize(query),
        None => query,
    }
}

fn check_declared(
    record_type: &RecordType,
    attributes: &[&str],
    kind: ConfigErrorKind,
    relation: &str,
) -> Result<()> {
    match attributes.iter().find(|a| !record_type.accepts_attribute(a)) {
        Some(missing) => Err(Error::config(
            kind,
            format!(
                "relation '{}' links through '{}.{}', which is not a declared attribute",
                relation,
                record_type.name(),
                missing
            ),
        )),
        None => Ok(()),
    }
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
