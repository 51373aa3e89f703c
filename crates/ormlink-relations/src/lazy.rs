//! On-demand relation access for single records.

#![allow(clippy::result_large_err)]

use crate::record::{RecordRef, RelationValue};
use crate::resolver::RelationResolver;
use ormlink_core::Result;
use ormlink_query::QueryExecutor;

/// A handle to one relation of one record.
///
/// The first [`get`](Self::get) loads and caches the value in the record's
/// relation cache; later calls return the cached value until the record's
/// link attributes change or the relation is reset.
pub struct LazyRelationProxy<'r, E> {
    resolver: &'r RelationResolver<E>,
    owner: RecordRef,
    relation: String,
}

impl<'r, E: QueryExecutor> LazyRelationProxy<'r, E> {
    pub fn new(resolver: &'r RelationResolver<E>, owner: RecordRef, relation: impl Into<String>) -> Self {
        Self {
            resolver,
            owner,
            relation: relation.into(),
        }
    }

    /// Load on first access, then return the cached value.
    #[track_caller]
    pub fn get(&self) -> Result<RelationValue> {
        self.resolver.resolve_one(&self.owner, &self.relation)
    }

    pub fn is_loaded(&self) -> bool {
        self.owner.is_populated(&self.relation)
    }

    /// Drop the cached value. Returns whether one was cached.
    pub fn reset(&self) -> bool {
        self.owner.unset(&self.relation)
    }

    pub fn owner(&self) -> &RecordRef {
        &self.owner
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }
}

/// Relation access on a record through an explicit resolver.
pub trait HasRelations {
    /// Value of a relation, loaded on first access.
    fn related_value<E: QueryExecutor>(
        &self,
        resolver: &RelationResolver<E>,
        relation: &str,
    ) -> Result<RelationValue>;

    /// Target records of a relation, loaded on first access.
    fn related<E: QueryExecutor>(
        &self,
        resolver: &RelationResolver<E>,
        relation: &str,
    ) -> Result<Vec<RecordRef>> {
        Ok(self.related_value(resolver, relation)?.records())
    }

    /// A proxy for repeated access to one relation.
    fn lazy<'r, E: QueryExecutor>(
        &self,
        resolver: &'r RelationResolver<E>,
        relation: &str,
    ) -> LazyRelationProxy<'r, E>;
}

impl HasRelations for RecordRef {
    #[track_caller]
    fn related_value<E: QueryExecutor>(
        &self,
        resolver: &RelationResolver<E>,
        relation: &str,
    ) -> Result<RelationValue> {
        resolver.resolve_one(self, relation)
    }

    fn lazy<'r, E: QueryExecutor>(
        &self,
        resolver: &'r RelationResolver<E>,
        relation: &str,
    ) -> LazyRelationProxy<'r, E> {
        LazyRelationProxy::new(resolver, self.clone(), relation)
    }
}
