//! The query-execution seam.

#![allow(clippy::result_large_err)]

use crate::select::RelationQuery;
use ormlink_core::{Result, Row};
use std::sync::Arc;

/// Executes relation queries and returns rows in result order.
///
/// Implementations own connections, pooling and driver concerns. Errors are
/// passed through the relation engine unchanged.
pub trait QueryExecutor {
    /// Run a query and return its rows.
    fn execute(&self, query: &RelationQuery) -> Result<Vec<Row>>;
}

impl<T: QueryExecutor + ?Sized> QueryExecutor for &T {
    fn execute(&self, query: &RelationQuery) -> Result<Vec<Row>> {
        (**self).execute(query)
    }
}

impl<T: QueryExecutor + ?Sized> QueryExecutor for Arc<T> {
    fn execute(&self, query: &RelationQuery) -> Result<Vec<Row>> {
        (**self).execute(query)
    }
}

impl<T: QueryExecutor + ?Sized> QueryExecutor for Box<T> {
    fn execute(&self, query: &RelationQuery) -> Result<Vec<Row>> {
        (**self).execute(query)
    }
}
