//! Relation query shapes and execution for ormlink.
//!
//! `ormlink-query` is the **query collaborator layer**. The relation engine
//! never talks to a database directly; it describes what it needs as a
//! [`RelationQuery`] and hands it to a [`QueryExecutor`].
//!
//! # Role In The Architecture
//!
//! - **Expression DSL**: [`Expr`] builds relation conditions, batched `IN`
//!   filters (single and composite keys) and JOIN conditions.
//! - **Query shape**: [`RelationQuery`] carries table, alias, selected
//!   columns, joins, filter, ordering and limit, and renders SQL per dialect.
//! - **Execution seam**: [`QueryExecutor`] is implemented by drivers, and
//!   by [`MemoryStore`] for in-process use and tests.

pub mod clause;
pub mod executor;
pub mod expr;
pub mod join;
pub mod memory;
pub mod select;

pub use clause::{NullsOrder, OrderBy, OrderDirection};
pub use executor::QueryExecutor;
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use join::{Join, JoinType};
pub use memory::{ExecutedQuery, MemoryStore};
pub use ormlink_core::Dialect;
pub use select::{RelationQuery, SelectColumn, aliased_columns};
