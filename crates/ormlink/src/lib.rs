//! ormlink - relation resolution for record-oriented ORMs.
//!
//! ormlink loads the related records of records a primary query already
//! returned. It provides:
//!
//! - Declarative relations (one/many, composite keys, junctions, inverses)
//! - Batched eager loading: one query per relation level, whatever the
//!   owner count
//! - Lazy loading with per-record caching and link-change invalidation
//! - Single-query joined loading with automatic aliasing
//!
//! # Quick Start
//!
//! ```
//! use ormlink::prelude::*;
//!
//! let schema = Schema::builder()
//!     .register(
//!         RecordType::builder("Author")
//!             .table("authors")
//!             .attributes(["id", "name"])
//!             .relation(
//!                 RelationDescriptor::has_many("books", "Book")
//!                     .link("id", "author_id")
//!                     .inverse_of("author")
//!                     .order_by(OrderBy::asc("id")),
//!             )
//!             .build(),
//!     )
//!     .register(
//!         RecordType::builder("Book")
//!             .table("books")
//!             .attributes(["id", "author_id", "title"])
//!             .relation(RelationDescriptor::has_one("author", "Author").link("author_id", "id"))
//!             .build(),
//!     )
//!     .build();
//!
//! let store = MemoryStore::new();
//! store.insert("authors", Row::from_pairs([("id", Value::from(1_i64)), ("name", Value::from("Le Guin"))]));
//! store.insert(
//!     "books",
//!     Row::from_pairs([("id", Value::from(7_i64)), ("author_id", Value::from(1_i64)), ("title", Value::from("Lathe"))]),
//! );
//!
//! let resolver = RelationResolver::new(schema.clone(), &store);
//! let authors = schema.records("Author", store.rows("authors"))?;
//! resolver.resolve_names(&authors, &["books"])?;
//!
//! let books = authors[0].relation("books").map(|v| v.records()).unwrap_or_default();
//! assert_eq!(books.len(), 1);
//! assert_eq!(store.query_count(), 1);
//! # Ok::<(), ormlink::Error>(())
//! ```
//!
//! # Crates
//!
//! - [`ormlink_core`]: values, rows, link keys, errors
//! - [`ormlink_query`]: relation queries and the executor contract
//! - [`ormlink_relations`]: the resolution engine

pub use ormlink_core::{
    ColumnInfo, ConfigError, ConfigErrorKind, ConnectionError, ConnectionErrorKind, Dialect,
    Error, FromValue, KeyValue, LinkKey, QueryError, QueryErrorKind, Result, Row, TypeError, Value,
};

pub use ormlink_query::{
    ExecutedQuery, Expr, Join, JoinType, MemoryStore, OrderBy, QueryExecutor, RelationQuery,
    SelectColumn,
};

pub use ormlink_relations::{
    HasRelations, IndexBy, IndexedRelation, JoinPlan, JoinPlanner, JoinRequest, LazyLoadStats,
    LazyLoadTracker, LazyRelationProxy, LinkPair, Model, Multiplicity, PivotTable, Record,
    RecordRef, RecordType, Related, RelationCache, RelationDescriptor, RelationPath,
    RelationResolver, RelationValue, ResolverConfig, Schema, ViaSpec,
};

/// Everything needed to declare relations and resolve them.
pub mod prelude {
    pub use crate::{
        // Core
        Error,
        // Query building
        Expr,
        // Relations
        HasRelations,
        IndexBy,
        JoinRequest,
        MemoryStore,
        Model,
        OrderBy,
        PivotTable,
        QueryExecutor,
        RecordRef,
        RecordType,
        RelationDescriptor,
        RelationPath,
        RelationResolver,
        RelationValue,
        ResolverConfig,
        Result,
        Row,
        Schema,
        Value,
    };
}
