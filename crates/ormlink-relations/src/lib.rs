//! Relation resolution for ormlink.
//!
//! `ormlink-relations` is the **relation engine**. Given records that a
//! primary query already returned, it loads their related records in
//! batches, links them back in memory and caches the result per record.
//!
//! # Role In The Architecture
//!
//! - **Declarations**: [`RelationDescriptor`] (link, multiplicity, junction,
//!   condition, inverse, ordering, index) registered per [`RecordType`] in a
//!   [`Schema`].
//! - **Records**: [`RecordRef`] shares one [`Record`] (attributes plus
//!   relation cache) between every owner it is linked to.
//! - **Eager loading**: [`RelationResolver::resolve`] issues one query per
//!   relation level (two through a junction), whatever the owner count.
//! - **Linking**: [`RelationLinker`] matches targets to owners by hashed
//!   [`LinkKey`](ormlink_core::LinkKey); NULL never matches.
//! - **Lazy loading**: [`RelationResolver::resolve_one`] and
//!   [`LazyRelationProxy`] load on first access and cache until a link
//!   attribute changes.
//! - **Joined loading**: [`JoinPlanner`] builds aliased joins for
//!   [`RelationResolver::find_with_joins`].
//!
//! # Design Philosophy
//!
//! - **Explicit context**: the executor is handed to the resolver; there is
//!   no global connection.
//! - **Explicit registry**: relations are looked up by exact name; a name
//!   that only differs in case is a configuration error.
//! - **Read-only**: resolution never writes and never retries; executor
//!   errors reach the caller unchanged.
//!
//! # Example
//!
//! ```
//! use ormlink_core::Row;
//! use ormlink_query::MemoryStore;
//! use ormlink_relations::{RecordType, RelationDescriptor, RelationResolver, Schema};
//!
//! let schema = Schema::builder()
//!     .register(
//!         RecordType::builder("Customer")
//!             .table("customers")
//!             .relation(RelationDescriptor::has_many("orders", "Order").link("id", "customer_id"))
//!             .build(),
//!     )
//!     .register(RecordType::builder("Order").table("orders").build())
//!     .build();
//!
//! let store = MemoryStore::new();
//! store.insert("orders", Row::from_pairs([("id", 10_i64), ("customer_id", 1_i64)]));
//! store.insert("orders", Row::from_pairs([("id", 11_i64), ("customer_id", 2_i64)]));
//!
//! let customers = schema
//!     .records("Customer", vec![
//!         Row::from_pairs([("id", 1_i64)]),
//!         Row::from_pairs([("id", 2_i64)]),
//!     ])
//!     .unwrap();
//!
//! let resolver = RelationResolver::new(schema, &store);
//! resolver.resolve_names(&customers, &["orders"]).unwrap();
//! assert_eq!(store.query_count(), 1);
//! assert_eq!(customers[0].relation("orders").unwrap().len(), 1);
//! ```

pub mod config;
pub mod join_planner;
pub mod lazy;
pub mod linker;
pub mod model;
pub mod path;
pub mod populate;
pub mod record;
pub mod relationship;
pub mod resolver;
pub mod schema;
pub mod tracker;

pub use config::ResolverConfig;
pub use join_planner::{JoinPlan, JoinPlanner, JoinRequest};
pub use lazy::{HasRelations, LazyRelationProxy};
pub use linker::{Junction, RelationLinker, link};
pub use model::Model;
pub use path::{QueryCustomizer, RelationPath};
pub use populate::{ResultPopulator, models};
pub use record::{
    IndexedRelation, Record, RecordRef, Related, RelationCache, RelationValue, WeakRecordRef,
};
pub use relationship::{
    IndexBy, LinkPair, Multiplicity, PivotTable, RelationDescriptor, ViaSpec,
};
pub use resolver::RelationResolver;
pub use schema::{RecordType, RecordTypeBuilder, Schema, SchemaBuilder};
pub use tracker::{CallSite, LazyLoadStats, LazyLoadTracker};
