//! Typed views over records.

#![allow(clippy::result_large_err)]

use ormlink_core::{Result, Row};

/// A Rust type that can be built from a record of one record type.
///
/// `RECORD_TYPE` names the registered record type the struct mirrors. The
/// resolver compares it with a relation's declared target before handing
/// out typed values, so asking for `Vec<Order>` from a relation that points
/// at `Product` fails with a configuration error instead of a decode error.
///
/// ```ignore
/// struct Order { id: i64, total: f64 }
///
/// impl Model for Order {
///     const RECORD_TYPE: &'static str = "Order";
///
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Self { id: row.get_named("id")?, total: row.get_named("total")? })
///     }
/// }
/// ```
pub trait Model: Sized {
    /// Name of the record type this model mirrors.
    const RECORD_TYPE: &'static str;

    /// Build an instance from an attribute row.
    fn from_row(row: &Row) -> Result<Self>;
}
