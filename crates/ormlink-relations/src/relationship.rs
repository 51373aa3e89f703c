//! Relation declarations.
//!
//! A [`RelationDescriptor`] is the static metadata for one named relation on
//! a record type: which record type sits at the other end, how owner and
//! target rows are linked, how many targets an owner may have, and the
//! optional junction, filter, ordering, indexing and inverse settings.
//!
//! Descriptors are built once with the fluent constructors and registered
//! on a [`crate::RecordType`]. They are validated when a relation is first
//! resolved, not when they are declared.

#![allow(clippy::result_large_err)]

use ormlink_core::{ConfigErrorKind, Error, Result, Row, Value, validate_identifier};
use ormlink_query::{Expr, OrderBy};
use std::fmt;
use std::sync::Arc;

/// How many target records an owner may have through a relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Multiplicity {
    /// At most one target; the first matching row wins.
    One,
    /// Any number of targets, in result order (junction order for via).
    #[default]
    Many,
}

/// One equality pair of a link: `owner.local = target.remote`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPair {
    /// Attribute on the near side (owner, or junction for the second hop)
    pub local: String,
    /// Attribute on the far side (target, or junction for the first hop)
    pub remote: String,
}

impl LinkPair {
    pub fn new(local: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }
}

/// A pivot table used as the junction of a two-hop relation.
///
/// `link` maps owner attributes to pivot columns. The descriptor's own link
/// then maps pivot columns to target attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTable {
    pub table: String,
    pub link: Vec<LinkPair>,
    pub condition: Option<Expr>,
}

impl PivotTable {
    /// Create a pivot table spec.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            link: Vec::new(),
            condition: None,
        }
    }

    /// Add an `owner.local = pivot.remote` pair.
    #[must_use]
    pub fn link(mut self, owner_attribute: impl Into<String>, pivot_column: impl Into<String>) -> Self {
        self.link.push(LinkPair::new(owner_attribute, pivot_column));
        self
    }

    /// Restrict which pivot rows participate.
    #[must_use]
    pub fn condition(mut self, condition: Expr) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Pivot columns matched against the owner.
    pub fn owner_columns(&self) -> Vec<&str> {
        self.link.iter().map(|p| p.remote.as_str()).collect()
    }

    /// Owner attributes the pivot is keyed on.
    pub fn owner_attributes(&self) -> Vec<&str> {
        self.link.iter().map(|p| p.local.as_str()).collect()
    }
}

/// The junction of a two-hop relation.
#[derive(Debug, Clone, PartialEq)]
pub enum ViaSpec {
    /// Another relation declared on the same owner type, whose targets are
    /// the junction records.
    Relation(String),
    /// A pivot table with explicit column pairs.
    Table(PivotTable),
}

/// Computes the key of a row in an indexed relation result.
#[derive(Clone)]
pub enum IndexBy {
    /// Use the value of this attribute.
    Attribute(String),
    /// Compute the key from the row.
    Function(Arc<dyn Fn(&Row) -> Value + Send + Sync>),
}

impl IndexBy {
    pub fn attribute(name: impl Into<String>) -> Self {
        IndexBy::Attribute(name.into())
    }

    pub fn function(f: impl Fn(&Row) -> Value + Send + Sync + 'static) -> Self {
        IndexBy::Function(Arc::new(f))
    }

    /// Compute the key for a row. A missing attribute keys as NULL.
    pub fn key_for(&self, row: &Row) -> Value {
        match self {
            IndexBy::Attribute(name) => row.get_by_name(name).cloned().unwrap_or(Value::Null),
            IndexBy::Function(f) => f(row),
        }
    }
}

impl fmt::Debug for IndexBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexBy::Attribute(name) => f.debug_tuple("Attribute").field(name).finish(),
            IndexBy::Function(_) => f.write_str("Function(<fn>)"),
        }
    }
}

/// Metadata for one named relation.
///
/// # Example
///
/// ```
/// use ormlink_relations::{IndexBy, RelationDescriptor};
/// use ormlink_query::{Expr, OrderBy};
///
/// let orders = RelationDescriptor::has_many("orders", "Order")
///     .link("id", "customer_id")
///     .condition(Expr::col("status").ne("void"))
///     .order_by(OrderBy::asc("id"))
///     .inverse_of("customer");
///
/// let items = RelationDescriptor::has_many("items", "Item")
///     .via_relation("order_items")
///     .link("item_id", "id")
///     .index_by(IndexBy::attribute("sku"));
/// # let _ = (orders, items);
/// ```
#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    name: String,
    target: String,
    multiplicity: Multiplicity,
    link: Vec<LinkPair>,
    via: Option<ViaSpec>,
    condition: Option<Expr>,
    inverse_of: Option<String>,
    order_by: Vec<OrderBy>,
    index_by: Option<IndexBy>,
}

impl RelationDescriptor {
    fn new(name: impl Into<String>, target: impl Into<String>, multiplicity: Multiplicity) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            multiplicity,
            link: Vec::new(),
            via: None,
            condition: None,
            inverse_of: None,
            order_by: Vec::new(),
            index_by: None,
        }
    }

    /// Declare a relation yielding at most one target.
    pub fn has_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, Multiplicity::One)
    }

    /// Declare a relation yielding any number of targets.
    pub fn has_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, Multiplicity::Many)
    }

    /// Add a link pair.
    ///
    /// Without a junction, `local` is an owner attribute. With one, `local`
    /// is a junction attribute. `remote` is always a target attribute.
    #[must_use]
    pub fn link(mut self, local: impl Into<String>, remote: impl Into<String>) -> Self {
        self.link.push(LinkPair::new(local, remote));
        self
    }

    /// Route through another relation of the owner.
    #[must_use]
    pub fn via_relation(mut self, relation: impl Into<String>) -> Self {
        self.via = Some(ViaSpec::Relation(relation.into()));
        self
    }

    /// Route through a pivot table.
    #[must_use]
    pub fn via_table(mut self, pivot: PivotTable) -> Self {
        self.via = Some(ViaSpec::Table(pivot));
        self
    }

    /// Extra filter on target rows.
    #[must_use]
    pub fn condition(mut self, condition: Expr) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Name of the relation on the target that points back at the owner.
    #[must_use]
    pub fn inverse_of(mut self, relation: impl Into<String>) -> Self {
        self.inverse_of = Some(relation.into());
        self
    }

    /// Order target rows.
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Key a `Many` result by attribute or function instead of a sequence.
    #[must_use]
    pub fn index_by(mut self, index: IndexBy) -> Self {
        self.index_by = Some(index);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the target record type.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    pub fn is_many(&self) -> bool {
        self.multiplicity == Multiplicity::Many
    }

    pub fn link_pairs(&self) -> &[LinkPair] {
        &self.link
    }

    /// Near-side attributes of the link, in link order.
    pub fn local_attributes(&self) -> Vec<&str> {
        self.link.iter().map(|p| p.local.as_str()).collect()
    }

    /// Target attributes of the link, in link order.
    pub fn remote_attributes(&self) -> Vec<&str> {
        self.link.iter().map(|p| p.remote.as_str()).collect()
    }

    pub fn via(&self) -> Option<&ViaSpec> {
        self.via.as_ref()
    }

    pub fn condition_expr(&self) -> Option<&Expr> {
        self.condition.as_ref()
    }

    pub fn inverse(&self) -> Option<&str> {
        self.inverse_of.as_deref()
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn index(&self) -> Option<&IndexBy> {
        self.index_by.as_ref()
    }

    /// Check names and link shape.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("relation name", &self.name)?;
        validate_identifier("target record type", &self.target)?;
        if self.link.is_empty() {
            return Err(Error::config(
                ConfigErrorKind::InvalidLink,
                format!("relation '{}' declares no link attributes", self.name),
            ));
        }
        for pair in &self.link {
            validate_identifier("link attribute", &pair.local)?;
            validate_identifier("link attribute", &pair.remote)?;
        }
        match &self.via {
            Some(ViaSpec::Relation(name)) => {
                validate_identifier("via relation", name)?;
                if name == &self.name {
                    return Err(Error::config(
                        ConfigErrorKind::UnresolvableVia,
                        format!("relation '{}' cannot route through itself", self.name),
                    ));
                }
            }
            Some(ViaSpec::Table(pivot)) => {
                validate_identifier("pivot table", &pivot.table)?;
                if pivot.link.is_empty() {
                    return Err(Error::config(
                        ConfigErrorKind::UnresolvableVia,
                        format!(
                            "pivot table '{}' of relation '{}' declares no owner link",
                            pivot.table, self.name
                        ),
                    ));
                }
                for pair in &pivot.link {
                    validate_identifier("pivot link attribute", &pair.local)?;
                    validate_identifier("pivot link attribute", &pair.remote)?;
                }
            }
            None => {}
        }
        if let Some(inverse) = &self.inverse_of {
            validate_identifier("inverse relation", inverse)?;
        }
        if let Some(IndexBy::Attribute(name)) = &self.index_by {
            validate_identifier("index attribute", name)?;
        }
        Ok(())
    }
}
