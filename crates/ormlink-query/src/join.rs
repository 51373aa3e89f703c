//! JOIN clause types.

use crate::expr::Expr;
use ormlink_core::{Dialect, Value};

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Type of join
    pub join_type: JoinType,
    /// Table to join
    pub table: String,
    /// Optional table alias
    pub alias: Option<String>,
    /// ON condition
    pub on: Expr,
}

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    Inner,
    #[default]
    Left,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

impl Join {
    /// Create an INNER JOIN.
    pub fn inner(table: impl Into<String>, on: Expr) -> Self {
        Self {
            join_type: JoinType::Inner,
            table: table.into(),
            alias: None,
            on,
        }
    }

    /// Create a LEFT JOIN.
    pub fn left(table: impl Into<String>, on: Expr) -> Self {
        Self {
            join_type: JoinType::Left,
            table: table.into(),
            alias: None,
            on,
        }
    }

    /// Set an alias for the joined table.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The name columns of this join are qualified with.
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// Do two joins name the same table under the same alias with the same
    /// condition? Such joins are emitted once.
    pub fn same_target(&self, other: &Join) -> bool {
        self.table == other.table && self.reference_name() == other.reference_name() && self.on == other.on
    }

    /// Generate SQL and collect parameters with a specific dialect.
    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        let mut sql = format!(
            " {} {}",
            self.join_type.as_str(),
            dialect.quote_identifier(&self.table)
        );

        if let Some(alias) = &self.alias {
            sql.push_str(" AS ");
            sql.push_str(&dialect.quote_identifier(alias));
        }

        let on_sql = self.on.build_with_dialect(dialect, params, offset);
        sql.push_str(" ON ");
        sql.push_str(&on_sql);

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_left_join_with_alias() {
        let join = Join::left(
            "orders",
            Expr::qualified("o", "customer_id").eq(Expr::qualified("customers", "id")),
        )
        .alias("o");
        let mut params = Vec::new();
        let sql = join.build_with_dialect(Dialect::Postgres, &mut params, 0);
        assert_eq!(
            sql,
            " LEFT JOIN \"orders\" AS \"o\" ON \"o\".\"customer_id\" = \"customers\".\"id\""
        );
        assert!(params.is_empty());
        assert_eq!(join.reference_name(), "o");
    }

    #[test]
    fn test_inner_join_binds_condition_params() {
        let join = Join::inner(
            "items",
            Expr::qualified("items", "kind").eq("book"),
        );
        let mut params = Vec::new();
        let sql = join.build_with_dialect(Dialect::Sqlite, &mut params, 2);
        assert_eq!(sql, " INNER JOIN \"items\" ON \"items\".\"kind\" = ?3");
        assert_eq!(params, vec![Value::Text("book".to_string())]);
    }

    #[test]
    fn test_same_target() {
        let on = Expr::qualified("a", "id").eq(Expr::qualified("b", "a_id"));
        let a = Join::left("b", on.clone());
        let b = Join::inner("b", on.clone());
        let c = Join::left("b", on).alias("b2");
        assert!(a.same_target(&b));
        assert!(!a.same_target(&c));
    }
}
