//! The query shape handed to the execution collaborator.

use crate::clause::OrderBy;
use crate::expr::Expr;
use crate::join::Join;
use ormlink_core::{Dialect, Value};

/// A column in a SELECT list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    /// Optional table name or alias
    pub table: Option<String>,
    /// Column name
    pub column: String,
    /// Output name (`AS ...`); the column name when absent
    pub alias: Option<String>,
}

impl SelectColumn {
    /// A bare column.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
            alias: None,
        }
    }

    /// A qualified column.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
            alias: None,
        }
    }

    /// Set the output name.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The name this column has in result rows.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }

    fn to_sql(&self, dialect: Dialect) -> String {
        let mut sql = match &self.table {
            Some(t) => format!(
                "{}.{}",
                dialect.quote_identifier(t),
                dialect.quote_identifier(&self.column)
            ),
            None => dialect.quote_identifier(&self.column),
        };
        if let Some(alias) = &self.alias {
            sql.push_str(" AS ");
            sql.push_str(&dialect.quote_identifier(alias));
        }
        sql
    }
}

/// Build `table.col AS table__col` selections so joined columns can be
/// told apart in a flat result row.
pub fn aliased_columns(table_alias: &str, columns: &[impl AsRef<str>]) -> Vec<SelectColumn> {
    columns
        .iter()
        .map(|c| {
            let c = c.as_ref();
            SelectColumn::qualified(table_alias, c).alias(format!("{table_alias}__{c}"))
        })
        .collect()
}

/// A SELECT against one table, optionally joined, filtered and ordered.
///
/// This is the only shape the relation engine ever asks the executor for:
/// one query per relation level, or one joined query for `find_with_joins`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationQuery {
    /// Table to select from
    pub table: String,
    /// Optional alias for the FROM table
    pub alias: Option<String>,
    /// Columns to select (empty = all columns of the FROM table)
    pub columns: Vec<SelectColumn>,
    /// WHERE condition
    pub filter: Option<Expr>,
    /// JOIN clauses
    pub joins: Vec<Join>,
    /// ORDER BY clauses
    pub order_by: Vec<OrderBy>,
    /// LIMIT
    pub limit: Option<u64>,
}

impl RelationQuery {
    /// Create a new SELECT for a table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: None,
            columns: Vec::new(),
            filter: None,
            joins: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Alias the FROM table.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The name FROM-table columns are qualified with.
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// Append columns to the SELECT list.
    #[must_use]
    pub fn select(mut self, columns: impl IntoIterator<Item = SelectColumn>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Add a WHERE condition (ANDed with any existing one).
    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(Expr::and_opt(self.filter.take(), expr));
        self
    }

    /// Add a JOIN clause.
    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Add ORDER BY clause.
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Set LIMIT.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Build SQL and parameters for a dialect.
    pub fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::new();

        // SELECT
        sql.push_str("SELECT ");
        if self.columns.is_empty() {
            match &self.alias {
                Some(alias) => {
                    sql.push_str(&dialect.quote_identifier(alias));
                    sql.push_str(".*");
                }
                None => sql.push('*'),
            }
        } else {
            let cols: Vec<_> = self.columns.iter().map(|c| c.to_sql(dialect)).collect();
            sql.push_str(&cols.join(", "));
        }

        // FROM
        sql.push_str(" FROM ");
        sql.push_str(&dialect.quote_identifier(&self.table));
        if let Some(alias) = &self.alias {
            sql.push_str(" AS ");
            sql.push_str(&dialect.quote_identifier(alias));
        }

        // JOINs
        for join in &self.joins {
            sql.push_str(&join.build_with_dialect(dialect, &mut params, 0));
        }

        // WHERE
        if let Some(filter) = &self.filter {
            let where_sql = filter.build_with_dialect(dialect, &mut params, 0);
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        // ORDER BY
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            let order_strs: Vec<_> = self.order_by.iter().map(|o| o.to_sql(dialect)).collect();
            sql.push_str(&order_strs.join(", "));
        }

        // LIMIT
        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }

        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batched_in_query_sql() {
        let query = RelationQuery::new("orders")
            .filter(Expr::in_keys(
                None,
                &["customer_id"],
                vec![vec![Value::BigInt(1)], vec![Value::BigInt(2)]],
            ))
            .filter(Expr::col("status").eq("paid"))
            .order_by(OrderBy::asc("id"));
        let (sql, params) = query.to_sql(Dialect::Postgres);
        assert_eq!(
            sql,
            "SELECT * FROM \"orders\" WHERE \"customer_id\" IN ($1, $2) AND \"status\" = $3 ORDER BY \"id\" ASC"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_join_params_precede_where_params() {
        let query = RelationQuery::new("customers")
            .alias("c")
            .select(aliased_columns("o", &["id", "total"]))
            .join(
                Join::left(
                    "orders",
                    Expr::qualified("o", "customer_id")
                        .eq(Expr::qualified("c", "id"))
                        .and(Expr::qualified("o", "status").eq("paid")),
                )
                .alias("o"),
            )
            .filter(Expr::qualified("c", "region").eq("eu"))
            .limit(10);
        let (sql, params) = query.to_sql(Dialect::Sqlite);
        assert_eq!(
            sql,
            "SELECT \"o\".\"id\" AS \"o__id\", \"o\".\"total\" AS \"o__total\" FROM \"customers\" AS \"c\" \
             LEFT JOIN \"orders\" AS \"o\" ON \"o\".\"customer_id\" = \"c\".\"id\" AND \"o\".\"status\" = ?1 \
             WHERE \"c\".\"region\" = ?2 LIMIT 10"
        );
        assert_eq!(
            params,
            vec![Value::Text("paid".to_string()), Value::Text("eu".to_string())]
        );
    }

    #[test]
    fn test_aliased_star_select() {
        let (sql, _) = RelationQuery::new("items").alias("i").to_sql(Dialect::Postgres);
        assert_eq!(sql, "SELECT \"i\".* FROM \"items\" AS \"i\"");
    }

    #[test]
    fn test_output_name() {
        assert_eq!(SelectColumn::new("id").output_name(), "id");
        assert_eq!(
            SelectColumn::qualified("o", "id").alias("o__id").output_name(),
            "o__id"
        );
    }
}
