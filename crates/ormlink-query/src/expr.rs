//! SQL expressions for relation filters and join conditions.
//!
//! Expressions are built fluently (`Expr::col("status").eq("active")`) and
//! rendered per dialect with bound parameters. The same tree is evaluated
//! directly by [`crate::MemoryStore`].

use ormlink_core::{Dialect, Value};

/// A SQL expression usable in WHERE and ON clauses.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference with optional table qualifier
    Column {
        /// Optional table name or alias
        table: Option<String>,
        /// Column name
        name: String,
    },

    /// Literal value (always bound as a parameter)
    Literal(Value),

    /// Binary operation (e.g., a = b, a AND b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation
    Unary { op: UnaryOp, expr: Box<Expr> },

    /// IN expression
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// Row value, e.g. `("a", "b")` on the left of a composite IN
    Tuple(Vec<Expr>),

    /// Raw SQL fragment (escape hatch)
    Raw(String),

    /// Parenthesized expression
    Paren(Box<Expr>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Comparison
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,

    // Logical
    /// Logical AND
    And,
    /// Logical OR
    Or,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    /// Get the precedence of this operator (higher = binds tighter).
    pub const fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 3,
        }
    }

    /// Is this a logical connective?
    pub const fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
}

impl Expr {
    // ==================== Constructors ====================

    /// Create a column reference expression.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// Create a qualified column reference (table.column).
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: column.into(),
        }
    }

    /// Create a literal value expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Create a NULL literal.
    pub fn null() -> Self {
        Expr::Literal(Value::Null)
    }

    /// Create a raw SQL expression.
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    /// Create a row value from component expressions.
    pub fn tuple(items: Vec<Expr>) -> Self {
        Expr::Tuple(items)
    }

    // ==================== Comparison Operators ====================

    /// Equal to (=)
    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other.into())
    }

    /// Not equal to (<>)
    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other.into())
    }

    /// Less than (<)
    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other.into())
    }

    /// Less than or equal to (<=)
    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other.into())
    }

    /// Greater than (>)
    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other.into())
    }

    /// Greater than or equal to (>=)
    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other.into())
    }

    // ==================== Logical Operators ====================

    /// Logical AND
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other.into())
    }

    /// Logical OR
    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other.into())
    }

    /// Logical NOT
    pub fn not(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    /// Combine an optional condition with another using AND.
    pub fn and_opt(existing: Option<Expr>, other: Expr) -> Expr {
        match existing {
            Some(e) => e.and(other),
            None => other,
        }
    }

    // ==================== Null Checks ====================

    /// IS NULL
    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// IS NOT NULL
    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    // ==================== IN Lists ====================

    /// IN list of values
    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// NOT IN list of values
    pub fn not_in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// Membership of a (possibly composite) column tuple in a set of keys.
    ///
    /// A single column renders as `col IN (...)`; several columns render as
    /// `(a, b) IN ((..), (..))`. Every key must have one value per column.
    pub fn in_keys(
        table: Option<&str>,
        columns: &[impl AsRef<str>],
        keys: impl IntoIterator<Item = Vec<Value>>,
    ) -> Self {
        let column = |name: &str| Expr::Column {
            table: table.map(str::to_string),
            name: name.to_string(),
        };
        if let [single] = columns {
            let values: Vec<Expr> = keys
                .into_iter()
                .filter_map(|mut key| key.pop())
                .map(Expr::Literal)
                .collect();
            return column(single.as_ref()).in_list(values);
        }
        let lhs = Expr::Tuple(columns.iter().map(|c| column(c.as_ref())).collect());
        let values: Vec<Expr> = keys
            .into_iter()
            .map(|key| Expr::Tuple(key.into_iter().map(Expr::Literal).collect()))
            .collect();
        lhs.in_list(values)
    }

    /// Wrap in parentheses.
    pub fn paren(self) -> Self {
        Expr::Paren(Box::new(self))
    }

    /// Qualify every unqualified column reference with `table`.
    ///
    /// Used when a condition written against a target table is moved into a
    /// JOIN's ON clause, where bare names would be ambiguous.
    #[must_use]
    pub fn qualify(&self, table: &str) -> Expr {
        match self {
            Expr::Column { table: None, name } => Expr::qualified(table, name.clone()),
            Expr::Column { .. } | Expr::Literal(_) | Expr::Raw(_) => self.clone(),
            Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(left.qualify(table)),
                op: *op,
                right: Box::new(right.qualify(table)),
            },
            Expr::Unary { op, expr } => Expr::Unary {
                op: *op,
                expr: Box::new(expr.qualify(table)),
            },
            Expr::In {
                expr,
                values,
                negated,
            } => Expr::In {
                expr: Box::new(expr.qualify(table)),
                values: values.iter().map(|v| v.qualify(table)).collect(),
                negated: *negated,
            },
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(expr.qualify(table)),
                negated: *negated,
            },
            Expr::Tuple(items) => Expr::Tuple(items.iter().map(|i| i.qualify(table)).collect()),
            Expr::Paren(expr) => Expr::Paren(Box::new(expr.qualify(table))),
        }
    }

    fn binary(self, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    // ==================== SQL Generation ====================

    /// Build SQL string and collect parameters (default PostgreSQL dialect).
    pub fn build(&self, params: &mut Vec<Value>, offset: usize) -> String {
        self.build_with_dialect(Dialect::Postgres, params, offset)
    }

    /// Build SQL string with specific dialect.
    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        match self {
            Expr::Column { table, name } => {
                if let Some(t) = table {
                    format!(
                        "{}.{}",
                        dialect.quote_identifier(t),
                        dialect.quote_identifier(name)
                    )
                } else {
                    dialect.quote_identifier(name)
                }
            }

            Expr::Literal(value) => {
                params.push(value.clone());
                dialect.placeholder(offset + params.len())
            }

            Expr::Binary { left, op, right } => {
                let left_sql = left.build_operand(*op, dialect, params, offset);
                let right_sql = right.build_operand(*op, dialect, params, offset);
                format!("{left_sql} {} {right_sql}", op.as_str())
            }

            Expr::Unary { op, expr } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                match op {
                    UnaryOp::Not => match expr.as_ref() {
                        Expr::Binary { .. } => format!("NOT ({expr_sql})"),
                        _ => format!("NOT {expr_sql}"),
                    },
                }
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                let not_str = if *negated { "NOT " } else { "" };
                if values.is_empty() {
                    // Standard SQL rejects `IN ()`; an empty set never matches.
                    return if *negated { "1 = 1" } else { "1 = 0" }.to_string();
                }
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let value_sqls: Vec<_> = values
                    .iter()
                    .map(|v| v.build_with_dialect(dialect, params, offset))
                    .collect();
                format!("{expr_sql} {not_str}IN ({})", value_sqls.join(", "))
            }

            Expr::IsNull { expr, negated } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let not_str = if *negated { " NOT" } else { "" };
                format!("{expr_sql} IS{not_str} NULL")
            }

            Expr::Tuple(items) => {
                let item_sqls: Vec<_> = items
                    .iter()
                    .map(|i| i.build_with_dialect(dialect, params, offset))
                    .collect();
                format!("({})", item_sqls.join(", "))
            }

            Expr::Raw(sql) => sql.clone(),

            Expr::Paren(expr) => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                format!("({expr_sql})")
            }
        }
    }

    /// Render an operand of `parent`, parenthesizing looser-binding children.
    fn build_operand(
        &self,
        parent: BinaryOp,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        let sql = self.build_with_dialect(dialect, params, offset);
        match self {
            Expr::Binary { op, .. } if op.precedence() < parent.precedence() => {
                format!("({sql})")
            }
            _ => sql,
        }
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Value::Text(s))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Value::Int(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::BigInt(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::Literal(Value::Double(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Column Tests ====================

    #[test]
    fn test_column_simple() {
        let expr = Expr::col("name");
        let mut params = Vec::new();
        let sql = expr.build(&mut params, 0);
        assert_eq!(sql, "\"name\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_column_qualified() {
        let expr = Expr::qualified("orders", "customer_id");
        let mut params = Vec::new();
        let sql = expr.build(&mut params, 0);
        assert_eq!(sql, "\"orders\".\"customer_id\"");
    }

    // ==================== Comparison Tests ====================

    #[test]
    fn test_eq_binds_parameter() {
        let expr = Expr::col("status").eq("active");
        let mut params = Vec::new();
        let sql = expr.build(&mut params, 0);
        assert_eq!(sql, "\"status\" = $1");
        assert_eq!(params, vec![Value::Text("active".to_string())]);
    }

    #[test]
    fn test_offset_shifts_placeholders() {
        let expr = Expr::col("age").gt(18);
        let mut params = Vec::new();
        let sql = expr.build_with_dialect(Dialect::Sqlite, &mut params, 3);
        assert_eq!(sql, "\"age\" > ?4");
    }

    // ==================== Logical Tests ====================

    #[test]
    fn test_or_inside_and_is_parenthesized() {
        let expr = Expr::col("a")
            .eq(1)
            .or(Expr::col("b").eq(2))
            .and(Expr::col("c").eq(3));
        let mut params = Vec::new();
        let sql = expr.build(&mut params, 0);
        assert_eq!(sql, "(\"a\" = $1 OR \"b\" = $2) AND \"c\" = $3");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_and_inside_or_is_not_parenthesized() {
        let expr = Expr::col("a")
            .eq(1)
            .and(Expr::col("b").eq(2))
            .or(Expr::col("c").eq(3));
        let mut params = Vec::new();
        let sql = expr.build(&mut params, 0);
        assert_eq!(sql, "\"a\" = $1 AND \"b\" = $2 OR \"c\" = $3");
    }

    #[test]
    fn test_not_wraps_binary() {
        let expr = Expr::col("a").eq(1).not();
        let mut params = Vec::new();
        assert_eq!(expr.build(&mut params, 0), "NOT (\"a\" = $1)");
    }

    // ==================== IN Tests ====================

    #[test]
    fn test_in_keys_single_column() {
        let expr = Expr::in_keys(
            None,
            &["customer_id"],
            vec![vec![Value::BigInt(1)], vec![Value::BigInt(2)]],
        );
        let mut params = Vec::new();
        let sql = expr.build(&mut params, 0);
        assert_eq!(sql, "\"customer_id\" IN ($1, $2)");
        assert_eq!(params, vec![Value::BigInt(1), Value::BigInt(2)]);
    }

    #[test]
    fn test_in_keys_composite() {
        let expr = Expr::in_keys(
            Some("t"),
            &["a", "b"],
            vec![vec![Value::BigInt(1), Value::BigInt(2)]],
        );
        let mut params = Vec::new();
        let sql = expr.build_with_dialect(Dialect::Mysql, &mut params, 0);
        assert_eq!(sql, "(`t`.`a`, `t`.`b`) IN ((?, ?))");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_empty_in_list_never_matches() {
        let expr = Expr::col("id").in_list(Vec::<Expr>::new());
        let mut params = Vec::new();
        assert_eq!(expr.build(&mut params, 0), "1 = 0");
    }

    #[test]
    fn test_is_null() {
        let mut params = Vec::new();
        assert_eq!(
            Expr::col("deleted_at").is_null().build(&mut params, 0),
            "\"deleted_at\" IS NULL"
        );
        assert_eq!(
            Expr::col("deleted_at").is_not_null().build(&mut params, 0),
            "\"deleted_at\" IS NOT NULL"
        );
    }

    // ==================== Qualification ====================

    #[test]
    fn test_qualify_only_touches_bare_columns() {
        let expr = Expr::col("status")
            .eq("paid")
            .and(Expr::qualified("c", "id").eq(Expr::col("customer_id")));
        let qualified = expr.qualify("o");
        let mut params = Vec::new();
        let sql = qualified.build(&mut params, 0);
        assert_eq!(
            sql,
            "\"o\".\"status\" = $1 AND \"c\".\"id\" = \"o\".\"customer_id\""
        );
    }

    #[test]
    fn test_and_opt() {
        let combined = Expr::and_opt(None, Expr::col("a").eq(1));
        assert_eq!(combined, Expr::col("a").eq(1));
        let combined = Expr::and_opt(Some(Expr::col("a").eq(1)), Expr::col("b").eq(2));
        assert!(matches!(
            combined,
            Expr::Binary {
                op: BinaryOp::And,
                ..
            }
        ));
    }
}
