//! An in-process query executor over plain row tables.
//!
//! `MemoryStore` evaluates [`RelationQuery`] trees directly: nested-loop
//! joins, three-valued filter logic, stable ordering and projection. It
//! records every executed query so callers can assert on batching, and can
//! be told to fail queries touching a table.
//!
//! Rows within one table are expected to share the same columns.

#![allow(clippy::result_large_err)]

use crate::clause::{NullsOrder, OrderBy, OrderDirection};
use crate::executor::QueryExecutor;
use crate::expr::{BinaryOp, Expr, UnaryOp};
use crate::join::JoinType;
use crate::select::RelationQuery;
use ormlink_core::{
    ColumnInfo, Dialect, Error, KeyValue, QueryError, QueryErrorKind, Result, Row, Value,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// A query the store has executed, with its rendered SQL.
#[derive(Debug, Clone)]
pub struct ExecutedQuery {
    pub query: RelationQuery,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default)]
struct StoreLog {
    executed: Vec<ExecutedQuery>,
    failures: HashMap<String, String>,
}

/// In-memory tables that answer [`RelationQuery`]s.
#[derive(Debug, Default)]
pub struct MemoryStore {
    dialect: Dialect,
    tables: RwLock<HashMap<String, Vec<Row>>>,
    log: Mutex<StoreLog>,
}

impl MemoryStore {
    /// Create an empty store rendering SQL for PostgreSQL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store rendering logged SQL for `dialect`.
    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Make sure a table exists, even with no rows.
    pub fn create_table(&self, table: &str) {
        self.tables_mut().entry(table.to_string()).or_default();
    }

    /// Append a row to a table, creating the table if needed.
    pub fn insert(&self, table: &str, row: Row) {
        self.tables_mut().entry(table.to_string()).or_default().push(row);
    }

    /// Append several rows to a table.
    pub fn insert_rows(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.tables_mut()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Snapshot of a table's rows.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Fail every later query that reads `table`.
    pub fn fail_table(&self, table: &str, message: impl Into<String>) {
        self.lock_log()
            .failures
            .insert(table.to_string(), message.into());
    }

    /// Stop failing queries.
    pub fn clear_failures(&self) {
        self.lock_log().failures.clear();
    }

    /// Number of queries executed so far (including failed ones).
    pub fn query_count(&self) -> usize {
        self.lock_log().executed.len()
    }

    /// All queries executed so far, in order.
    pub fn executed(&self) -> Vec<ExecutedQuery> {
        self.lock_log().executed.clone()
    }

    /// Rendered SQL of all queries executed so far.
    pub fn executed_sql(&self) -> Vec<String> {
        self.lock_log()
            .executed
            .iter()
            .map(|q| q.sql.clone())
            .collect()
    }

    /// Forget executed queries.
    pub fn clear_log(&self) {
        self.lock_log().executed.clear();
    }

    fn lock_log(&self) -> MutexGuard<'_, StoreLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tables_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<Row>>> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl QueryExecutor for MemoryStore {
    #[tracing::instrument(level = "trace", skip(self, query), fields(table = %query.table))]
    fn execute(&self, query: &RelationQuery) -> Result<Vec<Row>> {
        let (sql, params) = query.to_sql(self.dialect);
        tracing::trace!(sql = %sql, params = params.len(), "Executing in-memory query");

        {
            let mut log = self.lock_log();
            log.executed.push(ExecutedQuery {
                query: query.clone(),
                sql: sql.clone(),
                params,
            });
            let touched = std::iter::once(&query.table).chain(query.joins.iter().map(|j| &j.table));
            for table in touched {
                if let Some(message) = log.failures.get(table) {
                    return Err(Error::Query(QueryError {
                        kind: QueryErrorKind::Database,
                        sql: Some(sql),
                        message: message.clone(),
                        source: None,
                    }));
                }
            }
        }

        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        run(query, &tables).map_err(|e| match e {
            Error::Query(mut q) => {
                q.sql = Some(sql);
                Error::Query(q)
            }
            other => other,
        })
    }
}

// ==================== Evaluation ====================

type Tuple<'a> = Vec<Option<&'a Row>>;

struct Scope<'q, 'r> {
    names: &'q [&'q str],
    tuple: &'q [Option<&'r Row>],
}

fn not_found(message: String) -> Error {
    Error::query(QueryErrorKind::NotFound, message)
}

fn syntax(message: &str) -> Error {
    Error::query(QueryErrorKind::Syntax, message)
}

fn table_rows<'a>(tables: &'a HashMap<String, Vec<Row>>, table: &str) -> Result<&'a [Row]> {
    tables
        .get(table)
        .map(Vec::as_slice)
        .ok_or_else(|| not_found(format!("no such table: {table}")))
}

fn run(query: &RelationQuery, tables: &HashMap<String, Vec<Row>>) -> Result<Vec<Row>> {
    let base = table_rows(tables, &query.table)?;
    let mut names: Vec<&str> = vec![query.reference_name()];
    let mut tuples: Vec<Tuple<'_>> = base.iter().map(|r| vec![Some(r)]).collect();

    for join in &query.joins {
        let rows = table_rows(tables, &join.table)?;
        names.push(join.reference_name());
        let mut next = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let mut matched = false;
            for row in rows {
                let mut candidate = tuple.clone();
                candidate.push(Some(row));
                let scope = Scope {
                    names: &names,
                    tuple: &candidate,
                };
                if truth(&eval(&join.on, &scope)?) == Some(true) {
                    next.push(candidate);
                    matched = true;
                }
            }
            if !matched && join.join_type == JoinType::Left {
                let mut candidate = tuple;
                candidate.push(None);
                next.push(candidate);
            }
        }
        tuples = next;
    }

    if let Some(filter) = &query.filter {
        let mut kept = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let scope = Scope {
                names: &names,
                tuple: &tuple,
            };
            if truth(&eval(filter, &scope)?) == Some(true) {
                kept.push(tuple);
            }
        }
        tuples = kept;
    }

    if !query.order_by.is_empty() {
        let mut keyed = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let scope = Scope {
                names: &names,
                tuple: &tuple,
            };
            let mut key = Vec::with_capacity(query.order_by.len());
            for order in &query.order_by {
                let (table, column) = order.parts();
                key.push(scope.column(table, column)?);
            }
            keyed.push((key, tuple));
        }
        keyed.sort_by(|a, b| compare_sort_keys(&query.order_by, &a.0, &b.0));
        tuples = keyed.into_iter().map(|(_, t)| t).collect();
    }

    if let Some(limit) = query.limit {
        tuples.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }

    if query.columns.is_empty() {
        return Ok(tuples
            .into_iter()
            .filter_map(|t| t.first().copied().flatten().cloned())
            .collect());
    }

    let info = Arc::new(ColumnInfo::new(
        query
            .columns
            .iter()
            .map(|c| c.output_name().to_string())
            .collect(),
    ));
    let mut out = Vec::with_capacity(tuples.len());
    for tuple in &tuples {
        let scope = Scope {
            names: &names,
            tuple,
        };
        let values = query
            .columns
            .iter()
            .map(|c| scope.column(c.table.as_deref(), &c.column))
            .collect::<Result<Vec<_>>>()?;
        out.push(Row::with_columns(Arc::clone(&info), values));
    }
    Ok(out)
}

impl Scope<'_, '_> {
    fn column(&self, table: Option<&str>, name: &str) -> Result<Value> {
        if let Some(table) = table {
            let idx = self
                .names
                .iter()
                .position(|n| *n == table)
                .ok_or_else(|| not_found(format!("unknown table reference: {table}")))?;
            return match self.tuple.get(idx).copied().flatten() {
                None => Ok(Value::Null),
                Some(row) => row
                    .get_by_name(name)
                    .cloned()
                    .ok_or_else(|| not_found(format!("no such column: {table}.{name}"))),
            };
        }

        let mut saw_missing_row = false;
        for entry in self.tuple {
            match entry {
                Some(row) => {
                    if let Some(value) = row.get_by_name(name) {
                        return Ok(value.clone());
                    }
                }
                None => saw_missing_row = true,
            }
        }
        if saw_missing_row {
            Ok(Value::Null)
        } else {
            Err(not_found(format!("no such column: {name}")))
        }
    }
}

fn bool_value(b: Option<bool>) -> Value {
    b.map_or(Value::Null, Value::Bool)
}

fn truth(value: &Value) -> Option<bool> {
    if value.is_null() {
        None
    } else {
        value.as_bool()
    }
}

fn eval(expr: &Expr, scope: &Scope<'_, '_>) -> Result<Value> {
    match expr {
        Expr::Column { table, name } => scope.column(table.as_deref(), name),
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Paren(inner) => eval(inner, scope),
        Expr::Raw(_) => Err(syntax("raw SQL fragments cannot be evaluated in memory")),
        Expr::Tuple(_) => Err(syntax("row value used outside of IN")),

        Expr::Unary {
            op: UnaryOp::Not,
            expr,
        } => Ok(bool_value(truth(&eval(expr, scope)?).map(|b| !b))),

        Expr::IsNull { expr, negated } => {
            let value = eval(expr, scope)?;
            Ok(Value::Bool(value.is_null() != *negated))
        }

        Expr::Binary { left, op, right } => {
            let l = eval(left, scope)?;
            let r = eval(right, scope)?;
            Ok(match op {
                BinaryOp::And => bool_value(match (truth(&l), truth(&r)) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                }),
                BinaryOp::Or => bool_value(match (truth(&l), truth(&r)) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                }),
                BinaryOp::Eq => bool_value(values_equal(&l, &r)),
                BinaryOp::Ne => bool_value(values_equal(&l, &r).map(|b| !b)),
                BinaryOp::Lt => bool_value(compare_values(&l, &r).map(Ordering::is_lt)),
                BinaryOp::Le => bool_value(compare_values(&l, &r).map(Ordering::is_le)),
                BinaryOp::Gt => bool_value(compare_values(&l, &r).map(Ordering::is_gt)),
                BinaryOp::Ge => bool_value(compare_values(&l, &r).map(Ordering::is_ge)),
            })
        }

        Expr::In {
            expr,
            values,
            negated,
        } => {
            let lhs = eval_row_value(expr, scope)?;
            let mut unknown = false;
            for candidate in values {
                let rhs = eval_row_value(candidate, scope)?;
                if rhs.len() != lhs.len() {
                    return Err(syntax("row values in IN have different arity"));
                }
                let mut all = Some(true);
                for (a, b) in lhs.iter().zip(&rhs) {
                    match values_equal(a, b) {
                        Some(true) => {}
                        Some(false) => {
                            all = Some(false);
                            break;
                        }
                        None => all = None,
                    }
                }
                match all {
                    Some(true) => return Ok(Value::Bool(!*negated)),
                    None => unknown = true,
                    Some(false) => {}
                }
            }
            if unknown {
                Ok(Value::Null)
            } else {
                Ok(Value::Bool(*negated))
            }
        }
    }
}

fn eval_row_value(expr: &Expr, scope: &Scope<'_, '_>) -> Result<Vec<Value>> {
    match expr {
        Expr::Tuple(items) => items.iter().map(|i| eval(i, scope)).collect(),
        other => Ok(vec![eval(other, scope)?]),
    }
}

const fn is_integral(v: &Value) -> bool {
    matches!(
        v,
        Value::TinyInt(_) | Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_)
    )
}

const fn is_numeric(v: &Value) -> bool {
    is_integral(v) || matches!(v, Value::Float(_) | Value::Double(_))
}

/// SQL equality; `None` when either side is NULL.
///
/// Numbers compare through [`KeyValue`], the same normalization the
/// relation linker hashes with, so a row this store returns for an `IN`
/// filter is always a row the linker can match.
fn values_equal(a: &Value, b: &Value) -> Option<bool> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if is_numeric(a) && is_numeric(b) {
        let (a, b) = (KeyValue::new(a.clone()), KeyValue::new(b.clone()));
        return Some(!a.is_unmatchable() && a == b);
    }
    Some(a == b)
}

/// SQL ordering; `None` for NULLs and values of unrelated types.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if is_integral(a) && is_integral(b) {
        return Some(a.as_i64()?.cmp(&b.as_i64()?));
    }
    if is_numeric(a) && is_numeric(b) {
        return a.as_f64()?.partial_cmp(&b.as_f64()?);
    }
    match (a, b) {
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Some(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::Uuid(x), Value::Uuid(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_sort_keys(order_by: &[OrderBy], a: &[Value], b: &[Value]) -> Ordering {
    for ((order, va), vb) in order_by.iter().zip(a).zip(b) {
        let nulls_first = order.effective_nulls() == NullsOrder::First;
        let ord = match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = compare_values(va, vb).unwrap_or(Ordering::Equal);
                match order.direction() {
                    OrderDirection::Asc => ord,
                    OrderDirection::Desc => ord.reverse(),
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
