//! ORDER BY clause types.

use ormlink_core::Dialect;

/// ORDER BY clause.
///
/// The column may be bare (`"position"`) or qualified (`"o.position"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    column: String,
    direction: OrderDirection,
    nulls: Option<NullsOrder>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// NULLS FIRST/LAST ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

impl OrderBy {
    /// Create an ascending order by clause.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
            nulls: None,
        }
    }

    /// Create a descending order by clause.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
            nulls: None,
        }
    }

    /// Set NULLS FIRST.
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    /// Set NULLS LAST.
    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }

    /// Explicit NULLS placement, if any.
    pub fn nulls(&self) -> Option<NullsOrder> {
        self.nulls
    }

    /// Where NULLs sort when no explicit placement is given.
    ///
    /// NULL sorts as larger than any value: last ascending, first descending.
    pub fn effective_nulls(&self) -> NullsOrder {
        self.nulls.unwrap_or(match self.direction {
            OrderDirection::Asc => NullsOrder::Last,
            OrderDirection::Desc => NullsOrder::First,
        })
    }

    /// Split the column into an optional qualifier and the column name.
    pub fn parts(&self) -> (Option<&str>, &str) {
        match self.column.split_once('.') {
            Some((table, column)) => (Some(table), column),
            None => (None, self.column.as_str()),
        }
    }

    /// Qualify a bare column with `table`.
    #[must_use]
    pub fn qualify(&self, table: &str) -> Self {
        match self.parts() {
            (Some(_), _) => self.clone(),
            (None, column) => Self {
                column: format!("{table}.{column}"),
                ..self.clone()
            },
        }
    }

    /// Generate SQL for this ORDER BY clause.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let mut sql = match self.parts() {
            (Some(table), column) => format!(
                "{}.{}",
                dialect.quote_identifier(table),
                dialect.quote_identifier(column)
            ),
            (None, column) => dialect.quote_identifier(column),
        };

        sql.push_str(match self.direction {
            OrderDirection::Asc => " ASC",
            OrderDirection::Desc => " DESC",
        });

        if let Some(nulls) = self.nulls {
            sql.push_str(match nulls {
                NullsOrder::First => " NULLS FIRST",
                NullsOrder::Last => " NULLS LAST",
            });
        }

        sql
    }
}
