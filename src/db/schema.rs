//! Database schema introspection
//!
//! The subset of a table's schema that backs database validations: its
//! unique indexes and its foreign keys.

use serde::{Deserialize, Serialize};

/// Columns covered by an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexColumns {
    /// Plain column list, in index order
    Columns(Vec<String>),
    /// Expression index, e.g. `lower(field)`
    Expression(String),
}

impl IndexColumns {
    /// Number of key parts.
    ///
    /// Expressions are counted by their top-level commas, which is only an
    /// approximation for nested function calls.
    pub fn count(&self) -> usize {
        match self {
            IndexColumns::Columns(cols) => cols.len(),
            IndexColumns::Expression(expr) => {
                let mut depth = 0usize;
                let mut parts = 1;
                for ch in expr.chars() {
                    match ch {
                        '(' => depth += 1,
                        ')' => depth = depth.saturating_sub(1),
                        ',' if depth == 0 => parts += 1,
                        _ => {}
                    }
                }
                parts
            }
        }
    }

    /// Plain columns, or the expression as a single entry
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            IndexColumns::Columns(cols) => cols.clone(),
            IndexColumns::Expression(expr) => vec![expr.clone()],
        }
    }

    /// Whether this is a plain column list equal to `columns` as a set,
    /// ignoring order and ASCII case.
    pub fn same_set(&self, columns: &[String]) -> bool {
        match self {
            IndexColumns::Columns(cols) => normalize(cols) == normalize(columns),
            IndexColumns::Expression(_) => false,
        }
    }
}

fn normalize(columns: &[String]) -> Vec<String> {
    let mut cols: Vec<String> = columns.iter().map(|c| c.to_ascii_lowercase()).collect();
    cols.sort();
    cols.dedup();
    cols
}

/// A unique index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name
    pub name: String,
    /// Indexed columns or expression
    pub columns: IndexColumns,
    /// Partial-index predicate, as the database reports it
    pub where_clause: Option<String>,
}

impl Index {
    /// Unique index over plain columns
    pub fn new<S: Into<String>>(name: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            columns: IndexColumns::Columns(columns.into_iter().map(Into::into).collect()),
            where_clause: None,
        }
    }

    /// Unique expression index
    pub fn expression(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexColumns::Expression(expression.into()),
            where_clause: None,
        }
    }

    /// Restrict to a partial-index predicate
    pub fn with_where(mut self, where_clause: impl Into<String>) -> Self {
        self.where_clause = Some(where_clause.into());
        self
    }
}

/// A foreign key constraint on a single column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name
    pub name: String,
    /// Referencing column
    pub column: String,
    /// Referenced table
    pub to_table: String,
    /// Referenced column
    pub primary_key: String,
}

impl ForeignKey {
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        to_table: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            to_table: to_table.into(),
            primary_key: primary_key.into(),
        }
    }
}

/// Unique indexes and foreign keys of one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Unique, non-primary indexes
    pub unique_indexes: Vec<Index>,
    /// Foreign keys declared on this table
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    /// Create an empty table schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique_indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.unique_indexes.push(index);
        self
    }

    pub fn with_foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }
}
