//! Database type definitions
//!
//! Attribute values exchanged with the data access layer and the shape of
//! the existence query used by in-process checks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// NULL or whitespace-only text
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render as a SQL literal.
    ///
    /// Text is single-quoted with embedded quotes doubled, which is correct
    /// for Postgres with `standard_conforming_strings` on (the default).
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) if f.is_finite() => f.to_string(),
            Value::Float(f) => format!("'{}'", f),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    /// Case-folded copy used for case-insensitive comparisons
    pub fn folded(&self) -> Value {
        match self {
            Value::Text(s) => Value::Text(s.to_lowercase()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Quote an identifier for SQL (double quotes, embedded quotes doubled)
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// One equality condition of an [`ExistsQuery`]
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub value: Value,
    pub case_sensitive: bool,
}

/// "Is there already a row like this?" as asked by in-process checks
#[derive(Debug, Clone, PartialEq)]
pub struct ExistsQuery {
    pub table: String,
    pub conditions: Vec<Condition>,
    /// Partial-index predicate, appended verbatim
    pub where_clause: Option<String>,
    /// Row to ignore, usually the record itself when it is already persisted
    pub exclude: Option<(String, Value)>,
}

impl ExistsQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
            where_clause: None,
            exclude: None,
        }
    }

    pub fn condition(mut self, column: impl Into<String>, value: Value, case_sensitive: bool) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            value,
            case_sensitive,
        });
        self
    }

    pub fn where_clause(mut self, where_clause: Option<String>) -> Self {
        self.where_clause = where_clause;
        self
    }

    pub fn exclude(mut self, column: impl Into<String>, value: Value) -> Self {
        if !value.is_null() {
            self.exclude = Some((column.into(), value));
        }
        self
    }

    /// Render as a `SELECT 1 ... LIMIT 1` statement with inlined literals
    pub fn to_sql(&self) -> String {
        let mut predicates: Vec<String> = self
            .conditions
            .iter()
            .map(|c| {
                let column = quote_ident(&c.column);
                match (&c.value, c.case_sensitive) {
                    (Value::Null, _) => format!("{} IS NULL", column),
                    (Value::Text(_), false) => {
                        format!("lower({}) = lower({})", column, c.value.to_sql_literal())
                    }
                    (value, _) => format!("{} = {}", column, value.to_sql_literal()),
                }
            })
            .collect();

        if let Some(w) = &self.where_clause {
            predicates.push(format!("({})", w));
        }
        if let Some((column, value)) = &self.exclude {
            predicates.push(format!("{} <> {}", quote_ident(column), value.to_sql_literal()));
        }

        let mut sql = format!("SELECT 1 FROM {}", quote_ident(&self.table));
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }
        sql.push_str(" LIMIT 1");
        sql
    }
}
