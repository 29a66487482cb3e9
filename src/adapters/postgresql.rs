//! PostgreSQL violation text
//!
//! ```text
//! ERROR:  duplicate key value violates unique constraint "index_entities_on_field"
//! DETAIL:  Key (field)=(a) already exists.
//! ```

use std::sync::LazyLock;

use regex::Regex;

use super::ConstraintErrorParser;

static INDEX_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"unique constraint "([^"]+)""#).expect("valid regex"));
static UNIQUE_COLUMNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Key \((.+)\)=").expect("valid regex"));
static FOREIGN_KEY_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Key \(([^)]+)\)").expect("valid regex"));

pub struct PostgresqlParser;

impl ConstraintErrorParser for PostgresqlParser {
    fn unique_index_name(&self, message: &str) -> Option<String> {
        INDEX_NAME.captures(message).map(|c| c[1].to_string())
    }

    fn unique_error_columns(&self, _table: &str, message: &str) -> Vec<String> {
        UNIQUE_COLUMNS
            .captures(message)
            .map(|c| c[1].split(", ").map(unquote).collect())
            .unwrap_or_default()
    }

    fn foreign_key_error_column(&self, message: &str) -> Option<String> {
        FOREIGN_KEY_COLUMN.captures(message).map(|c| unquote(&c[1]))
    }
}

/// Postgres double-quotes identifiers that need it in DETAIL lines
fn unquote(column: &str) -> String {
    let column = column.trim();
    column
        .strip_prefix('"')
        .and_then(|c| c.strip_suffix('"'))
        .map(|c| c.replace("\"\"", "\""))
        .unwrap_or_else(|| column.to_string())
}
