//! SQLite violation text
//!
//! SQLite reports the columns as `table.column` pairs and never the index
//! name: `UNIQUE constraint failed: entities.field_1, entities.field_2`.

use std::sync::LazyLock;

use regex::Regex;

use super::ConstraintErrorParser;

static QUALIFIED_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\w+)\.([^,:\s]+)").expect("valid regex"));

static FOREIGN_KEY_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\("([^"]+)"\) VALUES"#).expect("valid regex"));

pub struct SqliteParser;

impl ConstraintErrorParser for SqliteParser {
    fn unique_index_name(&self, _message: &str) -> Option<String> {
        None
    }

    fn unique_error_columns(&self, table: &str, message: &str) -> Vec<String> {
        QUALIFIED_COLUMN
            .captures_iter(message)
            .filter(|c| &c[1] == table)
            .map(|c| c[2].to_string())
            .collect()
    }

    fn foreign_key_error_column(&self, message: &str) -> Option<String> {
        FOREIGN_KEY_COLUMN.captures(message).map(|c| c[1].to_string())
    }
}
