//! MySQL violation text
//!
//! MySQL names the index but never the columns, so columns are recovered
//! from the introspected index by the adapter. Since 8.0 the key name is
//! prefixed with the table name.

use std::sync::LazyLock;

use regex::Regex;

use super::ConstraintErrorParser;

static INDEX_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"key '([^']+)'").expect("valid regex"));
static FOREIGN_KEY_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"FOREIGN KEY \(`([^`]+)`\)").expect("valid regex"));

pub struct MysqlParser;

impl ConstraintErrorParser for MysqlParser {
    fn unique_index_name(&self, message: &str) -> Option<String> {
        INDEX_NAME.captures(message).map(|c| {
            let key = &c[1];
            // `table.index` on 8.0+
            key.rsplit_once('.').map_or(key, |(_, name)| name).to_string()
        })
    }

    fn unique_error_columns(&self, _table: &str, _message: &str) -> Vec<String> {
        Vec::new()
    }

    fn foreign_key_error_column(&self, message: &str) -> Option<String> {
        FOREIGN_KEY_COLUMN.captures(message).map(|c| c[1].to_string())
    }
}
