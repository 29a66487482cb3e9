//! Registry keys
//!
//! A key is derived only from identifying data, so the same index or column
//! set always produces the same key whether it comes from a declaration or
//! from a parsed violation message.

use std::fmt;

/// Canonical lookup key of a registered rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintKey(String);

impl ConstraintKey {
    /// Key of a unique index, by name
    pub fn unique_index(name: &str) -> Self {
        Self::generate("unique_index", &[name])
    }

    /// Key of a uniqueness rule, by its full column set
    pub fn uniqueness<S: AsRef<str>>(columns: &[S]) -> Self {
        Self::generate("db_uniqueness", columns)
    }

    /// Key of a presence rule, by its foreign key column
    pub fn presence(column: &str) -> Self {
        Self::generate("db_presence", &[column])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn generate<S: AsRef<str>>(kind: &str, parts: &[S]) -> Self {
        let mut key = kind.to_string();
        for part in unify_columns(parts) {
            key.push_str("__");
            key.push_str(&part);
        }
        Self(key)
    }
}

impl fmt::Display for ConstraintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim, sort and dedup column names; blanks are dropped
pub fn unify_columns<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    let mut unified: Vec<String> = columns
        .iter()
        .map(|c| c.as_ref().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    unified.sort();
    unified.dedup();
    unified
}
