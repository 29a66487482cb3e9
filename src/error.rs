//! Error types for dbvalidations
//!
//! This module defines the error hierarchy used throughout the library.
//! We use `thiserror` for library-style errors with clear error chains.
//!
//! Configuration errors are raised while a model is being defined and are
//! fatal to that definition. Database errors come from the data access layer;
//! the two constraint-violation variants are expected at runtime and are
//! handed to the dispatcher before anything else sees them.

use std::fmt;
use std::io;

use crate::config::settings::SKIP_INDEX_CHECK_ENV;
use crate::db::schema::{ForeignKey, Index};
use crate::model::errors::Errors;

/// Main error type for the dbvalidations library
#[derive(Debug, thiserror::Error)]
pub enum ValidationsError {
    /// Model definition errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// A record failed validation
    #[error(transparent)]
    Invalid(#[from] RecordInvalid),
}

/// Model definition and configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A declaration used an option the engine cannot honour
    #[error("Option {option} is not supported for {database}. Supported options are: {supported:?}")]
    OptionNotSupported {
        option: String,
        database: String,
        supported: Vec<String>,
    },

    /// No unique index backs a uniqueness declaration
    #[error("{0}")]
    IndexNotFound(Box<IndexNotFound>),

    /// No foreign key backs a belongs-to declaration
    #[error(
        "No foreign key found with column: \"{column}\". Found foreign keys are: {foreign_keys:?}. {hint}",
        hint = skip_check_hint()
    )]
    ForeignKeyNotFound {
        column: String,
        foreign_keys: Vec<String>,
    },

    /// The engine cannot enforce what the declaration needs
    #[error("Database {database} doesn't support {method}")]
    UnsupportedDatabase { method: String, database: String },

    /// No adapter is registered for the engine
    #[error("Unknown database: {0}")]
    UnknownDatabase(String),

    /// `index_name` maps to a single index, so only one attribute is allowed
    #[error(
        "When index_name is provided validator can have only one attribute. Got: {attributes:?}"
    )]
    IndexNameWithMultipleAttributes { attributes: Vec<String> },

    /// Two declarations of the same model resolved to the same key
    #[error("Key {key} is already registered by another rule")]
    DuplicateRule { key: String },

    /// Home directory not found
    #[error("Could not determine home directory")]
    NoHomeDir,

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to read a configuration file
    #[error("Failed to read configuration: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Diagnostic payload for a uniqueness declaration without a backing index.
///
/// Carries everything a migration author needs: what was asked for and every
/// unique index the table actually has.
#[derive(Debug, Clone)]
pub struct IndexNotFound {
    pub table: String,
    pub columns: Vec<String>,
    pub where_clause: Option<String>,
    pub index_name: Option<String>,
    pub available: Vec<Index>,
}

impl fmt::Display for IndexNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.index_name {
            let names: Vec<&str> = self.available.iter().map(|i| i.name.as_str()).collect();
            write!(
                f,
                "No unique index found with name: \"{}\" in table \"{}\". Available indexes are: {:?}. ",
                name, self.table, names
            )?;
        } else {
            let available: Vec<String> = self
                .available
                .iter()
                .map(|i| columns_and_where(&i.columns.to_vec(), i.where_clause.as_deref()))
                .collect();
            write!(
                f,
                "No unique index found with {} in table \"{}\". Available indexes are: [{}]. ",
                columns_and_where(&self.columns, self.where_clause.as_deref()),
                self.table,
                available.join(", ")
            )?;
        }
        f.write_str(&skip_check_hint())
    }
}

fn columns_and_where(columns: &[String], where_clause: Option<&str>) -> String {
    match where_clause {
        Some(w) => format!("columns: {:?} and where: {}", columns, w),
        None => format!("columns: {:?}", columns),
    }
}

fn skip_check_hint() -> String {
    format!(
        "Set {}=true in case you want to skip the check. For example, when you run migrations.",
        SKIP_INDEX_CHECK_ENV
    )
}

impl ConfigError {
    pub(crate) fn index_not_found(
        table: &str,
        columns: &[String],
        where_clause: Option<&str>,
        index_name: Option<&str>,
        available: &[Index],
    ) -> Self {
        Self::IndexNotFound(Box::new(IndexNotFound {
            table: table.to_string(),
            columns: columns.to_vec(),
            where_clause: where_clause.map(str::to_string),
            index_name: index_name.map(str::to_string),
            available: available.to_vec(),
        }))
    }

    pub(crate) fn foreign_key_not_found(column: &str, foreign_keys: &[ForeignKey]) -> Self {
        Self::ForeignKeyNotFound {
            column: column.to_string(),
            foreign_keys: foreign_keys.iter().map(|fk| fk.column.clone()).collect(),
        }
    }
}

/// Database operation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum DbError {
    /// Failed to establish connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Schema introspection failed
    #[error("Schema loading failed: {0}")]
    SchemaLoadFailed(String),

    /// Transaction bookkeeping failed (begin, savepoint, release, rollback)
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// A write broke a unique index
    #[error("Unique constraint violated: {message}")]
    UniqueViolation { message: String },

    /// A write referenced a missing parent row
    #[error("Foreign key constraint violated: {message}")]
    ForeignKeyViolation { message: String },
}

impl DbError {
    /// Whether the dispatcher should get a chance to translate this error.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::UniqueViolation { .. } | Self::ForeignKeyViolation { .. }
        )
    }
}

/// A record failed validation, either in-process or via a translated
/// database constraint violation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Validation failed: {}", .errors.full_messages().join(", "))]
pub struct RecordInvalid {
    pub errors: Errors,
}

impl RecordInvalid {
    pub fn new(errors: Errors) -> Self {
        Self { errors }
    }
}

/// Outcome of a failed save
#[derive(Debug, Clone, thiserror::Error)]
pub enum SaveError {
    /// Validation failed (in-process or translated from the database)
    #[error(transparent)]
    Invalid(#[from] RecordInvalid),

    /// Untranslated database failure, propagated verbatim
    #[error(transparent)]
    Database(#[from] DbError),
}

/// Specialized Result type for dbvalidations operations
pub type Result<T> = std::result::Result<T, ValidationsError>;

/// Specialized Result type for database operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Specialized Result type for model definition and config operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized Result type for saves
pub type SaveResult<T> = std::result::Result<T, SaveError>;
