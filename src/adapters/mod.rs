//! Per-engine schema adapters
//!
//! An adapter pairs a table's introspected schema with the knowledge of how
//! one engine family words its constraint-violation errors. Error text is
//! driver free text; everything that depends on its exact wording lives in
//! the engine's [`ConstraintErrorParser`] so a driver upgrade touches one
//! file.

pub mod mysql;
pub mod postgresql;
pub mod sqlite;

use std::fmt;

use crate::db::Session;
use crate::db::schema::{ForeignKey, Index, TableSchema};
use crate::error::{ConfigError, ConfigResult, DbResult};

use mysql::MysqlParser;
use postgresql::PostgresqlParser;
use sqlite::SqliteParser;

/// Engine family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Sqlite,
    Postgresql,
    Mysql,
}

impl Engine {
    /// Resolve an adapter name as found in connection settings.
    ///
    /// # Errors
    /// Returns `ConfigError::UnknownDatabase` for names with no adapter
    pub fn from_adapter_name(name: &str) -> ConfigResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sqlite3" | "sqlite" => Ok(Engine::Sqlite),
            "postgresql" | "postgres" | "postgis" => Ok(Engine::Postgresql),
            "mysql2" | "mysql" => Ok(Engine::Mysql),
            other => Err(ConfigError::UnknownDatabase(other.to_string())),
        }
    }

    /// Canonical adapter name
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Sqlite => "sqlite3",
            Engine::Postgresql => "postgresql",
            Engine::Mysql => "mysql2",
        }
    }

    /// Uniqueness options this engine can back with an index
    pub fn supported_options(&self) -> &'static [UniquenessOption] {
        use UniquenessOption::*;
        match self {
            Engine::Sqlite => &[Scope, Message, If, Unless],
            Engine::Postgresql => &[Scope, Message, Where, If, Unless, IndexName, CaseSensitive],
            Engine::Mysql => &[Scope, Message, If, Unless, IndexName],
        }
    }

    /// Whether foreign keys are enforced and reported reliably
    pub fn supports_foreign_keys(&self) -> bool {
        !matches!(self, Engine::Sqlite)
    }

    /// Error text parser for this engine
    pub fn parser(&self) -> &'static dyn ConstraintErrorParser {
        static SQLITE: SqliteParser = SqliteParser;
        static POSTGRESQL: PostgresqlParser = PostgresqlParser;
        static MYSQL: MysqlParser = MysqlParser;

        match self {
            Engine::Sqlite => &SQLITE,
            Engine::Postgresql => &POSTGRESQL,
            Engine::Mysql => &MYSQL,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options accepted by a uniqueness declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniquenessOption {
    Scope,
    Message,
    Where,
    If,
    Unless,
    IndexName,
    CaseSensitive,
}

impl UniquenessOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            UniquenessOption::Scope => "scope",
            UniquenessOption::Message => "message",
            UniquenessOption::Where => "where",
            UniquenessOption::If => "if",
            UniquenessOption::Unless => "unless",
            UniquenessOption::IndexName => "index_name",
            UniquenessOption::CaseSensitive => "case_sensitive",
        }
    }
}

impl fmt::Display for UniquenessOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of constraint a driver error reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Unique,
    ForeignKey,
}

impl ViolationKind {
    /// Classify a driver error code.
    ///
    /// Postgres SQLSTATE 23505/23503, MySQL 1062/1452, SQLite extended
    /// result codes 2067/787.
    pub fn from_code(engine: Engine, code: &str) -> Option<Self> {
        match (engine, code) {
            (Engine::Postgresql, "23505") => Some(Self::Unique),
            (Engine::Postgresql, "23503") => Some(Self::ForeignKey),
            (Engine::Mysql, "1062") => Some(Self::Unique),
            (Engine::Mysql, "1452") => Some(Self::ForeignKey),
            (Engine::Sqlite, "2067") => Some(Self::Unique),
            (Engine::Sqlite, "787") => Some(Self::ForeignKey),
            _ => None,
        }
    }
}

/// What a unique violation message identifies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniqueViolation {
    pub index_name: Option<String>,
    pub columns: Vec<String>,
}

/// Reads the identifying parts out of an engine's violation text
pub trait ConstraintErrorParser: Send + Sync {
    /// Name of the violated unique index, when the engine reports one
    fn unique_index_name(&self, message: &str) -> Option<String>;

    /// Columns of the violated unique index, when the engine reports them
    fn unique_error_columns(&self, table: &str, message: &str) -> Vec<String>;

    /// Referencing column of the violated foreign key
    fn foreign_key_error_column(&self, message: &str) -> Option<String>;
}

/// A table's validation-relevant schema plus its engine's error parser
#[derive(Debug, Clone)]
pub struct SchemaAdapter {
    engine: Engine,
    table: TableSchema,
}

impl SchemaAdapter {
    pub fn new(engine: Engine, table: TableSchema) -> Self {
        Self { engine, table }
    }

    /// Introspect `table` through a session
    pub async fn load<S: Session>(session: &mut S, table: &str) -> DbResult<Self> {
        let schema = session.table_schema(table).await?;
        Ok(Self::new(session.engine(), schema))
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    /// All unique indexes on the table
    pub fn unique_indexes(&self) -> &[Index] {
        &self.table.unique_indexes
    }

    /// All foreign keys on the table
    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.table.foreign_keys
    }

    pub fn find_index_by_name(&self, name: &str) -> Option<&Index> {
        self.unique_indexes().iter().find(|i| i.name == name)
    }

    /// Unique index over exactly `columns` (as a set) with the same
    /// partial predicate (absent matches absent)
    pub fn find_index(&self, columns: &[String], where_clause: Option<&str>) -> Option<&Index> {
        self.unique_indexes()
            .iter()
            .find(|i| i.columns.same_set(columns) && i.where_clause.as_deref() == where_clause)
    }

    pub fn find_foreign_key_by_column(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys().iter().find(|fk| fk.column == column)
    }

    pub fn supported_options(&self) -> &'static [UniquenessOption] {
        self.engine.supported_options()
    }

    pub fn supports_option(&self, option: UniquenessOption) -> bool {
        self.supported_options().contains(&option)
    }

    /// Extract the index name and columns from a unique violation.
    ///
    /// Engines that only name the index get their columns filled in from
    /// the matching introspected index.
    pub fn parse_unique_violation(&self, message: &str) -> UniqueViolation {
        let parser = self.engine.parser();
        let index_name = parser.unique_index_name(message);
        let mut columns = parser.unique_error_columns(self.table_name(), message);

        if columns.is_empty() {
            if let Some(index) = index_name.as_deref().and_then(|n| self.find_index_by_name(n)) {
                columns = index.columns.to_vec();
            }
        }

        UniqueViolation {
            index_name,
            columns,
        }
    }

    /// Extract the offending foreign key column
    pub fn parse_foreign_key_violation(&self, message: &str) -> Option<String> {
        self.engine.parser().foreign_key_error_column(message)
    }
}
