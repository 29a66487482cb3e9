//! Database abstraction layer
//!
//! This module provides a trait-based abstraction over the handful of
//! database operations validations need, allowing for multiple database
//! backends and easy testing with in-memory implementations.

pub mod postgres;
pub mod schema;
pub mod types;

// Re-export main types
pub use schema::{ForeignKey, Index, IndexColumns, TableSchema};
pub use types::{Condition, ExistsQuery, Value};

use crate::adapters::Engine;
use crate::error::DbResult;

/// A connection-scoped unit of work
///
/// Nesting is depth-tracked: the outermost `begin_nested` opens a real
/// transaction (or a savepoint, when the connection is already inside one),
/// inner ones open savepoints, so rolling back a level never poisons a
/// transaction the caller manages.
#[allow(async_fn_in_trait)]
pub trait Session {
    /// Engine family behind this session
    fn engine(&self) -> Engine;

    /// Introspect the unique indexes and foreign keys of a table
    ///
    /// # Errors
    /// Returns `DbError::SchemaLoadFailed` if introspection fails
    async fn table_schema(&mut self, table: &str) -> DbResult<TableSchema>;

    /// Open a transaction, or a savepoint when one is already open
    async fn begin_nested(&mut self) -> DbResult<()>;

    /// Commit the innermost level
    async fn commit_nested(&mut self) -> DbResult<()>;

    /// Roll back the innermost level
    async fn rollback_nested(&mut self) -> DbResult<()>;

    /// Insert one row
    ///
    /// # Errors
    /// Returns `DbError::UniqueViolation` / `DbError::ForeignKeyViolation`
    /// carrying the engine's error text when a constraint rejects the row
    async fn insert(&mut self, table: &str, values: &[(String, Value)]) -> DbResult<u64>;

    /// Whether any row matches the query
    async fn exists(&mut self, query: &ExistsQuery) -> DbResult<bool>;
}
