//! PostgreSQL data access layer
//!
//! Concrete [`Session`] implementation using tokio-postgres.

use crate::adapters::{Engine, ViolationKind};
use crate::config::{ConnectionConfig, SslMode};
use crate::db::Session;
use crate::db::schema::{ForeignKey, Index, IndexColumns, TableSchema};
use crate::db::types::{ExistsQuery, Value, quote_ident};
use crate::error::{DbError, DbResult};
use regex::Regex;
use std::sync::LazyLock;
use tokio::sync::mpsc;
use tokio_postgres::Client;
use tokio_postgres::error::SqlState;
use tracing::debug;

/// Prefix of savepoints opened by nested transactions
const SAVEPOINT_PREFIX: &str = "dbvalidations_sp";

/// Expression part of `pg_get_indexdef()` output, e.g.
/// `CREATE UNIQUE INDEX idx ON public.t USING btree (lower((field)::text)) WHERE (x > 1)`
static INDEX_EXPRESSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"USING \w+ \((.+?)\)(?: WHERE (.+))?$").expect("Invalid index definition regex")
});

/// How a nested level was opened
#[derive(Debug, Clone, PartialEq, Eq)]
enum Level {
    /// `BEGIN`, issued by this session
    Transaction,
    /// `SAVEPOINT <name>`, inside a transaction this session or the caller opened
    Savepoint(String),
}

/// PostgreSQL session
///
/// A transaction the caller opened with raw SQL is joined: the outermost
/// level becomes a savepoint inside it, so a failed save never rolls the
/// caller's work back.
pub struct PostgresSession {
    /// The tokio-postgres client
    client: Client,
    /// Open levels, outermost first (empty = autocommit)
    levels: Vec<Level>,
}

impl PostgresSession {
    /// Connect to a PostgreSQL database.
    ///
    /// Returns the session and a receiver that fires if the background
    /// connection is lost (e.g. server restart, idle timeout).
    pub async fn connect(
        config: &ConnectionConfig,
    ) -> DbResult<(Self, mpsc::UnboundedReceiver<String>)> {
        let conn_string = config.connection_string_with_password();
        let (conn_err_tx, conn_err_rx) = mpsc::unbounded_channel();

        let client = match config.ssl_mode {
            SslMode::Disable => {
                let (client, connection) =
                    tokio_postgres::connect(&conn_string, tokio_postgres::NoTls)
                        .await
                        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        let _ = conn_err_tx.send(format!("Connection lost: {}", e));
                    }
                });
                client
            }
            SslMode::Prefer | SslMode::Require => {
                let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_tls_config());
                let (client, connection) = tokio_postgres::connect(&conn_string, tls)
                    .await
                    .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        let _ = conn_err_tx.send(format!("Connection lost: {}", e));
                    }
                });
                client
            }
        };

        debug!(host = %config.host, database = %config.database, "connected to postgres");
        Ok((Self::from_client(client), conn_err_rx))
    }

    /// Wrap an already connected client
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            levels: Vec::new(),
        }
    }

    /// Number of open transaction levels
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Run raw SQL (DDL, fixtures) outside the validation flow.
    ///
    /// A transaction opened here with `BEGIN` is joined by later saves and
    /// stays the caller's to commit or roll back.
    pub async fn batch_execute(&self, sql: &str) -> DbResult<()> {
        self.client.batch_execute(sql).await.map_err(classify_error)
    }

    async fn unique_indexes(&self, table: &str) -> DbResult<Vec<Index>> {
        let map_err = |e: tokio_postgres::Error| DbError::SchemaLoadFailed(e.to_string());

        // attnum 0 marks an expression column
        let rows = self
            .client
            .query(
                "SELECT ci.relname::text, \
                        ARRAY(SELECT a.attname::text \
                              FROM unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) \
                              JOIN pg_attribute a ON a.attrelid = ix.indrelid AND a.attnum = k.attnum \
                              ORDER BY k.ord) AS columns, \
                        (0 = ANY (ix.indkey::int2[])) AS has_expression, \
                        pg_get_expr(ix.indpred, ix.indrelid) AS predicate, \
                        pg_get_indexdef(ix.indexrelid) AS definition \
                 FROM pg_index ix \
                 JOIN pg_class ci ON ci.oid = ix.indexrelid \
                 JOIN pg_class ct ON ct.oid = ix.indrelid \
                 JOIN pg_namespace n ON n.oid = ct.relnamespace \
                 WHERE ix.indisunique AND NOT ix.indisprimary \
                   AND ct.relname = $1 \
                   AND n.nspname = ANY (current_schemas(false)) \
                 ORDER BY ci.relname",
                &[&table],
            )
            .await
            .map_err(map_err)?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get(0).map_err(map_err)?;
            let columns: Vec<String> = row.try_get(1).map_err(map_err)?;
            let has_expression: bool = row.try_get(2).map_err(map_err)?;
            let predicate: Option<String> = row.try_get(3).map_err(map_err)?;
            let definition: String = row.try_get(4).map_err(map_err)?;

            let columns = if has_expression {
                IndexColumns::Expression(index_expression(&definition))
            } else {
                IndexColumns::Columns(columns)
            };

            indexes.push(Index {
                name,
                columns,
                where_clause: predicate,
            });
        }
        Ok(indexes)
    }

    async fn foreign_keys(&self, table: &str) -> DbResult<Vec<ForeignKey>> {
        let map_err = |e: tokio_postgres::Error| DbError::SchemaLoadFailed(e.to_string());

        let rows = self
            .client
            .query(
                "SELECT con.conname::text, a.attname::text, fc.relname::text, fa.attname::text \
                 FROM pg_constraint con \
                 JOIN pg_class c ON c.oid = con.conrelid \
                 JOIN pg_namespace n ON n.oid = c.relnamespace \
                 JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = con.conkey[1] \
                 JOIN pg_class fc ON fc.oid = con.confrelid \
                 JOIN pg_attribute fa ON fa.attrelid = fc.oid AND fa.attnum = con.confkey[1] \
                 WHERE con.contype = 'f' \
                   AND c.relname = $1 \
                   AND n.nspname = ANY (current_schemas(false)) \
                 ORDER BY con.conname",
                &[&table],
            )
            .await
            .map_err(map_err)?;

        rows.iter()
            .map(|row| -> DbResult<ForeignKey> {
                Ok(ForeignKey {
                    name: row.try_get(0).map_err(map_err)?,
                    column: row.try_get(1).map_err(map_err)?,
                    to_table: row.try_get(2).map_err(map_err)?,
                    primary_key: row.try_get(3).map_err(map_err)?,
                })
            })
            .collect()
    }

    fn savepoint(&self, level: usize) -> String {
        format!("{}_{}", SAVEPOINT_PREFIX, level)
    }

    /// Outermost level: a savepoint if the caller already has a transaction
    /// open, a fresh transaction otherwise
    async fn open_outermost(&self, name: String) -> DbResult<Level> {
        match self.client.batch_execute(&format!("SAVEPOINT {name}")).await {
            Ok(()) => {
                debug!(savepoint = %name, "joined open transaction");
                Ok(Level::Savepoint(name))
            }
            Err(e) if e.code() == Some(&SqlState::NO_ACTIVE_SQL_TRANSACTION) => {
                self.client
                    .batch_execute("BEGIN")
                    .await
                    .map_err(|e| DbError::Transaction(e.to_string()))?;
                Ok(Level::Transaction)
            }
            Err(e) => Err(DbError::Transaction(e.to_string())),
        }
    }
}

impl Session for PostgresSession {
    fn engine(&self) -> Engine {
        Engine::Postgresql
    }

    async fn table_schema(&mut self, table: &str) -> DbResult<TableSchema> {
        Ok(TableSchema {
            name: table.to_string(),
            unique_indexes: self.unique_indexes(table).await?,
            foreign_keys: self.foreign_keys(table).await?,
        })
    }

    async fn begin_nested(&mut self) -> DbResult<()> {
        let name = self.savepoint(self.levels.len());
        let level = if self.levels.is_empty() {
            self.open_outermost(name).await?
        } else {
            self.client
                .batch_execute(&format!("SAVEPOINT {name}"))
                .await
                .map_err(|e| DbError::Transaction(e.to_string()))?;
            Level::Savepoint(name)
        };
        self.levels.push(level);
        Ok(())
    }

    async fn commit_nested(&mut self) -> DbResult<()> {
        let level = self
            .levels
            .pop()
            .ok_or_else(|| DbError::Transaction("no open transaction to commit".into()))?;
        // Deferred constraints surface at COMMIT, so classify like a write
        self.client
            .batch_execute(&commit_sql(&level))
            .await
            .map_err(classify_error)
    }

    async fn rollback_nested(&mut self) -> DbResult<()> {
        let level = self
            .levels
            .pop()
            .ok_or_else(|| DbError::Transaction("no open transaction to roll back".into()))?;
        let sql = rollback_sql(&level);
        self.client
            .batch_execute(&sql)
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))
    }

    async fn insert(&mut self, table: &str, values: &[(String, Value)]) -> DbResult<u64> {
        let sql = insert_sql(table, values);
        debug!(%sql, "insert");
        self.client.execute(sql.as_str(), &[]).await.map_err(classify_error)
    }

    async fn exists(&mut self, query: &ExistsQuery) -> DbResult<bool> {
        let sql = query.to_sql();
        debug!(%sql, "exists");
        let rows = self
            .client
            .query(sql.as_str(), &[])
            .await
            .map_err(classify_error)?;
        Ok(!rows.is_empty())
    }
}

/// Build an INSERT with inlined literals.
///
/// NULL columns are left out so the column default applies; literals are
/// untyped, which lets Postgres coerce them to each column's type.
fn insert_sql(table: &str, values: &[(String, Value)]) -> String {
    let present: Vec<&(String, Value)> = values.iter().filter(|(_, v)| !v.is_null()).collect();
    if present.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table));
    }
    let columns: Vec<String> = present.iter().map(|(c, _)| quote_ident(c)).collect();
    let literals: Vec<String> = present.iter().map(|(_, v)| v.to_sql_literal()).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        literals.join(", ")
    )
}

/// Pull the key expression out of an index definition
fn index_expression(definition: &str) -> String {
    INDEX_EXPRESSION_REGEX
        .captures(definition)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| definition.to_string(), |m| m.as_str().to_string())
}

/// Map a driver error, singling out constraint violations by SQLSTATE.
///
/// The violation message is rebuilt as `ERROR:  <message>\nDETAIL:  <detail>`,
/// the layout libpq prints and the Postgres parser reads.
fn commit_sql(level: &Level) -> String {
    match level {
        Level::Transaction => "COMMIT".to_string(),
        Level::Savepoint(name) => format!("RELEASE SAVEPOINT {name}"),
    }
}

fn rollback_sql(level: &Level) -> String {
    match level {
        Level::Transaction => "ROLLBACK".to_string(),
        Level::Savepoint(name) => format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"),
    }
}

fn classify_error(e: tokio_postgres::Error) -> DbError {
    let Some(db) = e.as_db_error() else {
        return DbError::QueryFailed(e.to_string());
    };

    let mut message = format!("ERROR:  {}", db.message());
    if let Some(detail) = db.detail() {
        message.push_str("\nDETAIL:  ");
        message.push_str(detail);
    }

    match ViolationKind::from_code(Engine::Postgresql, db.code().code()) {
        Some(ViolationKind::Unique) => DbError::UniqueViolation { message },
        Some(ViolationKind::ForeignKey) => DbError::ForeignKeyViolation { message },
        None => DbError::QueryFailed(message),
    }
}

/// Build a rustls ClientConfig that trusts OS certificates (with Mozilla roots as fallback)
fn make_tls_config() -> rustls::ClientConfig {
    let mut root_store = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    let mut loaded = 0;
    for cert in native_certs.certs {
        if root_store.add(cert).is_ok() {
            loaded += 1;
        }
    }
    if loaded == 0 {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}
