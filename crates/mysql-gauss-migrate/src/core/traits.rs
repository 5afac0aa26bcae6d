//! Core traits for the database collaborators of the migration engine.
//!
//! - [`MetadataReader`]: catalog introspection and object definitions
//! - [`RowReader`]: row counts and forward-only row streams
//! - [`StatementWriter`]: statement execution, transactions and batched inserts
//! - [`Connector`]: opens a fresh source or target connection per phase
//!
//! Drivers implement these for MySQL (source) and GaussDB (target); tests
//! implement them in memory.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

use super::schema::{Column, ImportedKey, IndexEntry};
use super::value::Row;

/// Kind of object passed to [`MetadataReader::show_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    View,
}

/// A live connection to one database.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the database type identifier (e.g., "mysql", "gauss").
    fn db_type(&self) -> &str;

    /// Round-trip a trivial query (`SELECT 1`).
    async fn ping(&self) -> Result<()>;

    /// Close the connection. Further calls fail.
    async fn close(&self);
}

/// Catalog metadata of the connected schema.
///
/// Metadata methods return raw catalog rows; grouping and ordering into
/// descriptors is done by the introspector.
#[async_trait]
pub trait MetadataReader: Connection {
    /// Base table names (views excluded), sorted.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// View names, sorted.
    async fn list_views(&self) -> Result<Vec<String>>;

    /// Check whether a base table exists.
    ///
    /// The default implementation scans [`list_tables`](Self::list_tables).
    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.list_tables().await?.iter().any(|t| t == table))
    }

    /// Columns of a table. Order is not guaranteed; `ordinal_pos` is.
    async fn columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Primary key columns in key order.
    async fn primary_key(&self, table: &str) -> Result<Vec<String>>;

    /// One entry per (index, column), including the primary key index.
    async fn index_entries(&self, table: &str) -> Result<Vec<IndexEntry>>;

    /// One entry per (foreign key constraint, column pair).
    async fn imported_keys(&self, table: &str) -> Result<Vec<ImportedKey>>;

    /// Table comment, `None` when empty.
    async fn table_comment(&self, table: &str) -> Result<Option<String>>;

    /// Full textual definition of an object, as the database describes it.
    async fn show_create(&self, kind: ObjectKind, name: &str) -> Result<Option<String>>;
}

/// What to stream from a source table.
#[derive(Debug, Clone)]
pub struct RowQuery {
    /// Table name, for log and error context.
    pub table: String,
    /// Full SELECT statement.
    pub sql: String,
    /// Selected columns, positionally matching the SELECT list.
    pub columns: Vec<Column>,
}

/// Read rows from a source database.
#[async_trait]
pub trait RowReader: Send + Sync {
    /// Exact row count of a table.
    async fn count_rows(&self, table: &str) -> Result<u64>;

    /// Start streaming rows.
    ///
    /// Returns a channel receiver fed by a background task; dropping the
    /// receiver stops the stream.
    fn read_rows(&self, query: RowQuery) -> mpsc::Receiver<Result<Row>>;
}

/// Execute statements on a target database.
#[async_trait]
pub trait StatementWriter: Send + Sync {
    /// Turn autocommit off and open a transaction.
    async fn begin(&self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback(&self) -> Result<()>;

    /// Make `schema` the active schema for unqualified names.
    async fn set_search_path(&self, schema: &str) -> Result<()>;

    /// Execute one statement.
    ///
    /// Inside a transaction a failed statement must leave the transaction
    /// usable for the next statement.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Execute a positionally parameterized statement once per row in a
    /// single round trip. Returns the number of affected rows.
    async fn execute_batch(&self, sql: &str, rows: &[Row]) -> Result<u64>;
}

/// Source side of a migration.
pub trait SourceConnection: MetadataReader + RowReader {}

impl<T: MetadataReader + RowReader + ?Sized> SourceConnection for T {}

/// Target side of a migration.
pub trait TargetConnection: MetadataReader + StatementWriter {}

impl<T: MetadataReader + StatementWriter + ?Sized> TargetConnection for T {}

/// Opens connections. Each call returns a new, unshared connection.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a source connection.
    async fn connect_source(&self) -> Result<Box<dyn SourceConnection>>;

    /// Open a target connection.
    async fn connect_target(&self) -> Result<Box<dyn TargetConnection>>;
}
