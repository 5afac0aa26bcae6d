//! Core abstractions shared by every phase of a migration.
//!
//! - [`identifier`]: identifier quoting and case folding
//! - [`schema`]: table, column, index and constraint descriptors
//! - [`value`]: SQL values carried from source rows to target inserts
//! - [`traits`]: the database collaborator contract implemented by drivers

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    Column, ForeignKey, ImportedKey, Index, IndexEntry, ReferentialAction, Schema, Table, View,
};
pub use traits::{
    Connection, Connector, MetadataReader, ObjectKind, RowQuery, RowReader, SourceConnection,
    StatementWriter, TargetConnection,
};
pub use value::{Row, SqlValue};
