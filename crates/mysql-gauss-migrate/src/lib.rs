//! # mysql-gauss-migrate
//!
//! MySQL to GaussDB schema and data migration library.
//!
//! A migration task runs in four phases:
//!
//! - **Generate**: introspect the MySQL schema and write five DDL scripts
//!   (table structure, indexes, foreign keys, check constraints, views)
//! - **Structure**: apply the table structure script to the target schema
//! - **Transfer**: copy rows table by table in batched inserts, one
//!   transaction per table
//! - **Post-transfer**: apply the remaining scripts
//!
//! Progress is published to a shared [`TaskRegistry`] that callers poll by
//! task id.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_gauss_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> mysql_gauss_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config);
//!     let result = orchestrator.run("nightly-1").await?;
//!     println!("Task finished: {:?}", result.status);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod ddl;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod introspect;
pub mod orchestrator;
pub mod state;
pub mod transfer;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, ScriptFailurePolicy, SourceConfig, TargetConfig};
pub use crate::core::{Column, Connector, Row, Schema, SqlValue, Table, View};
pub use ddl::{DdlGenerator, GeneratedScripts, ScriptKind};
pub use drivers::DriverConnector;
pub use error::{MigrateError, Result};
pub use executor::{ScriptExecutor, ScriptOutcome};
pub use introspect::SchemaIntrospector;
pub use orchestrator::{GenerationResult, HealthCheckResult, MigrationResult, Orchestrator};
pub use state::{ProgressReporter, TaskPhase, TaskProgress, TaskRegistry, TaskStatus};
pub use transfer::{DataTransferEngine, TransferConfig, TransferSummary};
pub use typemap::TypeMappings;
