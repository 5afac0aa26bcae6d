//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or target connection could not be opened. Fatal for the task.
    #[error("Connection failed: {message}\n  Context: {context}")]
    Connectivity { message: String, context: String },

    /// Metadata query against a catalog failed
    #[error("Introspection failed: {0}")]
    Introspection(String),

    /// A single script statement failed on the target
    #[error("Statement failed: {message}\n  Statement: {statement}")]
    Statement { statement: String, message: String },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// A column value could not be converted for the target
    #[error(
        "Cannot convert value {value} of {table}.{column} ({source_type} -> {target_type}): {message}"
    )]
    Conversion {
        table: String,
        column: String,
        source_type: String,
        target_type: String,
        value: String,
        message: String,
    },

    /// Task registry misuse (e.g. starting a task id that is still running)
    #[error("Task state error: {0}")]
    State(String),

    /// Source (MySQL) driver error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target (GaussDB) driver error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// IO error (script files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connectivity error with context about which side failed
    pub fn connectivity(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connectivity {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an Introspection error for a failed catalog query
    pub fn introspection(what: &str, err: impl std::fmt::Display) -> Self {
        MigrateError::Introspection(format!("{}: {}", what, err))
    }

    /// Create a Statement error
    pub fn statement(statement: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Statement {
            statement: statement.into(),
            message: message.to_string(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Conversion error for one column value
    pub fn conversion(
        table: impl Into<String>,
        column: impl Into<String>,
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrateError::Conversion {
            table: table.into(),
            column: column.into(),
            source_type: source_type.into(),
            target_type: target_type.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Connectivity { .. } => 3,
            MigrateError::Introspection(_) => 4,
            MigrateError::Statement { .. } => 5,
            MigrateError::Transfer { .. } | MigrateError::Conversion { .. } => 6,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
