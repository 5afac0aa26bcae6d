//! Script execution against the target.
//!
//! One call applies one script inside one transaction on a fresh connection.
//! A failing statement is logged and recorded; whether the remaining
//! statements still run and whether the transaction is committed is decided
//! by the [`ScriptFailurePolicy`].

mod splitter;

pub use splitter::split_statements;

use std::path::Path;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::ScriptFailurePolicy;
use crate::core::traits::{Connector, TargetConnection};
use crate::error::Result;
use crate::state::BandedProgress;

/// A statement that failed, with its position in the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementFailure {
    /// 0-based statement index.
    pub index: usize,
    pub statement: String,
    pub error: String,
}

/// Result of applying one script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptOutcome {
    /// Script name, for reporting.
    pub script: String,
    /// Statements found in the script.
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<StatementFailure>,
    /// Statements never attempted because an earlier one failed.
    pub skipped: usize,
    /// Whether the transaction was committed.
    pub committed: bool,
}

impl ScriptOutcome {
    fn new(script: &str, total: usize) -> Self {
        Self {
            script: script.to_string(),
            total,
            succeeded: 0,
            failures: Vec::new(),
            skipped: 0,
            committed: false,
        }
    }

    /// True when no statement failed, whatever was committed.
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Applies scripts to the target schema.
pub struct ScriptExecutor<'a> {
    connector: &'a dyn Connector,
    schema: String,
    policy: ScriptFailurePolicy,
}

impl<'a> ScriptExecutor<'a> {
    pub fn new(
        connector: &'a dyn Connector,
        schema: impl Into<String>,
        policy: ScriptFailurePolicy,
    ) -> Self {
        Self {
            connector,
            schema: schema.into(),
            policy,
        }
    }

    /// Open a target connection and run `SELECT 1`.
    pub async fn test_connection(&self) -> Result<()> {
        let target = self.connector.connect_target().await?;
        let result = target.ping().await;
        target.close().await;
        result
    }

    /// Read a script file and apply it.
    pub async fn execute_file(
        &self,
        path: &Path,
        progress: Option<BandedProgress<'_>>,
    ) -> Result<ScriptOutcome> {
        let script = tokio::fs::read_to_string(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.execute_script(&name, &script, progress).await
    }

    /// Split `script` into statements and apply them.
    ///
    /// Errors are returned only when the connection cannot be opened or the
    /// transaction itself fails; statement failures are in the outcome.
    pub async fn execute_script(
        &self,
        name: &str,
        script: &str,
        progress: Option<BandedProgress<'_>>,
    ) -> Result<ScriptOutcome> {
        let statements = split_statements(script);
        info!("Executing {}: {} statements", name, statements.len());

        let target = self.connector.connect_target().await?;
        let result = self
            .apply(target.as_ref(), name, &statements, progress)
            .await;
        target.close().await;

        let outcome = result?;
        if outcome.success() {
            info!("{}: {} statements applied", name, outcome.succeeded);
        } else {
            warn!(
                "{}: {} of {} statements failed{}",
                name,
                outcome.failures.len(),
                outcome.total,
                if outcome.committed {
                    ", successful statements committed"
                } else {
                    ", rolled back"
                }
            );
        }
        Ok(outcome)
    }

    async fn apply(
        &self,
        target: &dyn TargetConnection,
        name: &str,
        statements: &[String],
        progress: Option<BandedProgress<'_>>,
    ) -> Result<ScriptOutcome> {
        target.begin().await?;
        match self.run_statements(target, name, statements, progress).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(rollback_err) = target.rollback().await {
                    warn!("Rollback of {} failed: {}", name, rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn run_statements(
        &self,
        target: &dyn TargetConnection,
        name: &str,
        statements: &[String],
        progress: Option<BandedProgress<'_>>,
    ) -> Result<ScriptOutcome> {
        target.set_search_path(&self.schema).await?;

        let mut outcome = ScriptOutcome::new(name, statements.len());
        for (index, statement) in statements.iter().enumerate() {
            match target.execute(statement).await {
                Ok(_) => {
                    debug!("{} #{} ok", name, index + 1);
                    outcome.succeeded += 1;
                }
                Err(e) => {
                    error!("{} #{} failed: {}\n  Statement: {}", name, index + 1, e, statement);
                    outcome.failures.push(StatementFailure {
                        index,
                        statement: statement.clone(),
                        error: e.to_string(),
                    });

                    if self.policy == ScriptFailurePolicy::AbortOnFirstFailure {
                        outcome.skipped = statements.len() - index - 1;
                        target.rollback().await?;
                        return Ok(outcome);
                    }
                }
            }

            if let Some(p) = progress {
                p.report((index + 1) as f64 / statements.len() as f64);
            }
        }

        target.commit().await?;
        outcome.committed = true;
        Ok(outcome)
    }
}
