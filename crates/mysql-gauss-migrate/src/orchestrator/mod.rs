//! Migration orchestrator - main workflow coordinator.
//!
//! A task runs four phases in order, publishing progress into the
//! [`TaskRegistry`] as it goes:
//!
//! | Phase                         | Percentage |
//! |-------------------------------|------------|
//! | Generate scripts              | 0-10       |
//! | Apply table structure         | 10-30      |
//! | Transfer data                 | 30-90      |
//! | Indexes, keys, checks, views  | 90-100     |

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::traits::Connector;
use crate::ddl::{DdlGenerator, ScriptKind};
use crate::drivers::DriverConnector;
use crate::error::Result;
use crate::executor::{ScriptExecutor, ScriptOutcome};
use crate::introspect::SchemaIntrospector;
use crate::state::{
    BandedProgress, ProgressBand, ProgressReporter, TaskPhase, TaskProgress, TaskRegistry,
    TaskStatus,
};
use crate::transfer::{DataTransferEngine, TransferConfig, TransferSummary};
use crate::typemap::TypeMappings;

/// Percentage once the structure script is written.
const STRUCTURE_WRITTEN: f64 = 6.0;

const GENERATED: f64 = 10.0;

const STRUCTURE_BAND: ProgressBand = ProgressBand::new(10.0, 30.0);

const TRANSFER_BAND: ProgressBand = ProgressBand::new(30.0, 90.0);

/// Band of each post-transfer script.
fn post_transfer_band(kind: ScriptKind) -> ProgressBand {
    match kind {
        ScriptKind::Indexes => ProgressBand::new(90.0, 92.0),
        ScriptKind::ForeignKeys => ProgressBand::new(92.0, 95.0),
        ScriptKind::CheckConstraints => ProgressBand::new(95.0, 96.0),
        ScriptKind::Views | ScriptKind::Structure => ProgressBand::new(96.0, 100.0),
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    connector: Arc<dyn Connector>,
    mappings: TypeMappings,
    registry: Arc<TaskRegistry>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Task identifier.
    pub task_id: String,

    /// Final status.
    pub status: TaskStatus,

    /// Source schema.
    pub schema: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Generated script files.
    pub scripts: Vec<PathBuf>,

    /// Outcome of every applied script, in application order.
    pub executions: Vec<ScriptOutcome>,

    /// Data transfer summary; absent when the structure script failed.
    pub transfer: Option<TransferSummary>,

    /// Tables whose data was not transferred.
    pub failed_tables: Vec<String>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Result of script generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub schema: String,
    pub tables: usize,
    pub views: usize,
    /// Written files, in application order.
    pub files: Vec<PathBuf>,
}

/// Result of a connection test.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator {
    /// Create an orchestrator that connects with the bundled MySQL and
    /// GaussDB drivers.
    pub fn new(config: Config) -> Self {
        let connector = Arc::new(DriverConnector::new(config.clone()));
        Self::with_connector(config, connector)
    }

    /// Create an orchestrator over any [`Connector`].
    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            mappings: TypeMappings::mysql_to_gauss(),
            registry: Arc::new(TaskRegistry::new()),
        }
    }

    /// Publish progress into a shared registry.
    pub fn with_registry(mut self, registry: Arc<TaskRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the type and default mapping tables.
    pub fn with_mappings(mut self, mappings: TypeMappings) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Current progress of a task.
    pub fn progress(&self, task_id: &str) -> TaskProgress {
        self.registry.get(task_id)
    }

    /// Run a full migration as task `task_id`.
    ///
    /// Statement failures and table failures do not make this return an
    /// error; they are in the result. Errors are returned for failures that
    /// end the task early (connectivity, introspection, script files), and the
    /// task is marked FAIL.
    pub async fn run(&self, task_id: &str) -> Result<MigrationResult> {
        let reporter = self.registry.start(task_id)?;
        info!("Starting migration task: {}", task_id);

        match self.run_phases(&reporter).await {
            Ok(result) => {
                info!(
                    "Migration task {} finished with status {:?} in {:.2}s",
                    task_id, result.status, result.duration_seconds
                );
                Ok(result)
            }
            Err(e) => {
                error!("Migration task {} failed: {}", task_id, e);
                reporter.fail();
                Err(e)
            }
        }
    }

    async fn run_phases(&self, reporter: &ProgressReporter) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let mut result = MigrationResult {
            task_id: reporter.task_id().to_string(),
            status: TaskStatus::Running,
            schema: self.config.source.database.clone(),
            started_at,
            completed_at: started_at,
            duration_seconds: 0.0,
            scripts: Vec::new(),
            executions: Vec::new(),
            transfer: None,
            failed_tables: Vec::new(),
        };

        // Phase 1: Generate scripts
        info!("Phase 1: Generating scripts from source schema");
        reporter.set_phase(TaskPhase::GenerateSql);
        let generated = self.generate(Some(reporter)).await?;
        result.scripts = generated.files;

        // Phase 2: Apply table structure
        info!("Phase 2: Creating tables on target");
        reporter.set_phase(TaskPhase::ExecuteSql);
        let executor = self.executor();
        let structure = executor
            .execute_file(
                &self.script_path(ScriptKind::Structure),
                Some(BandedProgress::new(reporter, STRUCTURE_BAND)),
            )
            .await?;
        let structure_ok = structure.success();
        result.executions.push(structure);

        if !structure_ok {
            error!("Table structure script failed, skipping data transfer");
            reporter.fail();
            result.status = TaskStatus::Fail;
            return Ok(finish(result, timer));
        }

        // Phase 3: Transfer data
        info!("Phase 3: Transferring data");
        reporter.set_phase(TaskPhase::TransferData);
        let mut engine = DataTransferEngine::new(
            self.connector.as_ref(),
            &self.mappings,
            TransferConfig {
                batch_size: self.config.migration.batch_size,
            },
        );
        let summary = engine
            .run(Some(BandedProgress::new(reporter, TRANSFER_BAND)))
            .await?;
        result.failed_tables = summary.failed_tables.clone();
        result.transfer = Some(summary);

        // Phase 4: Post-transfer scripts
        info!("Phase 4: Creating indexes, constraints and views");
        reporter.set_phase(TaskPhase::ExecuteSql);
        for kind in ScriptKind::POST_TRANSFER {
            let band = post_transfer_band(kind);
            let outcome = executor
                .execute_file(
                    &self.script_path(kind),
                    Some(BandedProgress::new(reporter, band)),
                )
                .await?;
            if !outcome.success() {
                warn!(
                    "{}: {} statements failed, continuing",
                    outcome.script,
                    outcome.failures.len()
                );
            }
            reporter.set_percentage(band.end);
            result.executions.push(outcome);
        }

        if !result.failed_tables.is_empty() {
            warn!(
                "Data of {} tables was not transferred: {}",
                result.failed_tables.len(),
                result.failed_tables.join(", ")
            );
        }

        reporter.succeed();
        result.status = TaskStatus::Success;
        Ok(finish(result, timer))
    }

    /// Introspect the source and write the five scripts, without applying
    /// them.
    pub async fn generate_scripts(&self) -> Result<GenerationResult> {
        self.generate(None).await
    }

    async fn generate(&self, reporter: Option<&ProgressReporter>) -> Result<GenerationResult> {
        let schema_name = &self.config.source.database;
        let source = self.connector.connect_source().await?;
        let introspected = SchemaIntrospector::new(source.as_ref())
            .introspect(schema_name)
            .await;
        source.close().await;
        let schema = introspected?;

        let scripts = DdlGenerator::new(&self.mappings).generate(&schema);
        let output_dir = &self.config.migration.output_dir;
        let mut files = Vec::with_capacity(ScriptKind::ALL.len());
        for kind in ScriptKind::ALL {
            files.push(scripts.write(kind, output_dir, schema_name)?);
            if kind == ScriptKind::Structure {
                if let Some(r) = reporter {
                    r.set_percentage(STRUCTURE_WRITTEN);
                }
            }
        }
        if let Some(r) = reporter {
            r.set_percentage(GENERATED);
        }

        Ok(GenerationResult {
            schema: schema_name.clone(),
            tables: schema.tables.len(),
            views: schema.views.len(),
            files,
        })
    }

    /// Apply one script file to the target schema.
    pub async fn execute_script(&self, path: &Path) -> Result<ScriptOutcome> {
        self.executor().execute_file(path, None).await
    }

    /// Run `SELECT 1` against source and target.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let timer = Instant::now();
        let source = match self.connector.connect_source().await {
            Ok(conn) => {
                let pinged = conn.ping().await;
                conn.close().await;
                pinged
            }
            Err(e) => Err(e),
        };
        let source_latency_ms = timer.elapsed().as_millis() as u64;

        let timer = Instant::now();
        let target = self.executor().test_connection().await;
        let target_latency_ms = timer.elapsed().as_millis() as u64;

        let result = HealthCheckResult {
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.err().map(|e| e.to_string()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.err().map(|e| e.to_string()),
            healthy: false,
        };
        Ok(HealthCheckResult {
            healthy: result.source_connected && result.target_connected,
            ..result
        })
    }

    fn executor(&self) -> ScriptExecutor<'_> {
        ScriptExecutor::new(
            self.connector.as_ref(),
            self.config.target.schema.clone(),
            self.config.migration.script_failure_policy,
        )
    }

    fn script_path(&self, kind: ScriptKind) -> PathBuf {
        self.config.script_path(kind.suffix())
    }
}

fn finish(mut result: MigrationResult, timer: Instant) -> MigrationResult {
    result.completed_at = Utc::now();
    result.duration_seconds = timer.elapsed().as_secs_f64();
    result
}
