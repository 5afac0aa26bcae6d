//! mysql-gauss-migrate CLI - MySQL to GaussDB schema and data migration.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use mysql_gauss_migrate::{
    Config, MigrateError, MigrationResult, Orchestrator, ScriptOutcome, TaskRegistry, TaskStatus,
};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mysql-gauss-migrate")]
#[command(about = "MySQL to GaussDB schema and data migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full migration: generate, create tables, transfer data, post DDL
    Run {
        /// Task id under which progress is published [default: random UUID]
        #[arg(long)]
        task_id: Option<String>,

        /// Override rows per insert batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override the script output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Generate the five DDL scripts without touching the target
    Generate {
        /// Override the script output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Apply one SQL script to the target schema
    Execute {
        /// Script file to apply
        script: PathBuf,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            task_id,
            batch_size,
            output_dir,
        } => {
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
            }
            if let Some(dir) = output_dir {
                config.migration.output_dir = dir;
            }
            config.validate()?;

            let task_id = task_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let registry = Arc::new(TaskRegistry::new());
            let orchestrator = Orchestrator::new(config).with_registry(Arc::clone(&registry));

            let reporter = cli
                .progress
                .then(|| spawn_progress_printer(Arc::clone(&registry), task_id.clone()));
            let result = orchestrator.run(&task_id).await;
            if let Some(handle) = reporter {
                handle.abort();
                print_progress(&registry, &task_id);
            }
            let result = result?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_migration(&result);
            }

            if result.status == TaskStatus::Fail {
                return Err(structure_failure(&result));
            }
        }

        Commands::Generate { output_dir } => {
            if let Some(dir) = output_dir {
                config.migration.output_dir = dir;
            }

            let orchestrator = Orchestrator::new(config);
            let result = orchestrator.generate_scripts().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Scripts generated for {}:", result.schema);
                println!("  Tables: {}", result.tables);
                println!("  Views: {}", result.views);
                for file in &result.files {
                    println!("  {}", file.display());
                }
            }
        }

        Commands::Execute { script } => {
            let orchestrator = Orchestrator::new(config);
            let outcome = orchestrator.execute_script(&script).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }

            if let Some(first) = outcome.failures.first() {
                return Err(MigrateError::statement(
                    first.statement.clone(),
                    format!(
                        "{} of {} statements failed, first: {}",
                        outcome.failures.len(),
                        outcome.total,
                        first.error
                    ),
                ));
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config);
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MySQL): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (GaussDB): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                let reason = result
                    .source_error
                    .or(result.target_error)
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(MigrateError::connectivity(reason, "health check"));
            }
        }
    }

    Ok(())
}

fn print_migration(result: &MigrationResult) {
    let status_msg = match result.status {
        TaskStatus::Success => "Migration completed!",
        _ => "Migration failed!",
    };
    println!("\n{}", status_msg);
    println!("  Task ID: {}", result.task_id);
    println!("  Schema: {}", result.schema);
    println!("  Duration: {:.2}s", result.duration_seconds);
    for outcome in &result.executions {
        println!(
            "  {}: {}/{} statements",
            outcome.script, outcome.succeeded, outcome.total
        );
    }
    if let Some(ref transfer) = result.transfer {
        println!(
            "  Tables: {}/{}",
            transfer.processed_tables, transfer.total_tables
        );
        println!(
            "  Rows: {}/{}",
            transfer.processed_records, transfer.total_records
        );
    }
    if !result.failed_tables.is_empty() {
        println!("  Failed tables: {:?}", result.failed_tables);
    }
}

fn print_outcome(outcome: &ScriptOutcome) {
    println!("{}:", outcome.script);
    println!("  Statements: {}/{}", outcome.succeeded, outcome.total);
    if outcome.skipped > 0 {
        println!("  Skipped: {}", outcome.skipped);
    }
    for failure in &outcome.failures {
        println!("  #{} failed: {}", failure.index + 1, failure.error);
    }
    println!(
        "  {}",
        if outcome.committed { "Committed" } else { "Rolled back" }
    );
}

fn structure_failure(result: &MigrationResult) -> MigrateError {
    match result.executions.first().and_then(|o| o.failures.first()) {
        Some(failure) => MigrateError::statement(failure.statement.clone(), failure.error.clone()),
        None => MigrateError::State(format!("task {} failed", result.task_id)),
    }
}

/// Poll the registry once per second until the task is terminal.
fn spawn_progress_printer(
    registry: Arc<TaskRegistry>,
    task_id: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            print_progress(&registry, &task_id);
            if registry.get(&task_id).status.is_terminal() {
                break;
            }
        }
    })
}

fn print_progress(registry: &TaskRegistry, task_id: &str) {
    if let Ok(line) = serde_json::to_string(&registry.get(task_id)) {
        eprintln!("{}", line);
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
