//! Task progress registry.
//!
//! A [`TaskRegistry`] maps task ids to [`TaskProgress`] records. It is owned by
//! whoever starts migrations and shared with whoever polls them. Only the
//! [`ProgressReporter`] returned by [`TaskRegistry::start`] mutates a record;
//! everyone else reads snapshots.
//!
//! Records are never dropped implicitly. Terminal records stay until the owner
//! calls [`TaskRegistry::evict`] or [`TaskRegistry::evict_terminal`]; records of
//! running tasks cannot be evicted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrateError, Result};

/// Overall task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Init,
    Running,
    Success,
    Fail,
}

impl TaskStatus {
    /// SUCCESS and FAIL are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Fail)
    }
}

/// Phase a task is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPhase {
    GenerateSql,
    ExecuteSql,
    TransferData,
}

/// Progress of one migration task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: String,

    /// 0-100, never decreases while the task runs.
    pub percentage: f64,

    pub status: TaskStatus,

    pub phase: TaskPhase,

    /// Last mutation, `None` for the implicit record of an unknown task.
    pub updated_at: Option<DateTime<Utc>>,
}

impl TaskProgress {
    /// The record reported for a task id the registry does not know.
    pub fn initial(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            percentage: 0.0,
            status: TaskStatus::Init,
            phase: TaskPhase::GenerateSql,
            updated_at: None,
        }
    }
}

/// A sub-range of the task percentage reserved for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBand {
    pub start: f64,
    pub end: f64,
}

impl ProgressBand {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Percentage for `fraction` (clamped to 0..=1) of the band.
    pub fn at(&self, fraction: f64) -> f64 {
        self.start + fraction.clamp(0.0, 1.0) * (self.end - self.start)
    }
}

/// A reporter restricted to one band of the task percentage.
#[derive(Debug, Clone, Copy)]
pub struct BandedProgress<'a> {
    pub reporter: &'a ProgressReporter,
    pub band: ProgressBand,
}

impl<'a> BandedProgress<'a> {
    pub fn new(reporter: &'a ProgressReporter, band: ProgressBand) -> Self {
        Self { reporter, band }
    }

    /// Publish `fraction` of the band.
    pub fn report(&self, fraction: f64) {
        self.reporter.set_percentage(self.band.at(fraction));
    }
}

/// Thread-safe map from task id to progress.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, TaskProgress>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task as RUNNING at 0% and return its writer handle.
    ///
    /// A terminal record with the same id is replaced; a running one is an
    /// error.
    pub fn start(self: &Arc<Self>, task_id: &str) -> Result<ProgressReporter> {
        let mut entry = self
            .tasks
            .entry(task_id.to_string())
            .or_insert_with(|| TaskProgress::initial(task_id));
        if entry.status == TaskStatus::Running {
            return Err(MigrateError::State(format!(
                "task {} is already running",
                task_id
            )));
        }
        *entry = TaskProgress {
            status: TaskStatus::Running,
            updated_at: Some(Utc::now()),
            ..TaskProgress::initial(task_id)
        };
        drop(entry);

        Ok(ProgressReporter {
            registry: Arc::clone(self),
            task_id: task_id.to_string(),
        })
    }

    /// Snapshot of a task's progress; unknown ids read as INIT / 0% /
    /// GENERATE_SQL.
    pub fn get(&self, task_id: &str) -> TaskProgress {
        self.tasks
            .get(task_id)
            .map(|p| p.value().clone())
            .unwrap_or_else(|| TaskProgress::initial(task_id))
    }

    /// Whether the registry holds a record for `task_id`.
    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }

    /// Snapshots of every record, sorted by task id.
    pub fn snapshot(&self) -> Vec<TaskProgress> {
        let mut all: Vec<_> = self.tasks.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        all
    }

    /// Remove a terminal record. Returns false if absent or still running.
    pub fn evict(&self, task_id: &str) -> bool {
        self.tasks
            .remove_if(task_id, |_, p| p.status.is_terminal())
            .is_some()
    }

    /// Remove every terminal record, returning how many were removed.
    pub fn evict_terminal(&self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, p| !p.status.is_terminal());
        before - self.tasks.len()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn update(&self, task_id: &str, f: impl FnOnce(&mut TaskProgress)) {
        if let Some(mut progress) = self.tasks.get_mut(task_id) {
            if progress.status.is_terminal() {
                debug!("Ignoring progress update for finished task {}", task_id);
                return;
            }
            f(progress.value_mut());
            progress.updated_at = Some(Utc::now());
        }
    }
}

/// Writer handle for one running task.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    registry: Arc<TaskRegistry>,
    task_id: String,
}

impl ProgressReporter {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Enter a phase.
    pub fn set_phase(&self, phase: TaskPhase) {
        self.registry.update(&self.task_id, |p| p.phase = phase);
    }

    /// Raise the percentage. Lower values are ignored.
    pub fn set_percentage(&self, percentage: f64) {
        let percentage = percentage.clamp(0.0, 100.0);
        self.registry.update(&self.task_id, |p| {
            if percentage > p.percentage {
                p.percentage = percentage;
            }
        });
    }

    /// Mark the task SUCCESS at 100%.
    pub fn succeed(&self) {
        self.registry.update(&self.task_id, |p| {
            p.percentage = 100.0;
            p.status = TaskStatus::Success;
        });
    }

    /// Mark the task FAIL, keeping its percentage.
    pub fn fail(&self) {
        self.registry
            .update(&self.task_id, |p| p.status = TaskStatus::Fail);
    }

    /// Current snapshot of this task.
    pub fn current(&self) -> TaskProgress {
        self.registry.get(&self.task_id)
    }
}
