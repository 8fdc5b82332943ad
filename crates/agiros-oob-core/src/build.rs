//! Per-package run result tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::BuildKind;

/// Result of running all tasks of one queued package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRun {
    /// Package name
    pub package_name: String,

    /// Run status
    pub status: RunStatus,

    /// Start time
    pub start_time: DateTime<Utc>,

    /// End time
    pub end_time: DateTime<Utc>,

    /// Duration in seconds
    pub duration_secs: f64,

    /// Kinds that finished successfully
    pub succeeded: Vec<BuildKind>,

    /// Kind that failed, if any
    pub failed_kind: Option<BuildKind>,

    /// Exit code of the failing command
    pub exit_code: Option<i32>,

    /// Error message if failed
    pub error: Option<String>,
}

/// Run status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting to run
    Pending,

    /// Tasks are executing
    Running,

    /// All tasks succeeded
    Completed,

    /// A task failed
    Failed,

    /// Already completed in a previous pass
    Skipped,
}

impl PackageRun {
    /// Create a new pending run
    pub fn new(package_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            package_name: package_name.into(),
            status: RunStatus::Pending,
            start_time: now,
            end_time: now,
            duration_secs: 0.0,
            succeeded: Vec::new(),
            failed_kind: None,
            exit_code: None,
            error: None,
        }
    }

    /// Mark run as started
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.start_time = Utc::now();
    }

    /// Record a successful task
    pub fn task_succeeded(&mut self, kind: BuildKind) {
        self.succeeded.push(kind);
    }

    /// Mark run as completed successfully
    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.finish_timing();
    }

    /// Mark run as failed
    pub fn fail(&mut self, kind: BuildKind, exit_code: Option<i32>, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.failed_kind = Some(kind);
        self.exit_code = exit_code;
        self.error = Some(error.into());
        self.finish_timing();
    }

    /// Mark run as skipped
    pub fn skip(&mut self) {
        self.status = RunStatus::Skipped;
        self.end_time = self.start_time;
    }

    fn finish_timing(&mut self) {
        self.end_time = Utc::now();
        self.duration_secs = (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0;
    }
}

impl RunStatus {
    /// Check if the run reached a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}
