//! Batch execution of the build queue

use agiros_oob_core::{BuildKind, PackageRun};
use agiros_oob_queue::{FsQueueFiles, QueueFiles, QueueStore};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::executor::{TaskExecutor, TaskOutcome};
use crate::progress_ui::ProgressUI;

/// Decides whether a pass goes on after a package failed
pub trait ContinueDecider: Send {
    /// Called once per failed package; `false` halts the pass
    fn should_continue(&mut self, package: &str, failure: &TaskOutcome) -> bool;
}

/// Keep going after every failure
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysContinue;

impl ContinueDecider for AlwaysContinue {
    fn should_continue(&mut self, _package: &str, _failure: &TaskOutcome) -> bool {
        true
    }
}

/// Halt at the first failure
#[derive(Debug, Clone, Copy, Default)]
pub struct StopOnFailure;

impl ContinueDecider for StopOnFailure {
    fn should_continue(&mut self, _package: &str, _failure: &TaskOutcome) -> bool {
        false
    }
}

/// Summary of one pass over the queue
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Packages whose tasks all succeeded in this pass
    pub completed: Vec<String>,
    /// Packages with a failed task
    pub failed: Vec<String>,
    /// Packages already completed before the pass
    pub skipped: Vec<String>,
    /// Whether the pass was halted before the end of the queue
    pub aborted: bool,
    /// Per-package results in run order
    pub runs: Vec<PackageRun>,
}

impl BatchReport {
    /// Whether no package failed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs pending queue packages one after another
pub struct BatchOrchestrator<'a, F: QueueFiles = FsQueueFiles> {
    store: &'a QueueStore<F>,
    executor: TaskExecutor<'a>,
    ui: &'a dyn ProgressUI,
}

impl<'a, F: QueueFiles> BatchOrchestrator<'a, F> {
    /// Create an orchestrator over a queue
    pub fn new(store: &'a QueueStore<F>, executor: TaskExecutor<'a>, ui: &'a dyn ProgressUI) -> Self {
        Self { store, executor, ui }
    }

    /// Run one pass over the queue
    ///
    /// Completed packages are skipped. Tasks of a package run in stored
    /// order and the first failure ends the package. Each package's
    /// completion flag is written back before the next package starts.
    pub async fn run(&self, decider: &mut dyn ContinueDecider) -> Result<BatchReport> {
        let state = self.store.load();
        let mut report = BatchReport::default();
        if state.is_empty() {
            info!("Build queue is empty");
            return Ok(report);
        }

        self.ui.batch_started(state.packages().len());
        for package in state.packages() {
            if state.is_completed(package) {
                let mut run = PackageRun::new(package.as_str());
                run.skip();
                report.runs.push(run);
                report.skipped.push(package.clone());
                self.ui.package_skipped(package, "already completed");
                continue;
            }
            let tasks = state.tasks_for(package);
            if tasks.is_empty() {
                continue;
            }

            self.ui.package_started(package);
            let mut run = PackageRun::new(package.as_str());
            run.start();

            let mut failure: Option<(BuildKind, TaskOutcome)> = None;
            for task in &tasks {
                let outcome = self.executor.execute(task, self.ui.observer()).await?;
                if outcome.is_success() {
                    run.task_succeeded(task.kind);
                } else {
                    failure = Some((task.kind, outcome));
                    break;
                }
            }

            match failure {
                None => {
                    run.complete();
                    self.persist(package, true)?;
                    self.ui.package_finished(package, None);
                    report.completed.push(package.clone());
                    report.runs.push(run);
                }
                Some((kind, outcome)) => {
                    let reason = format!("{kind}: {}", outcome.describe());
                    run.fail(kind, outcome.exit_code(), reason.as_str());
                    self.persist(package, false)?;
                    self.ui.package_finished(package, Some(&reason));
                    report.failed.push(package.clone());
                    report.runs.push(run);

                    if !decider.should_continue(package, &outcome) {
                        warn!("Stopping after failure of {}", package);
                        report.aborted = true;
                        break;
                    }
                }
            }
        }
        self.ui.finish();

        info!(
            "Batch finished: {} completed, {} failed, {} skipped",
            report.completed.len(),
            report.failed.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Write a completion flag; the package may have left the queue meanwhile
    fn persist(&self, package: &str, completed: bool) -> Result<()> {
        if self.executor.is_dry_run() {
            debug!("[DRY] {} completed={}", package, completed);
        } else if self.store.load().contains(package) {
            self.store.set_completed(package, completed)?;
        } else {
            warn!("{} left the queue during the run", package);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deciders() {
        let failure = TaskOutcome::Failed { command: "rpmbuild -ba x.spec".into(), exit_code: 1 };
        assert!(AlwaysContinue.should_continue("pkg", &failure));
        assert!(!StopOnFailure.should_continue("pkg", &failure));
    }

    #[test]
    fn test_report_success() {
        let mut report = BatchReport::default();
        assert!(report.is_success());
        report.failed.push("pkgB".into());
        assert!(!report.is_success());
    }
}
