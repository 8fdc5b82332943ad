//! Queue command implementation

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use agiros_oob_build::{
    AlwaysContinue, BatchOrchestrator, ContinueDecider, FailureLog, IndicatifProgressUI,
    NoOpProgressUI, ProgressUI, StopOnFailure, SystemRunner, TaskExecutor, TaskOutcome,
};
use agiros_oob_config::Config;
use agiros_oob_core::{display_name_for, BuildKind, BuildTask};
use agiros_oob_queue::{QueueState, QueueStore};
use color_eyre::eyre::{eyre, Context, Result};
use tracing::info;

/// Asks on the terminal whether to go on after a failed package
struct PromptDecider;

impl ContinueDecider for PromptDecider {
    fn should_continue(&mut self, package: &str, failure: &TaskOutcome) -> bool {
        println!("✗ {}: {}", package, failure.describe());
        print!("Continue with remaining packages? [Y/n] ");
        if std::io::stdout().flush().is_err() {
            return true;
        }
        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => true,
            Ok(_) => !answer.trim().to_lowercase().starts_with('n'),
        }
    }
}

/// Package named by a queue name or a 1-based index
fn resolve_target(state: &QueueState, target: &str) -> Option<String> {
    if state.contains(target) {
        return Some(target.to_string());
    }
    let index: usize = target.trim().parse().ok()?;
    state.packages().get(index.checked_sub(1)?).cloned()
}

/// Queue command implementation
pub struct QueueCommand {
    config: Config,
    show_progress: bool,
}

impl QueueCommand {
    pub fn new(config: Config, show_progress: bool) -> Self {
        Self { config, show_progress }
    }

    fn store(&self) -> QueueStore {
        QueueStore::open(&self.config.queue_file, self.config.meta_file(), &self.config.code_dir)
    }

    pub fn list(&self) -> Result<()> {
        let state = self.store().load();
        if state.is_empty() {
            println!("Queue is empty ({})", self.config.queue_file.display());
            return Ok(());
        }
        for (i, entry) in state.entries().iter().enumerate() {
            let kinds: Vec<&str> = entry.kinds().iter().map(BuildKind::as_str).collect();
            let mark = if entry.completed { "#" } else { " " };
            println!("{:>3}. {}{} [{}]", i + 1, mark, entry.name, kinds.join(", "));
            for task in entry.tasks.iter().filter(|t| !t.extra_args.is_empty()) {
                println!("       {} args: {}", task.kind, task.extra_args.join(" "));
            }
        }
        println!("\n{} pending of {}", state.pending().len(), state.packages().len());
        Ok(())
    }

    pub fn add(&self, path: &Path, kind: BuildKind, args: Vec<String>) -> Result<()> {
        let path = absolute(path)?;
        if !path.is_dir() {
            return Err(eyre!("Package directory does not exist: {}", path.display()));
        }
        let name = display_name_for(&path, &self.config.code_dir);
        let task = BuildTask::new(name.clone(), &path, kind).with_args(args);

        self.store()
            .append(task)
            .wrap_err_with(|| format!("Failed to update {}", self.config.queue_file.display()))?;
        println!("✓ Queued {} ({})", name, kind);
        Ok(())
    }

    pub fn remove(&self, target: &str) -> Result<()> {
        let store = self.store();
        let name = resolve_target(&store.load(), target)
            .ok_or_else(|| eyre!("No queued package matches {target}"))?;
        store.remove(&name).wrap_err("Failed to update the queue")?;
        println!("✓ Removed {}", name);
        Ok(())
    }

    pub fn set_args(&self, name: &str, kind: BuildKind, args: Vec<String>) -> Result<()> {
        self.store().set_extra_args(name, kind, args.clone()).wrap_err("Failed to update the queue")?;
        println!("✓ {} ({}) args: {}", name, kind, args.join(" "));
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.store().clear().wrap_err("Failed to clear the queue")?;
        println!("✓ Queue cleared");
        Ok(())
    }

    pub async fn run(&self, keep_going: bool, stop_on_failure: bool) -> Result<()> {
        let store = self.store();
        if !self.config.dry_run {
            store.ensure_files().wrap_err("Failed to create queue files")?;
        }
        info!("Running queue {}", self.config.queue_file.display());

        let runner = SystemRunner::from_config(&self.config);
        let log = FailureLog::new(&self.config.fail_log);
        let executor = TaskExecutor::new(&self.config, &runner, &log);
        let ui: Box<dyn ProgressUI> = if self.show_progress {
            Box::new(IndicatifProgressUI::new())
        } else {
            Box::new(NoOpProgressUI)
        };

        let mut decider: Box<dyn ContinueDecider> = if keep_going {
            Box::new(AlwaysContinue)
        } else if stop_on_failure {
            Box::new(StopOnFailure)
        } else {
            Box::new(PromptDecider)
        };

        let report = BatchOrchestrator::new(&store, executor, ui.as_ref())
            .run(decider.as_mut())
            .await
            .wrap_err("Queue run failed")?;

        println!(
            "\n✓ {} completed, {} failed, {} already done",
            report.completed.len(),
            report.failed.len(),
            report.skipped.len()
        );
        if report.aborted {
            println!("Stopped early; remaining packages stay pending");
        }
        if report.is_success() {
            Ok(())
        } else {
            println!("Failures are recorded in {}", log.path().display());
            Err(eyre!("{} package(s) failed: {}", report.failed.len(), report.failed.join(", ")))
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use agiros_oob_queue::{MemoryQueueFiles, QueueStore};

    use super::*;

    #[test]
    fn test_resolve_target_by_name_or_index() {
        let store = QueueStore::with_files(
            MemoryQueueFiles::with_contents(Some("pkgA#\npkgB\n"), None),
            "/code",
        );
        let state = store.load();
        assert_eq!(resolve_target(&state, "pkgB"), Some("pkgB".to_string()));
        assert_eq!(resolve_target(&state, "1"), Some("pkgA".to_string()));
        assert_eq!(resolve_target(&state, "0"), None);
        assert_eq!(resolve_target(&state, "3"), None);
        assert_eq!(resolve_target(&state, "pkgC"), None);
    }
}
