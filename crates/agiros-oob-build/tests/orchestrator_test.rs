//! Batch orchestration tests with a scripted process runner

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use agiros_oob_build::{
    AlwaysContinue, BatchOrchestrator, CommandSpec, ContinueDecider, FailureLog, Invocation,
    NoOpProgressUI, OutputObserver, ProcessRunner, Result, StopOnFailure, TaskExecutor,
    TaskOutcome,
};
use agiros_oob_config::Config;
use agiros_oob_queue::QueueStore;
use async_trait::async_trait;
use tempfile::TempDir;

/// Runner that records command lines and fails the ones matching a pattern
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    operations: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<Vec<(String, i32, Vec<String>)>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands whose line contains `pattern` exit with `code` and print `output`
    pub fn set_failure(&self, pattern: &str, code: i32, output: &[&str]) {
        self.failures.lock().unwrap().push((
            pattern.to_string(),
            code,
            output.iter().map(|s| s.to_string()).collect(),
        ));
    }

    pub fn get_operations(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn invoke(&self, spec: &CommandSpec, observer: &dyn OutputObserver) -> Result<Invocation> {
        observer.on_command(spec, false);
        let line = spec.command_line();
        self.operations.lock().unwrap().push(line.clone());
        let failure = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _, _)| line.contains(pattern.as_str()))
            .cloned();
        Ok(match failure {
            Some((_, code, output)) => {
                for out in &output {
                    observer.on_line(out);
                }
                Invocation::failure(code, output)
            }
            None => Invocation::success(),
        })
    }
}

struct Workspace {
    temp: TempDir,
    config: Config,
    store: QueueStore,
    log: FailureLog,
}

impl Workspace {
    fn code(&self, name: &str) -> PathBuf {
        self.config.code_dir.join(name)
    }

    fn read(&self, path: &Path) -> String {
        std::fs::read_to_string(path).unwrap_or_default()
    }
}

fn workspace(lines: &str, meta: &str) -> Workspace {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.code_dir = temp.path().join("code");
    config.release_dir = temp.path().join("release");
    config.queue_file = temp.path().join("build_queue.txt");
    config.fail_log = temp.path().join("fail.log");
    std::fs::create_dir_all(&config.release_dir).unwrap();

    for pkg in ["pkgA", "pkgB", "pkgC"] {
        std::fs::create_dir_all(config.code_dir.join(pkg).join("rpm")).unwrap();
        std::fs::write(config.code_dir.join(pkg).join("rpm").join(format!("{pkg}.spec")), "")
            .unwrap();
    }

    let meta = meta.replace("{code}", &config.code_dir.to_string_lossy());
    std::fs::write(&config.queue_file, lines).unwrap();
    std::fs::write(config.meta_file(), meta).unwrap();
    std::fs::write(&config.fail_log, "").unwrap();

    let store = QueueStore::open(&config.queue_file, config.meta_file(), &config.code_dir);
    let log = FailureLog::new(&config.fail_log);
    Workspace { temp, config, store, log }
}

const META: &str = r#"{
  "pkgA": {"path": "{code}/pkgA", "kinds": {"debian": {"extra_args": []}}},
  "pkgB": {"path": "{code}/pkgB", "kinds": {"debian": {"extra_args": []}, "rpm": {"extra_args": []}}}
}"#;

#[tokio::test]
async fn end_to_end_failure_keeps_package_pending() {
    let ws = workspace("pkgA#\npkgB\n", META);
    let runner = ScriptedRunner::new();
    runner.set_failure("rpmbuild", 1, &["error: Failed build dependencies"]);

    let executor = TaskExecutor::new(&ws.config, &runner, &ws.log);
    let orchestrator = BatchOrchestrator::new(&ws.store, executor, &NoOpProgressUI);
    let report = orchestrator.run(&mut AlwaysContinue).await.unwrap();

    let ops = runner.get_operations();
    assert_eq!(ops.len(), 2);
    assert!(ops[0].starts_with("gbp buildpackage"));
    assert!(ops[1].starts_with("rpmbuild -ba"));
    assert!(ops.iter().all(|op| !op.contains("pkgA")));

    assert_eq!(report.skipped, vec!["pkgA"]);
    assert_eq!(report.failed, vec!["pkgB"]);
    assert!(report.completed.is_empty());
    assert!(!report.aborted);

    let state = ws.store.load();
    assert!(state.is_completed("pkgA"));
    assert!(!state.is_completed("pkgB"));
    assert_eq!(ws.read(&ws.config.queue_file), "pkgA#\npkgB\n");

    let log = ws.read(&ws.config.fail_log);
    assert_eq!(log.lines().count(), 1);
    assert_eq!(log, "pkgB rpm failed rc=1\n");
}

#[tokio::test]
async fn successful_package_is_marked_completed() {
    let ws = workspace("pkgA\npkgB\n", META);
    let runner = ScriptedRunner::new();

    let executor = TaskExecutor::new(&ws.config, &runner, &ws.log);
    let report = BatchOrchestrator::new(&ws.store, executor, &NoOpProgressUI)
        .run(&mut AlwaysContinue)
        .await
        .unwrap();

    assert_eq!(report.completed, vec!["pkgA", "pkgB"]);
    assert!(report.is_success());
    assert_eq!(ws.read(&ws.config.queue_file), "pkgA#\npkgB#\n");
    assert_eq!(runner.get_operations().len(), 3);
    assert_eq!(report.runs.len(), 2);
}

#[tokio::test]
async fn first_failing_task_aborts_the_package() {
    let ws = workspace("pkgB\n", META);
    let runner = ScriptedRunner::new();
    runner.set_failure("gbp buildpackage", 2, &[]);

    let executor = TaskExecutor::new(&ws.config, &runner, &ws.log);
    BatchOrchestrator::new(&ws.store, executor, &NoOpProgressUI)
        .run(&mut AlwaysContinue)
        .await
        .unwrap();

    assert_eq!(runner.get_operations().len(), 1);
    assert_eq!(ws.read(&ws.config.fail_log), "pkgB debian failed rc=2\n");
}

#[tokio::test]
async fn stop_on_failure_leaves_rest_pending() {
    let meta = r#"{"pkgA": {"path": "{code}/pkgA", "kinds": {"rpm": {"extra_args": []}}},
                   "pkgC": {"path": "{code}/pkgC", "kinds": {"rpm": {"extra_args": []}}}}"#;
    let ws = workspace("pkgA\npkgC\n", meta);
    let runner = ScriptedRunner::new();
    runner.set_failure("pkgA.spec", 1, &[]);

    let executor = TaskExecutor::new(&ws.config, &runner, &ws.log);
    let report = BatchOrchestrator::new(&ws.store, executor, &NoOpProgressUI)
        .run(&mut StopOnFailure)
        .await
        .unwrap();

    assert!(report.aborted);
    assert_eq!(report.failed, vec!["pkgA"]);
    assert_eq!(runner.get_operations().len(), 1);
    assert_eq!(ws.read(&ws.config.queue_file), "pkgA\npkgC\n");
}

/// Decider that records what it was asked
struct Recording(Vec<String>);

impl ContinueDecider for Recording {
    fn should_continue(&mut self, package: &str, failure: &TaskOutcome) -> bool {
        self.0.push(format!("{package}: {}", failure.describe()));
        true
    }
}

#[tokio::test]
async fn missing_directory_is_reported_without_running() {
    let ws = workspace("ghost\n", "{}");
    let runner = ScriptedRunner::new();
    let mut decider = Recording(Vec::new());

    let executor = TaskExecutor::new(&ws.config, &runner, &ws.log);
    let report = BatchOrchestrator::new(&ws.store, executor, &NoOpProgressUI)
        .run(&mut decider)
        .await
        .unwrap();

    assert!(runner.get_operations().is_empty());
    assert_eq!(report.failed, vec!["ghost"]);
    assert_eq!(decider.0.len(), 1);
    assert!(decider.0[0].contains("does not exist"));
    assert!(ws.read(&ws.config.fail_log).starts_with("ghost debian error: "));
    assert!(ws.temp.path().join("build_queue.txt").exists());
    assert!(!ws.code("ghost").exists());
}
