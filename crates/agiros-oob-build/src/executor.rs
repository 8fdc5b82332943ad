//! Execution of single queue tasks

use std::path::Path;

use agiros_oob_config::Config;
use agiros_oob_core::{BuildKind, BuildTask};
use tracing::{debug, error, info, warn};

use crate::diagnostics::{missing_rules, FailureLog};
use crate::error::{BuildError, Result};
use crate::generator::{spec_files, sync_gbp_conf};
use crate::process::{CommandSpec, OutputObserver, ProcessRunner};

/// Result of running one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Every command exited zero
    Succeeded,
    /// A command exited non-zero
    Failed { command: String, exit_code: i32 },
    /// The task could not run at all
    Environment { message: String },
}

impl TaskOutcome {
    /// Whether the task succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Exit code of a failed command
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Short description of a failure
    pub fn describe(&self) -> String {
        match self {
            Self::Succeeded => "succeeded".to_string(),
            Self::Failed { command, exit_code } => format!("`{command}` exited with rc={exit_code}"),
            Self::Environment { message } => message.clone(),
        }
    }
}

/// Runs the build commands of queue tasks
pub struct TaskExecutor<'a> {
    config: &'a Config,
    runner: &'a dyn ProcessRunner,
    failure_log: &'a FailureLog,
}

fn existing_script(script: Option<&Path>) -> Option<&Path> {
    script.filter(|s| s.is_file())
}

impl<'a> TaskExecutor<'a> {
    /// Create an executor
    pub fn new(config: &'a Config, runner: &'a dyn ProcessRunner, failure_log: &'a FailureLog) -> Self {
        Self { config, runner, failure_log }
    }

    /// Whether commands are only echoed
    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Commands of a task, in run order
    pub fn commands(&self, task: &BuildTask) -> Result<Vec<CommandSpec>> {
        if !task.path.is_dir() {
            return Err(BuildError::environment(format!(
                "package directory {} does not exist",
                task.path.display()
            )));
        }
        match task.kind {
            BuildKind::Debian => Ok(vec![self.debian_command(task)]),
            BuildKind::Rpm => self.rpm_commands(task),
        }
    }

    fn debian_command(&self, task: &BuildTask) -> CommandSpec {
        let config = self.config;
        if let Some(script) = existing_script(config.debian_build_script.as_deref()) {
            let parallel = config.parallel.clone().unwrap_or_else(|| {
                std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4).to_string()
            });
            let mut spec = CommandSpec::new("bash", &task.path)
                .arg(script.to_string_lossy())
                .env("WORK_DIR", task.path.to_string_lossy())
                .env("CODE_DIR", config.code_dir.to_string_lossy())
                .env("DEB_OUT", config.deb_out_dir.to_string_lossy())
                .env("DISTRO", config.deb_distro.as_str())
                .env("DEFAULT_REL_INC", config.default_release_inc.as_str())
                .env("PARALLEL", parallel);
            if let Some(name) = &config.git_user_name {
                spec = spec.env("GIT_USER_NAME", name.as_str());
            }
            if let Some(email) = &config.git_user_email {
                spec = spec.env("GIT_USER_EMAIL", email.as_str());
            }
            return spec;
        }

        CommandSpec::new(config.gbp_bin.as_str(), &task.path)
            .arg("buildpackage")
            .args(config.debian_build_args.iter().cloned())
            .args(task.extra_args.iter().cloned())
    }

    fn rpm_commands(&self, task: &BuildTask) -> Result<Vec<CommandSpec>> {
        let config = self.config;
        if let Some(script) = existing_script(config.rpm_build_script.as_deref()) {
            return Ok(vec![CommandSpec::new("bash", &task.path)
                .arg(script.to_string_lossy())
                .env("WORK_DIR", task.path.to_string_lossy())
                .env("CODE_DIR", config.code_dir.to_string_lossy())]);
        }

        let specs = spec_files(&task.path);
        if specs.is_empty() {
            return Err(BuildError::environment(format!(
                "no rpm/*.spec under {}",
                task.path.display()
            )));
        }
        Ok(specs
            .iter()
            .map(|spec| {
                CommandSpec::new(config.rpm_build_bin.as_str(), &task.path)
                    .args(config.rpm_build_args.iter().cloned())
                    .arg(spec.to_string_lossy())
                    .args(task.extra_args.iter().cloned())
            })
            .collect())
    }

    /// Run a task
    ///
    /// Build failures and environment problems are outcomes, appended to the
    /// failure log. Only unexpected I/O while waiting on a process is an
    /// error.
    pub async fn execute(&self, task: &BuildTask, observer: &dyn OutputObserver) -> Result<TaskOutcome> {
        let target = task.kind.as_str();
        let commands = match self.commands(task) {
            Ok(commands) => commands,
            Err(e) => return Ok(self.environment_failure(task, e)),
        };

        if task.kind == BuildKind::Debian && self.config.sync_gbp_before_build {
            match sync_gbp_conf(self.config, &task.path) {
                Ok(Some(outcome)) => debug!("Synced {} ({})", outcome.path.display(), outcome.tag),
                Ok(None) => {}
                Err(e) => warn!("gbp.conf sync failed for {}: {}", task.display_name, e),
            }
        }

        for spec in &commands {
            let invocation = match self.runner.invoke(spec, observer).await {
                Ok(invocation) => invocation,
                Err(e) if e.is_environment() => return Ok(self.environment_failure(task, e)),
                Err(e) => return Err(e),
            };
            if !invocation.succeeded() {
                let command = spec.command_line();
                error!(
                    "{} {} failed: {} (cwd={}) exited with rc={}",
                    task.display_name,
                    target,
                    command,
                    spec.cwd.display(),
                    invocation.exit_code
                );
                let rules = missing_rules(
                    invocation.captured.as_deref().unwrap_or_default(),
                    &self.config.missing_rule_marker,
                );
                self.failure_log.note_failure(&task.display_name, target, invocation.exit_code, &rules);
                return Ok(TaskOutcome::Failed { command, exit_code: invocation.exit_code });
            }
        }

        info!("{} {} succeeded", task.display_name, target);
        Ok(TaskOutcome::Succeeded)
    }

    fn environment_failure(&self, task: &BuildTask, err: BuildError) -> TaskOutcome {
        let message = err.to_string();
        error!("{} {}: {}", task.display_name, task.kind, message);
        self.failure_log.note_error(&task.display_name, task.kind.as_str(), &message);
        TaskOutcome::Environment { message }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;

    fn setup() -> (TempDir, Config, PathBuf) {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("code").join("pkgA");
        std::fs::create_dir_all(&pkg).unwrap();
        let mut config = Config::default();
        config.code_dir = temp.path().join("code");
        config.release_dir = temp.path().join("release");
        (temp, config, pkg)
    }

    struct Unused;

    #[async_trait::async_trait]
    impl ProcessRunner for Unused {
        async fn invoke(&self, _: &CommandSpec, _: &dyn OutputObserver) -> Result<crate::Invocation> {
            unreachable!("no command expected")
        }
    }

    #[test]
    fn test_debian_uses_gbp_without_script() {
        let (temp, config, pkg) = setup();
        let log = FailureLog::new(temp.path().join("fail.log"));
        let executor = TaskExecutor::new(&config, &Unused, &log);
        let task = BuildTask::new("pkgA", &pkg, BuildKind::Debian).with_args(vec!["-nc".into()]);

        let commands = executor.commands(&task).unwrap();
        assert_eq!(
            commands[0].command_line(),
            "gbp buildpackage --git-ignore-branch --git-ignore-new -us -uc -nc"
        );
        assert_eq!(commands[0].cwd, pkg);
    }

    #[test]
    fn test_debian_script_gets_environment() {
        let (temp, mut config, pkg) = setup();
        let script = temp.path().join("git_build_any.sh");
        std::fs::write(&script, "#!/bin/bash\n").unwrap();
        config.debian_build_script = Some(script.clone());
        config.parallel = Some("8".into());
        config.git_user_name = Some("builder".into());
        let log = FailureLog::new(temp.path().join("fail.log"));
        let executor = TaskExecutor::new(&config, &Unused, &log);

        let commands = executor.commands(&BuildTask::new("pkgA", &pkg, BuildKind::Debian)).unwrap();
        let spec = &commands[0];
        assert_eq!(spec.program, "bash");
        assert_eq!(spec.args, vec![script.to_string_lossy().into_owned()]);
        assert_eq!(spec.env["WORK_DIR"], pkg.to_string_lossy());
        assert_eq!(spec.env["PARALLEL"], "8");
        assert_eq!(spec.env["DEFAULT_REL_INC"], "1");
        assert_eq!(spec.env["GIT_USER_NAME"], "builder");
        assert!(!spec.env.contains_key("GIT_USER_EMAIL"));
    }

    #[test]
    fn test_rpm_one_command_per_sorted_spec() {
        let (temp, config, pkg) = setup();
        std::fs::create_dir_all(pkg.join("rpm")).unwrap();
        std::fs::write(pkg.join("rpm/z.spec"), "").unwrap();
        std::fs::write(pkg.join("rpm/a.spec"), "").unwrap();
        let log = FailureLog::new(temp.path().join("fail.log"));
        let executor = TaskExecutor::new(&config, &Unused, &log);

        let commands = executor.commands(&BuildTask::new("pkgA", &pkg, BuildKind::Rpm)).unwrap();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].args[1].ends_with("a.spec"));
        assert_eq!(commands[0].args[0], "-ba");
    }

    #[tokio::test]
    async fn test_missing_specs_is_environment_outcome() {
        let (temp, config, pkg) = setup();
        let log = FailureLog::new(temp.path().join("fail.log"));
        let executor = TaskExecutor::new(&config, &Unused, &log);

        let outcome = executor
            .execute(&BuildTask::new("pkgA", &pkg, BuildKind::Rpm), &crate::NoOpProgressUI)
            .await
            .unwrap();
        assert!(matches!(outcome, TaskOutcome::Environment { .. }));
        let logged = std::fs::read_to_string(log.path()).unwrap();
        assert!(logged.starts_with("pkgA rpm error: "));
    }

    #[tokio::test]
    async fn test_missing_directory_is_environment_outcome() {
        let (temp, config, _) = setup();
        let log = FailureLog::new(temp.path().join("fail.log"));
        let executor = TaskExecutor::new(&config, &Unused, &log);
        let task = BuildTask::new("ghost", temp.path().join("code/ghost"), BuildKind::Debian);

        let outcome = executor.execute(&task, &crate::NoOpProgressUI).await.unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.describe().contains("does not exist"));
    }
}
