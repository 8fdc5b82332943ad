//! Failure log and per-attempt diagnostics

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;
use crate::process::Invocation;

/// Outcome of one failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptDiagnostic {
    /// Candidate value tried, such as an OS version
    pub candidate: String,
    /// Exit code of the attempt
    pub exit_code: i32,
    /// Output lines reporting a missing dependency rule
    pub missing_rules: Vec<String>,
}

impl AttemptDiagnostic {
    /// Build a diagnostic from a failed invocation
    pub fn from_invocation(
        candidate: impl Into<String>,
        invocation: &Invocation,
        marker: &str,
    ) -> Self {
        Self {
            candidate: candidate.into(),
            exit_code: invocation.exit_code,
            missing_rules: missing_rules(invocation.captured.as_deref().unwrap_or_default(), marker),
        }
    }
}

/// Lines containing the missing-rule marker, trimmed
pub fn missing_rules(lines: &[String], marker: &str) -> Vec<String> {
    if marker.is_empty() {
        return Vec::new();
    }
    lines.iter().filter(|l| l.contains(marker)).map(|l| l.trim().to_string()).collect()
}

/// Append-only failure log
#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    /// Log at `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a failed attempt and its missing-rule lines
    pub fn record_failure(
        &self,
        package: &str,
        target: &str,
        exit_code: i32,
        missing_rules: &[String],
    ) -> Result<()> {
        let mut lines = vec![format!("{package} {target} failed rc={exit_code}")];
        lines.extend(missing_rules.iter().map(|rule| format!("missing rule: {rule}")));
        self.append(&lines)
    }

    /// Record an environment error
    pub fn record_error(&self, package: &str, target: &str, message: &str) -> Result<()> {
        self.append(&[format!("{package} {target} error: {message}")])
    }

    /// Record a failure, logging instead of failing when the log is unwritable
    pub fn note_failure(&self, package: &str, target: &str, exit_code: i32, rules: &[String]) {
        if let Err(e) = self.record_failure(package, target, exit_code, rules) {
            warn!("Cannot write failure log {}: {}", self.path.display(), e);
        }
    }

    /// Record an error, logging instead of failing when the log is unwritable
    pub fn note_error(&self, package: &str, target: &str, message: &str) {
        if let Err(e) = self.record_error(package, target, message) {
            warn!("Cannot write failure log {}: {}", self.path.display(), e);
        }
    }

    fn append(&self, lines: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        for line in lines {
            writeln!(file, "{line}")?;
        }
        debug!("Appended {} line(s) to {}", lines.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_rules() {
        let lines = vec![
            "resolving".to_string(),
            "  No agirosdep rule for 'python3-foo'  ".to_string(),
        ];
        assert_eq!(
            missing_rules(&lines, "No agirosdep rule for"),
            vec!["No agirosdep rule for 'python3-foo'"]
        );
        assert!(missing_rules(&lines, "").is_empty());
    }

    #[test]
    fn test_failure_log_appends() {
        let temp = TempDir::new().unwrap();
        let log = FailureLog::new(temp.path().join("logs").join("fail.log"));
        std::fs::create_dir_all(temp.path().join("logs")).unwrap();
        std::fs::write(log.path(), "earlier line\n").unwrap();

        log.record_failure("nav2", "openeuler:24", 1, &["No agirosdep rule for 'x'".to_string()])
            .unwrap();
        log.record_error("nav2", "rpm", "no rpm/*.spec").unwrap();

        assert_eq!(
            std::fs::read_to_string(log.path()).unwrap(),
            "earlier line\n\
             nav2 openeuler:24 failed rc=1\n\
             missing rule: No agirosdep rule for 'x'\n\
             nav2 rpm error: no rpm/*.spec\n"
        );
    }

    #[test]
    fn test_diagnostic_from_invocation() {
        let invocation =
            Invocation::failure(2, vec!["No agirosdep rule for 'bar'".to_string(), "x".into()]);
        let diag = AttemptDiagnostic::from_invocation("22", &invocation, "No agirosdep rule for");
        assert_eq!(diag.candidate, "22");
        assert_eq!(diag.exit_code, 2);
        assert_eq!(diag.missing_rules.len(), 1);
    }
}
