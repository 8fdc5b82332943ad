//! Ordered search over target versions

use tracing::{info, warn};

use crate::diagnostics::{AttemptDiagnostic, FailureLog};
use crate::error::Result;
use crate::process::{CommandSpec, OutputObserver, ProcessRunner};

/// Candidates in try order: the primary first, then the fallbacks without
/// the primary and without repeats
pub fn candidate_order(primary: &str, fallback: &[String]) -> Vec<String> {
    let mut order = vec![primary.to_string()];
    for candidate in fallback {
        if !order.contains(candidate) {
            order.push(candidate.clone());
        }
    }
    order
}

/// Result of a fallback search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A candidate exited zero; earlier candidates failed
    Found { candidate: String, attempts: Vec<AttemptDiagnostic> },
    /// Every candidate failed
    Exhausted { attempts: Vec<AttemptDiagnostic> },
}

impl SearchOutcome {
    /// Whether a candidate succeeded
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    /// The successful candidate
    pub fn candidate(&self) -> Option<&str> {
        match self {
            Self::Found { candidate, .. } => Some(candidate),
            Self::Exhausted { .. } => None,
        }
    }

    /// Diagnostics of the failed attempts
    pub fn attempts(&self) -> &[AttemptDiagnostic] {
        match self {
            Self::Found { attempts, .. } | Self::Exhausted { attempts } => attempts,
        }
    }
}

/// Runs one command per candidate until one succeeds
pub struct FallbackSearch<'a> {
    runner: &'a dyn ProcessRunner,
    marker: &'a str,
    failure_log: Option<&'a FailureLog>,
}

impl<'a> FallbackSearch<'a> {
    /// Search with `runner`, collecting lines that contain `missing_rule_marker`
    pub fn new(runner: &'a dyn ProcessRunner, missing_rule_marker: &'a str) -> Self {
        Self { runner, marker: missing_rule_marker, failure_log: None }
    }

    /// Append every failed attempt to `log`
    pub fn with_failure_log(mut self, log: &'a FailureLog) -> Self {
        self.failure_log = Some(log);
        self
    }

    /// Try `candidates` in order
    ///
    /// Failed attempts are logged with the target label
    /// `<target_prefix>:<candidate>`. Start failures end the search with an
    /// error since no other candidate can succeed either.
    pub async fn run<F>(
        &self,
        package: &str,
        target_prefix: &str,
        candidates: &[String],
        observer: &dyn OutputObserver,
        command_for: F,
    ) -> Result<SearchOutcome>
    where
        F: Fn(&str) -> CommandSpec + Send + Sync,
    {
        let mut attempts = Vec::new();
        for candidate in candidates {
            let spec = command_for(candidate);
            let invocation = self.runner.invoke(&spec, observer).await?;
            if invocation.succeeded() {
                info!("{} succeeded for {}:{}", package, target_prefix, candidate);
                return Ok(SearchOutcome::Found { candidate: candidate.clone(), attempts });
            }

            let diagnostic = AttemptDiagnostic::from_invocation(candidate, &invocation, self.marker);
            warn!(
                "{} failed for {}:{} with rc={} ({} missing rule(s))",
                package,
                target_prefix,
                candidate,
                diagnostic.exit_code,
                diagnostic.missing_rules.len()
            );
            if let Some(log) = self.failure_log {
                log.note_failure(
                    package,
                    &format!("{target_prefix}:{candidate}"),
                    diagnostic.exit_code,
                    &diagnostic.missing_rules,
                );
            }
            attempts.push(diagnostic);
        }
        Ok(SearchOutcome::Exhausted { attempts })
    }
}
