//! Build execution for agiros-oob
//!
//! This crate runs the external packaging tools: bloom generation with
//! target-version fallback, gbp and rpmbuild builds of queued tasks, and
//! batch passes over the build queue with durable progress.

pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod generator;
pub mod orchestrator;
pub mod process;
pub mod progress_ui;
pub mod release;

pub use diagnostics::{missing_rules, AttemptDiagnostic, FailureLog};
pub use error::{BuildError, Result};
pub use executor::{TaskExecutor, TaskOutcome};
pub use fallback::{candidate_order, FallbackSearch, SearchOutcome};
pub use generator::{
    bloom_base, debian_command, find_subpackages, gbp_sync, is_valid_debian, is_valid_spec,
    rpm_command, spec_files, sync_gbp_conf, tracks_key, BloomGenerator,
};
pub use orchestrator::{AlwaysContinue, BatchOrchestrator, BatchReport, ContinueDecider, StopOnFailure};
pub use process::{
    CommandSpec, Invocation, LineHook, OutputObserver, ProcessRunner, PromptResponder, SystemRunner,
};
pub use progress_ui::{IndicatifProgressUI, NoOpProgressUI, ProgressUI};
pub use release::{
    scan_release_dir, ActionTargets, GenerateMode, GenerateOptions, GenerationSummary,
    ReleaseGenerator, ReleasePackage,
};
