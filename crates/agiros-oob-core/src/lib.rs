//! Core types and traits for the AGIROS out-of-band packaging tools

pub mod build;
pub mod error;
pub mod task;

pub use build::{PackageRun, RunStatus};
pub use error::{Error, Result};
pub use task::{display_name_for, BuildKind, BuildTask, QueueEntry, TaskId};
