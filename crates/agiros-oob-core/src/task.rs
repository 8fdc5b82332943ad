//! Build tasks and queue entries

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kind of artifact a task produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildKind {
    /// Debian package via gbp
    Debian,
    /// RPM package via rpmbuild
    Rpm,
}

impl BuildKind {
    /// Name used in the queue metadata file
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debian => "debian",
            Self::Rpm => "rpm",
        }
    }
}

impl fmt::Display for BuildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debian" | "deb" => Ok(Self::Debian),
            "rpm" | "spec" => Ok(Self::Rpm),
            other => Err(Error::UnknownKind { kind: other.to_string() }),
        }
    }
}

/// Identity of a task inside a queue
pub type TaskId = (String, BuildKind);

/// One unit of build work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTask {
    /// Package name as shown in the queue
    pub display_name: String,

    /// Source directory the build runs in
    pub path: PathBuf,

    /// Artifact kind
    pub kind: BuildKind,

    /// Extra arguments appended to the build command
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl BuildTask {
    /// Create a task without extra arguments
    pub fn new(display_name: impl Into<String>, path: impl Into<PathBuf>, kind: BuildKind) -> Self {
        Self { display_name: display_name.into(), path: path.into(), kind, extra_args: Vec::new() }
    }

    /// Set extra arguments
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Queue identity key
    pub fn id(&self) -> TaskId {
        (self.display_name.clone(), self.kind)
    }

    /// Whether this task has the given identity
    pub fn matches(&self, display_name: &str, kind: BuildKind) -> bool {
        self.display_name == display_name && self.kind == kind
    }
}

/// A package in the queue together with its tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Package name
    pub name: String,

    /// Whether all tasks finished successfully in a previous pass
    pub completed: bool,

    /// Tasks in execution order
    pub tasks: Vec<BuildTask>,
}

impl QueueEntry {
    /// Kinds of the tasks in execution order
    pub fn kinds(&self) -> Vec<BuildKind> {
        self.tasks.iter().map(|t| t.kind).collect()
    }
}

/// Queue display name for a source directory
///
/// Paths under `code_dir` are shown relative to it, everything else by its
/// full path.
pub fn display_name_for(path: &Path, code_dir: &Path) -> String {
    match path.strip_prefix(code_dir) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().into_owned(),
        _ => path.to_string_lossy().into_owned(),
    }
}
