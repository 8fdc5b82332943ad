//! Queue persistence with reload-modify-save mutations

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use agiros_oob_core::{BuildKind, BuildTask};
use tracing::{debug, warn};

use crate::codec::{parse_line_file, parse_meta_file, render_line_file, render_meta_file};
use crate::error::{QueueError, Result};
use crate::model::{merge, QueueState};

/// Content of an emptied metadata file
pub const EMPTY_META: &str = "{}";

/// Storage of the two queue files
pub trait QueueFiles: Send + Sync {
    /// Read the line file; a missing file reads as `None`
    fn read_lines(&self) -> std::io::Result<Option<String>>;

    /// Read the metadata file; a missing file reads as `None`
    fn read_meta(&self) -> std::io::Result<Option<String>>;

    /// Replace the line file
    fn write_lines(&self, content: &str) -> std::io::Result<()>;

    /// Replace the metadata file
    fn write_meta(&self, content: &str) -> std::io::Result<()>;

    /// Create missing files: an empty line file and `{}` metadata
    fn ensure(&self) -> std::io::Result<()> {
        if self.read_lines()?.is_none() {
            self.write_lines("")?;
        }
        if self.read_meta()?.is_none() {
            self.write_meta(EMPTY_META)?;
        }
        Ok(())
    }
}

/// Queue files on disk
#[derive(Debug, Clone)]
pub struct FsQueueFiles {
    lines: PathBuf,
    meta: PathBuf,
}

impl FsQueueFiles {
    /// Files at explicit locations
    pub fn new(lines: impl Into<PathBuf>, meta: impl Into<PathBuf>) -> Self {
        Self { lines: lines.into(), meta: meta.into() }
    }

    /// Line file path
    pub fn lines_path(&self) -> &Path {
        &self.lines
    }

    /// Metadata file path
    pub fn meta_path(&self) -> &Path {
        &self.meta
    }
}

fn read_optional(path: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write through a sibling temporary file and rename it into place
fn write_replace(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}

impl QueueFiles for FsQueueFiles {
    fn read_lines(&self) -> std::io::Result<Option<String>> {
        read_optional(&self.lines)
    }

    fn read_meta(&self) -> std::io::Result<Option<String>> {
        read_optional(&self.meta)
    }

    fn write_lines(&self, content: &str) -> std::io::Result<()> {
        write_replace(&self.lines, content)
    }

    fn write_meta(&self, content: &str) -> std::io::Result<()> {
        write_replace(&self.meta, content)
    }
}

/// Queue files held in memory
#[derive(Debug, Default)]
pub struct MemoryQueueFiles {
    lines: Mutex<Option<String>>,
    meta: Mutex<Option<String>>,
}

impl MemoryQueueFiles {
    /// Start from given file contents
    pub fn with_contents(lines: Option<&str>, meta: Option<&str>) -> Self {
        Self {
            lines: Mutex::new(lines.map(str::to_string)),
            meta: Mutex::new(meta.map(str::to_string)),
        }
    }

    /// Current line file content
    pub fn lines(&self) -> Option<String> {
        self.lines.lock().ok().and_then(|g| g.clone())
    }

    /// Current metadata content
    pub fn meta(&self) -> Option<String> {
        self.meta.lock().ok().and_then(|g| g.clone())
    }
}

fn poisoned() -> std::io::Error {
    std::io::Error::new(ErrorKind::Other, "queue file lock poisoned")
}

impl QueueFiles for MemoryQueueFiles {
    fn read_lines(&self) -> std::io::Result<Option<String>> {
        Ok(self.lines.lock().map_err(|_| poisoned())?.clone())
    }

    fn read_meta(&self) -> std::io::Result<Option<String>> {
        Ok(self.meta.lock().map_err(|_| poisoned())?.clone())
    }

    fn write_lines(&self, content: &str) -> std::io::Result<()> {
        *self.lines.lock().map_err(|_| poisoned())? = Some(content.to_string());
        Ok(())
    }

    fn write_meta(&self, content: &str) -> std::io::Result<()> {
        *self.meta.lock().map_err(|_| poisoned())? = Some(content.to_string());
        Ok(())
    }
}

/// Durable build queue
///
/// Every mutation reloads both files, applies the change and writes both
/// files back, so edits made by another invocation in between are kept.
#[derive(Debug)]
pub struct QueueStore<F: QueueFiles = FsQueueFiles> {
    files: F,
    source_root: PathBuf,
}

impl QueueStore<FsQueueFiles> {
    /// Open a queue on disk; packages without a stored path resolve under
    /// `source_root`
    pub fn open(
        queue_file: impl Into<PathBuf>,
        meta_file: impl Into<PathBuf>,
        source_root: impl Into<PathBuf>,
    ) -> Self {
        Self::with_files(FsQueueFiles::new(queue_file, meta_file), source_root)
    }
}

impl<F: QueueFiles> QueueStore<F> {
    /// Queue over arbitrary file storage
    pub fn with_files(files: F, source_root: impl Into<PathBuf>) -> Self {
        Self { files, source_root: source_root.into() }
    }

    /// Underlying file storage
    pub fn files(&self) -> &F {
        &self.files
    }

    /// Create missing queue files
    pub fn ensure_files(&self) -> Result<()> {
        self.files.ensure()?;
        Ok(())
    }

    /// Load the reconciled queue
    ///
    /// Unreadable or malformed files load as empty.
    pub fn load(&self) -> QueueState {
        let lines = self.files.read_lines().unwrap_or_else(|e| {
            warn!("Cannot read queue file, treating it as empty: {}", e);
            None
        });
        let meta = self.files.read_meta().unwrap_or_else(|e| {
            warn!("Cannot read queue metadata, treating it as empty: {}", e);
            None
        });
        merge(
            parse_line_file(lines.as_deref().unwrap_or_default()),
            parse_meta_file(meta.as_deref().unwrap_or_default()),
            &self.source_root,
        )
    }

    /// Write a queue in canonical form and return what was written
    pub fn save(&self, state: &QueueState) -> Result<QueueState> {
        let normalized = state.normalized();
        let (lines, meta) = normalized.to_files();
        let meta = render_meta_file(&meta)?;
        self.files.write_lines(&render_line_file(&lines))?;
        self.files.write_meta(&meta)?;
        debug!("Saved queue with {} packages", normalized.packages().len());
        Ok(normalized)
    }

    /// Add a task, or replace path and arguments of the task with the same
    /// package and kind; the package becomes pending
    pub fn append(&self, task: BuildTask) -> Result<QueueState> {
        let mut state = self.load();
        state.upsert(task);
        self.save(&state)
    }

    /// Remove a package and all of its tasks
    pub fn remove(&self, package: &str) -> Result<QueueState> {
        let mut state = self.load();
        if !state.remove_package(package) {
            return Err(QueueError::UnknownPackage { name: package.to_string() });
        }
        self.save(&state)
    }

    /// Set the completion flag of a package
    pub fn set_completed(&self, package: &str, completed: bool) -> Result<QueueState> {
        let mut state = self.load();
        if !state.set_completed(package, completed) {
            return Err(QueueError::UnknownPackage { name: package.to_string() });
        }
        self.save(&state)
    }

    /// Replace the extra arguments of one task
    pub fn set_extra_args(
        &self,
        package: &str,
        kind: BuildKind,
        args: Vec<String>,
    ) -> Result<QueueState> {
        let mut state = self.load();
        if !state.set_extra_args(package, kind, args) {
            return Err(QueueError::UnknownPackage { name: format!("{package} ({kind})") });
        }
        self.save(&state)
    }

    /// Empty both files without deleting them
    pub fn clear(&self) -> Result<()> {
        self.files.write_lines("")?;
        self.files.write_meta(EMPTY_META)?;
        Ok(())
    }
}
