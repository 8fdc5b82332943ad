//! In-memory queue model and the reconciliation of both queue files

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use agiros_oob_core::{BuildKind, BuildTask, QueueEntry, TaskId};

use crate::codec::{LineEntry, LineFile, MetaFile};

/// Reconciled queue: package order, completion flags and tasks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueState {
    packages: Vec<String>,
    completed: BTreeMap<String, bool>,
    tasks: Vec<BuildTask>,
}

/// Merge a parsed line file and metadata file into a queue
///
/// The line file decides which packages exist, their order and their
/// completion; metadata decides paths and extra arguments. Legacy metadata
/// from the line file is folded into `meta` first. A package without task
/// metadata gets one Debian task rooted at `source_root/<package>`.
/// Metadata of packages missing from the line file is ignored.
pub fn merge(lines: LineFile, mut meta: MetaFile, source_root: &Path) -> QueueState {
    meta.absorb(lines.legacy);

    let mut state = QueueState::default();
    for LineEntry { name, completed } in lines.entries {
        let info = meta.get(&name);
        let path = info
            .and_then(|i| i.path.as_deref())
            .map(PathBuf::from)
            .unwrap_or_else(|| source_root.join(&name));

        match info.map(|i| i.kinds.as_slice()) {
            Some(kinds) if !kinds.is_empty() => {
                for (kind, args) in kinds {
                    state.tasks.push(
                        BuildTask::new(name.clone(), path.clone(), *kind).with_args(args.clone()),
                    );
                }
            }
            _ => state.tasks.push(BuildTask::new(name.clone(), path, BuildKind::Debian)),
        }

        state.completed.insert(name.clone(), completed);
        state.packages.push(name);
    }
    state
}

impl QueueState {
    /// Package names in queue order
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// All tasks
    pub fn tasks(&self) -> &[BuildTask] {
        &self.tasks
    }

    /// Whether the queue holds no package
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Whether a package is marked completed
    pub fn is_completed(&self, package: &str) -> bool {
        self.completed.get(package).copied().unwrap_or(false)
    }

    /// Whether a package is in the queue
    pub fn contains(&self, package: &str) -> bool {
        self.packages.iter().any(|p| p == package)
    }

    /// Tasks of a package in stored order
    pub fn tasks_for(&self, package: &str) -> Vec<BuildTask> {
        self.tasks.iter().filter(|t| t.display_name == package).cloned().collect()
    }

    /// Packages not yet completed, in queue order
    pub fn pending(&self) -> Vec<String> {
        self.packages.iter().filter(|p| !self.is_completed(p)).cloned().collect()
    }

    /// Queue entries in order
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.packages
            .iter()
            .map(|name| QueueEntry {
                name: name.clone(),
                completed: self.is_completed(name),
                tasks: self.tasks_for(name),
            })
            .collect()
    }

    /// Add or replace a task and mark its package pending
    pub fn upsert(&mut self, task: BuildTask) {
        match self.tasks.iter_mut().find(|t| t.matches(&task.display_name, task.kind)) {
            Some(existing) => {
                existing.path = task.path.clone();
                existing.extra_args = task.extra_args.clone();
            }
            None => self.tasks.push(task.clone()),
        }
        if !self.contains(&task.display_name) {
            self.packages.push(task.display_name.clone());
        }
        self.completed.insert(task.display_name, false);
    }

    /// Remove a package and all of its tasks
    pub fn remove_package(&mut self, package: &str) -> bool {
        let before = self.packages.len();
        self.packages.retain(|p| p != package);
        self.tasks.retain(|t| t.display_name != package);
        self.completed.remove(package);
        self.packages.len() != before
    }

    /// Set the completion flag of a package
    pub fn set_completed(&mut self, package: &str, completed: bool) -> bool {
        if !self.contains(package) {
            return false;
        }
        self.completed.insert(package.to_string(), completed);
        true
    }

    /// Replace the extra arguments of one task
    pub fn set_extra_args(&mut self, package: &str, kind: BuildKind, args: Vec<String>) -> bool {
        match self.tasks.iter_mut().find(|t| t.matches(package, kind)) {
            Some(task) => {
                task.extra_args = args;
                true
            }
            None => false,
        }
    }

    /// Canonical form written to disk
    ///
    /// Tasks are deduplicated by identity, keeping the first position and
    /// the last values. Package order becomes the first-seen order of the
    /// tasks' packages, so packages left without tasks disappear.
    pub fn normalized(&self) -> QueueState {
        let mut tasks: Vec<BuildTask> = Vec::with_capacity(self.tasks.len());
        let mut index: BTreeMap<TaskId, usize> = BTreeMap::new();
        for task in &self.tasks {
            match index.get(&task.id()) {
                Some(&i) => tasks[i] = task.clone(),
                None => {
                    index.insert(task.id(), tasks.len());
                    tasks.push(task.clone());
                }
            }
        }

        let mut packages: Vec<String> = Vec::new();
        for task in &tasks {
            if !packages.contains(&task.display_name) {
                packages.push(task.display_name.clone());
            }
        }
        let completed = packages.iter().map(|p| (p.clone(), self.is_completed(p))).collect();

        QueueState { packages, completed, tasks }
    }

    /// Split into the line file entries and metadata to persist
    ///
    /// Tasks of one package share a single stored path, the last one wins.
    pub fn to_files(&self) -> (Vec<LineEntry>, MetaFile) {
        let lines = self
            .packages
            .iter()
            .map(|name| LineEntry { name: name.clone(), completed: self.is_completed(name) })
            .collect();

        let mut meta = MetaFile::default();
        for name in &self.packages {
            meta.entry(name);
        }
        for task in &self.tasks {
            let entry = meta.entry(&task.display_name);
            entry.path = Some(task.path.to_string_lossy().into_owned());
            entry.set_kind(task.kind, task.extra_args.clone());
        }
        (lines, meta)
    }
}
