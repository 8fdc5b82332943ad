//! Batch generation of packaging metadata from a release directory

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use agiros_oob_config::Config;
use agiros_oob_core::{display_name_for, BuildKind, BuildTask};
use agiros_oob_queue::{FsQueueFiles, QueueFiles, QueueStore};
use agiros_oob_tracks::{tracks_in_dir, TrackDescriptor};
use tracing::{debug, info, warn};

use crate::diagnostics::FailureLog;
use crate::error::{BuildError, Result};
use crate::generator::{find_subpackages, is_valid_debian, is_valid_spec, BloomGenerator};
use crate::process::ProcessRunner;
use crate::progress_ui::ProgressUI;

/// What to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateMode {
    /// `debian/` only
    Debian,
    /// `rpm/*.spec` only
    Spec,
    /// Both trees
    Both,
    /// Only `debian/gbp.conf` of trees that already have `debian/`
    Gbp,
}

impl GenerateMode {
    /// Mode name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debian => "debian",
            Self::Spec => "spec",
            Self::Both => "both",
            Self::Gbp => "gbp",
        }
    }

    /// Whether Debian-side work is done
    pub fn wants_debian(&self) -> bool {
        !matches!(self, Self::Spec)
    }

    /// Whether RPM generation is done
    pub fn wants_rpm(&self) -> bool {
        matches!(self, Self::Spec | Self::Both)
    }
}

impl fmt::Display for GenerateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerateMode {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debian" | "deb" => Ok(Self::Debian),
            "spec" | "rpm" => Ok(Self::Spec),
            "both" => Ok(Self::Both),
            "gbp" => Ok(Self::Gbp),
            other => Err(BuildError::config(format!("unknown generate mode: {other}"))),
        }
    }
}

/// Targets requested by a package's bloom actions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionTargets {
    /// An action targets Ubuntu
    pub ubuntu: bool,
    /// An action targets openEuler or RHEL
    pub openeuler: bool,
}

impl ActionTargets {
    /// Inspect action command lines
    pub fn from_actions(actions: &[String]) -> Self {
        Self {
            ubuntu: actions.iter().any(|a| a.contains("--os-name ubuntu")),
            openeuler: actions
                .iter()
                .any(|a| a.contains("--os-name openeuler") || a.contains("--os-name rhel")),
        }
    }

    /// Whether any target was found
    pub fn any(&self) -> bool {
        self.ubuntu || self.openeuler
    }
}

/// A release directory entry with a track descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePackage {
    /// Directory name, also the source directory name under `code_dir`
    pub name: String,
    /// Descriptor file
    pub tracks_file: PathBuf,
}

/// Child directories of `release_dir` holding a descriptor, sorted by name
pub fn scan_release_dir(release_dir: &Path) -> Result<Vec<ReleasePackage>> {
    let entries = std::fs::read_dir(release_dir).map_err(|e| {
        BuildError::environment(format!("cannot read release directory {}: {e}", release_dir.display()))
    })?;
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    Ok(dirs
        .into_iter()
        .filter_map(|dir| {
            let tracks_file = tracks_in_dir(&dir)?;
            let name = dir.file_name()?.to_string_lossy().into_owned();
            Some(ReleasePackage { name, tracks_file })
        })
        .collect())
}

/// Options of a generation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// What to generate
    pub mode: GenerateMode,
    /// Process at most this many release entries
    pub limit: Option<usize>,
    /// Add a queue task for every generated tree
    pub enqueue: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self { mode: GenerateMode::Debian, limit: None, enqueue: false }
    }
}

/// Counts of a generation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    /// Successful generations, one per tree and kind
    pub generated: usize,
    /// gbp.conf files written
    pub gbp_synced: usize,
    /// Queue tasks added
    pub enqueued: usize,
    /// Release entries or trees skipped, with the reason
    pub skipped: Vec<(String, String)>,
    /// Trees with a failed generation
    pub failed: Vec<String>,
}

/// Generates `debian/` and `rpm/` trees for the packages of a release
/// directory
pub struct ReleaseGenerator<'a, F: QueueFiles = FsQueueFiles> {
    config: &'a Config,
    bloom: BloomGenerator<'a>,
    queue: Option<&'a QueueStore<F>>,
    ui: &'a dyn ProgressUI,
    failure_log: &'a FailureLog,
}

impl<'a, F: QueueFiles> ReleaseGenerator<'a, F> {
    /// Create a generator
    pub fn new(
        config: &'a Config,
        runner: &'a dyn ProcessRunner,
        failure_log: &'a FailureLog,
        ui: &'a dyn ProgressUI,
    ) -> Self {
        Self {
            config,
            bloom: BloomGenerator::new(config, runner, failure_log),
            queue: None,
            ui,
            failure_log,
        }
    }

    /// Queue receiving tasks for generated trees
    pub fn with_queue(mut self, queue: &'a QueueStore<F>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Process the release directory
    pub async fn run(&self, options: GenerateOptions) -> Result<GenerationSummary> {
        let mut packages = scan_release_dir(&self.config.release_dir)?;
        info!(
            "Found {} release entries with a track descriptor in {}",
            packages.len(),
            self.config.release_dir.display()
        );
        if let Some(limit) = options.limit.filter(|l| *l > 0) {
            packages.truncate(limit);
        }

        let mut summary = GenerationSummary::default();
        self.ui.batch_started(packages.len());
        for package in &packages {
            match self.targets_for(package) {
                Ok(targets) => {
                    self.ui.package_started(&package.name);
                    let failures = summary.failed.len();
                    let dir = self.config.code_dir.join(&package.name);
                    self.process_package(&dir, targets, options, &mut summary).await?;
                    let error = (summary.failed.len() > failures).then_some("generation failed");
                    self.ui.package_finished(&package.name, error);
                }
                Err(reason) => {
                    self.ui.package_skipped(&package.name, &reason);
                    summary.skipped.push((package.name.clone(), reason));
                }
            }
        }
        self.ui.finish();

        info!(
            "Generation finished: {} generated, {} gbp.conf synced, {} failed",
            summary.generated,
            summary.gbp_synced,
            summary.failed.len()
        );
        info!("Failures are recorded in {}", self.failure_log.path().display());
        Ok(summary)
    }

    /// Generate for one source directory regardless of track descriptors
    pub async fn run_single(&self, dir: &Path, options: GenerateOptions) -> Result<GenerationSummary> {
        if !dir.is_dir() {
            return Err(BuildError::environment(format!(
                "package directory {} does not exist",
                dir.display()
            )));
        }
        let mut summary = GenerationSummary::default();
        let targets = ActionTargets { ubuntu: true, openeuler: true };
        self.process_package(dir, targets, options, &mut summary).await?;
        Ok(summary)
    }

    /// Targets of a release entry, or why it is skipped
    fn targets_for(&self, package: &ReleasePackage) -> std::result::Result<ActionTargets, String> {
        let descriptor = TrackDescriptor::load(&package.tracks_file)
            .map_err(|e| format!("unreadable descriptor: {e}"))?;
        let section = descriptor
            .section(&self.config.tracks_distro)
            .ok_or_else(|| format!("no {} section", self.config.tracks_distro))?;
        let actions = section.actions();
        if actions.is_empty() {
            return Err(format!("{}.actions is empty", section.key()));
        }
        let targets = ActionTargets::from_actions(&actions);
        if !targets.any() {
            return Err("no ubuntu or openeuler actions".to_string());
        }
        let dir = self.config.code_dir.join(&package.name);
        if !dir.is_dir() {
            return Err(format!("{} does not exist", dir.display()));
        }
        Ok(targets)
    }

    async fn process_package(
        &self,
        dir: &Path,
        targets: ActionTargets,
        options: GenerateOptions,
        summary: &mut GenerationSummary,
    ) -> Result<()> {
        for subpackage in find_subpackages(dir) {
            let label = display_name_for(&subpackage, &self.config.code_dir);
            debug!("Processing {}", label);
            if let Err(e) = self.process_tree(&label, &subpackage, targets, options, summary).await {
                if matches!(e, BuildError::Queue(_)) {
                    return Err(e);
                }
                warn!("{}: {}", label, e);
                self.failure_log.note_error(&label, options.mode.as_str(), &e.to_string());
                summary.failed.push(label);
            }
        }
        Ok(())
    }

    async fn process_tree(
        &self,
        label: &str,
        dir: &Path,
        targets: ActionTargets,
        options: GenerateOptions,
        summary: &mut GenerationSummary,
    ) -> Result<()> {
        if options.mode == GenerateMode::Gbp {
            if !targets.ubuntu {
                return Ok(());
            }
            if !dir.join("debian").is_dir() {
                summary.skipped.push((label.to_string(), "no debian/ directory".to_string()));
                return Ok(());
            }
            if self.bloom.sync_gbp(dir)?.is_some() {
                summary.gbp_synced += 1;
            }
            return Ok(());
        }

        let mut need_debian = targets.ubuntu && options.mode.wants_debian();
        let mut need_rpm = targets.openeuler && options.mode.wants_rpm();
        if need_debian && is_valid_debian(dir) {
            info!("[RESUME] {}: valid debian/ present, skipping", label);
            need_debian = false;
        }
        if need_rpm && is_valid_spec(dir) {
            info!("[RESUME] {}: valid rpm spec present, skipping", label);
            need_rpm = false;
        }

        let mut failed = false;
        if need_debian {
            if self.bloom.generate_debian(label, dir, self.ui.observer()).await? {
                summary.generated += 1;
                self.enqueue(label, dir, BuildKind::Debian, options, summary)?;
            } else {
                failed = true;
            }
        }
        if need_rpm {
            if self.bloom.generate_rpm(label, dir, self.ui.observer()).await?.succeeded() {
                summary.generated += 1;
                self.enqueue(label, dir, BuildKind::Rpm, options, summary)?;
            } else {
                failed = true;
            }
        }
        if failed {
            summary.failed.push(label.to_string());
        }
        Ok(())
    }

    fn enqueue(
        &self,
        label: &str,
        dir: &Path,
        kind: BuildKind,
        options: GenerateOptions,
        summary: &mut GenerationSummary,
    ) -> Result<()> {
        let Some(queue) = self.queue.filter(|_| options.enqueue) else {
            return Ok(());
        };
        if self.config.dry_run {
            info!("[DRY] enqueue {} ({})", label, kind);
            return Ok(());
        }
        queue.append(BuildTask::new(label, dir, kind))?;
        summary.enqueued += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_mode_parsing_and_gating() {
        assert_eq!("spec".parse::<GenerateMode>().unwrap(), GenerateMode::Spec);
        assert_eq!("BOTH".parse::<GenerateMode>().unwrap(), GenerateMode::Both);
        assert!("msi".parse::<GenerateMode>().is_err());
        assert!(GenerateMode::Gbp.wants_debian());
        assert!(!GenerateMode::Gbp.wants_rpm());
        assert!(!GenerateMode::Spec.wants_debian());
    }

    #[test]
    fn test_action_targets() {
        let targets = ActionTargets::from_actions(&[
            "bloom-generate agirosrpm --os-name rhel --os-version 9".to_string(),
        ]);
        assert_eq!(targets, ActionTargets { ubuntu: false, openeuler: true });
        assert!(!ActionTargets::from_actions(&["echo hi".to_string()]).any());
    }

    #[test]
    fn test_scan_release_dir() {
        let temp = TempDir::new().unwrap();
        for (name, file) in [("b_pkg", "tracks.yaml"), ("a_pkg", "track.yaml"), ("c_pkg", "README")] {
            let dir = temp.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(file), "").unwrap();
        }
        std::fs::write(temp.path().join("stray.yaml"), "").unwrap();

        let found = scan_release_dir(temp.path()).unwrap();
        let names: Vec<_> = found.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a_pkg", "b_pkg"]);
        assert!(found[0].tracks_file.ends_with("track.yaml"));
        assert!(scan_release_dir(&temp.path().join("missing")).is_err());
    }
}
