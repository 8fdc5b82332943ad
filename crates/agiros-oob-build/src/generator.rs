//! Packaging metadata generation for a single source tree

use std::path::{Path, PathBuf};

use agiros_oob_config::Config;
use agiros_oob_core::BuildKind;
use agiros_oob_tracks::{
    GbpSync, GbpSyncOutcome, ReleaseIncDefault, TagRequest, TrackResolver, UpstreamTagComputer,
    WriteMode,
};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::diagnostics::{missing_rules, FailureLog};
use crate::error::{BuildError, Result};
use crate::fallback::{candidate_order, FallbackSearch, SearchOutcome};
use crate::process::{CommandSpec, OutputObserver, ProcessRunner};

const DEFAULT_BLOOM: &str = "bloom-generate";
const DEBIAN_SUBCOMMAND: &str = "agirosdebian";
const RPM_SUBCOMMAND: &str = "agirosrpm";

/// Failure-log target of Debian generation
pub const UBUNTU_TARGET: &str = "ubuntu";

/// Failure-log target prefix of RPM generation
pub const OPENEULER_TARGET: &str = "openeuler";

/// Base bloom command line for a kind, sub-command included
///
/// The sub-command is not appended when the base already is a
/// `generate_cmd` module invocation or already ends in a sub-command.
pub fn bloom_base(config: &Config, kind: BuildKind) -> Vec<String> {
    let configured = match kind {
        BuildKind::Debian => config.bloom_bin_debian.as_deref().unwrap_or(&config.bloom_bin),
        BuildKind::Rpm => config.bloom_bin.as_str(),
    };
    let mut base: Vec<String> = configured.split_whitespace().map(str::to_string).collect();
    if base.is_empty() {
        base.push(DEFAULT_BLOOM.to_string());
    }

    let text = base.join(" ");
    let complete = text.contains("generate_cmd")
        || text.ends_with(DEBIAN_SUBCOMMAND)
        || text.ends_with(RPM_SUBCOMMAND);
    if !complete {
        base.push(match kind {
            BuildKind::Debian => DEBIAN_SUBCOMMAND.to_string(),
            BuildKind::Rpm => RPM_SUBCOMMAND.to_string(),
        });
    }
    base
}

fn bloom_command(config: &Config, kind: BuildKind, dir: &Path, os_name: &str, os_version: &str) -> CommandSpec {
    let mut base = bloom_base(config, kind).into_iter();
    let program = base.next().unwrap_or_else(|| DEFAULT_BLOOM.to_string());
    CommandSpec::new(program, dir).args(base).args([
        "--ros-distro",
        config.ros_distro.as_str(),
        "--os-name",
        os_name,
        "--os-version",
        os_version,
    ])
}

/// Debian generation command for a source tree
pub fn debian_command(config: &Config, dir: &Path) -> CommandSpec {
    bloom_command(config, BuildKind::Debian, dir, UBUNTU_TARGET, &config.ubuntu_version)
}

/// RPM generation command for a source tree and openEuler version
pub fn rpm_command(config: &Config, dir: &Path, version: &str) -> CommandSpec {
    bloom_command(config, BuildKind::Rpm, dir, OPENEULER_TARGET, version)
}

fn read_lossy(path: &Path) -> Option<String> {
    std::fs::read(path).ok().map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Whether `debian/control` exists, declares dependencies and has no
/// `!nocheck` profile
pub fn is_valid_debian(dir: &Path) -> bool {
    match read_lossy(&dir.join("debian").join("control")) {
        Some(text) => text.contains("Depends:") && !text.contains("!nocheck"),
        None => false,
    }
}

/// `rpm/*.spec` files of a source tree, sorted
pub fn spec_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir.join("rpm")) else {
        return Vec::new();
    };
    let mut specs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "spec"))
        .collect();
    specs.sort();
    specs
}

/// Whether at least one spec file exists and none has a `!nocheck` profile
pub fn is_valid_spec(dir: &Path) -> bool {
    let specs = spec_files(dir);
    !specs.is_empty()
        && specs
            .iter()
            .all(|spec| read_lossy(spec).is_some_and(|text| !text.contains("!nocheck")))
}

/// Directories below `dir` holding a `package.xml`, or `dir` itself when
/// there is none
pub fn find_subpackages(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == "package.xml")
        .filter_map(|e| e.path().parent().map(Path::to_path_buf))
        .collect();
    found.sort();
    found.dedup();
    if found.is_empty() {
        found.push(dir.to_path_buf());
    }
    found
}

/// First path component of `dir` below `code_dir`, the release directory key
pub fn tracks_key(config: &Config, dir: &Path) -> Option<String> {
    dir.strip_prefix(&config.code_dir)
        .ok()?
        .components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
}

/// gbp.conf sync with the configured distros, release directory and a write
/// mode
pub fn gbp_sync(config: &Config, mode: WriteMode, inc: ReleaseIncDefault) -> GbpSync {
    GbpSync::new(
        TrackResolver::new(config.tracks_distro.clone()),
        UpstreamTagComputer::new(config.tag_distro.clone()),
    )
    .with_tracks_root(Some(config.release_dir.clone()))
    .with_mode(mode)
    .with_release_inc(inc)
}

/// Overwrite `debian/gbp.conf` of a source tree from its track descriptor
///
/// A missing descriptor or section yields `Ok(None)` after a warning.
pub fn sync_gbp_conf(config: &Config, dir: &Path) -> Result<Option<GbpSyncOutcome>> {
    if config.dry_run {
        info!("[DRY] sync {}/debian/gbp.conf", dir.display());
        return Ok(None);
    }
    let request = TagRequest::new(dir).with_tracks_key(tracks_key(config, dir));
    match gbp_sync(config, WriteMode::Overwrite, ReleaseIncDefault::ConfigSync).sync(&request) {
        Ok(outcome) => Ok(Some(outcome)),
        Err(e) if e.is_skippable() => {
            warn!("Skipping gbp.conf sync for {}: {}", dir.display(), e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Runs bloom for one source tree
pub struct BloomGenerator<'a> {
    config: &'a Config,
    runner: &'a dyn ProcessRunner,
    failure_log: &'a FailureLog,
}

impl<'a> BloomGenerator<'a> {
    /// Create a generator
    pub fn new(config: &'a Config, runner: &'a dyn ProcessRunner, failure_log: &'a FailureLog) -> Self {
        Self { config, runner, failure_log }
    }

    fn require_dir(dir: &Path) -> Result<()> {
        if dir.is_dir() {
            Ok(())
        } else {
            Err(BuildError::environment(format!("package directory {} does not exist", dir.display())))
        }
    }

    /// Generate `debian/`; on success with `generate_gbp` also sync gbp.conf
    ///
    /// Returns whether generation succeeded. Failures are appended to the
    /// failure log under `label`.
    pub async fn generate_debian(
        &self,
        label: &str,
        dir: &Path,
        observer: &dyn OutputObserver,
    ) -> Result<bool> {
        Self::require_dir(dir)?;
        let spec = debian_command(self.config, dir);
        let invocation = self.runner.invoke(&spec, observer).await?;
        if !invocation.succeeded() {
            let rules = missing_rules(
                invocation.captured.as_deref().unwrap_or_default(),
                &self.config.missing_rule_marker,
            );
            warn!("{}: debian generation failed with rc={}", label, invocation.exit_code);
            self.failure_log.note_failure(label, UBUNTU_TARGET, invocation.exit_code, &rules);
            return Ok(false);
        }

        info!("{}: generated debian/", label);
        if self.config.generate_gbp {
            self.sync_gbp(dir)?;
        }
        Ok(true)
    }

    /// Generate `rpm/` trying the default openEuler version, then fallbacks
    pub async fn generate_rpm(
        &self,
        label: &str,
        dir: &Path,
        observer: &dyn OutputObserver,
    ) -> Result<SearchOutcome> {
        Self::require_dir(dir)?;
        let candidates =
            candidate_order(&self.config.openeuler_default, &self.config.openeuler_fallback);
        debug!("{}: openEuler candidates {:?}", label, candidates);

        let outcome = FallbackSearch::new(self.runner, &self.config.missing_rule_marker)
            .with_failure_log(self.failure_log)
            .run(label, OPENEULER_TARGET, &candidates, observer, |version| {
                rpm_command(self.config, dir, version)
            })
            .await?;
        match outcome.candidate() {
            Some(version) => info!("{}: generated rpm/ ({}:{})", label, OPENEULER_TARGET, version),
            None => warn!("{}: every openEuler version failed", label),
        }
        Ok(outcome)
    }

    /// Sync gbp.conf of a tree that has `debian/`
    pub fn sync_gbp(&self, dir: &Path) -> Result<Option<GbpSyncOutcome>> {
        sync_gbp_conf(self.config, dir)
    }
}
