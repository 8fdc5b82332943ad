//! Upstream tag computation and `debian/gbp.conf` writing

use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use crate::error::{Result, TracksError};
use crate::locate::locate_tracks;
use crate::manifest::read_manifest;
use crate::resolver::{ReleaseIncDefault, TrackResolution, TrackResolver};

/// Section header of gbp.conf
pub const GBP_SECTION: &str = "[git-buildpackage]";

/// Distro used when neither an override nor the configuration names one
pub const UNKNOWN_DISTRO: &str = "unknown";

/// Version used when neither package.xml nor the descriptor names one
pub const FALLBACK_VERSION: &str = "0.0.0";

/// Format an upstream tag
pub fn compute_tag(distro: &str, package: &str, version: &str, release_inc: &str) -> String {
    format!("release/{distro}/{package}/{version}-{release_inc}")
}

/// Render `{var}` / `:{var}` placeholders of a tag pattern
///
/// Known names are `version`, `release_inc`, `distro`, `package` and `pkg`.
/// A pattern that uses any other name is returned unchanged.
pub fn render_tag(
    pattern: &str,
    distro: &str,
    package: &str,
    version: &str,
    release_inc: &str,
) -> String {
    let Ok(re) = Regex::new(r":?\{(\w+)\}") else {
        return pattern.to_string();
    };
    let lookup = |name: &str| match name {
        "version" => Some(version),
        "release_inc" => Some(release_inc),
        "distro" => Some(distro),
        "package" | "pkg" => Some(package),
        _ => None,
    };

    if re.captures_iter(pattern).any(|cap| lookup(&cap[1]).is_none()) {
        return pattern.to_string();
    }
    re.replace_all(pattern, |cap: &Captures| lookup(&cap[1]).unwrap_or_default().to_string())
        .into_owned()
}

/// Replace `key=value` in INI-like content, appending the key when missing
///
/// Every other line is preserved; the result always ends with a newline.
pub fn set_conf_key(content: &str, key: &str, value: &str) -> String {
    let mut found = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            let is_key = line
                .split_once('=')
                .map(|(k, _)| k.trim() == key)
                .unwrap_or(false);
            if is_key {
                found = true;
                format!("{key}={value}")
            } else {
                line.to_string()
            }
        })
        .collect();
    if !found {
        lines.push(format!("{key}={value}"));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn has_conf_key(content: &str, key: &str) -> bool {
    content
        .lines()
        .any(|line| line.split_once('=').map(|(k, _)| k.trim() == key).unwrap_or(false))
}

/// Inputs naming the package a tag is computed for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRequest {
    /// Source tree, where package.xml is read and debian/ is written
    pub source_dir: PathBuf,

    /// Distro override
    pub distro: Option<String>,

    /// Package name override
    pub package: Option<String>,

    /// Release-dir key of the tracks file, defaults to the directory name
    pub tracks_key: Option<String>,
}

impl TagRequest {
    /// Request for a source tree without overrides
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self { source_dir: source_dir.into(), distro: None, package: None, tracks_key: None }
    }

    /// Override the distro
    pub fn with_distro(mut self, distro: Option<String>) -> Self {
        self.distro = distro;
        self
    }

    /// Override the package name
    pub fn with_package(mut self, package: Option<String>) -> Self {
        self.package = package;
        self
    }

    /// Override the release-dir key
    pub fn with_tracks_key(mut self, key: Option<String>) -> Self {
        self.tracks_key = key;
        self
    }

    fn dir_name(&self) -> String {
        self.source_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Computes `release/{distro}/{package}/{version}-{release_inc}` tags
#[derive(Debug, Clone, Default)]
pub struct UpstreamTagComputer {
    configured_distro: Option<String>,
}

impl UpstreamTagComputer {
    /// Create a computer; `configured_distro` is used when a request has no
    /// distro override
    pub fn new(configured_distro: Option<String>) -> Self {
        Self { configured_distro }
    }

    /// Distro used for a request
    pub fn distro(&self, request: &TagRequest) -> String {
        [request.distro.as_deref(), self.configured_distro.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|d| !d.is_empty())
            .unwrap_or(UNKNOWN_DISTRO)
            .to_string()
    }

    /// Package name used for a request
    pub fn package(&self, request: &TagRequest) -> String {
        request
            .package
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| request.dir_name())
    }

    /// Version used for a request: package.xml, then the descriptor
    pub fn version(&self, request: &TagRequest, resolution: &TrackResolution) -> String {
        read_manifest(&request.source_dir)
            .and_then(|m| m.version)
            .or_else(|| resolution.track_version.clone())
            .unwrap_or_else(|| FALLBACK_VERSION.to_string())
    }

    /// Compute the upstream tag
    pub fn compute(&self, request: &TagRequest, resolution: &TrackResolution) -> String {
        compute_tag(
            &self.distro(request),
            &self.package(request),
            &self.version(request, resolution),
            &resolution.release_inc,
        )
    }

    /// Tag written in patch mode: the rendered pattern when the descriptor
    /// has one, else the computed tag
    pub fn patch_tag(&self, request: &TagRequest, resolution: &TrackResolution) -> String {
        match &resolution.release_tag_pattern {
            Some(pattern) => render_tag(
                pattern,
                &self.distro(request),
                &self.package(request),
                &self.version(request, resolution),
                &resolution.release_inc,
            ),
            None => self.compute(request, resolution),
        }
    }
}

/// How an existing gbp.conf is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Rewrite only the upstream keys, keep everything else
    Patch,
    /// Replace the whole file
    Overwrite,
}

/// Writer for `debian/gbp.conf`
#[derive(Debug, Clone, Copy, Default)]
pub struct GbpConfWriter;

impl GbpConfWriter {
    /// Location of gbp.conf in a source tree
    pub fn path(source_dir: &Path) -> PathBuf {
        source_dir.join("debian").join("gbp.conf")
    }

    /// Replace gbp.conf with the upstream tag and tree
    pub fn overwrite(source_dir: &Path, tag: &str, tree: &str) -> Result<PathBuf> {
        let path = Self::prepare(source_dir)?;
        let content = format!("{GBP_SECTION}\nupstream-tag={tag}\nupstream-tree={tree}\n");
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Patch the upstream branch and tag of gbp.conf, creating it if missing
    pub fn patch(source_dir: &Path, branch: &str, tag: &str) -> Result<PathBuf> {
        let path = Self::prepare(source_dir)?;
        let content = if path.is_file() {
            let existing = std::fs::read_to_string(&path)?;
            let mut content = set_conf_key(&existing, "upstream-branch", branch);
            content = set_conf_key(&content, "upstream-tag", tag);
            if !has_conf_key(&content, "upstream-tree") {
                content.push_str("upstream-tree=tag\n");
            }
            content
        } else {
            format!("{GBP_SECTION}\nupstream-branch={branch}\nupstream-tag={tag}\nupstream-tree=tag\n")
        };
        std::fs::write(&path, content)?;
        Ok(path)
    }

    fn prepare(source_dir: &Path) -> Result<PathBuf> {
        if !source_dir.is_dir() {
            return Err(TracksError::MissingDirectory { path: source_dir.to_path_buf() });
        }
        let path = Self::path(source_dir);
        if let Some(debian_dir) = path.parent() {
            std::fs::create_dir_all(debian_dir)?;
        }
        Ok(path)
    }
}

/// Outcome of a gbp.conf sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GbpSyncOutcome {
    /// File written
    pub path: PathBuf,

    /// Upstream tag written
    pub tag: String,

    /// Descriptor the values came from
    pub tracks_file: PathBuf,
}

/// Locates, resolves and writes gbp.conf for a source tree
#[derive(Debug, Clone)]
pub struct GbpSync {
    resolver: TrackResolver,
    computer: UpstreamTagComputer,
    tracks_root: Option<PathBuf>,
    mode: WriteMode,
    inc: ReleaseIncDefault,
}

impl GbpSync {
    /// Create a sync for one distro key
    pub fn new(resolver: TrackResolver, computer: UpstreamTagComputer) -> Self {
        Self {
            resolver,
            computer,
            tracks_root: None,
            mode: WriteMode::Overwrite,
            inc: ReleaseIncDefault::ConfigSync,
        }
    }

    /// Directory holding `<pkg>/tracks.yaml`, searched first
    pub fn with_tracks_root(mut self, root: Option<PathBuf>) -> Self {
        self.tracks_root = root;
        self
    }

    /// Write mode
    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Default release increment
    pub fn with_release_inc(mut self, inc: ReleaseIncDefault) -> Self {
        self.inc = inc;
        self
    }

    /// Sync gbp.conf for a source tree
    ///
    /// Fails with a skippable error when no descriptor or no matching
    /// section exists; nothing is written in that case.
    pub fn sync(&self, request: &TagRequest) -> Result<GbpSyncOutcome> {
        if !request.source_dir.is_dir() {
            return Err(TracksError::MissingDirectory { path: request.source_dir.clone() });
        }
        let tracks_file = locate_tracks(
            &request.source_dir,
            self.tracks_root.as_deref(),
            request.tracks_key.as_deref(),
        )
        .ok_or_else(|| TracksError::TracksNotFound { path: request.source_dir.clone() })?;

        let resolution = self.resolver.resolve_file(&tracks_file, self.inc).map_err(|e| {
            if e.is_skippable() {
                warn!("{}: {}", tracks_file.display(), e);
            }
            e
        })?;
        debug!("Resolved {:?} from {}", resolution, tracks_file.display());

        let (path, tag) = match self.mode {
            WriteMode::Overwrite => {
                let tag = self.computer.compute(request, &resolution);
                let path = GbpConfWriter::overwrite(
                    &request.source_dir,
                    &tag,
                    resolution.tree_mode_or_default(),
                )?;
                (path, tag)
            }
            WriteMode::Patch => {
                let tag = self.computer.patch_tag(request, &resolution);
                let path =
                    GbpConfWriter::patch(&request.source_dir, &resolution.upstream_branch, &tag)?;
                (path, tag)
            }
        };
        info!("gbp.conf updated with upstream-tag={}", tag);
        Ok(GbpSyncOutcome { path, tag, tracks_file })
    }
}
