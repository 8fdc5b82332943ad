//! Resolution of branch, tag pattern and increment from a track section

use std::path::Path;

use serde_yaml::Value;
use tracing::{debug, warn};

use crate::descriptor::{is_placeholder, TrackDescriptor, TrackSection};
use crate::error::{Result, TracksError};

/// Branch used when a section names neither a branch nor a usable version
pub const DEFAULT_UPSTREAM_BRANCH: &str = "upstream";

/// Tree mode used when a section does not name one
pub const DEFAULT_TREE_MODE: &str = "tag";

/// Default release increment, which differs between call sites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseIncDefault {
    /// Syncing gbp.conf right after metadata generation or before a build
    ConfigSync,
    /// Standalone tag generation for a source tree
    FreshTag,
}

impl ReleaseIncDefault {
    /// Default increment value
    pub fn value(&self) -> &'static str {
        match self {
            Self::ConfigSync => "0",
            Self::FreshTag => "1",
        }
    }
}

/// Values derived from one track section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackResolution {
    /// Never empty
    pub upstream_branch: String,

    /// Pattern-based tag, used only when patching gbp.conf in place
    pub release_tag_pattern: Option<String>,

    /// `upstream-tree` value, callers default to `tag`
    pub tree_mode: Option<String>,

    /// Release increment as a decimal string
    pub release_inc: String,

    /// Version named by the descriptor
    pub track_version: Option<String>,
}

impl TrackResolution {
    /// Resolution used when no section could be read
    pub fn defaults(inc: ReleaseIncDefault) -> Self {
        Self {
            upstream_branch: DEFAULT_UPSTREAM_BRANCH.to_string(),
            release_tag_pattern: None,
            tree_mode: None,
            release_inc: inc.value().to_string(),
            track_version: None,
        }
    }

    /// Derive values from a section
    pub fn from_section(section: &TrackSection, inc: ReleaseIncDefault) -> Self {
        let track_version = section
            .text("version")
            .filter(|v| !is_placeholder(v))
            .map(str::to_string);

        let upstream_branch = section
            .text("devel_branch")
            .or_else(|| section.text("upstream-branch"))
            .or(track_version.as_deref())
            .map(normalize_branch_name)
            .unwrap_or_else(|| DEFAULT_UPSTREAM_BRANCH.to_string());

        let release_tag_pattern = section
            .release_text("tags")
            .or_else(|| section.text("release_tag"))
            .or_else(|| section.text("release-tag"))
            .map(str::to_string);

        let tree_mode = section.release_text("tree").map(str::to_string);

        let release_inc = section
            .get("release_inc")
            .and_then(release_inc_value)
            .unwrap_or_else(|| inc.value().to_string());

        Self { upstream_branch, release_tag_pattern, tree_mode, release_inc, track_version }
    }

    /// Tree mode with the default applied
    pub fn tree_mode_or_default(&self) -> &str {
        self.tree_mode.as_deref().unwrap_or(DEFAULT_TREE_MODE)
    }
}

/// Resolves track sections for one distro key
#[derive(Debug, Clone)]
pub struct TrackResolver {
    distro: String,
}

impl TrackResolver {
    /// Create a resolver for a distro key such as `jazzy`
    pub fn new(distro: impl Into<String>) -> Self {
        Self { distro: distro.into() }
    }

    /// Distro key this resolver looks up
    pub fn distro(&self) -> &str {
        &self.distro
    }

    /// Find the section for this resolver's distro
    pub fn section(&self, descriptor: &TrackDescriptor) -> Result<TrackSection> {
        descriptor
            .section(&self.distro)
            .ok_or_else(|| TracksError::SectionNotFound { distro: self.distro.clone() })
    }

    /// Resolve a parsed descriptor
    pub fn resolve(
        &self,
        descriptor: &TrackDescriptor,
        inc: ReleaseIncDefault,
    ) -> Result<TrackResolution> {
        let section = self.section(descriptor)?;
        debug!("Using track section '{}' for distro '{}'", section.key(), self.distro);
        Ok(TrackResolution::from_section(&section, inc))
    }

    /// Resolve descriptor content
    ///
    /// Content that is not valid YAML resolves to all defaults.
    pub fn resolve_str(&self, content: &str, inc: ReleaseIncDefault) -> Result<TrackResolution> {
        match TrackDescriptor::parse(content) {
            Ok(descriptor) => self.resolve(&descriptor, inc),
            Err(e) => {
                warn!("Malformed track descriptor, using defaults: {}", e);
                Ok(TrackResolution::defaults(inc))
            }
        }
    }

    /// Resolve a descriptor file
    pub fn resolve_file(&self, path: &Path, inc: ReleaseIncDefault) -> Result<TrackResolution> {
        debug!("Reading track descriptor {}", path.display());
        let content = std::fs::read_to_string(path)?;
        self.resolve_str(&content, inc)
    }
}

fn release_inc_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) if f.is_finite() => (f.trunc() as i64).to_string(),
            _ => return None,
        },
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    (!text.is_empty() && !is_placeholder(&text)).then_some(text)
}

fn normalize_branch_name(name: &str) -> String {
    name.trim().split_whitespace().collect::<Vec<_>>().join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(yaml: &str, inc: ReleaseIncDefault) -> TrackResolution {
        TrackResolver::new("jazzy").resolve_str(yaml, inc).unwrap()
    }

    #[test]
    fn test_devel_branch_wins() {
        let r = resolve(
            "jazzy:\n  devel_branch: feature/x\n  upstream-branch: main\n  version: 2.1.0\n",
            ReleaseIncDefault::FreshTag,
        );
        assert_eq!(r.upstream_branch, "feature/x");
    }

    #[test]
    fn test_upstream_branch_key() {
        let r = resolve("jazzy:\n  upstream-branch: my branch\n", ReleaseIncDefault::FreshTag);
        assert_eq!(r.upstream_branch, "my-branch");
    }

    #[test]
    fn test_version_as_branch() {
        let r = resolve("jazzy:\n  version: 2.1.0\n", ReleaseIncDefault::FreshTag);
        assert_eq!(r.upstream_branch, "2.1.0");
        assert_eq!(r.track_version.as_deref(), Some("2.1.0"));
    }

    #[test]
    fn test_placeholder_version_ignored() {
        let r = resolve("jazzy:\n  version: ':{version}'\n", ReleaseIncDefault::FreshTag);
        assert_eq!(r.upstream_branch, "upstream");
        assert_eq!(r.track_version, None);
    }

    #[test]
    fn test_tag_pattern_priority() {
        let r = resolve(
            "jazzy:\n  release:\n    tags: 'release/jazzy/{package}/{version}'\n  release_tag: old\n",
            ReleaseIncDefault::FreshTag,
        );
        assert_eq!(r.release_tag_pattern.as_deref(), Some("release/jazzy/{package}/{version}"));

        let r = resolve("jazzy:\n  release-tag: legacy\n", ReleaseIncDefault::FreshTag);
        assert_eq!(r.release_tag_pattern.as_deref(), Some("legacy"));

        let r = resolve("jazzy:\n  version: 1.0.0\n", ReleaseIncDefault::FreshTag);
        assert_eq!(r.release_tag_pattern, None);
    }

    #[test]
    fn test_tree_mode() {
        let r = resolve("jazzy:\n  release:\n    tree: branch\n", ReleaseIncDefault::FreshTag);
        assert_eq!(r.tree_mode_or_default(), "branch");

        let r = resolve("jazzy:\n  version: 1.0.0\n", ReleaseIncDefault::FreshTag);
        assert_eq!(r.tree_mode, None);
        assert_eq!(r.tree_mode_or_default(), "tag");
    }

    #[test]
    fn test_release_inc_coercion() {
        let r = resolve("jazzy:\n  release_inc: 3\n", ReleaseIncDefault::ConfigSync);
        assert_eq!(r.release_inc, "3");

        let r = resolve("jazzy:\n  release_inc: 2.0\n", ReleaseIncDefault::ConfigSync);
        assert_eq!(r.release_inc, "2");

        let r = resolve("jazzy:\n  release_inc: ' 5 '\n", ReleaseIncDefault::ConfigSync);
        assert_eq!(r.release_inc, "5");
    }

    #[test]
    fn test_release_inc_defaults_per_call_site() {
        let yaml = "jazzy:\n  release_inc: ':{release_inc}'\n";
        assert_eq!(resolve(yaml, ReleaseIncDefault::ConfigSync).release_inc, "0");
        assert_eq!(resolve(yaml, ReleaseIncDefault::FreshTag).release_inc, "1");
    }

    #[test]
    fn test_section_not_found() {
        let result = TrackResolver::new("jazzy")
            .resolve_str("humble:\n  version: 1.0.0\n", ReleaseIncDefault::FreshTag);
        assert!(matches!(result, Err(TracksError::SectionNotFound { .. })));
    }

    #[test]
    fn test_malformed_content_degrades_to_defaults() {
        let r = resolve("jazzy: [unclosed", ReleaseIncDefault::FreshTag);
        assert_eq!(r, TrackResolution::defaults(ReleaseIncDefault::FreshTag));
    }
}
