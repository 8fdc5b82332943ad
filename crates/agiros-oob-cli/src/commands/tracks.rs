//! Tracks command implementation

use std::path::PathBuf;

use agiros_oob_config::Config;
use agiros_oob_tracks::{ReleaseIncDefault, TrackDescriptor, TrackResolution, TrackResolver};
use color_eyre::eyre::{Context, Result};

/// Prints what a track descriptor resolves to
pub struct TracksCommand {
    config: Config,
    file: PathBuf,
    distro: Option<String>,
}

impl TracksCommand {
    pub fn new(config: Config, file: PathBuf, distro: Option<String>) -> Self {
        Self { config, file, distro }
    }

    pub async fn execute(&self) -> Result<()> {
        let distro = self.distro.clone().unwrap_or_else(|| self.config.tracks_distro.clone());
        let descriptor = TrackDescriptor::load(&self.file)
            .wrap_err_with(|| format!("Failed to read {}", self.file.display()))?;
        let section = TrackResolver::new(distro.as_str())
            .section(&descriptor)
            .wrap_err_with(|| format!("Available sections: {}", descriptor.distros().join(", ")))?;

        println!("✓ {} [{}]", self.file.display(), section.key());
        let resolution = TrackResolution::from_section(&section, ReleaseIncDefault::ConfigSync);
        print_resolution(&resolution);
        let fresh = TrackResolution::from_section(&section, ReleaseIncDefault::FreshTag);
        println!("  release_inc: {} (gbp command: {})", resolution.release_inc, fresh.release_inc);
        let actions = section.actions();
        if !actions.is_empty() {
            println!("  actions:");
            for action in actions {
                println!("    - {action}");
            }
        }
        Ok(())
    }
}

fn print_resolution(resolution: &TrackResolution) {
    println!("  upstream-branch: {}", resolution.upstream_branch);
    println!("  upstream-tree: {}", resolution.tree_mode_or_default());
    if let Some(pattern) = &resolution.release_tag_pattern {
        println!("  release tag pattern: {pattern}");
    }
    if let Some(version) = &resolution.track_version {
        println!("  version: {version}");
    }
}
