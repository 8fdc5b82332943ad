//! gbp command implementation

use std::path::PathBuf;

use agiros_oob_build::{gbp_sync, tracks_key};
use agiros_oob_config::Config;
use agiros_oob_tracks::{ReleaseIncDefault, TagRequest, WriteMode};
use color_eyre::eyre::{eyre, Context, Result};
use tracing::info;

/// Writes debian/gbp.conf for one source tree with a fresh release tag
pub struct GbpCommand {
    config: Config,
    path: PathBuf,
    distro: Option<String>,
    package: Option<String>,
    tracks_distro: Option<String>,
    patch: bool,
}

impl GbpCommand {
    pub fn new(
        config: Config,
        path: PathBuf,
        distro: Option<String>,
        package: Option<String>,
        tracks_distro: Option<String>,
        patch: bool,
    ) -> Self {
        Self { config, path, distro, package, tracks_distro, patch }
    }

    pub async fn execute(&self) -> Result<()> {
        if !self.path.is_dir() {
            return Err(eyre!("Source directory does not exist: {}", self.path.display()));
        }
        let mut config = self.config.clone();
        if let Some(distro) = &self.tracks_distro {
            config.tracks_distro = distro.clone();
        }
        let mode = if self.patch { WriteMode::Patch } else { WriteMode::Overwrite };

        if config.dry_run {
            println!("[DRY] write {}/debian/gbp.conf ({:?})", self.path.display(), mode);
            return Ok(());
        }

        let request = TagRequest::new(&self.path)
            .with_distro(self.distro.clone())
            .with_package(self.package.clone())
            .with_tracks_key(tracks_key(&config, &self.path));
        info!("Resolving section {} for {}", config.tracks_distro, self.path.display());

        let outcome = gbp_sync(&config, mode, ReleaseIncDefault::FreshTag)
            .sync(&request)
            .wrap_err_with(|| format!("Failed to write gbp.conf for {}", self.path.display()))?;

        println!("✓ Wrote {}", outcome.path.display());
        println!("  upstream-tag={}", outcome.tag);
        println!("  from {}", outcome.tracks_file.display());
        Ok(())
    }
}
