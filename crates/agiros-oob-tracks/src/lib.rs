//! Track descriptor resolution for AGIROS packaging
//!
//! This crate turns a per-package `tracks.yaml` release descriptor into
//! concrete branch, tag and increment values, and writes the
//! `debian/gbp.conf` that git-buildpackage reads during a Debian build.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use agiros_oob_tracks::{ReleaseIncDefault, TagRequest, TrackResolver, UpstreamTagComputer};
//!
//! # fn main() -> agiros_oob_tracks::Result<()> {
//! let resolver = TrackResolver::new("jazzy");
//! let resolution =
//!     resolver.resolve_file(Path::new("release/foo/tracks.yaml"), ReleaseIncDefault::FreshTag)?;
//!
//! let computer = UpstreamTagComputer::new(Some("loong".to_string()));
//! let tag = computer.compute(&TagRequest::new(Path::new("src/foo")), &resolution);
//! println!("{tag}");
//! # Ok(())
//! # }
//! ```

pub mod descriptor;
pub mod error;
pub mod gbp;
pub mod locate;
pub mod manifest;
pub mod resolver;

pub use descriptor::{is_placeholder, TrackDescriptor, TrackSection};
pub use error::{Result, TracksError};
pub use gbp::{
    compute_tag, render_tag, set_conf_key, GbpConfWriter, GbpSync, GbpSyncOutcome, TagRequest,
    UpstreamTagComputer, WriteMode,
};
pub use locate::{locate_tracks, tracks_candidates, tracks_in_dir, TRACKS_FILE_NAMES};
pub use manifest::{parse_manifest, read_manifest, PackageManifest};
pub use resolver::{ReleaseIncDefault, TrackResolution, TrackResolver};
