//! Locating the tracks file of a package

use std::path::{Path, PathBuf};

/// Accepted descriptor file names, in lookup order
pub const TRACKS_FILE_NAMES: [&str; 2] = ["tracks.yaml", "track.yaml"];

/// Descriptor file directly inside a directory
pub fn tracks_in_dir(dir: &Path) -> Option<PathBuf> {
    TRACKS_FILE_NAMES.iter().map(|name| dir.join(name)).find(|p| p.is_file())
}

/// Candidate descriptor paths for a package directory, in lookup order
///
/// `tracks_root/<key>/` comes first when a root is given (`key` defaults to
/// the directory name), then the package directory and its parent.
pub fn tracks_candidates(
    package_dir: &Path,
    tracks_root: Option<&Path>,
    key: Option<&str>,
) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(root) = tracks_root {
        let key = key
            .map(str::to_string)
            .or_else(|| package_dir.file_name().map(|n| n.to_string_lossy().into_owned()));
        if let Some(key) = key {
            dirs.push(root.join(key));
        }
    }
    dirs.push(package_dir.to_path_buf());
    if let Some(parent) = package_dir.parent() {
        dirs.push(parent.to_path_buf());
    }

    dirs.iter()
        .flat_map(|dir| TRACKS_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .collect()
}

/// First existing descriptor for a package directory
pub fn locate_tracks(
    package_dir: &Path,
    tracks_root: Option<&Path>,
    key: Option<&str>,
) -> Option<PathBuf> {
    tracks_candidates(package_dir, tracks_root, key).into_iter().find(|p| p.is_file())
}
