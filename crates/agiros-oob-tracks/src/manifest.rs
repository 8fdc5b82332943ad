//! Minimal package.xml reader

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::error::{Result, TracksError};

/// Manifest file name inside a package directory
pub const MANIFEST_FILE: &str = "package.xml";

/// Fields of a package manifest needed for tag computation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    /// `<name>` of the package
    pub name: Option<String>,

    /// `<version>` of the package
    pub version: Option<String>,
}

/// Parse package.xml content
///
/// Only direct children of the root `<package>` element are read, so a
/// `<version>` nested inside `<export>` or similar is ignored.
pub fn parse_manifest(xml_content: &str) -> Result<PackageManifest> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut manifest = PackageManifest::default();
    let mut stack: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = std::str::from_utf8(e.name().as_ref())
                    .map_err(|e| TracksError::manifest(e.to_string()))?
                    .to_string();
                stack.push(name);
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(e)) if stack.len() == 2 && stack[0] == "package" => {
                let text = e
                    .unescape()
                    .map_err(|e| TracksError::manifest(e.to_string()))?
                    .trim()
                    .to_string();
                if !text.is_empty() {
                    match stack[1].as_str() {
                        "name" if manifest.name.is_none() => manifest.name = Some(text),
                        "version" if manifest.version.is_none() => manifest.version = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(TracksError::manifest(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(manifest)
}

/// Read the manifest of a package directory, if it has a readable one
pub fn read_manifest(package_dir: &Path) -> Option<PackageManifest> {
    let path = package_dir.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&path).ok()?;
    match parse_manifest(&content) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            debug!("Ignoring unreadable {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_parse_manifest() {
        let xml = r#"<?xml version="1.0"?>
<package format="3">
  <name>demo_nodes</name>
  <version>0.33.1</version>
  <description>Demo</description>
  <export>
    <version>9.9.9</version>
  </export>
</package>"#;
        let manifest = parse_manifest(xml).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("demo_nodes"));
        assert_eq!(manifest.version.as_deref(), Some("0.33.1"));
    }

    #[test]
    fn test_missing_version() {
        let manifest = parse_manifest("<package><name>x</name></package>").unwrap();
        assert_eq!(manifest.version, None);
    }

    #[test]
    fn test_read_manifest_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_manifest(temp_dir.path()).is_none());

        std::fs::write(
            temp_dir.path().join(MANIFEST_FILE),
            "<package><version> 1.2.3 </version></package>",
        )
        .unwrap();
        let manifest = read_manifest(temp_dir.path()).unwrap();
        assert_eq!(manifest.version.as_deref(), Some("1.2.3"));
    }
}
