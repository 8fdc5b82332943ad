//! Track descriptor documents and per-distro sections

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::Result;

/// Prefix of unrendered template values such as `:{version}`
pub const PLACEHOLDER_PREFIX: &str = ":{";

/// Whether a descriptor value is an unrendered template placeholder
pub fn is_placeholder(value: &str) -> bool {
    value.trim().starts_with(PLACEHOLDER_PREFIX)
}

/// Parsed `tracks.yaml` document
///
/// Holds the track table: the value under a top-level `tracks` key when
/// present, else the whole top-level mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackDescriptor {
    table: Mapping,
}

impl TrackDescriptor {
    /// Parse descriptor content
    pub fn parse(content: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(content)?;
        Ok(Self::from_value(value))
    }

    /// Read and parse a descriptor file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Build a descriptor from an already parsed YAML value
    pub fn from_value(value: Value) -> Self {
        let table = match value {
            Value::Mapping(mut map) => match map.remove("tracks") {
                Some(Value::Mapping(tracks)) => tracks,
                Some(_) => Mapping::new(),
                None => map,
            },
            _ => Mapping::new(),
        };
        Self { table }
    }

    /// Distro keys in document order
    pub fn distros(&self) -> Vec<&str> {
        self.table.keys().filter_map(Value::as_str).collect()
    }

    /// Look up the section for a distro
    ///
    /// A case-insensitive exact key match wins; otherwise the first key that
    /// contains the distro name case-insensitively is used. Keys whose value
    /// is not a mapping are never candidates.
    pub fn section(&self, distro: &str) -> Option<TrackSection> {
        let target = distro.trim().to_lowercase();
        let candidates = || {
            self.table.iter().filter_map(|(k, v)| match (k.as_str(), v) {
                (Some(key), Value::Mapping(fields)) => Some((key, fields)),
                _ => None,
            })
        };

        candidates()
            .find(|(key, _)| key.to_lowercase() == target)
            .or_else(|| candidates().find(|(key, _)| key.to_lowercase().contains(&target)))
            .map(|(key, fields)| TrackSection { key: key.to_string(), fields: fields.clone() })
    }

    /// Whether the track table is empty
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Release metadata of one package for one distro
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSection {
    key: String,
    fields: Mapping,
}

impl TrackSection {
    /// Key this section was found under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Raw field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Non-empty trimmed string field
    pub fn text(&self, field: &str) -> Option<&str> {
        non_empty(self.fields.get(field))
    }

    /// Non-empty trimmed string field of the nested `release` mapping
    pub fn release_text(&self, field: &str) -> Option<&str> {
        match self.fields.get("release") {
            Some(Value::Mapping(release)) => non_empty(release.get(field)),
            _ => None,
        }
    }

    /// Generator actions listed for this distro
    pub fn actions(&self) -> Vec<String> {
        match self.fields.get("actions") {
            Some(Value::Sequence(items)) => {
                items.iter().filter_map(Value::as_str).map(str::to_string).collect()
            }
            Some(Value::String(single)) if !single.trim().is_empty() => vec![single.clone()],
            _ => Vec::new(),
        }
    }
}

fn non_empty(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwraps_tracks_key() {
        let descriptor = TrackDescriptor::parse("tracks:\n  jazzy:\n    version: 1.0.0\n").unwrap();
        assert_eq!(descriptor.distros(), vec!["jazzy"]);
    }

    #[test]
    fn test_whole_mapping_is_table() {
        let descriptor = TrackDescriptor::parse("humble:\n  version: 1.0.0\njazzy: {}\n").unwrap();
        assert_eq!(descriptor.distros(), vec!["humble", "jazzy"]);
    }

    #[test]
    fn test_non_mapping_document() {
        let descriptor = TrackDescriptor::parse("- a\n- b\n").unwrap();
        assert!(descriptor.is_empty());
        assert!(descriptor.section("jazzy").is_none());
    }

    #[test]
    fn test_exact_match_beats_substring() {
        let yaml = "tracks:\n  jazzy-testing:\n    version: 2.0.0\n  JAZZY:\n    version: 1.0.0\n";
        let descriptor = TrackDescriptor::parse(yaml).unwrap();
        let section = descriptor.section("jazzy").unwrap();
        assert_eq!(section.key(), "JAZZY");
        assert_eq!(section.text("version"), Some("1.0.0"));
    }

    #[test]
    fn test_substring_fallback() {
        let yaml = "tracks:\n  ros2-Jazzy:\n    version: 2.0.0\n";
        let descriptor = TrackDescriptor::parse(yaml).unwrap();
        assert_eq!(descriptor.section("jazzy").unwrap().key(), "ros2-Jazzy");
        assert!(descriptor.section("humble").is_none());
    }

    #[test]
    fn test_non_mapping_section_ignored() {
        let yaml = "tracks:\n  jazzy: disabled\n  jazzy-old:\n    version: 0.9.0\n";
        let descriptor = TrackDescriptor::parse(yaml).unwrap();
        assert_eq!(descriptor.section("jazzy").unwrap().key(), "jazzy-old");
    }

    #[test]
    fn test_section_fields() {
        let yaml = r#"
tracks:
  jazzy:
    version: " 1.2.3 "
    release:
      tags: "release/{version}"
      tree: tag
    actions:
      - bloom-generate agirosdebian --os-name ubuntu
"#;
        let section = TrackDescriptor::parse(yaml).unwrap().section("jazzy").unwrap();
        assert_eq!(section.text("version"), Some("1.2.3"));
        assert_eq!(section.release_text("tags"), Some("release/{version}"));
        assert_eq!(section.release_text("tree"), Some("tag"));
        assert_eq!(section.actions().len(), 1);
        assert_eq!(section.text("missing"), None);
    }

    #[test]
    fn test_is_placeholder() {
        assert!(is_placeholder(":{version}"));
        assert!(is_placeholder("  :{release_inc}"));
        assert!(!is_placeholder("1.0.0"));
        assert!(!is_placeholder("{version}"));
    }
}
