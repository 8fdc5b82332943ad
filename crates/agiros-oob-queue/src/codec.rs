//! Parsing and rendering of the queue line file and metadata file

use agiros_oob_core::BuildKind;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::Result;

/// Completion marker suffix in the line file
pub const COMPLETED_MARKER: char = '#';

/// One package line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry {
    /// Package name
    pub name: String,

    /// Completion marker present
    pub completed: bool,
}

/// Parsed line file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineFile {
    /// Distinct package names in first-seen order; completion flags of
    /// repeated names are OR-ed
    pub entries: Vec<LineEntry>,

    /// Metadata carried by legacy JSON-object lines
    pub legacy: MetaFile,
}

/// Per-package metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMeta {
    /// Source path, absent when empty
    pub path: Option<String>,

    /// Extra arguments per kind, in file order
    pub kinds: Vec<(BuildKind, Vec<String>)>,
}

impl PackageMeta {
    /// Insert or replace the arguments of a kind, keeping its position
    pub fn set_kind(&mut self, kind: BuildKind, extra_args: Vec<String>) {
        match self.kinds.iter_mut().find(|(k, _)| *k == kind) {
            Some(slot) => slot.1 = extra_args,
            None => self.kinds.push((kind, extra_args)),
        }
    }
}

/// Parsed metadata file, packages in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaFile {
    /// Package name and metadata pairs
    pub packages: Vec<(String, PackageMeta)>,
}

impl MetaFile {
    /// Metadata of a package
    pub fn get(&self, name: &str) -> Option<&PackageMeta> {
        self.packages.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    /// Metadata of a package, inserted empty when missing
    pub fn entry(&mut self, name: &str) -> &mut PackageMeta {
        let idx = match self.packages.iter().position(|(n, _)| n == name) {
            Some(idx) => idx,
            None => {
                self.packages.push((name.to_string(), PackageMeta::default()));
                self.packages.len() - 1
            }
        };
        &mut self.packages[idx].1
    }

    /// Whether no package has metadata
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Fold another metadata set into this one
    ///
    /// Non-empty paths of `other` replace ours; its kinds replace ours
    /// kind by kind.
    pub fn absorb(&mut self, other: MetaFile) {
        for (name, meta) in other.packages {
            let entry = self.entry(&name);
            if meta.path.is_some() {
                entry.path = meta.path;
            }
            for (kind, args) in meta.kinds {
                entry.set_kind(kind, args);
            }
        }
    }
}

/// Parse the line file
///
/// Blank lines are ignored. Lines holding a JSON object with a `name` are
/// the legacy format and contribute metadata as well.
pub fn parse_line_file(content: &str) -> LineFile {
    let mut file = LineFile::default();

    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let (name, completed) = match parse_legacy_line(line) {
            LegacyLine::Entry { name, completed, meta } => {
                file.legacy.absorb(MetaFile { packages: vec![(name.clone(), meta)] });
                (name, completed)
            }
            LegacyLine::Unnamed => {
                warn!("Ignoring queue line without a package name: {}", line);
                continue;
            }
            LegacyLine::NotLegacy => match line.strip_suffix(COMPLETED_MARKER) {
                Some(rest) => (rest.trim().to_string(), true),
                None => (line.to_string(), false),
            },
        };
        if name.is_empty() {
            continue;
        }

        match file.entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => existing.completed |= completed,
            None => file.entries.push(LineEntry { name, completed }),
        }
    }

    file
}

enum LegacyLine {
    Entry { name: String, completed: bool, meta: PackageMeta },
    Unnamed,
    NotLegacy,
}

fn parse_legacy_line(line: &str) -> LegacyLine {
    if !(line.starts_with('{') && line.ends_with('}')) {
        return LegacyLine::NotLegacy;
    }
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(line) else {
        return LegacyLine::NotLegacy;
    };
    let Some(name) =
        obj.get("name").and_then(Value::as_str).map(str::trim).filter(|n| !n.is_empty())
    else {
        return LegacyLine::Unnamed;
    };
    let completed = obj.get("completed").and_then(Value::as_bool).unwrap_or(false);

    let kind_name = obj.get("kind").and_then(Value::as_str).unwrap_or("debian");
    let mut meta = PackageMeta {
        path: obj.get("path").and_then(Value::as_str).filter(|p| !p.is_empty()).map(str::to_string),
        kinds: Vec::new(),
    };
    match kind_name.parse::<BuildKind>() {
        Ok(kind) => meta.kinds.push((kind, extra_args(obj.get("extra_args")))),
        Err(e) => warn!("Dropping legacy queue line for {}: {}", name, e),
    }

    LegacyLine::Entry { name: name.to_string(), completed, meta }
}

/// Parse the metadata file
///
/// Anything that is not a JSON object, or entries of the wrong shape, are
/// ignored rather than reported.
pub fn parse_meta_file(content: &str) -> MetaFile {
    let mut file = MetaFile::default();
    if content.trim().is_empty() {
        return file;
    }
    let root = match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(root)) => root,
        Ok(_) => {
            warn!("Queue metadata is not a JSON object, ignoring it");
            return file;
        }
        Err(e) => {
            warn!("Queue metadata is unreadable, ignoring it: {}", e);
            return file;
        }
    };

    for (name, info) in root {
        let Value::Object(info) = info else { continue };
        let entry = file.entry(&name);
        entry.path = info
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        if let Some(Value::Object(kinds)) = info.get("kinds") {
            for (kind_name, payload) in kinds {
                match kind_name.parse::<BuildKind>() {
                    Ok(kind) => entry.set_kind(kind, extra_args(payload.get("extra_args"))),
                    Err(e) => warn!("Dropping queue metadata of {}: {}", name, e),
                }
            }
        }
    }

    file
}

fn extra_args(raw: Option<&Value>) -> Vec<String> {
    match raw {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Render the line file
pub fn render_line_file(entries: &[LineEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            if e.completed {
                format!("{}{}\n", e.name, COMPLETED_MARKER)
            } else {
                format!("{}\n", e.name)
            }
        })
        .collect()
}

/// Render the metadata file as two-space indented JSON
pub fn render_meta_file(meta: &MetaFile) -> Result<String> {
    let mut root = Map::new();
    for (name, info) in &meta.packages {
        let mut kinds = Map::new();
        for (kind, args) in &info.kinds {
            let mut payload = Map::new();
            payload.insert(
                "extra_args".to_string(),
                Value::Array(args.iter().cloned().map(Value::String).collect()),
            );
            kinds.insert(kind.as_str().to_string(), Value::Object(payload));
        }
        let mut entry = Map::new();
        entry.insert(
            "path".to_string(),
            Value::String(info.path.clone().unwrap_or_default()),
        );
        entry.insert("kinds".to_string(), Value::Object(kinds));
        root.insert(name.clone(), Value::Object(entry));
    }
    Ok(serde_json::to_string_pretty(&Value::Object(root))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_lines() {
        let file = parse_line_file("pkgA#\n\n  pkgB  \npkgA\npkgC #\n");
        assert_eq!(
            file.entries,
            vec![
                LineEntry { name: "pkgA".into(), completed: true },
                LineEntry { name: "pkgB".into(), completed: false },
                LineEntry { name: "pkgC".into(), completed: true },
            ]
        );
        assert!(file.legacy.is_empty());
    }

    #[test]
    fn test_parse_legacy_json_lines() {
        let content = concat!(
            r#"{"name": "nav2", "completed": true, "kind": "rpm", "path": "/src/nav2", "extra_args": ["-v"]}"#,
            "\n",
            r#"{"name": "nav2", "kind": "debian", "extra_args": "--git-pbuilder"}"#,
            "\n",
            r#"{"completed": true}"#,
            "\n"
        );
        let file = parse_line_file(content);
        assert_eq!(file.entries, vec![LineEntry { name: "nav2".into(), completed: true }]);

        let meta = file.legacy.get("nav2").unwrap();
        assert_eq!(meta.path.as_deref(), Some("/src/nav2"));
        assert_eq!(
            meta.kinds,
            vec![
                (BuildKind::Rpm, vec!["-v".to_string()]),
                (BuildKind::Debian, vec!["--git-pbuilder".to_string()]),
            ]
        );
    }

    #[test]
    fn test_json_like_line_without_name_is_plain() {
        let file = parse_line_file("{not json}\n");
        assert_eq!(file.entries[0].name, "{not json}");
    }

    #[test]
    fn test_parse_meta_file() {
        let meta = parse_meta_file(
            r#"{"pkgB": {"path": "/src/pkgB", "kinds": {"debian": {"extra_args": []}, "rpm": {"extra_args": ["--nocheck"]}, "msi": {}}}, "bad": 3}"#,
        );
        let info = meta.get("pkgB").unwrap();
        assert_eq!(info.path.as_deref(), Some("/src/pkgB"));
        assert_eq!(info.kinds.len(), 2);
        assert_eq!(info.kinds[1], (BuildKind::Rpm, vec!["--nocheck".to_string()]));
        assert!(meta.get("bad").is_none());
    }

    #[test]
    fn test_parse_meta_garbage() {
        assert!(parse_meta_file("[1, 2").is_empty());
        assert!(parse_meta_file("[]").is_empty());
        assert!(parse_meta_file("").is_empty());
    }

    #[test]
    fn test_render_meta_file() {
        let mut meta = MetaFile::default();
        let entry = meta.entry("pkgA");
        entry.path = Some("/src/pkgA".to_string());
        entry.set_kind(BuildKind::Debian, vec!["-nc".to_string()]);

        let rendered = render_meta_file(&meta).unwrap();
        assert_eq!(
            rendered,
            "{\n  \"pkgA\": {\n    \"path\": \"/src/pkgA\",\n    \"kinds\": {\n      \"debian\": {\n        \"extra_args\": [\n          \"-nc\"\n        ]\n      }\n    }\n  }\n}"
        );
        assert_eq!(render_meta_file(&MetaFile::default()).unwrap(), "{}");
    }

    #[test]
    fn test_absorb_prefers_other() {
        let mut base = MetaFile::default();
        base.entry("a").path = Some("/old".to_string());
        base.entry("a").set_kind(BuildKind::Debian, vec!["x".to_string()]);

        let mut other = MetaFile::default();
        other.entry("a").set_kind(BuildKind::Debian, vec!["y".to_string()]);
        base.absorb(other);

        let a = base.get("a").unwrap();
        assert_eq!(a.path.as_deref(), Some("/old"));
        assert_eq!(a.kinds, vec![(BuildKind::Debian, vec!["y".to_string()])]);
    }
}
