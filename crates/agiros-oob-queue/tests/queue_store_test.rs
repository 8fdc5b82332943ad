//! Queue store tests against real files

use std::path::PathBuf;

use agiros_oob_core::{BuildKind, BuildTask};
use agiros_oob_queue::{FsQueueFiles, QueueStore};
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    queue: PathBuf,
    meta: PathBuf,
    store: QueueStore<FsQueueFiles>,
}

fn fixture(lines: Option<&str>, meta: Option<&str>) -> Fixture {
    let temp = TempDir::new().unwrap();
    let queue = temp.path().join("build_queue.txt");
    let meta_path = temp.path().join("build_queue.txt.meta.json");
    if let Some(lines) = lines {
        std::fs::write(&queue, lines).unwrap();
    }
    if let Some(meta) = meta {
        std::fs::write(&meta_path, meta).unwrap();
    }
    let store = QueueStore::open(&queue, &meta_path, temp.path().join("code"));
    Fixture { _temp: temp, queue, meta: meta_path, store }
}

fn read(path: &PathBuf) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[test]
fn save_of_load_is_byte_identical() {
    let f = fixture(
        Some("pkgA#\npkgB\n"),
        Some(
            r#"{"pkgB": {"path": "/src/pkgB", "kinds": {"debian": {"extra_args": []}, "rpm": {"extra_args": ["--with", "tests"]}}}}"#,
        ),
    );
    f.store.save(&f.store.load()).unwrap();
    let lines_once = read(&f.queue);
    let meta_once = read(&f.meta);

    f.store.save(&f.store.load()).unwrap();
    assert_eq!(read(&f.queue), lines_once);
    assert_eq!(read(&f.meta), meta_once);
    assert_eq!(lines_once, "pkgA#\npkgB\n");
}

#[test]
fn legacy_json_lines_migrate_to_two_files() {
    let f = fixture(
        Some(concat!(
            r#"{"name": "rclcpp", "completed": false, "kind": "rpm", "path": "/src/rclcpp", "extra_args": ["-v"]}"#,
            "\n",
            "nav2#\n"
        )),
        None,
    );

    let state = f.store.load();
    assert_eq!(state.packages(), ["rclcpp", "nav2"]);
    let rclcpp = state.tasks_for("rclcpp");
    assert_eq!(rclcpp.len(), 1);
    assert_eq!(rclcpp[0].kind, BuildKind::Rpm);
    assert_eq!(rclcpp[0].path, PathBuf::from("/src/rclcpp"));

    f.store.save(&state).unwrap();
    assert_eq!(read(&f.queue), "rclcpp\nnav2#\n");
    let meta: serde_json::Value = serde_json::from_str(&read(&f.meta)).unwrap();
    assert_eq!(meta["rclcpp"]["kinds"]["rpm"]["extra_args"][0], "-v");
    assert!(meta["nav2"]["path"].as_str().unwrap().ends_with("code/nav2"));
}

#[test]
fn append_overwrites_existing_identity() {
    let f = fixture(
        Some("pkgA#\n"),
        Some(r#"{"pkgA": {"path": "/old", "kinds": {"debian": {"extra_args": []}}}}"#),
    );

    let state = f
        .store
        .append(BuildTask::new("pkgA", "/new", BuildKind::Debian).with_args(vec!["-nc".to_string()]))
        .unwrap();

    assert_eq!(state.tasks().len(), 1);
    assert!(!state.is_completed("pkgA"));
    let reloaded = f.store.load();
    assert_eq!(reloaded.tasks_for("pkgA")[0].path, PathBuf::from("/new"));
    assert_eq!(reloaded.tasks_for("pkgA")[0].extra_args, vec!["-nc"]);
    assert_eq!(read(&f.queue), "pkgA\n");
}

#[test]
fn append_new_kind_keeps_existing_task() {
    let f = fixture(None, None);
    f.store.append(BuildTask::new("pkgB", "/src/pkgB", BuildKind::Debian)).unwrap();
    let state = f.store.append(BuildTask::new("pkgB", "/src/pkgB", BuildKind::Rpm)).unwrap();
    let kinds: Vec<_> = state.tasks_for("pkgB").iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![BuildKind::Debian, BuildKind::Rpm]);
}

#[test]
fn clear_leaves_both_files_present() {
    let f = fixture(Some("pkgA\n"), Some("{}"));
    f.store.clear().unwrap();
    assert!(f.queue.exists());
    assert!(f.meta.exists());
    assert_eq!(read(&f.queue), "");
    assert_eq!(read(&f.meta), "{}");
}

#[test]
fn corrupted_metadata_loads_defaults() {
    let f = fixture(Some("pkgA\n"), Some("{\"pkgA\": {\"path\": "));
    let tasks = f.store.load().tasks_for("pkgA");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].kind, BuildKind::Debian);
    assert!(tasks[0].path.ends_with("code/pkgA"));
}

#[test]
fn remove_drops_package_from_both_files() {
    let f = fixture(Some("pkgA\npkgB#\n"), None);
    f.store.remove("pkgA").unwrap();
    assert_eq!(read(&f.queue), "pkgB#\n");
    let meta: serde_json::Value = serde_json::from_str(&read(&f.meta)).unwrap();
    assert!(meta.get("pkgA").is_none());
    assert!(f.store.remove("pkgA").is_err());
}
