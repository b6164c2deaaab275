//! End-to-end tests for the read-only `fwatch` commands

mod common;

use chrono::Utc;
use common::FwatchCommand;
use filewatch_cli::config::DaemonConfig;
use filewatch_core::{FileEventBatch, FileWatch, FileWatchSpec, ResourceKey};
use filewatch_store::write_snapshot;
use std::path::PathBuf;
use tempfile::TempDir;

const MANIFEST: &str = r#"
[[watch]]
name = "web"
watched_paths = ["src"]
ignores = [{ base_path = "src", patterns = ["**/*.tmp"] }]
disable_source = { config_map = { name = "web-gate", key = "isDisabled" } }

[[config_map]]
name = "web-gate"
data = { isDisabled = "false" }
"#;

#[test]
fn test_check_valid_manifest() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir(temp_dir.path().join("src")).unwrap();
    std::fs::write(temp_dir.path().join("fwatch.toml"), MANIFEST).unwrap();

    let result = FwatchCommand::new(temp_dir.path())
        .args(&["check", "--manifest", "fwatch.toml"])
        .assert_success()
        .unwrap();

    assert!(result.stdout.contains("web"));
    assert!(result.stdout.contains("web-gate"));
    assert!(result.stdout.contains("Manifest is valid"));
}

#[test]
fn test_check_reports_bad_pattern() {
    let temp_dir = TempDir::new().unwrap();
    let manifest = "[[watch]]\nname = \"web\"\nwatched_paths = [\".\"]\nignores = [{ base_path = \".\", patterns = [\"[z-a]\"] }]\n";
    std::fs::write(temp_dir.path().join("fwatch.toml"), manifest).unwrap();

    let result = FwatchCommand::new(temp_dir.path())
        .args(&["check", "--manifest", "fwatch.toml"])
        .assert_failure()
        .unwrap();

    assert!(result.stderr.contains("1 problem"));
}

#[test]
fn test_check_missing_manifest_fails() {
    let temp_dir = TempDir::new().unwrap();

    let result = FwatchCommand::new(temp_dir.path())
        .args(&["check", "--manifest", "nope.toml"])
        .assert_failure()
        .unwrap();

    assert!(result.stderr.contains("nope.toml"));
}

#[test]
fn test_status_reads_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let snapshot = temp_dir.path().join("status.json");

    let mut fw = FileWatch::new(
        ResourceKey::new("", "web"),
        FileWatchSpec {
            watched_paths: vec![PathBuf::from("/srv/web")],
            ..Default::default()
        },
    );
    fw.status.monitor_start_time = Some(Utc::now());
    fw.status.record_batch(FileEventBatch {
        time: Utc::now(),
        seen_files: vec![PathBuf::from("/srv/web/index.html")],
    });
    write_snapshot(&snapshot, &[fw]).unwrap();

    let result = FwatchCommand::new(temp_dir.path())
        .args(&["status", "--snapshot", "status.json"])
        .assert_success()
        .unwrap();
    assert!(result.stdout.contains("web"));
    assert!(result.stdout.contains("/srv/web/index.html"));

    let result = FwatchCommand::new(temp_dir.path())
        .args(&["status", "--snapshot", "status.json", "--json"])
        .assert_success()
        .unwrap();
    let parsed: Vec<FileWatch> = serde_json::from_str(&result.stdout).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].status.file_events.len(), 1);
}

#[test]
fn test_config_example_is_valid() {
    let temp_dir = TempDir::new().unwrap();

    let result = FwatchCommand::new(temp_dir.path())
        .args(&["config", "--example"])
        .assert_success()
        .unwrap();

    let config: DaemonConfig = toml::from_str(&result.stdout).unwrap();
    config.validate().unwrap();
}

#[test]
fn test_config_reads_env_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("custom.toml");
    std::fs::write(&path, "[controller]\nrequeue_interval_secs = 7\n").unwrap();

    let result = FwatchCommand::new(temp_dir.path())
        .env("FWATCH_CONFIG", path.to_str().unwrap())
        .args(&["config", "--toml"])
        .assert_success()
        .unwrap();

    let config: DaemonConfig = toml::from_str(&result.stdout).unwrap();
    assert_eq!(config.controller.requeue_interval_secs, 7);
}
