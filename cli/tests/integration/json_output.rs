//! JSON output integration tests for vcp CLI.

#[path = "../common/mod.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::TestFixture;
use serde_json::Value;
use std::ffi::OsStr;
use std::fs;

fn run_json(args: &[&OsStr]) -> (Option<i32>, Value) {
    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("--output").arg("json").args(args);
    let output = cmd.output().unwrap();
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    (output.status.code(), value)
}

#[test]
fn test_json_summary_for_copy() {
    let fixture = TestFixture::new();
    fixture.create_tree();
    let src = fixture.src.path().join("tree");
    let dst = fixture.dst.path().join("tree");

    let (code, value) = run_json(&[src.as_os_str(), dst.as_os_str()]);

    assert_eq!(code, Some(0));
    assert_eq!(value["schema_version"], "1.0");
    assert_eq!(value["mode"], "copy");
    assert_eq!(value["stage"], "completed");
    assert_eq!(value["success"], true);
    // Three directories and four files.
    assert_eq!(value["items_copied"], 7);
    assert_eq!(value["bytes"], 22);
    assert_eq!(value["effective_config"]["conflict_policy"], "skip");
    assert_eq!(value["effective_config"]["error_policy"], "stop");
    assert_eq!(value["effective_config"]["symlink_mode"], "preserve");
    assert!(value["failures"].as_array().unwrap().is_empty());
}

#[test]
fn test_json_reports_skips() {
    let fixture = TestFixture::new();
    let src = fixture.src.path().join("a.txt");
    fs::write(&src, "new").unwrap();
    fs::write(fixture.dst.path().join("a.txt"), "old").unwrap();

    let (code, value) = run_json(&[src.as_os_str(), fixture.dst.path().as_os_str()]);

    assert_eq!(code, Some(0));
    assert_eq!(value["items_copied"], 0);
    assert_eq!(value["items_skipped"], 1);
}

#[test]
fn test_json_reports_failures() {
    let fixture = TestFixture::new();
    let src = fixture.src.path().join("item");
    fs::write(&src, "file").unwrap();
    fs::create_dir(fixture.dst.path().join("item")).unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    let output = cmd
        .args(["--output", "json", "-c", "overwrite", "--verify", "always"])
        .arg(&src)
        .arg(fixture.dst.path())
        .output()
        .unwrap();
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(value["success"], false);
    assert_eq!(value["stage"], "stopped");
    assert_eq!(value["effective_config"]["conflict_policy"], "overwrite");
    assert_eq!(value["effective_config"]["verification"], "always");
    let failures = value["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 1);
    assert!(
        failures[0]["reason"]
            .as_str()
            .unwrap()
            .contains("is a directory")
    );
}

#[test]
fn test_json_move_mode() {
    let fixture = TestFixture::new();
    let src = fixture.src.path().join("m.txt");
    fs::write(&src, "move me").unwrap();
    let dst = fixture.dst.path().join("m.txt");

    let (code, value) = run_json(&[OsStr::new("--move"), src.as_os_str(), dst.as_os_str()]);

    assert_eq!(code, Some(0));
    assert_eq!(value["mode"], "move");
    assert!(!src.exists());
    fixture.assert_file_content(&dst, "move me");
}
