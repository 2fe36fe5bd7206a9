//! Conflict policy integration tests for vcp CLI.

#[path = "../common/mod.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::TestFixture;
use predicates::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

fn fixture_with_conflict() -> TestFixture {
    let fixture = TestFixture::new();
    fs::write(fixture.src.path().join("file.txt"), "new content").unwrap();
    fs::write(fixture.dst.path().join("file.txt"), "old").unwrap();
    fixture
}

#[test]
fn test_skip_is_default() {
    let fixture = fixture_with_conflict();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg(fixture.src.path().join("file.txt"))
        .arg(fixture.dst.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to transfer (1 items skipped)"));

    fixture.assert_file_content(&fixture.dst.path().join("file.txt"), "old");
}

#[test]
fn test_overwrite() {
    let fixture = fixture_with_conflict();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("--on-conflict")
        .arg("overwrite")
        .arg(fixture.src.path().join("file.txt"))
        .arg(fixture.dst.path())
        .assert()
        .success();

    fixture.assert_file_content(&fixture.dst.path().join("file.txt"), "new content");
}

#[test]
fn test_update_skips_newer_destination() {
    let fixture = fixture_with_conflict();
    let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
    set_mtime(&fixture.src.path().join("file.txt"), past);

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("-c")
        .arg("update")
        .arg(fixture.src.path().join("file.txt"))
        .arg(fixture.dst.path())
        .assert()
        .success();

    fixture.assert_file_content(&fixture.dst.path().join("file.txt"), "old");
}

#[test]
fn test_update_replaces_older_destination() {
    let fixture = fixture_with_conflict();
    let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
    set_mtime(&fixture.dst.path().join("file.txt"), past);

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("-c")
        .arg("update")
        .arg(fixture.src.path().join("file.txt"))
        .arg(fixture.dst.path())
        .assert()
        .success();

    fixture.assert_file_content(&fixture.dst.path().join("file.txt"), "new content");
}

#[test]
fn test_append() {
    let fixture = TestFixture::new();
    fs::write(fixture.src.path().join("log.txt"), "tail").unwrap();
    fs::write(fixture.dst.path().join("log.txt"), "head").unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("-c")
        .arg("append")
        .arg(fixture.src.path().join("log.txt"))
        .arg(fixture.dst.path())
        .assert()
        .success();

    fixture.assert_file_content(&fixture.dst.path().join("log.txt"), "headtail");
}

#[test]
fn test_error_conflict_stops() {
    let fixture = fixture_with_conflict();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("-c")
        .arg("error")
        .arg(fixture.src.path().join("file.txt"))
        .arg(fixture.dst.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("destination exists"));

    fixture.assert_file_content(&fixture.dst.path().join("file.txt"), "old");
}

#[test]
fn test_skip_leaves_other_items_alone() {
    let fixture = fixture_with_conflict();
    fs::write(fixture.src.path().join("fresh.txt"), "fresh").unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg(fixture.src.path().join("file.txt"))
        .arg(fixture.src.path().join("fresh.txt"))
        .arg(fixture.dst.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 skipped"));

    fixture.assert_file_content(&fixture.dst.path().join("fresh.txt"), "fresh");
    fixture.assert_file_content(&fixture.dst.path().join("file.txt"), "old");
}
