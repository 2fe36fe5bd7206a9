//! Error handling integration tests for vcp CLI.

#[path = "../common/mod.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::TestFixture;
use predicates::prelude::*;
use std::fs;

#[test]
fn test_source_not_found() {
    let fixture = TestFixture::new();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg(fixture.src.path().join("missing.txt"))
        .arg(fixture.dst.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Source does not exist"));
}

#[test]
fn test_missing_destination_operand() {
    let fixture = TestFixture::new();
    fs::write(fixture.src.path().join("a.txt"), "a").unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg(fixture.src.path().join("a.txt"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Missing destination operand"));
}

#[test]
fn test_multiple_sources_into_file() {
    let fixture = TestFixture::new();
    fs::write(fixture.src.path().join("a.txt"), "a").unwrap();
    fs::write(fixture.src.path().join("b.txt"), "b").unwrap();
    fs::write(fixture.dst.path().join("target"), "file").unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg(fixture.src.path().join("a.txt"))
        .arg(fixture.src.path().join("b.txt"))
        .arg(fixture.dst.path().join("target"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("is not a directory"));
}

#[test]
fn test_target_directory_is_file() {
    let fixture = TestFixture::new();
    fs::write(fixture.src.path().join("a.txt"), "a").unwrap();
    fs::write(fixture.dst.path().join("target"), "file").unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("-t")
        .arg(fixture.dst.path().join("target"))
        .arg(fixture.src.path().join("a.txt"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Target is not a directory"));
}

#[test]
fn test_overwrite_directory_with_file_fails() {
    let fixture = TestFixture::new();
    fs::write(fixture.src.path().join("item"), "file").unwrap();
    fs::create_dir(fixture.dst.path().join("item")).unwrap();
    fs::write(fixture.dst.path().join("item/keep.txt"), "keep").unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("-c")
        .arg("overwrite")
        .arg(fixture.src.path().join("item"))
        .arg(fixture.dst.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("is a directory"));

    fixture.assert_file_content(&fixture.dst.path().join("item/keep.txt"), "keep");
}

#[test]
fn test_on_error_skip_continues() {
    let fixture = TestFixture::new();
    fs::write(fixture.src.path().join("item"), "file").unwrap();
    fs::write(fixture.src.path().join("other.txt"), "other").unwrap();
    fs::create_dir(fixture.dst.path().join("item")).unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("-c")
        .arg("overwrite")
        .arg("--on-error")
        .arg("skip")
        .arg(fixture.src.path().join("item"))
        .arg(fixture.src.path().join("other.txt"))
        .arg(fixture.dst.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot open destination"));

    fixture.assert_file_content(&fixture.dst.path().join("other.txt"), "other");
    assert!(fixture.dst.path().join("item").is_dir());
}
