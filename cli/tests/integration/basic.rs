//! Basic functionality integration tests for vcp CLI.

#[path = "../common/mod.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::TestFixture;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_basic_file_copy() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();

    fs::write(src.path().join("test.txt"), "hello world").unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg(src.path().join("test.txt"))
        .arg(dst.path().join("test.txt"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Copied 1 items"));

    assert_eq!(
        fs::read_to_string(dst.path().join("test.txt")).unwrap(),
        "hello world"
    );
    assert!(src.path().join("test.txt").exists());
}

#[test]
fn test_directory_copy_to_new_name() {
    let fixture = TestFixture::new();
    fixture.create_tree();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg(fixture.src.path().join("tree"))
        .arg(fixture.dst.path().join("copied"))
        .assert()
        .success();

    let copied = fixture.dst.path().join("copied");
    fixture.assert_file_content(&copied.join("a.txt"), "alpha");
    fixture.assert_file_content(&copied.join("sub/c.txt"), "charlie");
    fixture.assert_file_content(&copied.join("sub/deeper/d.txt"), "delta");
    assert_eq!(fixture.count_files_recursive(&copied), 4);
}

#[test]
fn test_directory_copy_into_existing_directory() {
    let fixture = TestFixture::new();
    fixture.create_tree();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg(fixture.src.path().join("tree"))
        .arg(fixture.dst.path())
        .assert()
        .success();

    fixture.assert_file_content(&fixture.dst.path().join("tree/b.txt"), "bravo");
}

#[test]
fn test_copy_multiple_sources() {
    let src1 = TempDir::new().unwrap();
    let src2 = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();

    fs::write(src1.path().join("file1.txt"), "content1").unwrap();
    fs::write(src2.path().join("file2.txt"), "content2").unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg(src1.path().join("file1.txt"))
        .arg(src2.path().join("file2.txt"))
        .arg(dst.path().join("dest"))
        .assert()
        .success();

    assert!(dst.path().join("dest/file1.txt").exists());
    assert!(dst.path().join("dest/file2.txt").exists());
}

#[test]
fn test_target_directory_flag() {
    let fixture = TestFixture::new();
    fs::write(fixture.src.path().join("one.txt"), "1").unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("-t")
        .arg(fixture.dst.path().join("inbox"))
        .arg(fixture.src.path().join("one.txt"))
        .assert()
        .success();

    fixture.assert_file_content(&fixture.dst.path().join("inbox/one.txt"), "1");
}

#[test]
fn test_move_directory() {
    let fixture = TestFixture::new();
    fixture.create_tree();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("--move")
        .arg(fixture.src.path().join("tree"))
        .arg(fixture.dst.path().join("moved"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Moved"));

    assert!(!fixture.src.path().join("tree").exists());
    fixture.assert_file_content(&fixture.dst.path().join("moved/sub/deeper/d.txt"), "delta");
}

#[test]
fn test_verify_always() {
    let fixture = TestFixture::new();
    fixture.create_tree();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("--verify")
        .arg("always")
        .arg("--buffer-size")
        .arg("4")
        .arg(fixture.src.path().join("tree"))
        .arg(fixture.dst.path().join("tree"))
        .assert()
        .success()
        .stdout(predicate::str::contains("4 verified"));
}

#[cfg(unix)]
#[test]
fn test_symlink_preserved() {
    let fixture = TestFixture::new();
    fs::write(fixture.src.path().join("target.txt"), "t").unwrap();
    std::os::unix::fs::symlink("target.txt", fixture.src.path().join("link")).unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg(fixture.src.path().join("link"))
        .arg(fixture.dst.path().join("link"))
        .assert()
        .success();

    let copied = fixture.dst.path().join("link");
    assert!(fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&copied).unwrap(), std::path::Path::new("target.txt"));
}

#[cfg(unix)]
#[test]
fn test_permissions_preserved() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = TestFixture::new();
    let file = fixture.src.path().join("script.sh");
    fs::write(&file, "#!/bin/sh").unwrap();
    fs::set_permissions(&file, fs::Permissions::from_mode(0o751)).unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg(&file)
        .arg(fixture.dst.path().join("script.sh"))
        .assert()
        .success();

    let mode = fs::metadata(fixture.dst.path().join("script.sh"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o751);
}

#[test]
fn test_quiet_mode() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();

    fs::write(src.path().join("test.txt"), "content").unwrap();

    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("--quiet")
        .arg(src.path().join("test.txt"))
        .arg(dst.path().join("test.txt"))
        .assert()
        .success();
    // Note: --quiet only disables progress bar, not summary output

    assert!(dst.path().join("test.txt").exists());
}

#[test]
fn test_help_flag() {
    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("vcp"))
        .stdout(predicate::str::contains("--on-conflict"));
}

#[test]
fn test_version_flag() {
    let mut cmd = cargo_bin_cmd!("vcp");
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vcp"));
}
