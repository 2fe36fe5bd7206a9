//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A test fixture that provides source and destination directories.
pub struct TestFixture {
    pub src: TempDir,
    pub dst: TempDir,
}

impl TestFixture {
    /// Create a new test fixture with fresh source and destination directories.
    pub fn new() -> Self {
        Self {
            src: TempDir::new().expect("Failed to create temp source dir"),
            dst: TempDir::new().expect("Failed to create temp dest dir"),
        }
    }

    /// Create a nested tree under `src/tree`: two files at the top, one in
    /// `sub/` and one in `sub/deeper/`.
    pub fn create_tree(&self) {
        let root = self.src.path().join("tree");
        fs::create_dir_all(root.join("sub/deeper")).expect("Failed to create directories");
        fs::write(root.join("a.txt"), "alpha").expect("Failed to write file");
        fs::write(root.join("b.txt"), "bravo").expect("Failed to write file");
        fs::write(root.join("sub/c.txt"), "charlie").expect("Failed to write file");
        fs::write(root.join("sub/deeper/d.txt"), "delta").expect("Failed to write file");
    }

    /// Count all files in a directory recursively.
    pub fn count_files_recursive(&self, dir: &Path) -> usize {
        let mut count = 0;
        if dir.is_dir() {
            for entry in fs::read_dir(dir).expect("Failed to read directory") {
                let entry = entry.expect("Failed to read entry");
                let path = entry.path();
                if path.is_dir() {
                    count += self.count_files_recursive(&path);
                } else {
                    count += 1;
                }
            }
        }
        count
    }

    /// Check if a file exists and has the expected content.
    pub fn assert_file_content(&self, path: &Path, expected: &str) {
        assert!(path.exists(), "File does not exist: {:?}", path);
        let actual = fs::read_to_string(path).expect("Failed to read file");
        assert_eq!(actual, expected, "File content mismatch");
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
