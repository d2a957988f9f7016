//! Shared integration-test fixture.
//!
//! Builds real git repositories in temp directories by driving the git
//! binary directly, so every test exercises the same wire formats the
//! crate parses in production.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use repohist::Repository;

/// Test fixture that creates a real git repository.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create an empty repository with a configured test identity.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        run_git(dir.path(), &["init", "-q"]);
        run_git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);
        Self { dir }
    }

    /// Path to the working directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A history view over this repository.
    pub fn repo(&self) -> Repository {
        Repository::new(self.path())
    }

    /// Write a file, creating parent directories as needed.
    pub fn write(&self, path: &str, content: impl AsRef<[u8]>) {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(full, content.as_ref()).expect("write file");
    }

    /// Delete a tracked file from the working directory.
    pub fn remove(&self, path: &str) {
        std::fs::remove_file(self.dir.path().join(path)).expect("remove file");
    }

    /// Stage everything and commit, returning the new commit hash.
    pub fn commit_all(&self, message: &str) -> String {
        run_git(self.path(), &["add", "-A"]);
        run_git(self.path(), &["commit", "-q", "-m", message]);
        self.head()
    }

    /// Current HEAD hash via git directly.
    pub fn head(&self) -> String {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(self.path())
            .output()
            .expect("git rev-parse failed");
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    /// Run an arbitrary git command in the repository.
    pub fn git(&self, args: &[&str]) {
        run_git(self.path(), args);
    }
}

/// Run a git command in the given directory, panicking on failure.
pub fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command failed");

    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}
