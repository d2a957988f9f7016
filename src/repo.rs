//! repo
//!
//! Single interface for all history extraction.
//!
//! # Architecture
//!
//! [`Repository`] is the one doorway: every walk and lookup goes
//! through it, every operation spawns its own git subprocess, and
//! nothing here holds state between calls: the struct is a path plus
//! the extra git arguments applied uniformly to every sub-walk that
//! accepts them. Independent walks are therefore safe to interleave or
//! run concurrently; there is no shared mutable state to corrupt.
//!
//! # Example
//!
//! ```ignore
//! use repohist::{LogOptions, Repository, TextMode};
//!
//! let repo = Repository::new("/path/to/repo");
//! for commit in repo.log(&LogOptions::default())? {
//!     let commit = commit?;
//!     for file in repo.commit_files(&commit)?.files() {
//!         println!("{} {}", commit.hash.short(7), file.name());
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};

use crate::archive::{Archive, FileContent};
use crate::core::commit::Commit;
use crate::error::Result;
use crate::graph::{self, GraphOptions, NodeWalk};
use crate::log::{self, CommitWalk, LogOptions};
use crate::process::GitCommand;
use crate::segment::{SegmentOptions, Segmented};
use crate::text::decode_lossy;

/// A read-only view over one git repository's history.
///
/// The path may be anywhere inside a working directory; normal git
/// repository discovery applies on every invocation.
#[derive(Debug, Clone)]
pub struct Repository {
    path: PathBuf,
    git_args: Vec<String>,
}

impl Repository {
    /// View the repository at (or above) `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            git_args: Vec::new(),
        }
    }

    /// Add global git arguments applied to every sub-walk that accepts
    /// them (e.g. `--all` to widen scope, or rename-detection flags for
    /// bit-exact parity with an existing archive).
    pub fn with_git_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.git_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The directory git commands run in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn git_args(&self) -> &[String] {
        &self.git_args
    }

    /// Walk commits as full records, lazily.
    ///
    /// Oldest-first by default; see [`LogOptions`] for traversal
    /// controls. The walk is one-shot: re-reading requires a new call.
    pub fn log(&self, opts: &LogOptions) -> Result<CommitWalk> {
        let stream = log::command(self, opts).stream()?;
        Ok(CommitWalk::new(stream, opts))
    }

    /// Walk commits regrouped into bounded linear branches.
    ///
    /// Emission order is per-branch oldest-first but not a total order;
    /// use [`Repository::log`] when total order matters.
    pub fn segmented(
        &self,
        log_opts: &LogOptions,
        seg_opts: &SegmentOptions,
    ) -> Result<Segmented<CommitWalk>> {
        Ok(Segmented::new(self.log(log_opts)?, seg_opts))
    }

    /// Walk lightweight revision-graph nodes, oldest-first.
    pub fn nodes(&self, opts: &GraphOptions) -> Result<NodeWalk> {
        let stream = graph::command(self, opts).stream()?;
        Ok(NodeWalk::new(stream, opts))
    }

    /// Count commits via `git rev-list --count`.
    ///
    /// Scope defaults to `--branches`, or `--all` when `all` is set,
    /// unless the repository's git args already pick one.
    pub fn commit_count(&self, paths: &[&str], all: bool) -> Result<u64> {
        let mut cmd = self
            .cmd("rev-list")
            .arg("--count")
            .args(self.git_args.iter().cloned());
        if all {
            if !self.git_args.iter().any(|a| a == "--all") {
                cmd = cmd.arg("--all");
            }
        } else if !self.git_args.iter().any(|a| a == "--branches") {
            cmd = cmd.arg("--branches");
        }
        if !paths.is_empty() {
            cmd = cmd.arg("--").args(paths.iter().map(|s| s.to_string()));
        }
        let command = cmd.command_line();
        let captured = cmd.output()?;
        let text = decode_lossy(&captured.stdout);
        text.trim().parse::<u64>().map_err(|_| {
            crate::error::Error::Parse(format!("`{command}` produced a non-count: {text:?}"))
        })
    }

    /// The oldest commit touching `paths` (or the whole history).
    pub fn first_commit(&self, paths: &[&str]) -> Result<Option<Commit>> {
        self.edge_commit(paths, false)
    }

    /// The newest commit touching `paths` (or the whole history).
    pub fn last_commit(&self, paths: &[&str]) -> Result<Option<Commit>> {
        self.edge_commit(paths, true)
    }

    fn edge_commit(&self, paths: &[&str], newest_first: bool) -> Result<Option<Commit>> {
        let opts = LogOptions {
            newest_first,
            max_count: Some(1),
            paths: paths.iter().map(|s| s.to_string()).collect(),
            ..LogOptions::default()
        };
        self.log(&opts)?.next().transpose()
    }

    /// Raw `git diff` output between revisions.
    ///
    /// The diff is computed by git, not by this crate; the output is
    /// returned as decoded text.
    pub fn diff(&self, revisions: &[&str]) -> Result<String> {
        let captured = self
            .cmd("diff")
            .args(revisions.iter().map(|s| s.to_string()))
            .output()?;
        Ok(decode_lossy(&captured.stdout))
    }

    /// All files at a tree-ish, optionally restricted to `paths`.
    ///
    /// With a path filter, a miss (no such path at that revision)
    /// surfaces as [`crate::Error::Invocation`]; without one, an empty
    /// tree yields an empty archive.
    pub fn archive(&self, treeish: &str, paths: &[&str]) -> Result<Archive> {
        let mut cmd = self
            .cmd("archive")
            .arg("--format=tar")
            .arg(treeish.to_string());
        if !paths.is_empty() {
            cmd = cmd.args(paths.iter().map(|s| s.to_string()));
        }
        Archive::from_command(cmd, !paths.is_empty())
    }

    /// One file's content at a revision, or `None` if the path is
    /// absent there.
    ///
    /// Absence is an absent result, never an error. An invalid
    /// revision still fails with git's stderr, distinguished by
    /// resolving the revision separately.
    pub fn read_file(&self, revision: &str, path: &str) -> Result<Option<FileContent>> {
        match self.archive(revision, &[path]) {
            Ok(archive) => Ok(archive.file(path).map(|f| f.to_content())),
            Err(err) => {
                if self.resolves(revision) {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// The files created, modified, or renamed by a commit.
    ///
    /// Deletions have no content to fetch; a commit with no surviving
    /// paths yields an empty archive without spawning git.
    pub fn commit_files(&self, commit: &Commit) -> Result<Archive> {
        let paths = commit.changed_paths();
        if paths.is_empty() {
            return Ok(Archive::empty());
        }
        self.archive(commit.hash.as_str(), &paths)
    }

    /// Whether a revision string resolves to a tree-ish here.
    fn resolves(&self, revision: &str) -> bool {
        self.cmd("rev-parse")
            .arg("--verify")
            .arg("--quiet")
            .arg(format!("{revision}^{{tree}}"))
            .output()
            .is_ok()
    }

    fn cmd(&self, subcommand: &str) -> GitCommand {
        GitCommand::new(&self.path, subcommand)
    }
}
