//! core::commit
//!
//! The commit and per-file change data model.
//!
//! # Ownership
//!
//! A [`Commit`] is immutable once assembled by the log parser and is owned
//! exclusively by the consumer that received it from the walk. It holds no
//! handle back to the repository; fetching file content at a commit goes
//! through [`crate::Repository`].

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::core::types::Oid;

/// An author or committer identity with a timezone-aware instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// Instant with the original UTC offset, as git reported it.
    pub date: DateTime<FixedOffset>,
}

/// How a file changed in a commit, merged from git's numstat and summary
/// reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    ModeChanged,
}

/// A numstat line count: a non-negative number, or git's `-` marker for
/// binary files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineCount {
    Lines(u64),
    Binary,
}

impl LineCount {
    /// The count, or `None` for binary files.
    pub fn lines(&self) -> Option<u64> {
        match self {
            LineCount::Lines(n) => Some(*n),
            LineCount::Binary => None,
        }
    }
}

/// One file's change within a commit.
///
/// `path` is the post-change path; `old_path` is present only for renames.
/// When log parsing ran with both change formats enabled, `kind` has been
/// confirmed against git's summary stream and `mode` carries the octal
/// file mode the summary reported (creates and deletes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub kind: ChangeKind,
    pub additions: LineCount,
    pub deletions: LineCount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// A single commit, as parsed from one `git log` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// The commit hash; also the commit's identity.
    pub hash: Oid,
    pub tree_hash: Oid,
    /// Ordered parents: empty for a root commit, two or more for a merge.
    pub parent_hashes: Vec<Oid>,
    pub author: Signature,
    pub committer: Signature,
    /// The commit's declared encoding, empty when git reports none.
    pub encoding: String,
    /// Full message body, trailing newlines trimmed.
    pub message: String,
    /// Decoration labels attached at log time (`HEAD -> main`, tags, ...).
    pub ref_names: Vec<String>,
    /// Per-file changes; empty unless change parsing was requested.
    pub changes: Vec<Change>,
}

impl Commit {
    /// Whether this commit has no parents.
    pub fn is_root(&self) -> bool {
        self.parent_hashes.is_empty()
    }

    /// Whether this commit has two or more parents.
    pub fn is_merge(&self) -> bool {
        self.parent_hashes.len() >= 2
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Paths touched by this commit that still exist afterwards.
    ///
    /// Deletions are omitted; for renames the new path is returned. This is
    /// the path set a replay tool fetches to materialize the commit's
    /// snapshot delta.
    pub fn changed_paths(&self) -> Vec<&str> {
        self.changes
            .iter()
            .filter(|c| c.kind != ChangeKind::Deleted)
            .map(|c| c.path.as_str())
            .collect()
    }
}

impl std::fmt::Display for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.hash.short(7), self.summary())
    }
}
