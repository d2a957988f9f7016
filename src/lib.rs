//! Repohist - streaming git history extraction for archival replay
//!
//! Repohist turns a git repository into structured history (commit
//! metadata, per-file change classification, and point-in-time file
//! content) without a checkout, by driving the installed `git` binary
//! and parsing its textual output incrementally.
//!
//! # Architecture
//!
//! The crate is layered, leaves first:
//!
//! - [`process`] - Subprocess runner: spawns git, streams stdout, and
//!   guarantees the child is reaped on every exit path
//! - [`text`] - Byte decoding policy shared by all parsers
//! - [`core`] - Domain types: [`Oid`], [`Commit`], [`Change`]
//! - [`log`] - `git log` record parser and change classification
//! - [`graph`] - Lightweight revision-graph walker over `git rev-list`
//! - [`segment`] - Bounded linear-branch segmentation of a commit stream
//! - [`archive`] - Tar-backed file reader over `git archive`
//! - [`repo`] - [`Repository`], the single entry point tying it together
//!
//! # Correctness Invariants
//!
//! 1. The repository is never mutated; every operation is a read-only
//!    view over the object database at call time
//! 2. Every walk owns its subprocess; dropping the walk kills and reaps it
//! 3. Malformed git output fails the current walk, never a later one
//!
//! # Example
//!
//! ```ignore
//! use repohist::{LogOptions, Repository};
//!
//! let repo = Repository::new("/path/to/repo");
//! for commit in repo.log(&LogOptions::default())? {
//!     let commit = commit?;
//!     println!("{} {}", commit.hash.short(7), commit.summary());
//! }
//! ```

pub mod archive;
pub mod core;
pub mod error;
pub mod graph;
pub mod log;
pub mod process;
pub mod repo;
pub mod segment;
pub mod text;

pub use archive::{Archive, FileContent, FileHandle};
pub use self::core::commit::{Change, ChangeKind, Commit, LineCount, Signature};
pub use self::core::types::Oid;
pub use error::{Error, Result};
pub use graph::{GraphOptions, RevisionNode};
pub use log::LogOptions;
pub use repo::Repository;
pub use segment::SegmentOptions;
pub use text::TextMode;
