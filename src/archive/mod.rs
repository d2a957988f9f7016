//! archive
//!
//! Point-in-time file content via `git archive`.
//!
//! # Architecture
//!
//! Tar parsing needs random access and a still-writing pipe is not
//! seekable, so the whole `git archive` stream is buffered in memory
//! before parsing begins; this is the one walk that is not
//! incremental. The buffer is owned by [`Archive`]; every
//! [`FileHandle`] borrows it, so the borrow checker enforces the
//! contract that handles do not outlive the archive call that produced
//! them.
//!
//! # Miss vs. empty
//!
//! Requesting specific paths that do not exist at the revision makes
//! git fail (or produce an unparseable stream); that surfaces as
//! [`Error::Invocation`] carrying git's stderr. With no path filter, an
//! empty or unreadable result is a valid empty tree and yields zero
//! files. [`crate::Repository::read_file`] layers the absent-result
//! contract on top: `Ok(None)` for a missing path at a valid revision.

pub(crate) mod tar;

use std::cell::OnceCell;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::process::GitCommand;
use crate::text::{self, TextMode};

use tar::Segments;

/// All regular files of one tree-ish, buffered and parsed.
#[derive(Debug)]
pub struct Archive {
    buffer: Vec<u8>,
    entries: Vec<tar::Entry>,
}

impl Archive {
    /// Run the prepared `git archive` command and parse its output.
    ///
    /// `filtered` says whether specific paths were requested, which
    /// decides how an unparseable buffer is reported.
    pub(crate) fn from_command(cmd: GitCommand, filtered: bool) -> Result<Self> {
        let command = cmd.command_line();
        let captured = cmd.output()?;
        match tar::parse(&captured.stdout) {
            Ok(entries) => Ok(Self {
                buffer: captured.stdout,
                entries,
            }),
            Err(err) if filtered => {
                debug!(%command, %err, "archive stream unparseable with path filter");
                Err(Error::Invocation {
                    command,
                    stderr: captured.stderr,
                })
            }
            Err(err) => {
                // No filter: an unreadable result is an empty tree.
                debug!(%command, %err, "treating unparseable archive as empty");
                Ok(Self {
                    buffer: Vec::new(),
                    entries: Vec::new(),
                })
            }
        }
    }

    /// An archive with no files, used when there is nothing to fetch.
    pub(crate) fn empty() -> Self {
        Self {
            buffer: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Number of regular files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all regular files, in archive order.
    pub fn files(&self) -> impl Iterator<Item = FileHandle<'_>> {
        self.entries.iter().map(|entry| FileHandle {
            buffer: &self.buffer,
            entry,
            cache: OnceCell::new(),
        })
    }

    /// Look up one file by its exact archive path.
    pub fn file(&self, name: &str) -> Option<FileHandle<'_>> {
        self.files().find(|f| f.name() == name)
    }
}

/// One regular file's content at one revision.
///
/// Content is read lazily and cached on first access. The handle
/// borrows the archive's buffer and becomes unusable once the
/// [`Archive`] goes out of scope.
#[derive(Debug)]
pub struct FileHandle<'a> {
    buffer: &'a [u8],
    entry: &'a tar::Entry,
    cache: OnceCell<Vec<u8>>,
}

impl FileHandle<'_> {
    /// Path inside the repository.
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    /// Size in bytes as the tar header declares it.
    pub fn size(&self) -> u64 {
        self.entry.size
    }

    /// Modification time as a unix timestamp (the commit time, for
    /// `git archive` output).
    pub fn mtime(&self) -> i64 {
        self.entry.mtime
    }

    /// Modification time as an instant.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.entry.mtime, 0)
    }

    /// Raw bytes, materialized on first call.
    ///
    /// Contiguous entries are served straight from the shared buffer;
    /// sparse entries concatenate their (offset, length) segments once
    /// and cache the result.
    pub fn data(&self) -> &[u8] {
        match &self.entry.segments {
            Segments::Contiguous { offset, len } => &self.buffer[*offset..*offset + *len],
            Segments::Sparse(segments) => self
                .cache
                .get_or_init(|| {
                    let total = segments.iter().map(|&(_, len)| len).sum();
                    let mut data = Vec::with_capacity(total);
                    for &(offset, len) in segments {
                        data.extend_from_slice(&self.buffer[offset..offset + len]);
                    }
                    data
                })
                .as_slice(),
        }
    }

    /// Content as text under the given decoding mode.
    pub fn text(&self, mode: TextMode) -> Result<String> {
        text::decode(self.data(), mode)
    }

    /// Content parsed as JSON.
    pub fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_slice(self.data())
            .map_err(|e| Error::Parse(format!("invalid json in {}: {e}", self.entry.name)))
    }

    /// Detach from the archive buffer into an owned value.
    pub fn to_content(&self) -> FileContent {
        FileContent {
            name: self.entry.name.clone(),
            size: self.entry.size,
            mtime: self.entry.mtime,
            data: self.data().to_vec(),
        }
    }
}

/// An owned copy of one file, independent of any archive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub name: String,
    pub size: u64,
    pub mtime: i64,
    pub data: Vec<u8>,
}

impl FileContent {
    /// Content as text under the given decoding mode.
    pub fn text(&self, mode: TextMode) -> Result<String> {
        text::decode(&self.data, mode)
    }

    /// Content parsed as JSON.
    pub fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_slice(&self.data)
            .map_err(|e| Error::Parse(format!("invalid json in {}: {e}", self.name)))
    }
}
