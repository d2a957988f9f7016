//! log
//!
//! The `git log` record parser: the crate's main walk.
//!
//! # Wire format
//!
//! `git log` is run with a fixed `--pretty` format built from two
//! sentinel delimiter lines (chosen to be implausible inside commit
//! content) and one line per field:
//!
//! ```text
//! <delimiter-1>
//! <hash> <tree_hash> <parents> <author name/email/date>
//! <committer name/email/date> <ref_names> <encoding>   (one line each)
//! <message body, any number of lines>
//! <delimiter-2>
//! <numstat and summary lines, when change parsing is on>
//! ```
//!
//! The field list is a static table ([`FIELDS`]): placeholder, target
//! field, and the transform applied to the raw line. The transform set
//! is closed (identity, list splits, date parse), so a record is
//! assembled by indexing the table with the current field position, not
//! by dispatching on field names.
//!
//! # State machine
//!
//! `AwaitingStart → Field(0..N) → Message → Changes → (next record)`.
//! Delimiter-1 completes any pending record and starts the next;
//! delimiter-2 ends the message; everything after it up to the next
//! delimiter-1 belongs to the change classifier. At end of stream the
//! pending record is completed and the exit status checked.
//!
//! The walk is a one-shot, forward-only lazy iterator: each `next()`
//! pulls lines from the subprocess until one more record is complete.
//! Skip and max-count are applied here, after assembly, never pushed
//! into the git invocation.

pub(crate) mod changes;

use chrono::{DateTime, FixedOffset};
use tracing::trace;

use crate::core::commit::{Change, Commit, Signature};
use crate::core::types::Oid;
use crate::error::{Error, Result};
use crate::process::{GitCommand, LineStream};
use crate::text::decode_lossy;

use changes::ChangeSet;

/// Starts a record. Never appears in real commit content.
const DELIMITER1: &str = "===1#repohist#record#delimiter#===";
/// Ends the message body.
const DELIMITER2: &str = "===2#repohist#record#delimiter#===";

/// Where a fixed field's value ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Hash,
    TreeHash,
    ParentHashes,
    AuthorName,
    AuthorEmail,
    AuthorDate,
    CommitterName,
    CommitterEmail,
    CommitterDate,
    RefNames,
    Encoding,
}

/// The closed set of line transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transform {
    /// The raw line, unchanged.
    Text,
    /// Whitespace-split into an ordered list.
    SpaceList,
    /// Comma-split into an ordered list.
    CommaList,
    /// ISO-8601 with offset.
    Date,
}

struct FieldSpec {
    placeholder: &'static str,
    field: Field,
    transform: Transform,
}

/// Placeholder → field → transform, in wire order.
const FIELDS: [FieldSpec; 11] = [
    FieldSpec { placeholder: "%H", field: Field::Hash, transform: Transform::Text },
    FieldSpec { placeholder: "%T", field: Field::TreeHash, transform: Transform::Text },
    FieldSpec { placeholder: "%P", field: Field::ParentHashes, transform: Transform::SpaceList },
    FieldSpec { placeholder: "%an", field: Field::AuthorName, transform: Transform::Text },
    FieldSpec { placeholder: "%ae", field: Field::AuthorEmail, transform: Transform::Text },
    FieldSpec { placeholder: "%aI", field: Field::AuthorDate, transform: Transform::Date },
    FieldSpec { placeholder: "%cn", field: Field::CommitterName, transform: Transform::Text },
    FieldSpec { placeholder: "%ce", field: Field::CommitterEmail, transform: Transform::Text },
    FieldSpec { placeholder: "%cI", field: Field::CommitterDate, transform: Transform::Date },
    FieldSpec { placeholder: "%D", field: Field::RefNames, transform: Transform::CommaList },
    FieldSpec { placeholder: "%e", field: Field::Encoding, transform: Transform::Text },
];

/// Consumer-side controls for a log walk.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Walk newest-to-oldest instead of the oldest-first default.
    pub newest_first: bool,
    /// Records to discard after assembly, before yielding.
    pub skip: usize,
    /// Stop after this many yielded commits.
    pub max_count: Option<usize>,
    /// Parse per-file numstat/summary change output.
    pub changes: bool,
    /// Restrict the walk to these paths.
    pub paths: Vec<String>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            newest_first: false,
            skip: 0,
            max_count: None,
            changes: true,
            paths: Vec::new(),
        }
    }
}

/// Build the `git log` invocation for the given options.
pub(crate) fn command(repo: &crate::Repository, opts: &LogOptions) -> GitCommand {
    let mut cmd = GitCommand::new(repo.path(), "log");
    if opts.changes {
        cmd = cmd.arg("--numstat").arg("--summary");
    }

    let mut pretty = format!("--pretty={DELIMITER1}%n");
    for spec in &FIELDS {
        pretty.push_str(spec.placeholder);
        pretty.push_str("%n");
    }
    pretty.push_str("%B%n");
    pretty.push_str(DELIMITER2);
    cmd = cmd.arg(pretty);

    cmd = cmd.args(repo.git_args().iter().cloned());
    if !opts.newest_first {
        cmd = cmd.arg("--reverse");
    }
    if !opts.paths.is_empty() {
        cmd = cmd.arg("--").args(opts.paths.iter().cloned());
    }
    cmd
}

/// Record assembly state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingStart,
    Field(usize),
    Message,
    Changes,
}

/// Per-record accumulator.
#[derive(Default)]
struct RecordBuilder {
    hash: Option<Oid>,
    tree_hash: Option<Oid>,
    parent_hashes: Vec<Oid>,
    author_name: Option<String>,
    author_email: Option<String>,
    author_date: Option<DateTime<FixedOffset>>,
    committer_name: Option<String>,
    committer_email: Option<String>,
    committer_date: Option<DateTime<FixedOffset>>,
    ref_names: Vec<String>,
    encoding: String,
    message_lines: Vec<String>,
    message_done: bool,
    changes: ChangeSet,
}

impl RecordBuilder {
    fn apply(&mut self, spec: &FieldSpec, line: &str) -> Result<()> {
        match (spec.field, spec.transform) {
            (Field::Hash, _) => self.hash = Some(parse_oid(line)?),
            (Field::TreeHash, _) => self.tree_hash = Some(parse_oid(line)?),
            (Field::ParentHashes, _) => {
                self.parent_hashes = line
                    .split_whitespace()
                    .map(parse_oid)
                    .collect::<Result<_>>()?;
            }
            (Field::AuthorName, _) => self.author_name = Some(line.to_string()),
            (Field::AuthorEmail, _) => self.author_email = Some(line.to_string()),
            (Field::AuthorDate, _) => self.author_date = Some(parse_date(line)?),
            (Field::CommitterName, _) => self.committer_name = Some(line.to_string()),
            (Field::CommitterEmail, _) => self.committer_email = Some(line.to_string()),
            (Field::CommitterDate, _) => self.committer_date = Some(parse_date(line)?),
            (Field::RefNames, Transform::CommaList) => {
                self.ref_names = if line.trim().is_empty() {
                    Vec::new()
                } else {
                    line.split(", ").map(str::to_string).collect()
                };
            }
            (Field::RefNames, _) => unreachable!("ref names are comma-split"),
            (Field::Encoding, _) => self.encoding = line.to_string(),
        }
        Ok(())
    }

    fn build(self, with_changes: bool) -> Result<Commit> {
        if !self.message_done {
            return Err(Error::Parse(
                "record ended before the message terminator".to_string(),
            ));
        }
        let missing = || Error::Parse("record is missing fixed fields".to_string());

        let message = self
            .message_lines
            .join("\n")
            .trim_end_matches('\n')
            .to_string();
        let changes: Vec<Change> = if with_changes {
            self.changes.into_changes()
        } else {
            Vec::new()
        };

        Ok(Commit {
            hash: self.hash.ok_or_else(missing)?,
            tree_hash: self.tree_hash.ok_or_else(missing)?,
            parent_hashes: self.parent_hashes,
            author: Signature {
                name: self.author_name.ok_or_else(missing)?,
                email: self.author_email.ok_or_else(missing)?,
                date: self.author_date.ok_or_else(missing)?,
            },
            committer: Signature {
                name: self.committer_name.ok_or_else(missing)?,
                email: self.committer_email.ok_or_else(missing)?,
                date: self.committer_date.ok_or_else(missing)?,
            },
            encoding: self.encoding,
            message,
            ref_names: self.ref_names,
            changes,
        })
    }
}

fn parse_oid(s: &str) -> Result<Oid> {
    Oid::new(s).map_err(|e| Error::Parse(e.to_string()))
}

fn parse_date(s: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).map_err(|e| Error::Parse(format!("bad date {s:?}: {e}")))
}

/// The record-level state machine, fed one decoded line at a time.
///
/// Pure with respect to I/O, so it is testable on synthetic line
/// sequences without a subprocess.
pub(crate) struct RecordParser {
    state: State,
    builder: Option<RecordBuilder>,
    parse_changes: bool,
}

impl RecordParser {
    pub(crate) fn new(parse_changes: bool) -> Self {
        Self {
            state: State::AwaitingStart,
            builder: None,
            parse_changes,
        }
    }

    /// Feed one line; returns a commit when the line completed a record.
    pub(crate) fn feed(&mut self, line: &str) -> Result<Option<Commit>> {
        if line == DELIMITER1 {
            let completed = self.take_pending()?;
            self.state = State::Field(0);
            self.builder = Some(RecordBuilder::default());
            return Ok(completed);
        }

        match self.state {
            State::AwaitingStart => {
                if line.trim().is_empty() {
                    Ok(None)
                } else {
                    Err(Error::Parse(format!("output before first record: {line:?}")))
                }
            }
            State::Field(index) => {
                if line == DELIMITER2 {
                    return Err(Error::Parse(format!(
                        "record ended after {index} of {} fields",
                        FIELDS.len()
                    )));
                }
                let builder = self.builder.as_mut().ok_or_else(|| {
                    Error::Parse("field line outside a record".to_string())
                })?;
                builder.apply(&FIELDS[index], line)?;
                self.state = if index + 1 == FIELDS.len() {
                    State::Message
                } else {
                    State::Field(index + 1)
                };
                Ok(None)
            }
            State::Message => {
                let builder = self.builder.as_mut().ok_or_else(|| {
                    Error::Parse("message line outside a record".to_string())
                })?;
                if line == DELIMITER2 {
                    builder.message_done = true;
                    self.state = State::Changes;
                } else {
                    builder.message_lines.push(line.to_string());
                }
                Ok(None)
            }
            State::Changes => {
                if self.parse_changes {
                    let builder = self.builder.as_mut().ok_or_else(|| {
                        Error::Parse("change line outside a record".to_string())
                    })?;
                    builder.changes.parse_line(line)?;
                    Ok(None)
                } else if line.trim().is_empty() {
                    Ok(None)
                } else {
                    Err(Error::Parse(format!("unexpected trailing line: {line:?}")))
                }
            }
        }
    }

    /// Flush the pending record at end of stream.
    pub(crate) fn finish(&mut self) -> Result<Option<Commit>> {
        self.state = State::AwaitingStart;
        self.take_pending()
    }

    fn take_pending(&mut self) -> Result<Option<Commit>> {
        match self.builder.take() {
            Some(builder) => {
                let commit = builder.build(self.parse_changes)?;
                trace!(hash = %commit.hash, "assembled commit record");
                Ok(Some(commit))
            }
            None => Ok(None),
        }
    }
}

/// A lazy, one-shot walk over `git log` records.
///
/// Yields `Result<Commit>`; the first error ends the walk. Dropping the
/// walk early terminates the underlying process.
pub struct CommitWalk {
    stream: Option<LineStream>,
    parser: RecordParser,
    skip: usize,
    remaining: Option<usize>,
    done: bool,
}

impl CommitWalk {
    pub(crate) fn new(stream: LineStream, opts: &LogOptions) -> Self {
        Self {
            stream: Some(stream),
            parser: RecordParser::new(opts.changes),
            skip: opts.skip,
            remaining: opts.max_count,
            done: false,
        }
    }

    /// OS process id of the underlying git process, if still running.
    pub fn pid(&self) -> Option<u32> {
        self.stream.as_ref().map(LineStream::pid)
    }

    fn fail(&mut self, err: Error) -> Option<Result<Commit>> {
        self.done = true;
        self.stream = None;
        Some(Err(err))
    }

    /// Apply skip/max-count accounting to an assembled record.
    fn admit(&mut self, commit: Commit) -> Option<Commit> {
        if self.skip > 0 {
            self.skip -= 1;
            return None;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                // Reached the cap: stop pulling and release the process.
                self.done = true;
                self.stream = None;
            }
        }
        Some(commit)
    }
}

impl Iterator for CommitWalk {
    type Item = Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done && self.stream.is_none() {
            return None;
        }
        if self.remaining == Some(0) {
            self.done = true;
            self.stream = None;
            return None;
        }
        loop {
            let stream = self.stream.as_mut()?;
            match stream.next_line() {
                Err(err) => return self.fail(err),
                Ok(None) => {
                    self.done = true;
                    self.stream = None;
                    match self.parser.finish() {
                        Err(err) => return Some(Err(err)),
                        Ok(Some(commit)) => return self.admit(commit).map(Ok),
                        Ok(None) => return None,
                    }
                }
                Ok(Some(bytes)) => {
                    // Lenient decoding keeps a long walk alive across one
                    // strangely-encoded message.
                    let line = decode_lossy(&bytes);
                    match self.parser.feed(&line) {
                        Err(err) => return self.fail(err),
                        Ok(Some(commit)) => {
                            if let Some(commit) = self.admit(commit) {
                                return Some(Ok(commit));
                            }
                        }
                        Ok(None) => {}
                    }
                }
            }
        }
    }
}
