//! log::changes
//!
//! Merges git's two per-file change report formats into one taxonomy.
//!
//! With `--numstat --summary`, git emits two interleaved views of the
//! same file set after each log record:
//!
//! ```text
//! 3       1       src/{old.rs => new.rs}
//! 12      0       added.txt
//!  create mode 100644 added.txt
//!  rename src/{old.rs => new.rs} (85%)
//! ```
//!
//! The numstat pass builds one [`Change`] per file (default kind
//! `Modified`, renames decoded from the path syntax); the summary pass
//! then overwrites the kind and records the mode on the already-built
//! entry. The two streams are assumed path-consistent: a summary line
//! with no matching numstat entry means the installed git speaks a
//! different dialect, and the walk fails rather than guessing.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::commit::{Change, ChangeKind, LineCount};
use crate::error::{Error, Result};

static NUMSTAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-|\d+)\s(-|\d+)\s(.*)$").expect("numstat pattern"));

static SUMMARY_MODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(create|delete) mode (\d{6}) (.+)$").expect("summary pattern"));

static MODE_CHANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^mode change (\d{6}) => (\d{6}) (.+)$").expect("mode change pattern")
});

static MULTI_SLASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/+").expect("slash pattern"));

/// Accumulates the change block of one log record.
#[derive(Debug, Default)]
pub(crate) struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Classify and absorb one line from the change block.
    ///
    /// Blank separator lines are ignored. A non-blank line matching
    /// neither the numstat nor the summary grammar is a fatal
    /// [`Error::Parse`].
    pub(crate) fn parse_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        if let Some(caps) = NUMSTAT.captures(line) {
            self.push_numstat(&caps[1], &caps[2], &caps[3])?;
            return Ok(());
        }

        // Similarity report lines restate what the numstat path syntax
        // already carries.
        if line.starts_with("rename ") || line.starts_with("copy ") || line.starts_with("rewrite ")
        {
            return Ok(());
        }

        if let Some(caps) = SUMMARY_MODE.captures(line) {
            let kind = match &caps[1] {
                "create" => ChangeKind::Added,
                _ => ChangeKind::Deleted,
            };
            return self.apply_summary(kind, &caps[2], &caps[3]);
        }

        if let Some(caps) = MODE_CHANGE.captures(line) {
            return self.apply_summary(ChangeKind::ModeChanged, &caps[2], &caps[3]);
        }

        Err(Error::Parse(format!("unrecognized change line: {line:?}")))
    }

    /// The assembled changes, in numstat order.
    pub(crate) fn into_changes(self) -> Vec<Change> {
        self.changes
    }

    fn push_numstat(&mut self, additions: &str, deletions: &str, path: &str) -> Result<()> {
        let (path, old_path, kind) = match split_rename(path) {
            Some((old, new)) => (new, Some(old), ChangeKind::Renamed),
            None => (path.to_string(), None, ChangeKind::Modified),
        };
        self.changes.push(Change {
            path,
            kind,
            additions: parse_count(additions)?,
            deletions: parse_count(deletions)?,
            old_path,
            mode: None,
        });
        Ok(())
    }

    fn apply_summary(&mut self, kind: ChangeKind, mode: &str, path: &str) -> Result<()> {
        match self.changes.iter_mut().find(|c| c.path == path) {
            Some(change) => {
                change.kind = kind;
                change.mode = Some(mode.to_string());
                Ok(())
            }
            None => Err(Error::Parse(format!(
                "summary reports {path:?} but numstat never mentioned it"
            ))),
        }
    }
}

/// Count field: a number, or `-` for binary files.
fn parse_count(field: &str) -> Result<LineCount> {
    if field == "-" {
        return Ok(LineCount::Binary);
    }
    field
        .parse::<u64>()
        .map(LineCount::Lines)
        .map_err(|_| Error::Parse(format!("bad numstat count: {field:?}")))
}

/// Decode git's rename path syntax into (old, new).
///
/// Two forms exist: flat (`old.txt => new.txt`) and abbreviated brace
/// (`dir/{old.txt => new.txt}/x`), where the part outside the braces is
/// shared. An empty brace side (`dir/{ => sub}/x`) leaves a doubled
/// separator behind, which is collapsed.
fn split_rename(path: &str) -> Option<(String, String)> {
    if !path.contains(" => ") {
        return None;
    }

    if let (Some(open), Some(close)) = (path.find('{'), path.find('}')) {
        if open < close {
            let middle = &path[open + 1..close];
            if let Some((old_mid, new_mid)) = middle.split_once(" => ") {
                let prefix = &path[..open];
                let suffix = &path[close + 1..];
                return Some((
                    collapse_slashes(&format!("{prefix}{old_mid}{suffix}")),
                    collapse_slashes(&format!("{prefix}{new_mid}{suffix}")),
                ));
            }
        }
    }

    let (old, new) = path.split_once(" => ")?;
    Some((
        collapse_slashes(old),
        collapse_slashes(new),
    ))
}

fn collapse_slashes(path: &str) -> String {
    MULTI_SLASH.replace_all(path, "/").into_owned()
}
