//! error
//!
//! Crate-wide error taxonomy.
//!
//! # Design
//!
//! Failures come in four kinds, and each is scoped to the call or walk
//! that raised it:
//!
//! - [`Error::Invocation`] - git exited non-zero. Carries the command
//!   line and captured stderr. Never retried.
//! - [`Error::Io`] - git could not be spawned or its pipes could not be
//!   read.
//! - [`Error::Parse`] - output violated the expected fixed grammar
//!   (wrong field count, unparseable date or hash, unmatched summary
//!   line, unrecognized change line). Signals a grammar or tooling
//!   mismatch, not a transient condition.
//! - [`Error::Encoding`] - bytes undecodable under the strict text mode.
//!
//! A path absent at a revision is *not* an error: lookups return
//! `Ok(None)` for that case.

use thiserror::Error;

/// Errors from history extraction.
#[derive(Debug, Error)]
pub enum Error {
    /// Git exited non-zero.
    #[error("`{command}` failed: {}", stderr.trim_end())]
    Invocation {
        /// The command line that was run.
        command: String,
        /// Captured stderr of the failed process.
        stderr: String,
    },

    /// Git could not be spawned or its output could not be read.
    #[error("`{command}`: {source}")]
    Io {
        /// The command line that was being run.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Output did not match the expected grammar.
    #[error("unexpected git output: {0}")]
    Parse(String),

    /// Bytes undecodable in strict text mode.
    #[error("undecodable text: {0}")]
    Encoding(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_display_trims_stderr() {
        let err = Error::Invocation {
            command: "git log".to_string(),
            stderr: "fatal: bad revision\n".to_string(),
        };
        assert_eq!(err.to_string(), "`git log` failed: fatal: bad revision");
    }

    #[test]
    fn parse_display() {
        let err = Error::Parse("expected 11 fields, got 3".to_string());
        assert!(err.to_string().contains("expected 11 fields"));
    }
}
