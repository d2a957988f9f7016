//! process
//!
//! The subprocess runner every walk is built on.
//!
//! # Architecture
//!
//! All git invocations flow through [`GitCommand`]. A command is either
//! run to completion with [`GitCommand::output`] (small, bounded output:
//! `rev-list --count`, `archive`, `diff`) or spawned as a [`LineStream`]
//! with [`GitCommand::stream`] (unbounded output: log and rev-list walks),
//! which exposes stdout one line at a time and never materializes the
//! whole stream.
//!
//! # Invariants
//!
//! - A `LineStream` that is dropped before end-of-stream kills and reaps
//!   its child; the guarantee holds on every exit path (early break, `?`
//!   propagation, panic unwinding) because it lives in `Drop`, not at
//!   call sites
//! - At clean end-of-stream the exit status is checked; non-zero becomes
//!   [`Error::Invocation`] with captured stderr
//! - No retries, no built-in timeout; a failure is terminal for the call
//!   that made it

use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::debug;

use crate::error::{Error, Result};

/// A fixed git subcommand with arguments, cwd bound at construction.
#[derive(Debug, Clone)]
pub struct GitCommand {
    cwd: PathBuf,
    args: Vec<String>,
}

/// Captured output of a completed git command.
#[derive(Debug)]
pub struct Captured {
    /// Raw stdout bytes.
    pub stdout: Vec<u8>,
    /// Stderr, decoded leniently. Usually empty on success, but kept so
    /// callers can attach it to downstream parse failures.
    pub stderr: String,
}

impl GitCommand {
    /// Create a command for `git <subcommand>` running in `cwd`.
    ///
    /// Normal git repository discovery applies: `cwd` may be anywhere
    /// inside a working directory.
    pub fn new(cwd: impl Into<PathBuf>, subcommand: &str) -> Self {
        Self {
            cwd: cwd.into(),
            args: vec![subcommand.to_string()],
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The full command line, for logs and error messages.
    pub fn command_line(&self) -> String {
        let mut line = String::from("git");
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// The directory the command runs in.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Run to completion and capture stdout.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if git cannot be spawned
    /// - [`Error::Invocation`] with captured stderr on non-zero exit
    pub fn output(&self) -> Result<Captured> {
        debug!(command = %self.command_line(), cwd = %self.cwd.display(), "running git");
        let output = Command::new("git")
            .args(self.args.iter().map(OsStr::new))
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.io_error(e))?;

        let stderr = crate::text::decode_lossy(&output.stderr);
        if !output.status.success() {
            return Err(Error::Invocation {
                command: self.command_line(),
                stderr,
            });
        }
        Ok(Captured {
            stdout: output.stdout,
            stderr,
        })
    }

    /// Spawn and expose stdout as an incrementally consumable line stream.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if git cannot be spawned. Exit-status failures
    /// surface from the stream itself, once stdout is drained.
    pub fn stream(self) -> Result<LineStream> {
        debug!(command = %self.command_line(), cwd = %self.cwd.display(), "streaming git");
        let mut child = Command::new("git")
            .args(self.args.iter().map(OsStr::new))
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.io_error(e))?;

        #[cfg(any(test, feature = "test_hooks"))]
        hooks::note_spawn();

        // Piped stdout always exists after a successful spawn.
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| Error::Parse("spawned git process has no stdout".to_string()))?;

        Ok(LineStream {
            command: self.command_line(),
            child,
            stdout,
            finished: false,
        })
    }

    fn io_error(&self, source: std::io::Error) -> Error {
        Error::Io {
            command: self.command_line(),
            source,
        }
    }
}

/// A spawned git process consumed one stdout line at a time.
///
/// The stream is one-shot and forward-only: once end-of-stream is
/// reached (or the stream is dropped) the process is gone, and
/// re-reading requires a new invocation.
#[derive(Debug)]
pub struct LineStream {
    command: String,
    child: Child,
    stdout: BufReader<ChildStdout>,
    /// Set once EOF was reached and the child was waited on.
    finished: bool,
}

impl LineStream {
    /// Pull the next line, without its trailing `\n`/`\r\n`.
    ///
    /// Returns `Ok(None)` at end-of-stream, after the exit status has
    /// been verified.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the pipe read fails
    /// - [`Error::Invocation`] if the process exited non-zero
    pub fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }
        let mut line = Vec::new();
        let n = self.stdout.read_until(b'\n', &mut line).map_err(|e| Error::Io {
            command: self.command.clone(),
            source: e,
        })?;
        if n == 0 {
            self.finish()?;
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// OS process id of the underlying child.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// The command line this stream runs, for error messages.
    pub fn command_line(&self) -> &str {
        &self.command
    }

    /// Wait for the child at clean EOF and check its exit status.
    fn finish(&mut self) -> Result<()> {
        self.finished = true;

        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let mut bytes = Vec::new();
            if pipe.read_to_end(&mut bytes).is_ok() {
                stderr = crate::text::decode_lossy(&bytes);
            }
        }

        let status = self.child.wait().map_err(|e| Error::Io {
            command: self.command.clone(),
            source: e,
        })?;

        #[cfg(any(test, feature = "test_hooks"))]
        hooks::note_reap();

        if !status.success() {
            return Err(Error::Invocation {
                command: self.command.clone(),
                stderr,
            });
        }
        Ok(())
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        // Consumer stopped pulling early: terminate and reap. Errors are
        // ignored; the process may already have exited.
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();

            #[cfg(any(test, feature = "test_hooks"))]
            hooks::note_reap();
        }
    }
}

/// Process-lifecycle hooks for tests.
///
/// Counters are thread-local, so concurrent tests do not interfere as
/// long as each runs on its own thread (the `cargo test` default).
/// Available under `cfg(test)` or the `test_hooks` feature; zero cost in
/// production builds.
#[cfg(any(test, feature = "test_hooks"))]
pub mod hooks {
    use std::cell::Cell;

    thread_local! {
        static SPAWNED: Cell<u64> = const { Cell::new(0) };
        static REAPED: Cell<u64> = const { Cell::new(0) };
    }

    /// Reset both counters. Call at the start of a test.
    pub fn reset() {
        SPAWNED.with(|c| c.set(0));
        REAPED.with(|c| c.set(0));
    }

    /// Streams spawned on this thread since the last [`reset`].
    pub fn spawned() -> u64 {
        SPAWNED.with(Cell::get)
    }

    /// Children waited on (clean EOF or kill-on-drop) since [`reset`].
    pub fn reaped() -> u64 {
        REAPED.with(Cell::get)
    }

    pub(crate) fn note_spawn() {
        SPAWNED.with(|c| c.set(c.get() + 1));
    }

    pub(crate) fn note_reap() {
        REAPED.with(|c| c.set(c.get() + 1));
    }
}
