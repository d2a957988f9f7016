//! graph
//!
//! Lightweight revision-graph walker over `git rev-list`.
//!
//! Where the log walk assembles full [`Commit`](crate::Commit) records,
//! this walk yields [`RevisionNode`]s (hash, timestamp, tree, parents,
//! children) and nothing else. It is the cheap path for questions that
//! only need graph shape plus time, like mapping a wall-clock instant to
//! the nearest prior commit.
//!
//! # Wire format
//!
//! `git rev-list --children --reverse --pretty=%aI %T %P` emits two
//! physical lines per logical record:
//!
//! ```text
//! commit <hash> <child-hash>*
//! <author-date> <tree-hash> <parent-hash>*
//! ```
//!
//! Decoding is strict here: every byte of this stream is git-generated
//! structure, so undecodable bytes mean a broken stream, not odd commit
//! content.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::core::types::Oid;
use crate::error::{Error, Result};
use crate::process::{GitCommand, LineStream};
use crate::text::decode_strict;

/// One commit's position in the revision graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionNode {
    pub hash: Oid,
    /// Author instant with original offset.
    pub date: DateTime<FixedOffset>,
    pub tree_hash: Oid,
    pub parent_hashes: Vec<Oid>,
    pub children_hashes: Vec<Oid>,
}

/// Consumer-side controls for a graph walk.
#[derive(Debug, Clone, Default)]
pub struct GraphOptions {
    /// Order parents before children even when timestamps disagree.
    pub topo_order: bool,
    /// Walk all refs instead of just branches.
    pub all: bool,
    /// Records to discard before yielding.
    pub skip: usize,
    /// Stop after this many yielded nodes.
    pub max_count: Option<usize>,
    /// Restrict the walk to these paths.
    pub paths: Vec<String>,
}

/// Build the `git rev-list` invocation for the given options.
pub(crate) fn command(repo: &crate::Repository, opts: &GraphOptions) -> GitCommand {
    let mut cmd = GitCommand::new(repo.path(), "rev-list")
        .arg("--children")
        .arg("--reverse")
        .arg("--pretty=%aI %T %P");
    if opts.topo_order {
        cmd = cmd.arg("--topo-order");
    }
    let git_args = repo.git_args();
    if opts.all {
        if !git_args.iter().any(|a| a == "--all") {
            cmd = cmd.arg("--all");
        }
    } else if !git_args.iter().any(|a| a == "--branches") {
        cmd = cmd.arg("--branches");
    }
    cmd = cmd.args(git_args.iter().cloned());
    if !opts.paths.is_empty() {
        cmd = cmd.arg("--").args(opts.paths.iter().cloned());
    }
    cmd
}

/// Parses the two-line record grammar.
#[derive(Default)]
pub(crate) struct NodeParser {
    /// Header already seen: (hash, children).
    pending: Option<(Oid, Vec<Oid>)>,
}

impl NodeParser {
    /// Feed one line; a node completes on every second line.
    pub(crate) fn feed(&mut self, line: &str) -> Result<Option<RevisionNode>> {
        let mut tokens = line.split_whitespace();
        if line.starts_with("commit ") {
            if self.pending.is_some() {
                return Err(Error::Parse(format!(
                    "two header lines in a row: {line:?}"
                )));
            }
            tokens.next(); // the "commit" keyword
            let hash = tokens
                .next()
                .ok_or_else(|| Error::Parse(format!("header without hash: {line:?}")))
                .and_then(parse_oid)?;
            let children = tokens.map(parse_oid).collect::<Result<_>>()?;
            self.pending = Some((hash, children));
            return Ok(None);
        }

        let (hash, children_hashes) = self.pending.take().ok_or_else(|| {
            Error::Parse(format!("detail line without a header: {line:?}"))
        })?;
        let date = tokens
            .next()
            .ok_or_else(|| Error::Parse("empty detail line".to_string()))?;
        let date = DateTime::parse_from_rfc3339(date)
            .map_err(|e| Error::Parse(format!("bad date {date:?}: {e}")))?;
        let tree_hash = tokens
            .next()
            .ok_or_else(|| Error::Parse(format!("detail line without tree: {line:?}")))
            .and_then(parse_oid)?;
        let parent_hashes = tokens.map(parse_oid).collect::<Result<_>>()?;

        Ok(Some(RevisionNode {
            hash,
            date,
            tree_hash,
            parent_hashes,
            children_hashes,
        }))
    }

    /// End of stream: a dangling header is a truncated record.
    pub(crate) fn finish(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Err(Error::Parse("stream ended mid-record".to_string()));
        }
        Ok(())
    }
}

fn parse_oid(s: &str) -> Result<Oid> {
    Oid::new(s).map_err(|e| Error::Parse(e.to_string()))
}

/// A lazy, one-shot walk over revision-graph nodes, oldest first.
pub struct NodeWalk {
    stream: Option<LineStream>,
    parser: NodeParser,
    skip: usize,
    remaining: Option<usize>,
}

impl NodeWalk {
    pub(crate) fn new(stream: LineStream, opts: &GraphOptions) -> Self {
        Self {
            stream: Some(stream),
            parser: NodeParser::default(),
            skip: opts.skip,
            remaining: opts.max_count,
        }
    }

    /// OS process id of the underlying git process, if still running.
    pub fn pid(&self) -> Option<u32> {
        self.stream.as_ref().map(LineStream::pid)
    }

    fn fail(&mut self, err: Error) -> Option<Result<RevisionNode>> {
        self.stream = None;
        Some(Err(err))
    }
}

impl Iterator for NodeWalk {
    type Item = Result<RevisionNode>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            self.stream = None;
            return None;
        }
        loop {
            let stream = self.stream.as_mut()?;
            match stream.next_line() {
                Err(err) => return self.fail(err),
                Ok(None) => {
                    self.stream = None;
                    if let Err(err) = self.parser.finish() {
                        return Some(Err(err));
                    }
                    return None;
                }
                Ok(Some(bytes)) => {
                    let line = match decode_strict(&bytes) {
                        Ok(line) => line,
                        Err(err) => return self.fail(err),
                    };
                    match self.parser.feed(&line) {
                        Err(err) => return self.fail(err),
                        Ok(Some(node)) => {
                            if self.skip > 0 {
                                self.skip -= 1;
                                continue;
                            }
                            if let Some(remaining) = self.remaining.as_mut() {
                                *remaining -= 1;
                                if *remaining == 0 {
                                    self.stream = None;
                                }
                            }
                            return Some(Ok(node));
                        }
                        Ok(None) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H0: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const H1: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const TREE: &str = "cccccccccccccccccccccccccccccccccccccccc";

    fn feed_all(lines: &[String]) -> Result<Vec<RevisionNode>> {
        let mut parser = NodeParser::default();
        let mut nodes = Vec::new();
        for line in lines {
            if let Some(node) = parser.feed(line)? {
                nodes.push(node);
            }
        }
        parser.finish()?;
        Ok(nodes)
    }

    #[test]
    fn root_node_with_child() {
        let lines = vec![
            format!("commit {H0} {H1}"),
            format!("2021-06-01T12:00:00+02:00 {TREE} "),
        ];
        let nodes = feed_all(&lines).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].hash.as_str(), H0);
        assert_eq!(nodes[0].children_hashes[0].as_str(), H1);
        assert!(nodes[0].parent_hashes.is_empty());
        assert_eq!(nodes[0].tree_hash.as_str(), TREE);
    }

    #[test]
    fn tip_node_without_children() {
        let lines = vec![
            format!("commit {H1}"),
            format!("2021-06-02T09:00:00+00:00 {TREE} {H0}"),
        ];
        let nodes = feed_all(&lines).unwrap();
        assert!(nodes[0].children_hashes.is_empty());
        assert_eq!(nodes[0].parent_hashes[0].as_str(), H0);
    }

    #[test]
    fn two_records_in_sequence() {
        let lines = vec![
            format!("commit {H0} {H1}"),
            format!("2021-06-01T12:00:00+02:00 {TREE} "),
            format!("commit {H1}"),
            format!("2021-06-02T09:00:00+00:00 {TREE} {H0}"),
        ];
        let nodes = feed_all(&lines).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].hash.as_str(), H0);
        assert_eq!(nodes[1].hash.as_str(), H1);
    }

    #[test]
    fn detail_without_header_is_parse_error() {
        let lines = vec![format!("2021-06-01T12:00:00+02:00 {TREE} ")];
        assert!(matches!(feed_all(&lines), Err(Error::Parse(_))));
    }

    #[test]
    fn doubled_header_is_parse_error() {
        let lines = vec![format!("commit {H0}"), format!("commit {H1}")];
        assert!(matches!(feed_all(&lines), Err(Error::Parse(_))));
    }

    #[test]
    fn dangling_header_at_eof_is_parse_error() {
        let lines = vec![format!("commit {H0}")];
        assert!(matches!(feed_all(&lines), Err(Error::Parse(_))));
    }

    #[test]
    fn bad_date_is_parse_error() {
        let lines = vec![format!("commit {H0}"), format!("whenever {TREE} ")];
        assert!(matches!(feed_all(&lines), Err(Error::Parse(_))));
    }
}
