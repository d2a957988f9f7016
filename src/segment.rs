//! segment
//!
//! Groups a chronological commit stream into bounded linear branches.
//!
//! # Purpose
//!
//! A replay tool that processes history incrementally wants to take a
//! contiguous run of commits, process it, and come back later, without
//! re-walking from the start and without holding the whole history in
//! memory. Segmentation buffers commits into straight-line branches and
//! flushes each branch once extending it would push it past
//! `branch_length` commits, or once it outlives `branch_age` incoming
//! commits.
//!
//! # Ordering
//!
//! Within one flushed branch, commits are oldest-to-newest. Across
//! branches the emission order interleaves as branches flush, so the
//! output is *not* a strict total order over all commits. Callers that
//! need total order use the unsegmented walk.
//!
//! The branch list, ages, and flush bookkeeping live entirely inside
//! this module; a "branch" here is an accounting construct, not a git
//! ref.

use std::collections::VecDeque;

use crate::core::commit::Commit;
use crate::error::Result;

/// Flush thresholds for the segmenter.
#[derive(Debug, Clone)]
pub struct SegmentOptions {
    /// Maximum commits buffered per branch before it flushes.
    pub branch_length: usize,
    /// Maximum incoming commits a branch survives before it flushes.
    pub branch_age: usize,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            branch_length: 100,
            branch_age: 100,
        }
    }
}

/// One open branch: buffered commits plus an age counter.
#[derive(Debug)]
struct OpenBranch {
    age: usize,
    commits: Vec<Commit>,
}

impl OpenBranch {
    fn new(commit: Commit) -> Self {
        Self {
            age: 0,
            commits: vec![commit],
        }
    }

    fn tip_is_parent_of(&self, commit: &Commit) -> bool {
        // Branches are never empty between steps.
        let tip = &self.commits[self.commits.len() - 1];
        commit.parent_hashes.contains(&tip.hash)
    }
}

/// Iterator adapter that regroups commits into bounded linear branches.
///
/// Input errors pass through and end the segmentation; commits buffered
/// at that point are dropped with the failed walk.
pub struct Segmented<I> {
    inner: I,
    opts: SegmentOptions,
    branches: Vec<OpenBranch>,
    ready: VecDeque<Commit>,
    done: bool,
}

impl<I> Segmented<I>
where
    I: Iterator<Item = Result<Commit>>,
{
    pub fn new(inner: I, opts: &SegmentOptions) -> Self {
        Self {
            inner,
            opts: opts.clone(),
            branches: Vec::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }

    /// Place one incoming commit, then run the accounting pass.
    fn push(&mut self, commit: Commit) {
        if commit.parent_hashes.is_empty() {
            self.branches.push(OpenBranch::new(commit));
        } else {
            // First branch whose tip is a parent wins; this is the
            // tie-break for branches that could both extend at a merge.
            match self
                .branches
                .iter()
                .position(|b| b.tip_is_parent_of(&commit))
            {
                Some(i) if self.branches[i].commits.len() >= self.opts.branch_length => {
                    // Extending would exceed the bound: flush the buffered
                    // run and let the commit start a fresh branch.
                    let branch = self.branches.remove(i);
                    self.ready.extend(branch.commits);
                    self.branches.push(OpenBranch::new(commit));
                }
                Some(i) => self.branches[i].commits.push(commit),
                None => self.branches.push(OpenBranch::new(commit)),
            }
        }

        // Accounting runs once per incoming commit across all open
        // branches, whether or not any of them was extended.
        for branch in &mut self.branches {
            branch.age += 1;
        }
        let mut i = 0;
        while i < self.branches.len() {
            if self.branches[i].age > self.opts.branch_age {
                let branch = self.branches.remove(i);
                self.ready.extend(branch.commits);
            } else {
                i += 1;
            }
        }
    }

    /// End of input: flush remaining branches in creation order.
    fn flush_all(&mut self) {
        for branch in self.branches.drain(..) {
            self.ready.extend(branch.commits);
        }
    }
}

impl<I> Iterator for Segmented<I>
where
    I: Iterator<Item = Result<Commit>>,
{
    type Item = Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(commit) = self.ready.pop_front() {
                return Some(Ok(commit));
            }
            if self.done {
                return None;
            }
            match self.inner.next() {
                Some(Ok(commit)) => self.push(commit),
                Some(Err(err)) => {
                    self.done = true;
                    self.branches.clear();
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    self.flush_all();
                }
            }
        }
    }
}
