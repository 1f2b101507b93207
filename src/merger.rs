//! Binary heap run merger.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io;

use crate::record::Record;

/// Merges sorted record runs into a single sorted stream.
/// Time complexity is *m* \* log(*n*) where *m* is the number of records and *n* the number of runs.
pub struct RunMerger<R>
where
    R: Iterator<Item = io::Result<Record>>,
{
    // binary heap is max-heap by default so we reverse it to convert it to min-heap
    heads: BinaryHeap<(Reverse<Record>, usize)>,
    runs: Vec<R>,
    pending: Option<io::Error>,
}

impl<R> RunMerger<R>
where
    R: Iterator<Item = io::Result<Record>>,
{
    /// Creates a merger over `runs`. Every run should be sorted in ascending order otherwise the result
    /// is undefined.
    pub fn new(runs: impl IntoIterator<Item = R>) -> Self {
        let mut runs = Vec::from_iter(runs);
        let mut heads = BinaryHeap::with_capacity(runs.len());
        let mut pending = None;

        for (idx, run) in runs.iter_mut().enumerate() {
            match run.next() {
                Some(Ok(record)) => heads.push((Reverse(record), idx)),
                Some(Err(err)) => {
                    pending = Some(err);
                    break;
                }
                None => {}
            }
        }

        return RunMerger { heads, runs, pending };
    }
}

impl<R> Iterator for RunMerger<R>
where
    R: Iterator<Item = io::Result<Record>>,
{
    type Item = io::Result<Record>;

    /// Returns the smallest record among the run heads.
    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            self.heads.clear();
            return Some(Err(err));
        }

        let (Reverse(record), idx) = self.heads.pop()?;
        match self.runs[idx].next() {
            Some(Ok(next)) => self.heads.push((Reverse(next), idx)),
            Some(Err(err)) => self.pending = Some(err),
            None => {}
        }

        return Some(Ok(record));
    }
}
