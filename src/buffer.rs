//! Limited run buffer.

use rayon;

use crate::record::{Record, RECORD_SIZE};

const MAX_PREALLOCATED: usize = 4096;

/// Number of whole records fitting into `bytes` bytes, at least one.
pub fn records_limit(bytes: u64) -> usize {
    let limit = (bytes / RECORD_SIZE as u64).max(1);
    usize::try_from(limit).unwrap_or(usize::MAX)
}

/// In-memory run buffer limited by records count.
pub struct RunBuffer {
    limit: usize,
    inner: Vec<Record>,
}

impl RunBuffer {
    pub fn new(limit: usize) -> Self {
        RunBuffer {
            limit,
            inner: Vec::with_capacity(limit.min(MAX_PREALLOCATED)),
        }
    }

    /// Adds a new record to the buffer.
    pub fn push(&mut self, record: Record) {
        self.inner.push(record);
    }

    /// Returns buffer length
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }
}

impl IntoIterator for RunBuffer {
    type Item = Record;
    type IntoIter = <Vec<Record> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl rayon::slice::ParallelSliceMut<Record> for RunBuffer {
    fn as_parallel_slice_mut(&mut self) -> &mut [Record] {
        self.inner.as_mut_slice()
    }
}

#[cfg(test)]
mod test {
    use rayon::slice::ParallelSliceMut;

    use super::{records_limit, RunBuffer};
    use crate::record::test::record;

    #[test]
    fn test_run_buffer() {
        let mut buffer = RunBuffer::new(2);

        buffer.push(record(2, 0));
        assert_eq!(buffer.is_full(), false);
        buffer.push(record(1, 0));
        assert_eq!(buffer.is_full(), true);

        buffer.par_sort_unstable();
        let data = Vec::from_iter(buffer);
        assert_eq!(data, vec![record(1, 0), record(2, 0)]);
    }

    #[test]
    fn test_byte_limit() {
        assert_eq!(records_limit(1000), 10);
        assert_eq!(records_limit(1099), 10);
        assert_eq!(records_limit(10), 1);
        assert_eq!(records_limit(1024 * 1024), 10485);
    }
}
