//! Sorted runs.

use std::fs;
use std::io;
use std::io::prelude::*;
use std::vec;

use tempfile;

use crate::record::{Record, RecordReader};

/// Sorted run spilled to a temporary file. Records are stored back to back in their raw 100-byte layout.
pub struct RecordChunk {
    reader: RecordReader<io::Take<io::BufReader<fs::File>>>,
}

impl RecordChunk {
    /// Dumps `records` to a new anonymous file in `dir`.
    pub fn build(
        dir: &tempfile::TempDir,
        records: impl IntoIterator<Item = Record>,
        buf_size: Option<usize>,
    ) -> io::Result<Self> {
        let tmp_file = tempfile::tempfile_in(dir)?;

        let mut chunk_writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, tmp_file.try_clone()?),
            None => io::BufWriter::new(tmp_file.try_clone()?),
        };

        for record in records.into_iter() {
            chunk_writer.write_all(record.as_bytes())?;
        }
        chunk_writer.flush()?;

        let mut chunk_reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, tmp_file.try_clone()?),
            None => io::BufReader::new(tmp_file.try_clone()?),
        };

        chunk_reader.rewind()?;
        let file_len = tmp_file.metadata()?.len();

        return Ok(RecordChunk {
            reader: RecordReader::new(chunk_reader.take(file_len)),
        });
    }
}

impl Iterator for RecordChunk {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next()
    }
}

/// Sorted run, either kept in memory or spilled to disk.
pub enum Run {
    Memory(vec::IntoIter<Record>),
    Spilled(RecordChunk),
}

impl Iterator for Run {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Run::Memory(records) => records.next().map(Ok),
            Run::Spilled(chunk) => chunk.next(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use rstest::*;

    use super::{RecordChunk, Run};
    use crate::record::test::record;
    use crate::record::Record;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    #[case(None)]
    #[case(Some(7))]
    fn test_record_chunk(tmp_dir: tempfile::TempDir, #[case] buf_size: Option<usize>) {
        let saved = Vec::from_iter((0..100).map(|i| record(i, 100 - i)));

        let chunk = RecordChunk::build(&tmp_dir, saved.clone(), buf_size).unwrap();

        let restored: io::Result<Vec<Record>> = chunk.collect();
        assert_eq!(restored.unwrap(), saved);
    }

    #[rstest]
    fn test_empty_chunk(tmp_dir: tempfile::TempDir) {
        let mut chunk = RecordChunk::build(&tmp_dir, Vec::new(), None).unwrap();
        assert!(chunk.next().is_none());
    }

    #[test]
    fn test_memory_run() {
        let run = Run::Memory(vec![record(1, 1), record(2, 2)].into_iter());
        let restored: io::Result<Vec<Record>> = run.collect();
        assert_eq!(restored.unwrap(), vec![record(1, 1), record(2, 2)]);
    }
}
