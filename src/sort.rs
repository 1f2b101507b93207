//! Merge and emit stage.
//!
//! Records owned by the node are accumulated by [`RunBuilder`]s: one fed by the dispatch loop with local
//! records, one fed by the barrier collector with received records. A builder keeps records in memory until
//! its buffer is full, then sorts the buffer in parallel and spills it to a temporary file as a sorted run.
//! [`emit`] merges all runs into the output shard.

use std::io;
use std::io::prelude::*;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use log;
use rayon::slice::ParallelSliceMut;

use crate::buffer::RunBuffer;
use crate::chunk::{RecordChunk, Run};
use crate::merger::RunMerger;
use crate::record::{Record, RecordSink};
use crate::SortError;

/// Resources shared by every run builder of a node.
pub struct SortContext {
    /// Sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory to be used to store spilled runs.
    tmp_dir: tempfile::TempDir,
    /// Maximum number of records kept in memory by a single run builder.
    buffer_limit: usize,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
}

impl SortContext {
    /// Creates a new sort context.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads to be used to sort data in parallel. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    /// * `tmp_path` - Directory to be used to store temporary data. If paramater is [`None`] default OS temporary
    ///   directory will be used.
    /// * `buffer_limit` - Number of records a run builder keeps in memory before spilling them to disk.
    /// * `rw_buf_size` - Run files read/write buffer size.
    pub fn new(
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        buffer_limit: usize,
        rw_buf_size: Option<usize>,
    ) -> Result<Self, SortError> {
        return Ok(SortContext {
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
            buffer_limit: buffer_limit.max(1),
            rw_buf_size,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder.build().map_err(SortError::ThreadPoolBuildError)?;

        return Ok(thread_pool);
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, SortError> {
        let tmp_dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(SortError::TempDir)?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    pub fn rw_buf_size(&self) -> Option<usize> {
        self.rw_buf_size
    }

    fn sort(&self, buffer: &mut RunBuffer) {
        self.thread_pool.install(|| buffer.par_sort_unstable());
    }
}

/// Accumulates records into sorted runs.
pub struct RunBuilder {
    context: Arc<SortContext>,
    buffer: RunBuffer,
    spilled: Vec<RecordChunk>,
    records: usize,
}

impl RunBuilder {
    pub fn new(context: Arc<SortContext>) -> Self {
        let buffer = RunBuffer::new(context.buffer_limit);
        RunBuilder {
            context,
            buffer,
            spilled: Vec::new(),
            records: 0,
        }
    }

    /// Adds a record, spilling the buffer to disk if it is full.
    pub fn push(&mut self, record: Record) -> io::Result<()> {
        self.buffer.push(record);
        self.records += 1;

        if self.buffer.is_full() {
            self.spill()?;
        }
        return Ok(());
    }

    /// Total number of records pushed.
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Number of runs spilled to disk so far.
    pub fn spilled(&self) -> usize {
        self.spilled.len()
    }

    fn spill(&mut self) -> io::Result<()> {
        let mut buffer = mem::replace(&mut self.buffer, RunBuffer::new(self.context.buffer_limit));

        log::debug!("sorting run data ({} records) ...", buffer.len());
        self.context.sort(&mut buffer);

        log::debug!("spilling run data");
        let chunk = RecordChunk::build(&self.context.tmp_dir, buffer, self.context.rw_buf_size)?;
        self.spilled.push(chunk);

        return Ok(());
    }

    /// Sorts the records still held in memory and returns every run.
    pub fn finish(mut self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.spilled.drain(..).map(Run::Spilled).collect();
        if !self.buffer.is_empty() {
            self.context.sort(&mut self.buffer);
            runs.push(Run::Memory(self.buffer.into_iter()));
        }
        return runs;
    }
}

impl RecordSink for RunBuilder {
    fn accept(&mut self, record: Record) -> io::Result<()> {
        self.push(record)
    }
}

/// Merges sorted `runs` and writes them to `output` as contiguous records.
/// Returns the number of records written.
pub fn emit<W: Write>(runs: Vec<Run>, output: W, rw_buf_size: Option<usize>) -> Result<usize, SortError> {
    let mut output = match rw_buf_size {
        Some(buf_size) => io::BufWriter::with_capacity(buf_size, output),
        None => io::BufWriter::new(output),
    };

    log::debug!("merging {} runs", runs.len());
    let mut written = 0;
    for record in RunMerger::new(runs) {
        let record = record.map_err(SortError::IO)?;
        output.write_all(record.as_bytes()).map_err(SortError::Output)?;
        written += 1;
    }
    output.flush().map_err(SortError::Output)?;

    return Ok(written);
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use rand::seq::SliceRandom;
    use rand::Rng;
    use rstest::*;

    use super::{emit, RunBuilder, SortContext};
    use crate::record::{Record, RecordReader, RECORD_SIZE};

    fn random_records(count: usize) -> Vec<Record> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                let mut bytes = [0u8; RECORD_SIZE];
                rng.fill(&mut bytes[..]);
                Record::from_bytes(bytes)
            })
            .collect()
    }

    #[rstest]
    #[case(usize::MAX, 0)]
    #[case(100, 9)]
    #[case(33, 30)]
    #[case(1, 1000)]
    fn test_sort_with_spilling(#[case] buffer_limit: usize, #[case] spilled: usize) {
        let context = Arc::new(SortContext::new(Some(2), None, buffer_limit, None).unwrap());

        let mut input = random_records(1000);
        let mut local = RunBuilder::new(context.clone());
        let mut received = RunBuilder::new(context.clone());
        for (idx, record) in input.iter().enumerate() {
            if idx % 3 == 0 {
                local.push(*record).unwrap();
            } else {
                received.push(*record).unwrap();
            }
        }
        assert_eq!(local.len() + received.len(), 1000);
        assert_eq!(local.spilled() + received.spilled(), spilled);

        let mut runs = local.finish();
        runs.extend(received.finish());

        let mut output = Vec::new();
        let written = emit(runs, &mut output, context.rw_buf_size()).unwrap();
        assert_eq!(written, 1000);
        assert_eq!(output.len(), 1000 * RECORD_SIZE);

        input.sort();
        let restored: Vec<Record> = RecordReader::new(output.as_slice()).map(Result::unwrap).collect();
        assert_eq!(restored, input);
    }

    #[test]
    fn test_sort_by_key_bytes() {
        let context = Arc::new(SortContext::new(Some(1), None, usize::MAX, Some(512)).unwrap());

        let mut keys: Vec<[u8; 10]> = vec![[0xFF; 10], [0x00; 10], [0x7F; 10], [0x80; 10]];
        keys.shuffle(&mut rand::thread_rng());

        let mut builder = RunBuilder::new(context);
        for key in &keys {
            builder.push(Record::new(*key, [0xAA; 90])).unwrap();
        }

        let mut output = Vec::new();
        emit(builder.finish(), &mut output, None).unwrap();

        let heads: Vec<u8> = output.chunks(RECORD_SIZE).map(|chunk| chunk[0]).collect();
        assert_eq!(heads, vec![0x00, 0x7F, 0x80, 0xFF]);
    }

    #[test]
    fn test_emit_nothing() {
        let mut output = Vec::new();
        assert_eq!(emit(Vec::new(), &mut output, None).unwrap(), 0);
        assert!(output.is_empty());
    }
}
