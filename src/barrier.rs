//! Termination barrier.
//!
//! The barrier is told up front how many inbound connections it waits for. Once all of them are registered a
//! collector thread drains every connection queue into a single sink. A queue is finished when its reader closes
//! it after decoding the peer's terminator frame; the barrier fires once, after every queue is finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Select};
use log;

use crate::record::{FrameError, Record, RecordSink};
use crate::SortError;

/// Item of a connection queue: a received record or the error that stopped the reader.
pub type Delivery = Result<Record, FrameError>;

struct Source {
    name: String,
    queue: Receiver<Delivery>,
}

/// One-shot barrier over a known number of inbound record queues.
pub struct TerminationBarrier {
    expected: usize,
    sources: Vec<Source>,
}

impl TerminationBarrier {
    /// Creates a barrier waiting for `expected_sources` queues.
    pub fn new(expected_sources: usize) -> Self {
        TerminationBarrier {
            expected: expected_sources,
            sources: Vec::with_capacity(expected_sources),
        }
    }

    /// Registers a connection queue.
    ///
    /// # Panics
    /// Panics if all expected queues are already registered.
    pub fn register(&mut self, name: impl Into<String>, queue: Receiver<Delivery>) {
        assert!(!self.is_ready(), "barrier expects only {} sources", self.expected);
        self.sources.push(Source {
            name: name.into(),
            queue,
        });
    }

    /// Number of queues still to be registered.
    pub fn remaining(&self) -> usize {
        self.expected - self.sources.len()
    }

    /// Checks if every expected queue is registered.
    pub fn is_ready(&self) -> bool {
        self.sources.len() == self.expected
    }

    /// Starts the collector thread moving every delivered record into `sink`.
    ///
    /// # Panics
    /// Panics if some expected queues are not registered yet.
    pub fn spawn_collector<S>(self, sink: S) -> Completion<S>
    where
        S: RecordSink + Send + 'static,
    {
        assert!(self.is_ready(), "{} sources are not registered", self.remaining());

        let fired = Arc::new(AtomicBool::new(false));
        let collector_fired = fired.clone();
        let handle = thread::spawn(move || collect(self.sources, sink, &collector_fired));
        return Completion { handle, fired };
    }
}

fn collect<S: RecordSink>(sources: Vec<Source>, mut sink: S, fired: &AtomicBool) -> Result<S, SortError> {
    let mut select = Select::new();
    for source in &sources {
        select.recv(&source.queue);
    }

    let mut open = sources.len();
    let mut received = 0;
    while open > 0 {
        let operation = select.select();
        let idx = operation.index();
        let source = &sources[idx];
        match operation.recv(&source.queue) {
            Ok(Ok(record)) => {
                sink.accept(record).map_err(SortError::IO)?;
                received += 1;
            }
            Ok(Err(err)) => return Err(SortError::Receive(source.name.clone(), err)),
            Err(_) => {
                select.remove(idx);
                open -= 1;
                log::debug!("stream from {} finished ({} streams left)", source.name, open);
            }
        }
    }

    log::info!("received {} records from {} peers", received, sources.len());
    fired.store(true, Ordering::Release);
    return Ok(sink);
}

/// Barrier completion event.
pub struct Completion<S> {
    handle: thread::JoinHandle<Result<S, SortError>>,
    /// Set only once every queue was closed by its terminator.
    fired: Arc<AtomicBool>,
}

impl<S> Completion<S> {
    /// Checks if every queue has been drained, without blocking.
    /// A collector stopped by a reader error never fires.
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Blocks until every queue has been drained. Returns the sink holding all received records.
    pub fn wait(self) -> Result<S, SortError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod test {
    use std::thread;
    use std::time::Duration;

    use rand::Rng;

    use super::TerminationBarrier;
    use crate::record::test::record;
    use crate::record::{FrameError, Record};
    use crate::SortError;

    #[test]
    fn test_fires_after_all_terminators() {
        let mut barrier = TerminationBarrier::new(3);
        let mut senders = Vec::new();
        for peer in 0..3 {
            let (sender, receiver) = crossbeam_channel::unbounded();
            barrier.register(format!("peer-{}", peer), receiver);
            senders.push(sender);
        }
        assert!(barrier.is_ready());

        let completion = barrier.spawn_collector(Vec::new());
        let mut senders = senders.into_iter();
        let (first, second, third) = (senders.next().unwrap(), senders.next().unwrap(), senders.next().unwrap());

        // 0, 5 and 2 data frames, terminators in arbitrary order
        for i in 0..5 {
            second.send(Ok(record(0x40, i))).unwrap();
        }
        drop(first);
        third.send(Ok(record(0xC0, 0))).unwrap();
        drop(second);
        third.send(Ok(record(0xC0, 1))).unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(!completion.is_fired());

        drop(third);
        let received = completion.wait().unwrap();
        assert_eq!(received.len(), 7);
    }

    #[test]
    fn test_concurrent_producers() {
        let counts = [0usize, 5, 2];
        let mut barrier = TerminationBarrier::new(counts.len());
        let mut producers = Vec::new();
        for (peer, &count) in counts.iter().enumerate() {
            let (sender, receiver) = crossbeam_channel::unbounded();
            barrier.register(format!("peer-{}", peer), receiver);
            producers.push(thread::spawn(move || {
                for i in 0..count {
                    thread::sleep(Duration::from_millis(rand::thread_rng().gen_range(0..5)));
                    sender.send(Ok(record(peer as u8, i as u8))).unwrap();
                }
            }));
        }

        let completion = barrier.spawn_collector(Vec::new());
        let mut received: Vec<Record> = completion.wait().unwrap();
        for producer in producers {
            producer.join().unwrap();
        }

        received.sort();
        let expected: Vec<Record> = vec![
            record(1, 0),
            record(1, 1),
            record(1, 2),
            record(1, 3),
            record(1, 4),
            record(2, 0),
            record(2, 1),
        ];
        assert_eq!(received, expected);
    }

    #[test]
    fn test_no_sources_fires_immediately() {
        let barrier = TerminationBarrier::new(0);
        assert!(barrier.is_ready());
        assert!(barrier.spawn_collector(Vec::new()).wait().unwrap().is_empty());
    }

    #[test]
    fn test_reader_error_is_reported() {
        let mut barrier = TerminationBarrier::new(2);
        let (healthy, healthy_queue) = crossbeam_channel::unbounded();
        let (broken, broken_queue) = crossbeam_channel::unbounded();
        barrier.register("healthy", healthy_queue);
        barrier.register("broken", broken_queue);

        broken.send(Err(FrameError::Truncated(12))).unwrap();
        let completion = barrier.spawn_collector(Vec::new());

        thread::sleep(Duration::from_millis(100));
        assert!(!completion.is_fired());

        match completion.wait() {
            Err(SortError::Receive(name, FrameError::Truncated(12))) => assert_eq!(name, "broken"),
            other => panic!("unexpected result: {:?}", other.map(|r| r.len())),
        }
        drop(healthy);
    }

    #[test]
    #[should_panic]
    fn test_register_beyond_expected() {
        let mut barrier = TerminationBarrier::new(1);
        barrier.register("a", crossbeam_channel::unbounded().1);
        barrier.register("b", crossbeam_channel::unbounded().1);
    }
}
