//! Full-mesh peer transport.
//!
//! Every node is a client of each of its peers (outbound connections, written by the dispatch loop only) and a
//! server for each of them (inbound connections, each read by a dedicated reader thread). Connections are never
//! re-established: once open they live until the run ends.

use std::io;
use std::io::prelude::*;
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use log;

use crate::barrier::{Completion, Delivery, TerminationBarrier};
use crate::record::{read_frame, write_frame, Frame, Record, RecordSink};
use crate::SortError;

/// Peer dialing retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between two consecutive attempts.
    pub delay: Duration,
    /// Maximum number of attempts, [`None`] means retry forever.
    pub max_attempts: Option<usize>,
}

impl RetryPolicy {
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        RetryPolicy { delay, max_attempts }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            delay: Duration::from_millis(250),
            max_attempts: None,
        }
    }
}

/// Outbound connection factory.
pub trait Connector {
    type Stream: Write;

    /// Opens a connection to `addr`.
    fn connect(&self, addr: &str) -> io::Result<Self::Stream>;
}

/// TCP connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, addr: &str) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        return Ok(stream);
    }
}

/// Dials `addr` until the connection is established or the policy gives up.
/// On failure returns the last dialing error.
pub fn connect_with_retry<C: Connector>(connector: &C, addr: &str, policy: &RetryPolicy) -> io::Result<C::Stream> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match connector.connect(addr) {
            Ok(stream) => {
                log::debug!("connected to {} (attempt: {})", addr, attempt);
                return Ok(stream);
            }
            Err(err) => {
                if policy.max_attempts.map_or(false, |max| attempt >= max) {
                    return Err(err);
                }
                log::debug!("{} not reachable yet: {}, retrying", addr, err);
                thread::sleep(policy.delay);
            }
        }
    }
}

/// Outbound connections to every peer, opened on first use.
pub struct Outbound<C: Connector> {
    connector: C,
    policy: RetryPolicy,
    node_id: usize,
    addresses: Vec<String>,
    streams: Vec<Option<io::BufWriter<C::Stream>>>,
    sent: Vec<usize>,
}

impl<C: Connector> Outbound<C> {
    /// Creates an outbound connection table.
    ///
    /// # Arguments
    /// * `connector` - Connection factory
    /// * `policy` - Dialing retry policy
    /// * `node_id` - Id of the local node, never dialed
    /// * `addresses` - Peer addresses indexed by node id
    pub fn new(connector: C, policy: RetryPolicy, node_id: usize, addresses: Vec<String>) -> Self {
        let streams = addresses.iter().map(|_| None).collect();
        let sent = vec![0; addresses.len()];
        Outbound {
            connector,
            policy,
            node_id,
            addresses,
            streams,
            sent,
        }
    }

    /// Peer ids, the local node excluded.
    pub fn peers(&self) -> impl Iterator<Item = usize> {
        let node_id = self.node_id;
        (0..self.addresses.len()).filter(move |&peer| peer != node_id)
    }

    /// Number of data frames sent to every node.
    pub fn sent(&self) -> &[usize] {
        &self.sent
    }

    /// Returns an open connection to `peer`, dialing it if needed.
    pub fn connect(&mut self, peer: usize) -> Result<&mut io::BufWriter<C::Stream>, SortError> {
        debug_assert!(peer != self.node_id, "node never connects to itself");

        if self.streams[peer].is_none() {
            let addr = &self.addresses[peer];
            log::debug!("connecting to server {} ({})", peer, addr);
            let stream =
                connect_with_retry(&self.connector, addr, &self.policy).map_err(|err| SortError::Connect(peer, err))?;
            self.streams[peer] = Some(io::BufWriter::new(stream));
        }

        match self.streams[peer].as_mut() {
            Some(stream) => Ok(stream),
            None => unreachable!("connection is established above"),
        }
    }

    /// Sends a data frame to `peer`.
    pub fn send(&mut self, peer: usize, record: Record) -> Result<(), SortError> {
        let stream = self.connect(peer)?;
        write_frame(stream, &Frame::Data(record)).map_err(|err| SortError::Send(peer, err))?;
        self.sent[peer] += 1;
        return Ok(());
    }

    /// Sends a terminator frame to every peer, including peers that never received data.
    pub fn terminate_all(&mut self) -> Result<(), SortError> {
        let peers: Vec<usize> = self.peers().collect();
        for peer in peers {
            let stream = self.connect(peer)?;
            write_frame(stream, &Frame::Terminator)
                .and_then(|_| stream.flush())
                .map_err(|err| SortError::Send(peer, err))?;
            log::debug!("terminator sent to server {} after {} records", peer, self.sent[peer]);
        }
        return Ok(());
    }
}

/// Reads frames from a single inbound connection until its terminator.
/// Data records are forwarded to `queue`. The queue is closed when the function returns;
/// a decoding error is forwarded before that.
pub fn receive_frames<R: Read>(mut reader: R, queue: Sender<Delivery>) {
    loop {
        match read_frame(&mut reader) {
            Ok(Frame::Data(record)) => {
                log::trace!("received {:?}", record);
                if queue.send(Ok(record)).is_err() {
                    // collector is gone
                    return;
                }
            }
            Ok(Frame::Terminator) => return,
            Err(err) => {
                if let Err(undelivered) = queue.send(Err(err)) {
                    // collector is gone, it already failed on another connection
                    log::debug!("stream error not delivered: {:?}", undelivered.into_inner());
                }
                return;
            }
        }
    }
}

/// Inbound side of the node: accept loop followed by the collector.
pub struct Inbound<S> {
    handle: thread::JoinHandle<Result<Completion<S>, SortError>>,
}

impl<S> Inbound<S> {
    /// Blocks until every peer has connected and sent its terminator.
    /// Returns the sink holding every received record.
    pub fn wait(self) -> Result<S, SortError> {
        let completion = match self.handle.join() {
            Ok(result) => result?,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        completion.wait()
    }
}

/// Spawns the accept loop. It accepts exactly as many connections as the barrier expects, starts a reader
/// thread for each of them and then hands the queues over to the barrier collector feeding `sink`.
pub fn spawn_accept_loop<S>(listener: TcpListener, mut barrier: TerminationBarrier, sink: S) -> Inbound<S>
where
    S: RecordSink + Send + 'static,
{
    let handle = thread::spawn(move || {
        while !barrier.is_ready() {
            let (stream, addr) = listener.accept().map_err(SortError::Accept)?;
            log::debug!("accepted connection from {} ({} remaining)", addr, barrier.remaining() - 1);

            let (sender, receiver) = crossbeam_channel::unbounded();
            thread::Builder::new()
                .name(format!("reader-{}", addr))
                .spawn(move || receive_frames(io::BufReader::new(stream), sender))
                .map_err(SortError::IO)?;

            barrier.register(addr.to_string(), receiver);
        }
        log::info!("all peers connected");

        return Ok(barrier.spawn_collector(sink));
    });

    return Inbound { handle };
}
