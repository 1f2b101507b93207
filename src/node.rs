//! Distributed sorting node.

use std::io::prelude::*;
use std::net::TcpListener;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log;

use crate::barrier::TerminationBarrier;
use crate::dispatch::Dispatcher;
use crate::partition::Partitioner;
use crate::record::RecordReader;
use crate::sort::{emit, RunBuilder, SortContext};
use crate::topology::Topology;
use crate::transport::{spawn_accept_loop, Outbound, RetryPolicy, TcpConnector};
use crate::SortError;

/// Node run statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Number of records read from the input shard.
    pub read: usize,
    /// Number of input records owned by the node itself.
    pub kept: usize,
    /// Number of records sent to every node, indexed by node id.
    pub sent: Vec<usize>,
    /// Number of records received from peers.
    pub received: usize,
    /// Number of records written to the output shard.
    pub written: usize,
}

/// Sorting node builder. Provides methods for [`SortNode`] initialization.
#[derive(Clone)]
pub struct SortNodeBuilder {
    /// Number of threads to be used to sort data in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Number of records a run keeps in memory before being spilled.
    buffer_limit: usize,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Peer dialing retry policy.
    retry_policy: RetryPolicy,
    /// Pause between listener start and dispatch start.
    startup_delay: Duration,
    /// Whether every peer is dialed before dispatching.
    eager_connect: bool,
}

impl SortNodeBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        SortNodeBuilder::default()
    }

    /// Builds a [`SortNode`] instance for node `id` of `topology`.
    pub fn build(self, id: usize, topology: Topology) -> Result<SortNode, SortError> {
        if topology.node(id).is_none() {
            return Err(SortError::UnknownNode(id));
        }

        let context = SortContext::new(
            self.threads_number,
            self.tmp_dir.as_deref(),
            self.buffer_limit,
            self.rw_buf_size,
        )?;

        return Ok(SortNode {
            id,
            topology,
            context: Arc::new(context),
            retry_policy: self.retry_policy,
            startup_delay: self.startup_delay,
            eager_connect: self.eager_connect,
        });
    }

    /// Sets number of threads to be used to sort data in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> SortNodeBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> SortNodeBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets number of records kept in memory before a sorted run is spilled to disk.
    pub fn with_buffer_limit(mut self, records: usize) -> SortNodeBuilder {
        self.buffer_limit = records;
        return self;
    }

    /// Sets run file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> SortNodeBuilder {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets peer dialing retry policy.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> SortNodeBuilder {
        self.retry_policy = retry_policy;
        return self;
    }

    /// Sets the pause giving peers time to start listening before dispatch begins.
    pub fn with_startup_delay(mut self, delay: Duration) -> SortNodeBuilder {
        self.startup_delay = delay;
        return self;
    }

    /// Dials every peer up front instead of on first use.
    pub fn with_eager_connect(mut self, eager_connect: bool) -> SortNodeBuilder {
        self.eager_connect = eager_connect;
        return self;
    }
}

impl Default for SortNodeBuilder {
    fn default() -> Self {
        SortNodeBuilder {
            threads_number: None,
            tmp_dir: None,
            buffer_limit: usize::MAX,
            rw_buf_size: None,
            retry_policy: RetryPolicy::default(),
            startup_delay: Duration::ZERO,
            eager_connect: false,
        }
    }
}

/// Node of a distributed sort cluster.
pub struct SortNode {
    id: usize,
    topology: Topology,
    context: Arc<SortContext>,
    retry_policy: RetryPolicy,
    startup_delay: Duration,
    eager_connect: bool,
}

impl SortNode {
    /// Starts listening on the node's own address.
    pub fn bind(&self) -> Result<TcpListener, SortError> {
        let addr = self.topology.addresses().swap_remove(self.id);
        let listener = TcpListener::bind(&addr).map_err(|err| SortError::Bind(addr.clone(), err))?;
        log::info!("server {} listening on {}", self.id, addr);
        return Ok(listener);
    }

    /// Sorts the node's share of the cluster data.
    /// Reads the input shard, exchanges records with peers and writes the sorted output shard.
    ///
    /// # Arguments
    /// * `input` - Input shard of raw records
    /// * `output` - Output shard the node's key range is written to
    pub fn run<R: Read, W: Write>(&self, input: R, output: W) -> Result<NodeStats, SortError> {
        let listener = self.bind()?;
        self.run_with_listener(listener, input, output)
    }

    /// Same as [`SortNode::run`] with an already bound listener.
    pub fn run_with_listener<R: Read, W: Write>(
        &self,
        listener: TcpListener,
        input: R,
        output: W,
    ) -> Result<NodeStats, SortError> {
        let nodes = self.topology.len();
        let partitioner = Partitioner::new(nodes);
        if partitioner.reachable() < nodes {
            log::warn!(
                "only servers 0..{} own keys, servers {}..{} receive no records",
                partitioner.reachable(),
                partitioner.reachable(),
                nodes
            );
        }

        let barrier = TerminationBarrier::new(nodes - 1);
        let inbound = spawn_accept_loop(listener, barrier, RunBuilder::new(self.context.clone()));

        if !self.startup_delay.is_zero() {
            log::debug!("waiting {:?} for peers to start", self.startup_delay);
            thread::sleep(self.startup_delay);
        }

        let outbound = Outbound::new(TcpConnector, self.retry_policy, self.id, self.topology.addresses());
        let mut dispatcher = Dispatcher::new(self.id, partitioner, outbound);
        if self.eager_connect {
            dispatcher.connect_all()?;
        }

        let mut local = RunBuilder::new(self.context.clone());
        let read = dispatcher.dispatch(RecordReader::new(input), &mut local)?;
        let dispatched = dispatcher.finish(read)?;

        log::info!("waiting for peers to finish");
        let received = inbound.wait()?;

        let stats = NodeStats {
            read: dispatched.read,
            kept: dispatched.kept,
            sent: dispatched.sent,
            received: received.len(),
            written: local.len() + received.len(),
        };

        log::info!(
            "merging {} local and {} received records ({} runs spilled)",
            stats.kept,
            stats.received,
            local.spilled() + received.spilled()
        );
        let mut runs = local.finish();
        runs.extend(received.finish());
        let written = emit(runs, output, self.context.rw_buf_size())?;
        debug_assert_eq!(written, stats.written);

        log::info!("server {} done ({} records written)", self.id, written);
        return Ok(stats);
    }
}
