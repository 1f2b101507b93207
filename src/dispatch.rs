//! Ingest and dispatch loop.

use std::io;

use log;

use crate::partition::Partitioner;
use crate::record::{Record, RecordSink};
use crate::transport::{Connector, Outbound};
use crate::SortError;

/// Dispatch statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Number of records read from the input shard.
    pub read: usize,
    /// Number of records owned by the local node.
    pub kept: usize,
    /// Number of records sent to every node, indexed by node id.
    pub sent: Vec<usize>,
}

/// Routes every input record either to the local sink or to the owning peer.
pub struct Dispatcher<C: Connector> {
    node_id: usize,
    partitioner: Partitioner,
    outbound: Outbound<C>,
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(node_id: usize, partitioner: Partitioner, outbound: Outbound<C>) -> Self {
        Dispatcher {
            node_id,
            partitioner,
            outbound,
        }
    }

    /// Dials every peer before any record is dispatched.
    pub fn connect_all(&mut self) -> Result<(), SortError> {
        let peers: Vec<usize> = self.outbound.peers().collect();
        for peer in peers {
            self.outbound.connect(peer)?;
        }
        return Ok(());
    }

    /// Dispatches every record of `input`. Records owned by this node are moved to `local`.
    /// Returns the number of records read.
    pub fn dispatch<I, S>(&mut self, input: I, local: &mut S) -> Result<usize, SortError>
    where
        I: IntoIterator<Item = io::Result<Record>>,
        S: RecordSink,
    {
        let mut read = 0;
        for record in input.into_iter() {
            let record = record.map_err(SortError::Input)?;
            read += 1;

            let destination = self.partitioner.destination(record.key());
            if destination == self.node_id {
                local.accept(record).map_err(SortError::IO)?;
            } else {
                self.outbound.send(destination, record)?;
            }
        }

        log::info!("input dispatched ({} records)", read);
        return Ok(read);
    }

    /// Closes the stream to every peer with a terminator frame.
    pub fn finish(mut self, read: usize) -> Result<DispatchStats, SortError> {
        self.outbound.terminate_all()?;

        let sent = self.outbound.sent().to_vec();
        let kept = read - sent.iter().sum::<usize>();
        log::info!("terminators sent to {} peers", self.partitioner.nodes().saturating_sub(1));

        return Ok(DispatchStats { read, kept, sent });
    }
}
