//! Sorting node error.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;

use crate::record::FrameError;
use crate::topology::TopologyError;

/// Distributed sorting error. Every variant is fatal for the node.
#[derive(Debug)]
pub enum SortError {
    /// Topology is invalid or does not contain the node.
    Topology(TopologyError),
    /// Node id is not listed in the topology.
    UnknownNode(usize),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Listening socket creation error.
    Bind(String, io::Error),
    /// Inbound connection accepting error.
    Accept(io::Error),
    /// Peer connection not established within the retry limit.
    Connect(usize, io::Error),
    /// Frame sending error.
    Send(usize, io::Error),
    /// Frame receiving error.
    Receive(String, FrameError),
    /// Input shard reading error.
    Input(io::Error),
    /// Output shard writing error.
    Output(io::Error),
    /// Common I/O error.
    IO(io::Error),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::Topology(err) => Some(err),
            SortError::UnknownNode(_) => None,
            SortError::ThreadPoolBuildError(err) => Some(err),
            SortError::TempDir(err) => Some(err),
            SortError::Bind(_, err) => Some(err),
            SortError::Accept(err) => Some(err),
            SortError::Connect(_, err) => Some(err),
            SortError::Send(_, err) => Some(err),
            SortError::Receive(_, err) => Some(err),
            SortError::Input(err) => Some(err),
            SortError::Output(err) => Some(err),
            SortError::IO(err) => Some(err),
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::Topology(err) => write!(f, "{}", err),
            SortError::UnknownNode(id) => write!(f, "server id {} is not listed in the topology", id),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::Bind(addr, err) => write!(f, "listening on {} failed: {}", addr, err),
            SortError::Accept(err) => write!(f, "accepting peer connection failed: {}", err),
            SortError::Connect(peer, err) => write!(f, "connection to server {} failed: {}", peer, err),
            SortError::Send(peer, err) => write!(f, "sending to server {} failed: {}", peer, err),
            SortError::Receive(peer, err) => write!(f, "receiving from {} failed: {}", peer, err),
            SortError::Input(err) => write!(f, "input shard reading error: {}", err),
            SortError::Output(err) => write!(f, "output shard writing error: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
        }
    }
}

impl From<TopologyError> for SortError {
    fn from(err: TopologyError) -> Self {
        SortError::Topology(err)
    }
}
