//! `net-sort` is a rust distributed external sort implementation.
//!
//! A cluster of `N` nodes, each holding a shard of unsorted fixed-size records, redistributes the records by key
//! range so that every node ends up with a sorted output shard holding exactly the keys it owns. Concatenating
//! the output shards in node id order yields the globally sorted data set.
//!
//! # Overview
//!
//! * **Records:**
//!   a record is 100 bytes, a 10-byte key followed by a 90-byte value, ordered by unsigned byte-wise key
//!   comparison.
//! * **Partitioning:**
//!   the owner of a key is selected by the top `log2(N)` bits of its first byte, every node computes it
//!   independently.
//! * **Transport:**
//!   every node listens for its `N-1` peers and dials each of them, records travel as 101-byte frames
//!   (control byte + record) over TCP, a terminator frame closes every stream.
//! * **Termination barrier:**
//!   the merge stage starts only once every peer has sent its terminator.
//! * **External merge:**
//!   records are sorted in parallel and, when a memory limit is set, spilled to disk as sorted runs that are
//!   merged into the output shard.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io;
//! use std::path::Path;
//!
//! use env_logger;
//! use log;
//!
//! use net_sort::{SortNodeBuilder, Topology};
//!
//! fn main() {
//!     env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();
//!
//!     let topology = Topology::load(Path::new("cluster.yaml")).unwrap();
//!     let input_reader = io::BufReader::new(fs::File::open("input.dat").unwrap());
//!     let output_writer = fs::File::create("output.dat").unwrap();
//!
//!     let node = SortNodeBuilder::new()
//!         .with_threads_number(4)
//!         .build(0, topology)
//!         .unwrap();
//!
//!     node.run(input_reader, output_writer).unwrap();
//! }
//! ```

pub mod barrier;
pub mod buffer;
pub mod chunk;
pub mod dispatch;
pub mod error;
pub mod merger;
pub mod node;
pub mod partition;
pub mod record;
pub mod sort;
pub mod topology;
pub mod transport;

pub use barrier::{Completion, TerminationBarrier};
pub use error::SortError;
pub use node::{NodeStats, SortNode, SortNodeBuilder};
pub use partition::{destination, Partitioner};
pub use record::{Frame, FrameError, Record, RecordReader, RecordSink};
pub use topology::{NodeDescriptor, Topology, TopologyError};
pub use transport::{RetryPolicy, TcpConnector};
