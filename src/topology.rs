//! Cluster topology.
//!
//! The topology file is a YAML document listing every node of the cluster:
//!
//! ```yaml
//! servers:
//!   - serverId: 0
//!     host: 127.0.0.1
//!     port: "9000"
//!   - serverId: 1
//!     host: 127.0.0.1
//!     port: 9001
//! ```

use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;

/// Topology loading error.
#[derive(Debug)]
pub enum TopologyError {
    /// Topology file reading error.
    IO(io::Error),
    /// Topology document parsing error.
    Parse(serde_yaml::Error),
    /// Topology lists no nodes.
    Empty,
    /// Several nodes share an id.
    DuplicateId(usize),
    /// Node ids are not contiguous starting at zero.
    MissingId(usize),
}

impl Error for TopologyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            TopologyError::IO(err) => Some(err),
            TopologyError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            TopologyError::IO(err) => write!(f, "topology file not read: {}", err),
            TopologyError::Parse(err) => write!(f, "topology parsing error: {}", err),
            TopologyError::Empty => write!(f, "topology contains no servers"),
            TopologyError::DuplicateId(id) => write!(f, "server id {} is listed more than once", id),
            TopologyError::MissingId(id) => write!(f, "server id {} is missing", id),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Port {
    Number(u16),
    Text(String),
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Port::deserialize(deserializer)? {
        Port::Number(port) => port.to_string(),
        Port::Text(port) => port,
    })
}

/// Single cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeDescriptor {
    #[serde(rename = "serverId")]
    pub server_id: usize,
    pub host: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: String,
}

impl NodeDescriptor {
    pub fn new(server_id: usize, host: impl Into<String>, port: impl Into<String>) -> Self {
        NodeDescriptor {
            server_id,
            host: host.into(),
            port: port.into(),
        }
    }

    /// Returns `host:port` network address of the node.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Deserialize)]
struct TopologyFile {
    servers: Vec<NodeDescriptor>,
}

/// Validated cluster topology. Node index equals node id.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<NodeDescriptor>,
}

impl Topology {
    /// Creates a topology from an unordered node list.
    pub fn new(mut nodes: Vec<NodeDescriptor>) -> Result<Self, TopologyError> {
        if nodes.is_empty() {
            return Err(TopologyError::Empty);
        }

        nodes.sort_by_key(|node| node.server_id);
        for (idx, node) in nodes.iter().enumerate() {
            if node.server_id < idx {
                return Err(TopologyError::DuplicateId(node.server_id));
            }
            if node.server_id > idx {
                return Err(TopologyError::MissingId(idx));
            }
        }

        return Ok(Topology { nodes });
    }

    /// Parses a YAML topology document.
    pub fn from_yaml(document: &str) -> Result<Self, TopologyError> {
        let file: TopologyFile = serde_yaml::from_str(document).map_err(TopologyError::Parse)?;
        Self::new(file.servers)
    }

    /// Loads a YAML topology file.
    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let document = fs::read_to_string(path).map_err(TopologyError::IO)?;
        Self::from_yaml(&document)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: usize) -> Option<&NodeDescriptor> {
        self.nodes.get(id)
    }

    /// Network addresses indexed by node id.
    pub fn addresses(&self) -> Vec<String> {
        self.nodes.iter().map(NodeDescriptor::address).collect()
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use rstest::*;

    use super::{NodeDescriptor, Topology, TopologyError};

    #[test]
    fn test_from_yaml_sorts_by_id() {
        let topology = Topology::from_yaml(
            r#"
servers:
  - serverId: 2
    host: node-c
    port: "7002"
  - serverId: 0
    host: node-a
    port: 7000
  - serverId: 1
    host: node-b
    port: "7001"
"#,
        )
        .unwrap();

        assert_eq!(topology.len(), 3);
        assert_eq!(
            topology.addresses(),
            vec!["node-a:7000", "node-b:7001", "node-c:7002"]
        );
        assert_eq!(topology.node(1), Some(&NodeDescriptor::new(1, "node-b", "7001")));
    }

    #[test]
    fn test_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "servers:\n  - serverId: 0\n    host: localhost\n    port: 9000").unwrap();

        let topology = Topology::load(file.path()).unwrap();
        assert_eq!(topology.addresses(), vec!["localhost:9000"]);
    }

    #[rstest]
    #[case(vec![], "Empty")]
    #[case(vec![(0, "a"), (0, "b")], "DuplicateId(0)")]
    #[case(vec![(0, "a"), (2, "c")], "MissingId(1)")]
    #[case(vec![(1, "b")], "MissingId(0)")]
    fn test_invalid_topology(#[case] nodes: Vec<(usize, &str)>, #[case] expected: &str) {
        let nodes = nodes
            .into_iter()
            .map(|(id, host)| NodeDescriptor::new(id, host, "1"))
            .collect();

        let err = Topology::new(nodes).unwrap_err();
        assert_eq!(format!("{:?}", err), expected);
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            Topology::from_yaml("servers: 12"),
            Err(TopologyError::Parse(_))
        ));
    }
}
