use serde::{Deserialize, Serialize};

/// Index of a node in the cluster, `0..size`.
pub type NodeId = u32;

/// Static mapping from node id to address.
///
/// Node `i` listens on `host:(base_port + i + 1)`; `base_port` itself is left to the
/// process that bootstraps the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    host: String,
    base_port: u16,
    size: u32,
}

impl Directory {
    pub fn new(host: impl Into<String>, base_port: u16, size: u32) -> Self {
        Self {
            host: host.into(),
            base_port,
            size,
        }
    }

    pub fn len(&self) -> usize {
        self.size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        0..self.size
    }

    pub fn address(&self, id: NodeId) -> String {
        let port = u32::from(self.base_port) + id + 1;
        format!("{}:{}", self.host, port)
    }

    pub fn route(&self, id: NodeId, service: &str) -> String {
        format!("{}/{}", self.address(id), service)
    }
}
