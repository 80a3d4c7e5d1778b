use std::sync::Arc;

use crate::memory_transport::{MemoryTransport, Network};
use crate::node::{Node, NodeConfig};
use crate::storage::{MemoryStorage, Storage, StorageError};
use crate::transport::Transport;
use crate::types::NodeId;

/// An in-process cluster over one `Network`, for tests and the demo binary.
///
/// Nodes are named `n0..n{N-1}` and share `quorum_size = N / 2 + 1`.
pub struct Cluster {
    network: Arc<Network>,
    nodes: Vec<Node>,
    transports: Vec<Arc<MemoryTransport>>,
}

impl Cluster {
    /// Build `size` nodes over fresh in-memory storage.
    pub fn new(size: usize, config: NodeConfig) -> Result<Self, StorageError> {
        let storages = (0..size)
            .map(|_| Box::new(MemoryStorage::new()) as Box<dyn Storage>)
            .collect();
        Self::with_storages(storages, config)
    }

    /// Build one node per storage, rehydrating each acceptor from its own
    /// backing store. Tests seed these to stage prior promises and accepts.
    pub fn with_storages(
        storages: Vec<Box<dyn Storage>>,
        config: NodeConfig,
    ) -> Result<Self, StorageError> {
        let quorum_size = storages.len() / 2 + 1;
        let network = Network::new();
        let mut nodes = Vec::new();
        let mut transports = Vec::new();

        for (i, storage) in storages.into_iter().enumerate() {
            let id = NodeId::from(format!("n{i}"));
            let transport = network.register(id.clone());
            transports.push(Arc::clone(&transport));
            nodes.push(Node::new(
                id,
                quorum_size,
                transport as Arc<dyn Transport>,
                storage,
                config.clone(),
            )?);
        }

        Ok(Self {
            network,
            nodes,
            transports,
        })
    }

    pub fn start(&self) {
        for node in &self.nodes {
            node.start();
        }
    }

    pub fn stop(&self) {
        for node in &self.nodes {
            node.stop();
        }
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn transport(&self, index: usize) -> &Arc<MemoryTransport> {
        &self.transports[index]
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }
}
