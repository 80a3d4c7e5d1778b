//! Single-decree Paxos implementation.
//!
//! Based on:
//! - "The Part-Time Parliament" (Lamport)
//! - "Paxos Made Simple" (Lamport)
//!
//! A cluster of nodes agrees on exactly one opaque value despite message
//! loss, reordering, duplication, and crash-stop failures. Each node
//! composes the three protocol roles: the proposer drives Prepare/Promise
//! and Accept/Accepted rounds and announces the outcome with Learn, the
//! acceptor guards the durable safety state, and the learner watches
//! Accepted traffic for a quorum. Storage and transport sit behind narrow
//! traits so the protocol core stays independent of medium and fabric.

pub mod acceptor;
pub mod cluster;
pub mod file_storage;
pub mod learner;
pub mod memory_transport;
pub mod node;
pub mod proposer;
pub mod storage;
pub mod transport;
pub mod types;

pub use acceptor::{Acceptor, AcceptorSnapshot};
pub use cluster::Cluster;
pub use file_storage::FileStorage;
pub use learner::{Chosen, Learner};
pub use memory_transport::{MemoryTransport, Network};
pub use node::{Node, NodeConfig};
pub use proposer::{ProposeError, Proposer};
pub use storage::{MemoryStorage, Storage, StorageError};
pub use transport::{Transport, TransportError};
pub use types::{Accept, Accepted, Learn, Message, NodeId, Prepare, Promise, ProposalId};
