use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::transport::{Transport, TransportError};
use crate::types::{Message, NodeId};

/// In-process fabric: a registry of per-node inboxes.
///
/// Broadcasts reach every registered node including the sender, so a node's
/// own acceptor votes on its own proposals. A five-node cluster can then
/// lose two peers and still assemble a quorum around the surviving proposer.
#[derive(Default)]
pub struct Network {
    inboxes: Mutex<HashMap<NodeId, Sender<Message>>>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create the endpoint for `id`. Registering an id again replaces the
    /// previous endpoint, which then observes `Closed`.
    pub fn register(self: &Arc<Self>, id: NodeId) -> Arc<MemoryTransport> {
        let (tx, rx) = mpsc::channel();
        self.inboxes
            .lock()
            .expect("network lock poisoned")
            .insert(id.clone(), tx);
        Arc::new(MemoryTransport {
            id,
            network: Arc::clone(self),
            inbox: Mutex::new(rx),
            closed: AtomicBool::new(false),
        })
    }
}

/// One node's endpoint on a `Network`.
pub struct MemoryTransport {
    id: NodeId,
    network: Arc<Network>,
    inbox: Mutex<Receiver<Message>>,
    closed: AtomicBool,
}

impl Transport for MemoryTransport {
    fn send(&self, to: &NodeId, message: Message) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let inboxes = self.network.inboxes.lock().expect("network lock poisoned");
        let tx = inboxes
            .get(to)
            .ok_or_else(|| TransportError::UnknownPeer(to.clone()))?;
        // A peer that closed concurrently just loses the message.
        let _ = tx.send(message);
        Ok(())
    }

    fn broadcast(&self, message: Message) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let inboxes = self.network.inboxes.lock().expect("network lock poisoned");
        for tx in inboxes.values() {
            let _ = tx.send(message.clone());
        }
        Ok(())
    }

    fn receive(&self) -> Result<Message, TransportError> {
        let inbox = self.inbox.lock().expect("inbox lock poisoned");
        inbox.recv().map_err(|_| TransportError::Closed)
    }

    fn receive_timeout(&self, timeout: Duration) -> Result<Message, TransportError> {
        let inbox = self.inbox.lock().expect("inbox lock poisoned");
        inbox.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => TransportError::Timeout,
            RecvTimeoutError::Disconnected => TransportError::Closed,
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.network
            .inboxes
            .lock()
            .expect("network lock poisoned")
            .remove(&self.id);
    }
}
