use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::acceptor::Acceptor;
use crate::learner::Learner;
use crate::proposer::{ProposeError, Proposer};
use crate::storage::{Storage, StorageError};
use crate::transport::{Transport, TransportError};
use crate::types::{Message, NodeId};

/// Tunables for a node's event handling.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// How long the proposer waits for each phase's quorum before retrying.
    pub phase_timeout: Duration,
    /// How often the receive loop wakes to observe shutdown.
    pub poll_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            phase_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// One Paxos participant: a proposer, an acceptor, and a learner sharing a
/// transport, plus the receive loop that routes traffic between them.
pub struct Node {
    id: NodeId,
    proposer: Arc<Proposer>,
    acceptor: Arc<Acceptor>,
    learner: Arc<Learner>,
    transport: Arc<dyn Transport>,
    config: NodeConfig,
    shutdown: Arc<AtomicBool>,
    receive_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Build a node, rehydrating acceptor state from `storage`.
    pub fn new(
        id: NodeId,
        quorum_size: usize,
        transport: Arc<dyn Transport>,
        storage: Box<dyn Storage>,
        config: NodeConfig,
    ) -> Result<Self, StorageError> {
        let acceptor = Arc::new(Acceptor::new(id.clone(), storage)?);
        let learner = Arc::new(Learner::new(id.clone(), quorum_size));
        let proposer = Arc::new(Proposer::new(
            id.clone(),
            quorum_size,
            Arc::clone(&transport),
            config.phase_timeout,
        ));
        Ok(Self {
            id,
            proposer,
            acceptor,
            learner,
            transport,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            receive_loop: Mutex::new(None),
        })
    }

    /// Start the receive loop. Idempotent.
    pub fn start(&self) {
        let mut guard = self.receive_loop.lock().expect("node lock poisoned");
        if guard.is_some() {
            return;
        }
        self.shutdown.store(false, Ordering::Release);
        let dispatcher = Dispatcher {
            id: self.id.clone(),
            acceptor: Arc::clone(&self.acceptor),
            learner: Arc::clone(&self.learner),
            proposer: Arc::clone(&self.proposer),
            transport: Arc::clone(&self.transport),
            shutdown: Arc::clone(&self.shutdown),
            poll_interval: self.config.poll_interval,
        };
        *guard = Some(thread::spawn(move || dispatcher.run()));
    }

    /// Signal the receive loop and wait for it to exit. Idempotent.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        let handle = self.receive_loop.lock().expect("node lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Drive the two-phase protocol until a value is chosen for this
    /// instance, and return it. The result may differ from `value` when an
    /// earlier proposal already locked a value in.
    pub fn propose(&self, value: Vec<u8>) -> Result<Vec<u8>, ProposeError> {
        self.proposer.propose(value)
    }

    /// Snapshot of this node's learner: the chosen value, if any.
    pub fn chosen_value(&self) -> Option<Vec<u8>> {
        self.learner.chosen().map(|chosen| chosen.value)
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn learner(&self) -> &Learner {
        &self.learner
    }

    pub fn acceptor(&self) -> &Acceptor {
        &self.acceptor
    }
}

/// The receive loop: blocks on transport with a bounded timeout, dispatches
/// by message kind, and exits on shutdown, transport closure, or storage
/// failure.
struct Dispatcher {
    id: NodeId,
    acceptor: Arc<Acceptor>,
    learner: Arc<Learner>,
    proposer: Arc<Proposer>,
    transport: Arc<dyn Transport>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl Dispatcher {
    fn run(self) {
        debug!(node = %self.id, "receive loop started");
        while !self.shutdown.load(Ordering::Acquire) {
            let message = match self.transport.receive_timeout(self.poll_interval) {
                Ok(message) => message,
                Err(TransportError::Timeout) => continue,
                Err(e) => {
                    info!(node = %self.id, error = %e, "transport closed; receive loop exiting");
                    break;
                }
            };
            if let Err(e) = self.dispatch(message) {
                // An acceptor that cannot persist must stop answering, or a
                // forgotten promise could let two values be chosen.
                error!(node = %self.id, error = %e, "storage failure; node ceasing to reply");
                break;
            }
        }
        debug!(node = %self.id, "receive loop stopped");
    }

    fn dispatch(&self, message: Message) -> Result<(), StorageError> {
        match message {
            Message::Prepare(prepare) => {
                let promise = self.acceptor.handle_prepare(&prepare)?;
                self.reply(&prepare.from, Message::Promise(promise));
            }
            Message::Accept(accept) => {
                let accepted = self.acceptor.handle_accept(&accept)?;
                let affirmed = accepted.ok;
                self.reply(&accept.from, Message::Accepted(accepted.clone()));
                // This node's own vote must reach its own learner; nobody
                // else will deliver it.
                if affirmed {
                    self.learner.handle_accepted(&accepted);
                }
            }
            Message::Accepted(accepted) => {
                self.learner.handle_accepted(&accepted);
                self.proposer.deliver_accepted(accepted);
            }
            Message::Promise(promise) => self.proposer.deliver_promise(promise),
            Message::Learn(learn) => self.learner.handle_learn(&learn),
        }
        Ok(())
    }

    fn reply(&self, to: &NodeId, message: Message) {
        // Lost replies are tolerated; the proposer retries a new round.
        if let Err(e) = self.transport.send(to, message) {
            warn!(node = %self.id, to = %to, error = %e, "send failed");
        }
    }
}
