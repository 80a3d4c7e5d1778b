use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::transport::Transport;
use crate::types::{Accept, Accepted, Learn, Message, NodeId, Prepare, Promise, ProposalId};

/// Error type for `propose`.
#[derive(Debug, thiserror::Error)]
pub enum ProposeError {
    #[error("transport: {0}")]
    Transport(#[from] crate::transport::TransportError),
    #[error("acceptors reported conflicting values for proposal {0}")]
    ConflictingAccepts(ProposalId),
}

/// Replies the dispatcher routes into an in-flight round.
enum Reply {
    Promise(Promise),
    Accepted(Accepted),
}

/// Outcome of one phase's wait.
enum Wait<T> {
    Quorum(T),
    Rejected(ProposalId),
    TimedOut,
}

/// Active coordinator driving Phase 1 then Phase 2.
///
/// The proposer never reads the transport. Each round it installs a
/// collector, broadcasts, and waits on the collector's channel; the node's
/// receive loop deposits Promise and Accepted replies as they arrive. One
/// `propose` runs at a time per proposer.
pub struct Proposer {
    id: NodeId,
    quorum_size: usize,
    phase_timeout: Duration,
    transport: Arc<dyn Transport>,
    round_hint: Mutex<u64>,
    collector: Mutex<Option<Sender<Reply>>>,
}

impl Proposer {
    pub fn new(
        id: NodeId,
        quorum_size: usize,
        transport: Arc<dyn Transport>,
        phase_timeout: Duration,
    ) -> Self {
        Self {
            id,
            quorum_size,
            phase_timeout,
            transport,
            round_hint: Mutex::new(0),
            collector: Mutex::new(None),
        }
    }

    /// Drive rounds until some value is chosen for this instance, then
    /// return it. The result may differ from `value` when a prior round
    /// already locked a value in. Fails only when the transport is
    /// permanently closed or the quorum reports a safety violation.
    pub fn propose(&self, value: Vec<u8>) -> Result<Vec<u8>, ProposeError> {
        // Holding the round hint for the whole call serializes proposals
        // from this proposer.
        let mut round_hint = self.round_hint.lock().expect("proposer lock poisoned");
        let result = self.drive(&mut round_hint, value);
        *self.collector.lock().expect("collector lock poisoned") = None;
        result
    }

    fn drive(&self, round_hint: &mut u64, original_value: Vec<u8>) -> Result<Vec<u8>, ProposeError> {
        loop {
            *round_hint += 1;
            let proposal = ProposalId::new(*round_hint, self.id.clone());
            let replies = self.install_collector();
            let mut value_to_propose = original_value.clone();

            debug!(proposer = %self.id, proposal = %proposal, "phase 1: prepare");
            self.transport.broadcast(Message::Prepare(Prepare {
                proposal: proposal.clone(),
                from: self.id.clone(),
            }))?;

            let promises = match self.await_promises(&replies, &proposal) {
                Wait::Quorum(promises) => promises,
                Wait::Rejected(highest_seen) => {
                    debug!(
                        proposer = %self.id,
                        proposal = %proposal,
                        highest_seen = %highest_seen,
                        "phase 1 rejected",
                    );
                    *round_hint = (*round_hint).max(highest_seen.round());
                    continue;
                }
                Wait::TimedOut => {
                    debug!(proposer = %self.id, proposal = %proposal, "phase 1 timed out");
                    continue;
                }
            };

            if let Some(adopted) = self.adopted_value(&promises)? {
                debug!(proposer = %self.id, proposal = %proposal, "adopting value from a prior accept");
                value_to_propose = adopted;
            }

            debug!(proposer = %self.id, proposal = %proposal, "phase 2: accept");
            self.transport.broadcast(Message::Accept(Accept {
                proposal: proposal.clone(),
                value: value_to_propose.clone(),
                from: self.id.clone(),
            }))?;

            match self.await_accepts(&replies, &proposal) {
                Wait::Quorum(()) => {}
                Wait::Rejected(highest_seen) => {
                    debug!(
                        proposer = %self.id,
                        proposal = %proposal,
                        highest_seen = %highest_seen,
                        "phase 2 rejected",
                    );
                    *round_hint = (*round_hint).max(highest_seen.round());
                    continue;
                }
                Wait::TimedOut => {
                    debug!(proposer = %self.id, proposal = %proposal, "phase 2 timed out");
                    continue;
                }
            }

            info!(proposer = %self.id, proposal = %proposal, "value chosen; broadcasting learn");
            self.transport.broadcast(Message::Learn(Learn {
                proposal,
                value: value_to_propose.clone(),
                from: self.id.clone(),
            }))?;
            return Ok(value_to_propose);
        }
    }

    /// Deposit a Promise into the in-flight round, if any. Called from the
    /// node's receive loop.
    pub fn deliver_promise(&self, promise: Promise) {
        if let Some(replies) = self.collector.lock().expect("collector lock poisoned").as_ref() {
            let _ = replies.send(Reply::Promise(promise));
        }
    }

    /// Deposit an Accepted into the in-flight round, if any.
    pub fn deliver_accepted(&self, accepted: Accepted) {
        if let Some(replies) = self.collector.lock().expect("collector lock poisoned").as_ref() {
            let _ = replies.send(Reply::Accepted(accepted));
        }
    }

    fn install_collector(&self) -> Receiver<Reply> {
        let (tx, rx) = mpsc::channel();
        *self.collector.lock().expect("collector lock poisoned") = Some(tx);
        rx
    }

    /// Gather promises for `proposal` until a quorum of distinct acceptors
    /// grants it, any acceptor rejects it, or the phase deadline passes.
    fn await_promises(&self, replies: &Receiver<Reply>, proposal: &ProposalId) -> Wait<Vec<Promise>> {
        let deadline = Instant::now() + self.phase_timeout;
        let mut promises: HashMap<NodeId, Promise> = HashMap::new();

        while promises.len() < self.quorum_size {
            let Some(reply) = next_reply(replies, deadline) else {
                return Wait::TimedOut;
            };
            let promise = match reply {
                Reply::Promise(promise) if promise.proposal == *proposal => promise,
                // Stale rounds and stray Accepted replies are not ours to count.
                _ => continue,
            };
            if !promise.ok {
                return Wait::Rejected(promise.highest_promised);
            }
            promises.insert(promise.from.clone(), promise);
        }

        Wait::Quorum(promises.into_values().collect())
    }

    /// Gather Accepted replies for `proposal` until a quorum of distinct
    /// acceptors affirms it, any acceptor rejects it, or the deadline passes.
    fn await_accepts(&self, replies: &Receiver<Reply>, proposal: &ProposalId) -> Wait<()> {
        let deadline = Instant::now() + self.phase_timeout;
        let mut affirmed: HashSet<NodeId> = HashSet::new();

        while affirmed.len() < self.quorum_size {
            let Some(reply) = next_reply(replies, deadline) else {
                return Wait::TimedOut;
            };
            let accepted = match reply {
                Reply::Accepted(accepted) if accepted.proposal == *proposal => accepted,
                _ => continue,
            };
            if !accepted.ok {
                return Wait::Rejected(accepted.highest_promised);
            }
            affirmed.insert(accepted.from);
        }

        Wait::Quorum(())
    }

    /// The value the quorum obligates this proposer to carry forward: the
    /// one attached to the highest-numbered prior accept any promise
    /// reported, if any. Proposing anything else could choose a second
    /// value.
    fn adopted_value(&self, promises: &[Promise]) -> Result<Option<Vec<u8>>, ProposeError> {
        let mut reported: HashMap<&ProposalId, &[u8]> = HashMap::new();
        let mut best: Option<&Promise> = None;

        for promise in promises {
            if promise.accepted_proposal.is_zero() {
                continue;
            }
            if let Some(prior) =
                reported.insert(&promise.accepted_proposal, &promise.accepted_value)
            {
                if prior != promise.accepted_value.as_slice() {
                    error!(
                        proposer = %self.id,
                        proposal = %promise.accepted_proposal,
                        "two acceptors report different values for one proposal",
                    );
                    return Err(ProposeError::ConflictingAccepts(
                        promise.accepted_proposal.clone(),
                    ));
                }
            }
            if best.map_or(true, |b| promise.accepted_proposal > b.accepted_proposal) {
                best = Some(promise);
            }
        }

        Ok(best.map(|promise| promise.accepted_value.clone()))
    }
}

fn next_reply(replies: &Receiver<Reply>, deadline: Instant) -> Option<Reply> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return None;
    }
    match replies.recv_timeout(remaining) {
        Ok(reply) => Some(reply),
        Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
    }
}
