use std::sync::Mutex;

use tracing::debug;

use crate::storage::{Storage, StorageError};
use crate::types::{Accept, Accepted, NodeId, Prepare, Promise, ProposalId};

/// The three durable fields an acceptor answers from.
#[derive(Clone, Debug)]
pub struct AcceptorSnapshot {
    pub highest_promised: ProposalId,
    pub accepted_proposal: ProposalId,
    pub accepted_value: Vec<u8>,
}

struct AcceptorState {
    highest_promised: ProposalId,
    accepted_proposal: ProposalId,
    accepted_value: Vec<u8>,
    storage: Box<dyn Storage>,
}

/// Passive voter owning the durable safety state.
///
/// One lock guards the three fields and serializes persistence, so no two
/// handlers observe an intermediate state. Both handlers persist before an
/// affirmative reply is produced: an acknowledgement that precedes
/// durability opens a crash window in which the acceptor forgets a promise
/// it already handed out.
pub struct Acceptor {
    id: NodeId,
    state: Mutex<AcceptorState>,
}

impl Acceptor {
    /// Rehydrate from storage. A fresh store yields the zero identifiers.
    pub fn new(id: NodeId, storage: Box<dyn Storage>) -> Result<Self, StorageError> {
        let highest_promised = storage.load_promised()?;
        let (accepted_proposal, accepted_value) = storage.load_accepted()?;
        Ok(Self {
            id,
            state: Mutex::new(AcceptorState {
                highest_promised,
                accepted_proposal,
                accepted_value,
                storage,
            }),
        })
    }

    /// Phase 1: grant when the proposal is strictly above the highest
    /// promised. Granted or not, the reply reports the durable accepted pair
    /// and the current highest promise, so a losing proposer knows what to
    /// outbid.
    pub fn handle_prepare(&self, msg: &Prepare) -> Result<Promise, StorageError> {
        let mut state = self.state.lock().expect("acceptor lock poisoned");

        let granted = msg.proposal > state.highest_promised;
        if granted {
            state.storage.save_promised(&msg.proposal)?;
            state.highest_promised = msg.proposal.clone();
            debug!(acceptor = %self.id, proposal = %msg.proposal, "promise granted");
        } else {
            debug!(
                acceptor = %self.id,
                proposal = %msg.proposal,
                promised = %state.highest_promised,
                "prepare rejected",
            );
        }

        Ok(Promise {
            proposal: msg.proposal.clone(),
            ok: granted,
            accepted_proposal: state.accepted_proposal.clone(),
            accepted_value: state.accepted_value.clone(),
            highest_promised: state.highest_promised.clone(),
            from: self.id.clone(),
        })
    }

    /// Phase 2: accept when the proposal is at or above the highest
    /// promised. `>=` rather than `>`, so the acceptor honours the Accept
    /// carrying the exact number it promised in Phase 1.
    pub fn handle_accept(&self, msg: &Accept) -> Result<Accepted, StorageError> {
        let mut state = self.state.lock().expect("acceptor lock poisoned");

        let granted = msg.proposal >= state.highest_promised;
        if granted {
            // Promise is persisted first: a crash between the two writes
            // must never leave an accept recorded above the promise.
            state.storage.save_promised(&msg.proposal)?;
            state.storage.save_accepted(&msg.proposal, &msg.value)?;
            state.highest_promised = msg.proposal.clone();
            state.accepted_proposal = msg.proposal.clone();
            state.accepted_value = msg.value.clone();
            debug!(acceptor = %self.id, proposal = %msg.proposal, "value accepted");
        } else {
            debug!(
                acceptor = %self.id,
                proposal = %msg.proposal,
                promised = %state.highest_promised,
                "accept rejected",
            );
        }

        Ok(Accepted {
            proposal: msg.proposal.clone(),
            value: if granted { msg.value.clone() } else { Vec::new() },
            ok: granted,
            highest_promised: state.highest_promised.clone(),
            from: self.id.clone(),
        })
    }

    /// Debug/test read of the durable fields.
    pub fn snapshot(&self) -> AcceptorSnapshot {
        let state = self.state.lock().expect("acceptor lock poisoned");
        AcceptorSnapshot {
            highest_promised: state.highest_promised.clone(),
            accepted_proposal: state.accepted_proposal.clone(),
            accepted_value: state.accepted_value.clone(),
        }
    }
}
