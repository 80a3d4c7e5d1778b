use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::types::{Accepted, Learn, NodeId, ProposalId};

/// A value locked in by a quorum, with the proposal that carried it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chosen {
    pub proposal: ProposalId,
    pub value: Vec<u8>,
}

#[derive(Default)]
struct LearnerState {
    /// Acceptor ids affirming each (proposal, value) pair. Affirmations for
    /// different pairs never combine.
    affirmations: HashMap<(ProposalId, Vec<u8>), HashSet<NodeId>>,
    chosen: Option<Chosen>,
}

/// Passive observer that detects when a quorum forms around one
/// (proposal, value) pair.
///
/// State is volatile: a restarted learner re-learns from future Accepted
/// and Learn traffic. Once `chosen` is set it is never overwritten;
/// observations that disagree with it are logged as safety anomalies.
pub struct Learner {
    id: NodeId,
    quorum_size: usize,
    state: Mutex<LearnerState>,
    chosen_signal: Condvar,
}

impl Learner {
    pub fn new(id: NodeId, quorum_size: usize) -> Self {
        Self {
            id,
            quorum_size,
            state: Mutex::new(LearnerState::default()),
            chosen_signal: Condvar::new(),
        }
    }

    /// Count one acceptor's affirmation of (proposal, value). Re-delivery
    /// from the same acceptor is idempotent.
    pub fn handle_accepted(&self, msg: &Accepted) {
        if !msg.ok {
            return;
        }

        let mut state = self.state.lock().expect("learner lock poisoned");
        let affirmed = state
            .affirmations
            .entry((msg.proposal.clone(), msg.value.clone()))
            .or_default();
        if !affirmed.insert(msg.from.clone()) {
            return;
        }
        if affirmed.len() < self.quorum_size {
            return;
        }

        match state.chosen.as_ref().map(|chosen| chosen.value == msg.value) {
            None => {
                info!(learner = %self.id, proposal = %msg.proposal, "quorum reached; value chosen");
                state.chosen = Some(Chosen {
                    proposal: msg.proposal.clone(),
                    value: msg.value.clone(),
                });
                self.chosen_signal.notify_all();
            }
            Some(true) => {
                // A later round re-affirmed the chosen value; normal under
                // contention.
                debug!(learner = %self.id, proposal = %msg.proposal, "chosen value re-affirmed");
            }
            Some(false) => {
                error!(
                    learner = %self.id,
                    conflicting = %msg.proposal,
                    "quorum formed for a second value; keeping the first",
                );
            }
        }
    }

    /// Adopt a chosen value announced by a proposer. A Learn that disagrees
    /// with an already-chosen value is flagged and ignored.
    pub fn handle_learn(&self, msg: &Learn) {
        let mut state = self.state.lock().expect("learner lock poisoned");
        if state.chosen.is_none() {
            debug!(learner = %self.id, proposal = %msg.proposal, "chosen value learned");
            state.chosen = Some(Chosen {
                proposal: msg.proposal.clone(),
                value: msg.value.clone(),
            });
            self.chosen_signal.notify_all();
        } else if state
            .chosen
            .as_ref()
            .is_some_and(|chosen| chosen.value != msg.value)
        {
            error!(
                learner = %self.id,
                proposal = %msg.proposal,
                "learn disagrees with the chosen value",
            );
        }
    }

    /// Non-blocking snapshot of the chosen record.
    pub fn chosen(&self) -> Option<Chosen> {
        self.state.lock().expect("learner lock poisoned").chosen.clone()
    }

    /// Block until a value is chosen.
    pub fn wait_for_chosen(&self) -> Chosen {
        let mut state = self.state.lock().expect("learner lock poisoned");
        loop {
            if let Some(chosen) = &state.chosen {
                return chosen.clone();
            }
            state = self.chosen_signal.wait(state).expect("learner lock poisoned");
        }
    }

    /// As `wait_for_chosen`, giving up after `timeout`.
    pub fn wait_for_chosen_timeout(&self, timeout: Duration) -> Option<Chosen> {
        let state = self.state.lock().expect("learner lock poisoned");
        let (state, _) = self
            .chosen_signal
            .wait_timeout_while(state, timeout, |state| state.chosen.is_none())
            .expect("learner lock poisoned");
        state.chosen.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(round: u64, proposer: &str, value: &[u8], from: &str) -> Accepted {
        let proposal = ProposalId::new(round, NodeId::from(proposer));
        Accepted {
            proposal: proposal.clone(),
            value: value.to_vec(),
            ok: true,
            highest_promised: proposal,
            from: NodeId::from(from),
        }
    }

    #[test]
    fn quorum_of_distinct_acceptors_chooses() {
        let learner = Learner::new(NodeId::from("l"), 3);

        learner.handle_accepted(&accepted(1, "p", b"v", "a1"));
        learner.handle_accepted(&accepted(1, "p", b"v", "a2"));
        assert!(learner.chosen().is_none());

        learner.handle_accepted(&accepted(1, "p", b"v", "a3"));

        let chosen = learner.chosen().expect("chosen");
        assert_eq!(chosen.value, b"v".to_vec());
        assert_eq!(chosen.proposal, ProposalId::new(1, NodeId::from("p")));
    }

    #[test]
    fn duplicate_affirmations_count_once() {
        let learner = Learner::new(NodeId::from("l"), 2);

        learner.handle_accepted(&accepted(1, "p", b"v", "a1"));
        learner.handle_accepted(&accepted(1, "p", b"v", "a1"));
        learner.handle_accepted(&accepted(1, "p", b"v", "a1"));

        assert!(learner.chosen().is_none());

        learner.handle_accepted(&accepted(1, "p", b"v", "a2"));
        assert!(learner.chosen().is_some());
    }

    #[test]
    fn affirmations_for_different_pairs_never_combine() {
        let learner = Learner::new(NodeId::from("l"), 2);

        // Same value at different proposals, different values at the same
        // proposal: neither pair has a quorum of its own.
        learner.handle_accepted(&accepted(1, "p", b"v", "a1"));
        learner.handle_accepted(&accepted(2, "q", b"v", "a2"));
        learner.handle_accepted(&accepted(1, "p", b"w", "a3"));

        assert!(learner.chosen().is_none());
    }

    #[test]
    fn rejections_are_ignored() {
        let learner = Learner::new(NodeId::from("l"), 1);
        let mut rejected = accepted(1, "p", b"v", "a1");
        rejected.ok = false;

        learner.handle_accepted(&rejected);

        assert!(learner.chosen().is_none());
    }

    #[test]
    fn chosen_is_never_overwritten() {
        let learner = Learner::new(NodeId::from("l"), 1);

        learner.handle_accepted(&accepted(1, "p", b"first", "a1"));
        learner.handle_accepted(&accepted(2, "q", b"second", "a2"));

        assert_eq!(learner.chosen().expect("chosen").value, b"first".to_vec());
    }

    #[test]
    fn learn_sets_the_chosen_value() {
        let learner = Learner::new(NodeId::from("l"), 3);

        learner.handle_learn(&Learn {
            proposal: ProposalId::new(2, NodeId::from("p")),
            value: b"announced".to_vec(),
            from: NodeId::from("p"),
        });

        assert_eq!(
            learner.chosen().expect("chosen").value,
            b"announced".to_vec()
        );
    }

    #[test]
    fn conflicting_learn_is_dropped() {
        let learner = Learner::new(NodeId::from("l"), 1);
        learner.handle_accepted(&accepted(1, "p", b"v", "a1"));

        learner.handle_learn(&Learn {
            proposal: ProposalId::new(9, NodeId::from("q")),
            value: b"other".to_vec(),
            from: NodeId::from("q"),
        });

        assert_eq!(learner.chosen().expect("chosen").value, b"v".to_vec());
    }

    #[test]
    fn wait_for_chosen_blocks_until_notified() {
        use std::sync::Arc;
        use std::thread;

        let learner = Arc::new(Learner::new(NodeId::from("l"), 1));
        let waiter = {
            let learner = Arc::clone(&learner);
            thread::spawn(move || learner.wait_for_chosen())
        };

        thread::sleep(Duration::from_millis(50));
        learner.handle_learn(&Learn {
            proposal: ProposalId::new(1, NodeId::from("p")),
            value: b"v".to_vec(),
            from: NodeId::from("p"),
        });

        assert_eq!(waiter.join().expect("join").value, b"v".to_vec());
    }

    #[test]
    fn wait_for_chosen_times_out_then_succeeds() {
        let learner = Learner::new(NodeId::from("l"), 1);

        assert!(learner
            .wait_for_chosen_timeout(Duration::from_millis(50))
            .is_none());

        learner.handle_accepted(&accepted(1, "p", b"v", "a1"));

        let chosen = learner
            .wait_for_chosen_timeout(Duration::from_millis(50))
            .expect("chosen");
        assert_eq!(chosen.value, b"v".to_vec());
    }
}
