use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique participant identifier.
///
/// Ids are opaque strings fixed at construction. They double as the
/// tiebreaker in proposal ordering, so they must be unique across the
/// cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    value: String,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId {
            value: value.to_string(),
        }
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        NodeId { value }
    }
}

/// Totally ordered competition marker attached to every Prepare and Accept.
///
/// Ordering is round-major with the proposer id as tiebreaker, so two
/// proposers can never produce the same identifier as long as their ids are
/// unique. The default value is the zero identifier: strictly less than
/// every identifier a proposer emits, it stands for "none".
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProposalId {
    round: u64,
    proposer: NodeId,
}

impl ProposalId {
    pub fn new(round: u64, proposer: NodeId) -> Self {
        Self { round, proposer }
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    /// True for the "nothing yet" identifier acceptors start from.
    pub fn is_zero(&self) -> bool {
        self.round == 0 && self.proposer.value.is_empty()
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            write!(f, "(none)")
        } else {
            write!(f, "({}, {})", self.round, self.proposer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_strictly_minimal() {
        let zero = ProposalId::default();
        assert!(zero.is_zero());
        assert!(zero < ProposalId::new(1, NodeId::from("a")));
        assert!(zero < ProposalId::new(0, NodeId::from("a")));
    }

    #[test]
    fn orders_by_round_then_proposer() {
        let low = ProposalId::new(1, NodeId::from("b"));
        let high = ProposalId::new(2, NodeId::from("a"));
        assert!(low < high);

        let a = ProposalId::new(3, NodeId::from("a"));
        let b = ProposalId::new(3, NodeId::from("b"));
        assert!(a < b);
        assert_eq!(a, ProposalId::new(3, NodeId::from("a")));
    }

    #[test]
    fn concurrent_proposers_never_collide() {
        let a = ProposalId::new(7, NodeId::from("n0"));
        let b = ProposalId::new(7, NodeId::from("n1"));
        assert_ne!(a, b);
    }

    #[test]
    fn display() {
        assert_eq!(
            ProposalId::new(5, NodeId::from("n0")).to_string(),
            "(5, n0)"
        );
        assert_eq!(ProposalId::default().to_string(), "(none)");
    }
}
