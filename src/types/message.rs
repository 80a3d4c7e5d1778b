use serde::{Deserialize, Serialize};

use super::primitives::{NodeId, ProposalId};

/// Phase 1 request: a proposer claims authority for `proposal`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prepare {
    pub proposal: ProposalId,
    pub from: NodeId,
}

/// Phase 1 response.
///
/// A granted promise (`ok = true`) reports the acceptor's durable accepted
/// pair so the proposer can adopt a value that may already be chosen. A
/// rejection carries `highest_promised` so the proposer can outbid it next
/// round; the accepted pair is still reported truthfully either way.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Promise {
    pub proposal: ProposalId,
    pub ok: bool,
    pub accepted_proposal: ProposalId,
    pub accepted_value: Vec<u8>,
    pub highest_promised: ProposalId,
    pub from: NodeId,
}

/// Phase 2 request: lock in `value` at `proposal`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Accept {
    pub proposal: ProposalId,
    pub value: Vec<u8>,
    pub from: NodeId,
}

/// Phase 2 response. `highest_promised` guides the proposer's next round
/// when `ok = false`; `value` is empty on rejection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Accepted {
    pub proposal: ProposalId,
    pub value: Vec<u8>,
    pub ok: bool,
    pub highest_promised: ProposalId,
    pub from: NodeId,
}

/// Notification that a quorum formed around `(proposal, value)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Learn {
    pub proposal: ProposalId,
    pub value: Vec<u8>,
    pub from: NodeId,
}

/// All protocol messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    Prepare(Prepare),
    Promise(Promise),
    Accept(Accept),
    Accepted(Accepted),
    Learn(Learn),
}
