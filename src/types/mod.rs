mod message;
mod primitives;

pub use message::{Accept, Accepted, Learn, Message, Prepare, Promise};
pub use primitives::{NodeId, ProposalId};
