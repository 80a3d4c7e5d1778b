use std::time::Duration;

use crate::types::{Message, NodeId};

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("receive timed out")]
    Timeout,
    #[error("transport closed")]
    Closed,
    #[error("unknown peer: {0}")]
    UnknownPeer(NodeId),
}

/// Message fabric connecting the participants.
///
/// Delivery is at-most-once: the fabric may drop, duplicate, or reorder
/// messages, and the protocol handlers tolerate all three. The one hard
/// guarantee is routing: a message addressed to X is delivered only to X.
/// Whether a broadcast reaches the sender itself is implementation-defined;
/// handlers must not be confused by their own broadcasts. Implementations
/// are shared between the receive loop and every sender and must be
/// internally thread-safe.
pub trait Transport: Send + Sync {
    /// Attempt delivery to one peer. Never blocks on the receiver; no
    /// delivery guarantee.
    fn send(&self, to: &NodeId, message: Message) -> Result<(), TransportError>;

    /// Attempt delivery to every known participant.
    fn broadcast(&self, message: Message) -> Result<(), TransportError>;

    /// Block until the next message arrives.
    fn receive(&self) -> Result<Message, TransportError>;

    /// As `receive`, giving up after `timeout`.
    fn receive_timeout(&self, timeout: Duration) -> Result<Message, TransportError>;

    /// Tear down this endpoint. Subsequent sends and receives fail with
    /// `TransportError::Closed`.
    fn close(&self);
}
