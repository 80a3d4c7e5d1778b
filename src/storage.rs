use std::io;
use std::sync::{Arc, Mutex};

use crate::types::ProposalId;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt storage: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable backing for an acceptor's safety state.
///
/// Every `save_*` must be durable before it returns: the acceptor replies to
/// Prepare and Accept only after the state change is on stable media, and an
/// acceptor that forgets a promise across a crash can let two values be
/// chosen. Implementations copy value bytes on the way in and on the way
/// out, so caller and store never alias one buffer.
pub trait Storage: Send {
    /// Persist the highest promised proposal.
    fn save_promised(&mut self, proposal: &ProposalId) -> Result<(), StorageError>;

    /// Load the highest promised proposal. Zero if never written.
    fn load_promised(&self) -> Result<ProposalId, StorageError>;

    /// Persist the accepted pair in one commit.
    fn save_accepted(&mut self, proposal: &ProposalId, value: &[u8]) -> Result<(), StorageError>;

    /// Load the accepted pair. Zero and empty if never written.
    fn load_accepted(&self) -> Result<(ProposalId, Vec<u8>), StorageError>;

    /// Release the backing medium.
    fn close(&mut self) -> Result<(), StorageError>;
}

#[derive(Default)]
struct MemoryState {
    promised: ProposalId,
    accepted_proposal: ProposalId,
    accepted_value: Vec<u8>,
}

/// In-memory storage for tests and demos.
///
/// Cloning yields a handle to the same backing state; tests rehydrate a
/// fresh acceptor from a retained clone the way a restart would.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn save_promised(&mut self, proposal: &ProposalId) -> Result<(), StorageError> {
        self.state.lock().expect("storage lock poisoned").promised = proposal.clone();
        Ok(())
    }

    fn load_promised(&self) -> Result<ProposalId, StorageError> {
        Ok(self
            .state
            .lock()
            .expect("storage lock poisoned")
            .promised
            .clone())
    }

    fn save_accepted(&mut self, proposal: &ProposalId, value: &[u8]) -> Result<(), StorageError> {
        let mut state = self.state.lock().expect("storage lock poisoned");
        state.accepted_proposal = proposal.clone();
        state.accepted_value = value.to_vec();
        Ok(())
    }

    fn load_accepted(&self) -> Result<(ProposalId, Vec<u8>), StorageError> {
        let state = self.state.lock().expect("storage lock poisoned");
        Ok((state.accepted_proposal.clone(), state.accepted_value.clone()))
    }

    fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    #[test]
    fn fresh_store_reads_zero() {
        let storage = MemoryStorage::new();
        assert!(storage.load_promised().unwrap().is_zero());
        let (proposal, value) = storage.load_accepted().unwrap();
        assert!(proposal.is_zero());
        assert!(value.is_empty());
    }

    #[test]
    fn promised_round_trips() {
        let mut storage = MemoryStorage::new();
        let proposal = ProposalId::new(4, NodeId::from("n1"));

        storage.save_promised(&proposal).unwrap();

        assert_eq!(storage.load_promised().unwrap(), proposal);
    }

    #[test]
    fn accepted_round_trips_byte_for_byte() {
        let mut storage = MemoryStorage::new();
        let proposal = ProposalId::new(2, NodeId::from("n0"));

        storage.save_accepted(&proposal, b"payload").unwrap();

        let (loaded, value) = storage.load_accepted().unwrap();
        assert_eq!(loaded, proposal);
        assert_eq!(value, b"payload".to_vec());
    }

    #[test]
    fn buffers_do_not_alias_the_store() {
        let mut storage = MemoryStorage::new();
        let proposal = ProposalId::new(1, NodeId::from("n0"));
        let mut input = b"abc".to_vec();

        storage.save_accepted(&proposal, &input).unwrap();
        input[0] = b'z';

        let (_, mut output) = storage.load_accepted().unwrap();
        assert_eq!(output, b"abc".to_vec());

        output[0] = b'q';
        let (_, again) = storage.load_accepted().unwrap();
        assert_eq!(again, b"abc".to_vec());
    }

    #[test]
    fn clone_shares_the_backing_state() {
        let mut storage = MemoryStorage::new();
        let reopened = storage.clone();
        let proposal = ProposalId::new(9, NodeId::from("n2"));

        storage.save_promised(&proposal).unwrap();

        assert_eq!(reopened.load_promised().unwrap(), proposal);
    }
}
