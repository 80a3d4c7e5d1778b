use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::storage::{Storage, StorageError};
use crate::types::ProposalId;

const PROMISED_FILE: &str = "promised.json";
const ACCEPTED_FILE: &str = "accepted.json";

#[derive(Default, Serialize, Deserialize)]
struct AcceptedRecord {
    proposal: ProposalId,
    value: Vec<u8>,
}

/// Disk-backed storage. State lives in two files inside `dir`:
///   promised.json: highest promised proposal, written atomically via rename
///   accepted.json: accepted proposal and value, one record, same discipline
///
/// In-memory copies serve reads. Writes go to the file with fsync before the
/// copy is updated, so a successful save has already survived a crash.
pub struct FileStorage {
    dir: PathBuf,
    promised: ProposalId,
    accepted: AcceptedRecord,
}

impl FileStorage {
    /// Open (or create) storage rooted at `dir`. On first use the directory
    /// is created and both records start at zero.
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        let promised = read_json(&dir.join(PROMISED_FILE))?.unwrap_or_default();
        let accepted = read_json(&dir.join(ACCEPTED_FILE))?.unwrap_or_default();
        Ok(Self {
            dir: dir.to_path_buf(),
            promised,
            accepted,
        })
    }

    /// Atomically overwrite `name`: write temp file, fsync, rename, fsync dir.
    fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let tmp = self.dir.join(format!("{name}.tmp"));
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, self.dir.join(name))?;
        // Fsync the directory so the rename is visible after a crash.
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

impl Storage for FileStorage {
    fn save_promised(&mut self, proposal: &ProposalId) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(proposal)?;
        self.write_atomic(PROMISED_FILE, &bytes)?;
        self.promised = proposal.clone();
        Ok(())
    }

    fn load_promised(&self) -> Result<ProposalId, StorageError> {
        Ok(self.promised.clone())
    }

    fn save_accepted(&mut self, proposal: &ProposalId, value: &[u8]) -> Result<(), StorageError> {
        let record = AcceptedRecord {
            proposal: proposal.clone(),
            value: value.to_vec(),
        };
        let bytes = serde_json::to_vec(&record)?;
        self.write_atomic(ACCEPTED_FILE, &bytes)?;
        self.accepted = record;
        Ok(())
    }

    fn load_accepted(&self) -> Result<(ProposalId, Vec<u8>), StorageError> {
        Ok((self.accepted.proposal.clone(), self.accepted.value.clone()))
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
    fn fresh_open_reads_zero() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::open(tmp.path()).expect("open");

        assert!(storage.load_promised().expect("load").is_zero());
        let (proposal, value) = storage.load_accepted().expect("load");
        assert!(proposal.is_zero());
        assert!(value.is_empty());
    }

    #[test]
    fn promised_survives_reopen() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let proposal = ProposalId::new(7, NodeId::from("n2"));
        {
            let mut storage = FileStorage::open(tmp.path()).expect("open");
            storage.save_promised(&proposal).expect("save");
        }
        let storage = FileStorage::open(tmp.path()).expect("reopen");
        assert_eq!(storage.load_promised().expect("load"), proposal);
    }

    #[test]
    fn accepted_survives_reopen() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let proposal = ProposalId::new(3, NodeId::from("n1"));
        {
            let mut storage = FileStorage::open(tmp.path()).expect("open");
            storage.save_accepted(&proposal, b"locked in").expect("save");
        }
        let storage = FileStorage::open(tmp.path()).expect("reopen");
        let (loaded, value) = storage.load_accepted().expect("load");
        assert_eq!(loaded, proposal);
        assert_eq!(value, b"locked in".to_vec());
    }

    #[test]
    fn latest_save_wins() {
        let tmp = tempfile::tempdir().expect("tempdir");
        {
            let mut storage = FileStorage::open(tmp.path()).expect("open");
            storage
                .save_promised(&ProposalId::new(1, NodeId::from("a")))
                .expect("save");
            storage
                .save_promised(&ProposalId::new(5, NodeId::from("b")))
                .expect("save");
        }
        let storage = FileStorage::open(tmp.path()).expect("reopen");
        assert_eq!(
            storage.load_promised().expect("load"),
            ProposalId::new(5, NodeId::from("b"))
        );
    }

    #[test]
    fn mutating_the_input_after_save_changes_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let proposal = ProposalId::new(2, NodeId::from("n0"));
        let mut input = b"original".to_vec();
        {
            let mut storage = FileStorage::open(tmp.path()).expect("open");
            storage.save_accepted(&proposal, &input).expect("save");
            input[0] = b'X';
            let (_, value) = storage.load_accepted().expect("load");
            assert_eq!(value, b"original".to_vec());
        }
        let storage = FileStorage::open(tmp.path()).expect("reopen");
        let (_, value) = storage.load_accepted().expect("load");
        assert_eq!(value, b"original".to_vec());
    }
}
