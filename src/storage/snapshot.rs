//! Chain snapshot persistence
//!
//! The whole chain is serialized to a single JSON document on every append
//! or replacement. On load the stored hashes are kept verbatim - block and
//! transaction hashes are content-defined and were captured at
//! construction - and only the structural invariants are re-verified.
//! A corrupt snapshot is fatal at startup; it is never overwritten.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::consensus::Block;
use crate::node::genesis_block;
use crate::validation::Transaction;

/// Persistence errors; fatal when raised during startup
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("snapshot failed verification: {0}")]
    Invalid(String),
}

/// On-disk store for the chain snapshot
#[derive(Debug, Clone)]
pub struct ChainStore {
    path: PathBuf,
}

impl ChainStore {
    /// Create a store writing to the given file path
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize the chain to disk
    pub fn save(&self, chain: &[Block]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(chain)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Load and verify the snapshot; `None` when the file does not exist
    pub fn load(&self) -> Result<Option<Vec<Block>>, PersistenceError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let chain: Vec<Block> = serde_json::from_str(&json)?;
        verify_snapshot(&chain)?;
        Ok(Some(chain))
    }
}

/// Structural verification of a loaded snapshot
///
/// Parent links, indices and transaction validity; hashes are trusted as
/// stored.
fn verify_snapshot(chain: &[Block]) -> Result<(), PersistenceError> {
    let first = chain
        .first()
        .ok_or_else(|| PersistenceError::Invalid("snapshot is empty".into()))?;

    if *first != genesis_block() {
        return Err(PersistenceError::Invalid(
            "snapshot does not start from the genesis block".into(),
        ));
    }

    for i in 1..chain.len() {
        let block = &chain[i];
        if block.previous_hash != chain[i - 1].hash {
            return Err(PersistenceError::Invalid(format!(
                "broken parent link at index {i}"
            )));
        }
        if block.index as usize != i {
            return Err(PersistenceError::Invalid(format!(
                "block at position {i} claims index {}",
                block.index
            )));
        }
        if !block.transactions.iter().all(Transaction::is_valid) {
            return Err(PersistenceError::Invalid(format!(
                "invalid transaction in block {i}"
            )));
        }
    }

    Ok(())
}
