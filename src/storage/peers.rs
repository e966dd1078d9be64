//! Persisted peer log
//!
//! A deduplicated list of `host:port` strings observed over the lifetime
//! of the node, stored as a JSON array next to the chain snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use super::PersistenceError;

/// Append-only log of peers this node has seen
#[derive(Debug)]
pub struct PeerLog {
    path: PathBuf,
    peers: Vec<String>,
}

impl PeerLog {
    /// Open the log, loading any existing entries
    ///
    /// An unreadable log is not fatal - the node can run without peer
    /// history - so load failures fall back to an empty list.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let peers = fs::read_to_string(&path)
            .ok()
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default();
        Self { path, peers }
    }

    /// Record a `host:port` entry; returns true when it was new
    pub fn record(&mut self, entry: &str) -> bool {
        if self.peers.iter().any(|p| p == entry) {
            return false;
        }
        self.peers.push(entry.to_string());
        if let Err(e) = self.save() {
            log::warn!("failed to persist peer log: {e}");
        }
        true
    }

    /// All recorded peers
    pub fn entries(&self) -> &[String] {
        &self.peers
    }

    fn save(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&self.peers)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
