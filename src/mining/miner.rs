//! Miner
//!
//! Drives PoW rounds while the chain is still in its PoW phase. Each
//! round snapshots the head and pending pool into an immutable job, runs
//! the search on the blocking pool, and submits the worker's sealed block
//! back to the ledger. A submission failure ends the round, not the
//! miner; a successful append is broadcast and the next round is
//! scheduled one target block time later.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::consensus::expected_difficulty;
use crate::constants::{BLOCK_TIME_MS, POW_CUTOFF};
use crate::ledger::Ledger;
use crate::mining::{pow_search, MineJob, WorkerMessage};
use crate::node::now_ms;
use crate::p2p::{GossipMessage, PeerHub};

/// Asynchronous PoW block producer
pub struct Miner {
    ledger: Arc<Ledger>,
    hub: Arc<PeerHub>,
    mining: AtomicBool,
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Miner {
    /// Wire a miner to the ledger and gossip hub
    pub fn new(ledger: Arc<Ledger>, hub: Arc<PeerHub>) -> Self {
        Self {
            ledger,
            hub,
            mining: AtomicBool::new(false),
            stop: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Whether a mining task is currently running
    pub fn is_mining(&self) -> bool {
        self.mining.load(Ordering::SeqCst)
    }

    /// Begin mining to `address`
    ///
    /// No-op when already mining or when the chain has reached the PoW
    /// cutoff. When the head is younger than the target spacing, the
    /// first round is delayed by the remainder.
    pub fn start(self: &Arc<Self>, address: String) {
        if self.mining.swap(true, Ordering::SeqCst) {
            debug!("miner already running");
            return;
        }
        if self.ledger.chain_len() >= POW_CUTOFF as usize {
            info!("chain is past the PoW cutoff; not starting the miner");
            self.mining.store(false, Ordering::SeqCst);
            return;
        }

        self.stop.store(false, Ordering::SeqCst);
        info!("mining to {address}");

        let miner = Arc::clone(self);
        let task = tokio::spawn(async move {
            miner.run(address).await;
            miner.mining.store(false, Ordering::SeqCst);
        });

        let mut handle = self.lock_handle();
        *handle = Some(task);
    }

    /// Cancel any pending schedule and terminate the worker
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(task) = self.lock_handle().take() {
            task.abort();
        }
        self.mining.store(false, Ordering::SeqCst);
    }

    async fn run(&self, address: String) {
        while !self.stop.load(Ordering::SeqCst) {
            if self.ledger.chain_len() >= POW_CUTOFF as usize {
                info!("PoW cutoff reached; miner retiring");
                return;
            }

            // Respect the target spacing relative to the current head.
            let head = self.ledger.latest_block();
            let elapsed = now_ms().saturating_sub(head.timestamp);
            if elapsed < BLOCK_TIME_MS {
                tokio::time::sleep(Duration::from_millis(BLOCK_TIME_MS - elapsed)).await;
                continue;
            }

            self.mine_round(&address).await;
            tokio::time::sleep(Duration::from_millis(BLOCK_TIME_MS)).await;
        }
    }

    /// One complete search-and-submit round
    async fn mine_round(&self, address: &str) {
        let chain = self.ledger.chain_snapshot();
        let head = chain.last().expect("chain holds genesis");

        let job = MineJob {
            miner_address: address.to_string(),
            index: head.index + 1,
            difficulty: expected_difficulty(&chain),
            previous_hash: head.hash.clone(),
            pending: self.ledger.pending_snapshot(),
            min_timestamp: head.timestamp + BLOCK_TIME_MS + 1,
        };

        let (out, mut results) = mpsc::channel(16);
        let stop = Arc::clone(&self.stop);
        tokio::task::spawn_blocking(move || pow_search(job, stop, out));

        while let Some(message) = results.recv().await {
            match message {
                WorkerMessage::Progress { nonce } => {
                    debug!("mining... {nonce} nonces tried");
                }
                WorkerMessage::Mined(block) => {
                    // A round finishing after stop is discarded.
                    if self.stop.load(Ordering::SeqCst) {
                        return;
                    }
                    match self.ledger.append_mined_block(block.clone()) {
                        Ok(()) => {
                            info!("mined block {} ({})", block.index, block.hash);
                            self.hub.broadcast(&GossipMessage::Block(block));
                        }
                        Err(e) => error!("mined block rejected: {e}"),
                    }
                    return;
                }
                WorkerMessage::Failed(reason) => {
                    error!("mining round failed: {reason}");
                    return;
                }
            }
        }
    }

    fn lock_handle(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChainStore, PeerLog};

    fn miner() -> (Arc<Miner>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(
            Ledger::open(ChainStore::new(dir.path().join("chain.json"))).unwrap(),
        );
        let hub = Arc::new(PeerHub::new(PeerLog::open(dir.path().join("peers.json"))));
        (Arc::new(Miner::new(ledger, hub)), dir)
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (miner, _dir) = miner();

        miner.start("miner1".to_string());
        assert!(miner.is_mining());
        // Second start is a no-op, not a second task
        miner.start("miner1".to_string());
        assert!(miner.is_mining());

        miner.stop();
        assert!(!miner.is_mining());
    }

    #[tokio::test]
    async fn test_round_submits_to_ledger() {
        let (miner, _dir) = miner();

        // Genesis is old, so the round runs immediately; genesis difficulty
        // keeps the search short enough for a test.
        miner.mine_round("miner1").await;

        assert_eq!(miner.ledger.chain_len(), 2);
        let head = miner.ledger.latest_block();
        assert!(head.is_pow());
        assert!(head.meets_own_difficulty());
        assert_eq!(head.transactions[0].outputs[0].address, "miner1");
    }

    #[tokio::test]
    async fn test_result_after_stop_is_discarded() {
        let (miner, _dir) = miner();

        miner.stop.store(true, Ordering::SeqCst);
        miner.mine_round("miner1").await;

        assert_eq!(miner.ledger.chain_len(), 1);
    }
}
