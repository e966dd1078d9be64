//! PoW search worker
//!
//! The search is CPU-bound and must never run on the async executor: the
//! worker receives an immutable job description on the blocking pool,
//! shares no state with the ledger, and reports back over a channel as a
//! tagged stream of progress, a sealed block, or a failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::consensus::{hash_preimage_prefix, hash_with_nonce, meets_difficulty, Block};
use crate::constants::POW_BLOCK_REWARD;
use crate::node::now_ms;
use crate::validation::Transaction;

/// Nonce attempts between progress reports
const PROGRESS_INTERVAL: u64 = 100_000;

/// Immutable description of one mining round
#[derive(Debug, Clone)]
pub struct MineJob {
    /// Address credited by the coinbase
    pub miner_address: String,
    /// Height of the block being mined
    pub index: u32,
    /// Leading-zero-nibble target
    pub difficulty: u8,
    /// Hash of the current head
    pub previous_hash: String,
    /// Pending transactions to include after the coinbase
    pub pending: Vec<Transaction>,
    /// Earliest permissible timestamp (parent + spacing)
    pub min_timestamp: u64,
}

/// Messages the worker emits while searching
#[derive(Debug)]
pub enum WorkerMessage {
    /// Heartbeat every `PROGRESS_INTERVAL` attempts
    Progress { nonce: u64 },
    /// The sealed block; its hash is final and must be kept verbatim
    Mined(Block),
    /// The round cannot produce a block
    Failed(String),
}

/// Run the PoW search to completion, streaming results over `out`
///
/// Returns silently when `stop` is raised or the receiver goes away; a
/// result that can no longer be delivered is simply discarded.
pub fn pow_search(job: MineJob, stop: Arc<AtomicBool>, out: mpsc::Sender<WorkerMessage>) {
    if job.difficulty as usize > 64 {
        let _ = out.blocking_send(WorkerMessage::Failed(format!(
            "unattainable difficulty {}",
            job.difficulty
        )));
        return;
    }

    let timestamp = now_ms().max(job.min_timestamp);

    let mut transactions = vec![Transaction::coinbase(
        &job.miner_address,
        POW_BLOCK_REWARD,
        timestamp,
    )];
    transactions.extend(job.pending);

    let prefix = hash_preimage_prefix(timestamp, &transactions, &job.previous_hash);

    let mut nonce = 0u64;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }

        let hash = hash_with_nonce(&prefix, nonce);
        if meets_difficulty(&hash, job.difficulty) {
            let block = Block {
                index: job.index,
                timestamp,
                previous_hash: job.previous_hash,
                nonce,
                difficulty: job.difficulty,
                transactions,
                hash,
            };
            let _ = out.blocking_send(WorkerMessage::Mined(block));
            return;
        }

        nonce = nonce.wrapping_add(1);
        if nonce % PROGRESS_INTERVAL == 0 {
            if out
                .blocking_send(WorkerMessage::Progress { nonce })
                .is_err()
            {
                // Receiver is gone; nobody wants the block anymore.
                return;
            }
        }
    }
}
