//! Staking service
//!
//! Periodic PoS proposal attempts: every check interval the service asks
//! the ledger for a stake block and submits whatever it gets. Failures
//! are logged and retried after a short pause; they never stop the
//! service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::constants::STAKE_CHECK_INTERVAL_MS;
use crate::ledger::Ledger;
use crate::p2p::{GossipMessage, PeerHub};

/// Pause before retrying after a failed submission
const RETRY_DELAY_MS: u64 = 5_000;

/// Periodic PoS block proposer
pub struct StakingService {
    ledger: Arc<Ledger>,
    hub: Arc<PeerHub>,
    running: AtomicBool,
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StakingService {
    /// Wire the service to the ledger and gossip hub
    pub fn new(ledger: Arc<Ledger>, hub: Arc<PeerHub>) -> Self {
        Self {
            ledger,
            hub,
            running: AtomicBool::new(false),
            stop: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Whether the proposal ticker is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start proposing for `address`
    pub fn start(self: &Arc<Self>, address: String) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("staking service already running");
            return;
        }
        self.stop.store(false, Ordering::SeqCst);
        info!("staking as {address}");

        let service = Arc::clone(self);
        let task = tokio::spawn(async move {
            service.run(address).await;
            service.running.store(false, Ordering::SeqCst);
        });

        let mut handle = self.lock_handle();
        *handle = Some(task);
    }

    /// Cancel the ticker
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(task) = self.lock_handle().take() {
            task.abort();
        }
        self.running.store(false, Ordering::SeqCst);
    }

    async fn run(&self, address: String) {
        while !self.stop.load(Ordering::SeqCst) {
            let delay = match self.attempt(&address) {
                Ok(()) => STAKE_CHECK_INTERVAL_MS,
                Err(()) => RETRY_DELAY_MS,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// One proposal attempt; `Err` asks for the short retry delay
    fn attempt(&self, address: &str) -> Result<(), ()> {
        let block = match self.ledger.generate_stake_block(address) {
            Some(block) => block,
            None => {
                debug!("no stake proposal this round");
                return Ok(());
            }
        };

        match self.ledger.append_mined_block(block.clone()) {
            Ok(()) => {
                info!("proposed stake block {} ({})", block.index, block.hash);
                self.hub.broadcast(&GossipMessage::Block(block));
                Ok(())
            }
            Err(e) => {
                warn!("stake block rejected: {e}");
                Err(())
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

    fn service(deterministic: bool) -> (Arc<StakingService>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::open(ChainStore::new(dir.path().join("chain.json"))).unwrap();
        if deterministic {
            ledger = ledger.with_deterministic_pos();
        }
        let hub = Arc::new(PeerHub::new(PeerLog::open(dir.path().join("peers.json"))));
        (
            Arc::new(StakingService::new(Arc::new(ledger), hub)),
            dir,
        )
    }

    #[tokio::test]
    async fn test_start_stop() {
        let (service, _dir) = service(false);

        service.start("staker".to_string());
        assert!(service.is_running());
        service.start("staker".to_string());
        assert!(service.is_running());

        service.stop();
        assert!(!service.is_running());
    }

    #[test]
    fn test_attempt_without_stake_is_quiet() {
        let (service, _dir) = service(true);
        // No stake registered: nothing proposed, regular interval kept.
        assert!(service.attempt("staker").is_ok());
        assert_eq!(service.ledger.chain_len(), 1);
    }
}
