//! Stake registry
//!
//! In-memory accounting of who has locked funds for Proof-of-Stake. The
//! registry drives proposer eligibility and the selection lottery; the
//! funds themselves live in the UTXO index and are re-checked by coinstake
//! validation.

use std::collections::HashMap;
use crate::constants::{MIN_STAKE_AGE_SECS, STAKE_CHECK_INTERVAL_MS};

use super::StateError;

const DAY_MS: u64 = 86_400_000;

/// Stake record of a single address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeInfo {
    /// Locked amount in minor units
    pub amount: u64,
    /// When the stake was (last) registered, milliseconds
    pub stake_start: u64,
    /// When this stake last won a block, milliseconds
    pub last_block_time: u64,
}

/// Weight of a stake in the proposer lottery
///
/// Grows 10% for every full day between registration and the last won
/// block; a stake that stops winning stops growing.
pub fn stake_weight(info: &StakeInfo) -> u64 {
    let matured = info.last_block_time.saturating_sub(info.stake_start);
    let days = (matured / DAY_MS) as i32;
    (info.amount as f64 * 1.1f64.powi(days)).floor() as u64
}

/// Whether a stake may attempt a proposal at time `now`
pub fn eligible_to_propose(info: &StakeInfo, now: u64) -> bool {
    now.saturating_sub(info.stake_start) >= MIN_STAKE_AGE_SECS * 1000
        && now.saturating_sub(info.last_block_time) >= STAKE_CHECK_INTERVAL_MS
}

/// Registry of all known stakes
#[derive(Debug, Default)]
pub struct StakeRegistry {
    stakes: HashMap<String, StakeInfo>,
}

impl StakeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the stake of an address
    pub fn get(&self, address: &str) -> Option<&StakeInfo> {
        self.stakes.get(address)
    }

    /// True while nobody has registered stake
    pub fn is_empty(&self) -> bool {
        self.stakes.is_empty()
    }

    /// Register new stake, accumulating onto any existing record
    pub fn register(&mut self, address: &str, amount: u64, now: u64) {
        let info = self.stakes.entry(address.to_string()).or_insert(StakeInfo {
            amount: 0,
            stake_start: now,
            last_block_time: now,
        });
        info.amount += amount;
        info.stake_start = now;
        info.last_block_time = now;
    }

    /// Withdraw stake; the record disappears when it reaches zero
    pub fn withdraw(&mut self, address: &str, amount: u64) -> Result<(), StateError> {
        let info = self.stakes.get_mut(address).ok_or(StateError::NoStake)?;
        if info.amount < amount {
            return Err(StateError::InsufficientStake);
        }
        info.amount -= amount;
        if info.amount == 0 {
            self.stakes.remove(address);
        }
        Ok(())
    }

    /// Advance a stake's last win to the given block time
    pub fn record_win(&mut self, address: &str, block_time: u64) {
        if let Some(info) = self.stakes.get_mut(address) {
            info.last_block_time = block_time;
        }
    }

    /// Sum of all stake weights
    pub fn total_weight(&self) -> u64 {
        self.stakes.values().map(stake_weight).sum()
    }
}
