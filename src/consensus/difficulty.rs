//! Difficulty adjustment algorithm
//!
//! Pure retarget targeting 600 second blocks. The expected difficulty is
//! recomputed for every new block by comparing the head against the block
//! one full interval behind it; append validation and whole-chain
//! validation share this one function so they can never disagree.

use crate::consensus::Block;
use crate::constants::{
    BLOCK_TIME_MS, DIFFICULTY_ADJUSTMENT_FACTOR, DIFFICULTY_ADJUSTMENT_INTERVAL,
    GENESIS_DIFFICULTY,
};

/// Expected difficulty of the block that would extend `chain`
///
/// Chains not longer than the retarget interval keep the genesis
/// difficulty. Otherwise the elapsed time between the head and the block
/// `DIFFICULTY_ADJUSTMENT_INTERVAL` back decides a single ±1 step with a
/// floor of 1.
pub fn expected_difficulty(chain: &[Block]) -> u8 {
    let head = match chain.last() {
        Some(head) => head,
        None => return GENESIS_DIFFICULTY,
    };

    if chain.len() <= DIFFICULTY_ADJUSTMENT_INTERVAL {
        return GENESIS_DIFFICULTY;
    }

    let anchor = &chain[chain.len() - 1 - DIFFICULTY_ADJUSTMENT_INTERVAL];
    let time_taken = head.timestamp.saturating_sub(anchor.timestamp);
    let time_expected = BLOCK_TIME_MS * DIFFICULTY_ADJUSTMENT_INTERVAL as u64;

    if time_taken < time_expected / DIFFICULTY_ADJUSTMENT_FACTOR {
        head.difficulty.saturating_add(1)
    } else if time_taken > time_expected * DIFFICULTY_ADJUSTMENT_FACTOR {
        head.difficulty.saturating_sub(1).max(1)
    } else {
        head.difficulty
    }
}
