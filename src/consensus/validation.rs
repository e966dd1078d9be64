//! Block and chain validation
//!
//! Pure functions shared by local append, peer append and whole-chain
//! replacement, so a block cannot be valid on one path and invalid on
//! another.

use thiserror::Error;
use crate::consensus::{expected_difficulty, Block};
use crate::constants::{BLOCK_TIME_MS, MIN_STAKE_AGE_SECS, MIN_STAKE_AMOUNT, POW_CUTOFF};
use crate::crypto::Hash;
use crate::node::genesis_block;
use crate::storage::UtxoIndex;
use crate::validation::Transaction;

/// Validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("block contains invalid transactions")]
    InvalidTransactions,
    #[error("block timestamp is too close to its parent")]
    BlockTooSoon,
    #[error("block does not extend the current head")]
    WrongParent,
    #[error("block index does not match the chain height")]
    WrongIndex,
    #[error("proof-of-work block past the cutoff height")]
    PowAfterCutoff,
    #[error("block difficulty does not match the retarget")]
    BadDifficulty,
    #[error("block hash does not satisfy its difficulty target")]
    BadProofOfWork,
    #[error("invalid coinstake: {0}")]
    BadStake(String),
    #[error("chain does not start from the genesis block")]
    InvalidGenesis,
    #[error("broken parent link at index {0}")]
    BrokenLink(u32),
}

/// Locate a confirmed transaction by hash
pub fn find_transaction<'a>(chain: &'a [Block], hash: &Hash) -> Option<&'a Transaction> {
    chain
        .iter()
        .flat_map(|block| block.transactions.iter())
        .find(|tx| tx.hash() == *hash)
}

/// Validate a block extending `chain`
///
/// `utxo` must be the index replayed up to the chain head. `no_stakers`
/// relaxes the PoW cutoff for the single transition block: when nobody has
/// registered stake as the chain reaches the cutoff height, that one block
/// may still be proof of work.
pub fn validate_next_block(
    block: &Block,
    chain: &[Block],
    utxo: &UtxoIndex,
    now_ms: u64,
    no_stakers: bool,
) -> Result<(), ValidationError> {
    if !block.transactions.iter().all(Transaction::is_valid) {
        return Err(ValidationError::InvalidTransactions);
    }

    let parent = chain.last().ok_or(ValidationError::InvalidGenesis)?;
    if block.previous_hash != parent.hash {
        return Err(ValidationError::WrongParent);
    }
    if block.index as usize != chain.len() {
        return Err(ValidationError::WrongIndex);
    }

    if block.timestamp.saturating_sub(parent.timestamp) < BLOCK_TIME_MS {
        return Err(ValidationError::BlockTooSoon);
    }

    if block.is_pow() {
        validate_pow(block, chain, no_stakers)
    } else {
        validate_coinstake(block, chain, utxo, now_ms)
    }
}

fn validate_pow(block: &Block, chain: &[Block], no_stakers: bool) -> Result<(), ValidationError> {
    // Exactly one PoW block is tolerated past the cutoff: the transition
    // block at the cutoff height itself, and only while nobody has
    // registered stake. Anything later must be PoS.
    if block.index >= POW_CUTOFF && !(no_stakers && block.index == POW_CUTOFF) {
        return Err(ValidationError::PowAfterCutoff);
    }

    if block.difficulty != expected_difficulty(chain) {
        return Err(ValidationError::BadDifficulty);
    }

    // The stored hash must be the canonical hash and meet the target.
    if block.compute_hash() != block.hash || !block.meets_own_difficulty() {
        return Err(ValidationError::BadProofOfWork);
    }

    Ok(())
}

fn validate_coinstake(
    block: &Block,
    chain: &[Block],
    utxo: &UtxoIndex,
    now_ms: u64,
) -> Result<(), ValidationError> {
    // is_pos guarantees transactions[1] exists and is a coinstake
    let coinstake = &block.transactions[1];
    let staked = &coinstake.outputs[1];

    if staked.amount < MIN_STAKE_AMOUNT {
        return Err(ValidationError::BadStake(format!(
            "staked amount {} below minimum",
            staked.amount
        )));
    }

    let input = &coinstake.inputs[0];

    // Double-stake guard: the referenced output must still be unspent.
    let previous = utxo
        .get(&input.previous_tx, input.output_index)
        .ok_or_else(|| ValidationError::BadStake("staked output is spent or unknown".into()))?;

    if previous.output.amount != staked.amount {
        return Err(ValidationError::BadStake(
            "staked amount does not match the spent output".into(),
        ));
    }
    if previous.output.address != staked.address {
        return Err(ValidationError::BadStake(
            "coinstake does not return funds to the staker".into(),
        ));
    }

    let previous_tx = find_transaction(chain, &input.previous_tx)
        .ok_or_else(|| ValidationError::BadStake("staked output has no confirmed origin".into()))?;
    if now_ms.saturating_sub(previous_tx.timestamp) < MIN_STAKE_AGE_SECS * 1000 {
        return Err(ValidationError::BadStake("staked output is too young".into()));
    }

    Ok(())
}

/// Validate a whole chain from genesis, returning the replayed UTXO index
///
/// Used by chain replacement and `is_chain_valid`; the index it returns is
/// exactly the one a node replaying the chain block by block would hold.
/// A historical transition PoW block at the cutoff height is accepted
/// (its producer had no stakers at the time), so replay agrees with the
/// append rule.
pub fn validate_chain(chain: &[Block], now_ms: u64) -> Result<UtxoIndex, ValidationError> {
    let genesis = chain.first().ok_or(ValidationError::InvalidGenesis)?;
    if *genesis != genesis_block() {
        return Err(ValidationError::InvalidGenesis);
    }

    let mut utxo = UtxoIndex::new();
    utxo.apply_block(genesis);

    for i in 1..chain.len() {
        let block = &chain[i];
        if block.previous_hash != chain[i - 1].hash || block.index as usize != i {
            return Err(ValidationError::BrokenLink(i as u32));
        }
        validate_next_block(block, &chain[..i], &utxo, now_ms, true)?;
        utxo.apply_block(block);
    }

    Ok(utxo)
}
