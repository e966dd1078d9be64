//! Genesis block
//!
//! Every Ember node starts from the same fixed genesis block; chain
//! replacement and snapshot loading both verify equivalence against it.

use crate::consensus::Block;
use crate::constants::{GENESIS_ADDRESS, GENESIS_AMOUNT, GENESIS_DIFFICULTY, GENESIS_TIMESTAMP};
use crate::validation::Transaction;

/// Construct the genesis block
///
/// Reproducible byte-for-byte: the single coinbase pays the genesis
/// address at the fixed epoch timestamp, and the hash is computed from
/// those fields alone.
pub fn genesis_block() -> Block {
    let coinbase = Transaction::coinbase(GENESIS_ADDRESS, GENESIS_AMOUNT, GENESIS_TIMESTAMP);
    Block::seal(
        0,
        GENESIS_TIMESTAMP,
        "0".to_string(),
        0,
        GENESIS_DIFFICULTY,
        vec![coinbase],
    )
}
