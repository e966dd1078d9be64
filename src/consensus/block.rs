//! Block structure
//!
//! A block's kind is a structural property of its transaction list: it is
//! PoS when the second transaction is a coinstake, PoW otherwise. The hash
//! circulates as a hex string because the PoW target is expressed in
//! leading zero nibbles.

use serde::{Deserialize, Serialize};
use crate::crypto::sha256;
use crate::validation::Transaction;

/// A block in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Height of this block
    pub index: u32,
    /// Block timestamp, milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Hex hash of the parent block; "0" for genesis
    pub previous_hash: String,
    /// PoW nonce; 0 for PoS blocks
    pub nonce: u64,
    /// Leading-zero-nibble target for PoW; chain identification for PoS
    #[serde(rename = "powDifficulty")]
    pub difficulty: u8,
    /// Transactions committed by this block
    pub transactions: Vec<Transaction>,
    /// Canonical hex hash, stored verbatim once computed
    pub hash: String,
}

/// Canonical hash preimage shared by sealing and the mining worker
///
/// Layout: u64-LE timestamp, the 32-byte canonical hash of each transaction
/// in order, u32-LE previous-hash length, the previous-hash UTF-8 bytes.
/// The u64-LE nonce is appended per attempt, so a PoW search re-hashes only
/// the nonce suffix. Index and difficulty are not part of the preimage.
pub fn hash_preimage_prefix(
    timestamp: u64,
    transactions: &[Transaction],
    previous_hash: &str,
) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&timestamp.to_le_bytes());
    for tx in transactions {
        bytes.extend_from_slice(&tx.hash().0);
    }
    bytes.extend_from_slice(&(previous_hash.len() as u32).to_le_bytes());
    bytes.extend_from_slice(previous_hash.as_bytes());
    bytes
}

/// Complete a preimage prefix with a nonce and hash it
pub fn hash_with_nonce(prefix: &[u8], nonce: u64) -> String {
    let mut bytes = Vec::with_capacity(prefix.len() + 8);
    bytes.extend_from_slice(prefix);
    bytes.extend_from_slice(&nonce.to_le_bytes());
    sha256(&bytes).to_hex()
}

/// Check that a hex hash meets a leading-zero-nibble target
pub fn meets_difficulty(hash: &str, difficulty: u8) -> bool {
    hash.len() >= difficulty as usize
        && hash.chars().take(difficulty as usize).all(|c| c == '0')
}

impl Block {
    /// Assemble a block and compute its hash
    pub fn seal(
        index: u32,
        timestamp: u64,
        previous_hash: String,
        nonce: u64,
        difficulty: u8,
        transactions: Vec<Transaction>,
    ) -> Self {
        let prefix = hash_preimage_prefix(timestamp, &transactions, &previous_hash);
        let hash = hash_with_nonce(&prefix, nonce);
        Self {
            index,
            timestamp,
            previous_hash,
            nonce,
            difficulty,
            transactions,
            hash,
        }
    }

    /// Recompute the canonical hash from the block's contents
    pub fn compute_hash(&self) -> String {
        let prefix = hash_preimage_prefix(self.timestamp, &self.transactions, &self.previous_hash);
        hash_with_nonce(&prefix, self.nonce)
    }

    /// A block is PoS iff its second transaction is a coinstake
    pub fn is_pos(&self) -> bool {
        self.transactions.len() >= 2 && self.transactions[1].is_coinstake()
    }

    /// PoW is every block that is not PoS
    pub fn is_pow(&self) -> bool {
        !self.is_pos()
    }

    /// Check this block's hash against its own difficulty target
    pub fn meets_own_difficulty(&self) -> bool {
        meets_difficulty(&self.hash, self.difficulty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pow_block() -> Block {
        Block::seal(
            1,
            1000,
            "aa".repeat(32),
            42,
            1,
            vec![Transaction::coinbase("miner", 12_500, 1000)],
        )
    }

    #[test]
    fn test_seal_matches_recompute() {
        let block = pow_block();
        assert_eq!(block.hash, block.compute_hash());
    }

    #[test]
    fn test_hash_depends_on_nonce() {
        let a = pow_block();
        let mut b = a.clone();
        b.nonce += 1;
        assert_ne!(a.hash, b.compute_hash());
    }

    #[test]
    fn test_hash_ignores_index_and_difficulty() {
        let a = pow_block();
        let mut b = a.clone();
        b.index = 99;
        b.difficulty = 7;
        assert_eq!(a.hash, b.compute_hash());
    }

    #[test]
    fn test_kind_discrimination() {
        let pow = pow_block();
        assert!(pow.is_pow());
        assert!(!pow.is_pos());

        let pos = Block::seal(
            2,
            2000,
            pow.hash.clone(),
            0,
            1,
            vec![
                Transaction::coinbase("staker", 10, 2000),
                Transaction::coinstake(crate::crypto::sha256(b"prev"), 0, "staker", 500, 2000),
            ],
        );
        assert!(pos.is_pos());
        assert!(!pos.is_pow());
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ff", 2));
        assert!(!meets_difficulty("0fff", 2));
        assert!(meets_difficulty("ffff", 0));
        assert!(!meets_difficulty("0", 2));
    }

    #[test]
    fn test_difficulty_serializes_as_pow_difficulty() {
        let block = pow_block();
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"powDifficulty\":1"));

        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
    }
}
