//! Ledger engine
//!
//! Owns the chain, the pending pool, the UTXO index and the stake
//! registry behind one mutex - the replace-mutex - so chain replacement,
//! block append and every read-modify-write on derived state observe a
//! consistent ledger. The snapshot store is written only from inside that
//! mutex (single writer).

mod stake;

pub use stake::*;

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::consensus::{
    expected_difficulty, find_transaction, hash_preimage_prefix, hash_with_nonce,
    meets_difficulty, validate_chain, validate_next_block, Block, ValidationError,
};
use crate::constants::{
    BLOCK_TIME_MS, MIN_STAKE_AGE_SECS, MIN_STAKE_AMOUNT, POS_BLOCK_REWARD, POW_BLOCK_REWARD,
    POW_CUTOFF,
};
use crate::crypto::Hash;
use crate::node::{genesis_block, now_ms};
use crate::storage::{ChainStore, PersistenceError, UtxoIndex};
use crate::validation::{Transaction, TxInput, TxOutput};
use crate::wallet::KeyPair;

/// Errors from ledger state operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("balance does not cover the requested stake")]
    InsufficientBalanceForStaking,
    #[error("no stake registered for this address")]
    NoStake,
    #[error("unstake amount exceeds the registered stake")]
    InsufficientStake,
    #[error("stake amount below the minimum")]
    BelowMinimumStake,
}

/// Umbrella error for the ledger's public surface
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Everything guarded by the replace-mutex
struct ChainState {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    utxo: UtxoIndex,
    stakes: StakeRegistry,
}

/// The ledger engine
pub struct Ledger {
    state: Mutex<ChainState>,
    store: ChainStore,
    /// Test mode: proposer eligibility and the lottery deterministically pass
    deterministic_pos: bool,
}

impl Ledger {
    /// Open the ledger, loading the snapshot or writing genesis
    ///
    /// A present-but-invalid snapshot is a fatal error; it is never
    /// overwritten.
    pub fn open(store: ChainStore) -> Result<Self, LedgerError> {
        let chain = match store.load()? {
            Some(chain) => chain,
            None => {
                let chain = vec![genesis_block()];
                store.save(&chain)?;
                chain
            }
        };

        let utxo = UtxoIndex::rebuild(&chain);
        Ok(Self {
            state: Mutex::new(ChainState {
                chain,
                pending: Vec::new(),
                utxo,
                stakes: StakeRegistry::new(),
            }),
            store,
            deterministic_pos: false,
        })
    }

    /// Switch proposer eligibility and the stake lottery to always pass
    pub fn with_deterministic_pos(mut self) -> Self {
        self.deterministic_pos = true;
        self
    }

    // A panicking writer must not wedge the node; recover the guard.
    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validate and append a locally produced block
    pub fn append_mined_block(&self, block: Block) -> Result<(), LedgerError> {
        let mut st = self.lock();
        self.append_locked(&mut st, block, now_ms())
    }

    /// Validate and append a block received from a peer
    ///
    /// Idempotent: a block already in the chain is accepted silently with
    /// `false`, so the caller knows not to re-broadcast it.
    pub fn try_append_peer_block(&self, block: Block) -> Result<bool, LedgerError> {
        let mut st = self.lock();
        if st.chain.iter().any(|b| b.hash == block.hash) {
            return Ok(false);
        }
        self.append_locked(&mut st, block, now_ms())?;
        Ok(true)
    }

    fn append_locked(
        &self,
        st: &mut ChainState,
        block: Block,
        now: u64,
    ) -> Result<(), LedgerError> {
        validate_next_block(&block, &st.chain, &st.utxo, now, st.stakes.is_empty())?;

        st.utxo.apply_block(&block);
        if block.is_pos() {
            let staker = block.transactions[1].outputs[1].address.clone();
            st.stakes.record_win(&staker, block.timestamp);
        }
        st.chain.push(block);
        st.pending.clear();
        self.store.save(&st.chain)?;
        Ok(())
    }

    /// Replace the chain wholesale with a strictly longer valid one
    ///
    /// Returns `false` without touching anything when the candidate is not
    /// longer; validation failures surface as errors. On success the UTXO
    /// index is the candidate's full replay and pending transactions now
    /// confirmed by the new chain are dropped.
    pub fn replace_chain(&self, new_chain: Vec<Block>) -> Result<bool, LedgerError> {
        let mut st = self.lock();
        if new_chain.len() <= st.chain.len() {
            return Ok(false);
        }

        let utxo = validate_chain(&new_chain, now_ms())?;

        let confirmed: HashSet<Hash> = new_chain
            .iter()
            .flat_map(|b| b.transactions.iter())
            .map(Transaction::hash)
            .collect();
        st.pending.retain(|tx| !confirmed.contains(&tx.hash()));

        st.chain = new_chain;
        st.utxo = utxo;
        self.store.save(&st.chain)?;
        Ok(true)
    }

    /// Admit a transaction to the pending pool
    pub fn add_transaction(&self, tx: Transaction) -> Result<(), LedgerError> {
        if tx.inputs.is_empty() || tx.outputs.is_empty() {
            return Err(ValidationError::InvalidTransactions.into());
        }
        if !tx.is_valid() || !tx.verify_signatures() {
            return Err(ValidationError::InvalidTransactions.into());
        }

        let mut st = self.lock();
        st.pending.push(tx);
        Ok(())
    }

    /// Build and sign a transfer; the result is not yet pending
    ///
    /// Selects UTXOs of `from` greedily until the amount is covered and
    /// returns change to `from`, omitting a zero change output.
    pub fn create_transaction(
        &self,
        from: &str,
        to: &str,
        amount: u64,
        signer: &KeyPair,
    ) -> Result<Transaction, LedgerError> {
        let st = self.lock();

        let selected = st.utxo.select(from, amount).ok_or(StateError::InsufficientFunds {
            have: st.utxo.balance(from),
            need: amount,
        })?;
        let total: u64 = selected.iter().map(|u| u.output.amount).sum();

        let mut outputs = vec![TxOutput {
            address: to.to_string(),
            amount,
        }];
        let change = total - amount;
        if change > 0 {
            outputs.push(TxOutput {
                address: from.to_string(),
                amount: change,
            });
        }

        let inputs = selected
            .into_iter()
            .map(|utxo| TxInput {
                previous_tx: utxo.tx_hash,
                output_index: utxo.output_index,
                signature: vec![],
                public_key: vec![],
            })
            .collect();

        let mut tx = Transaction::new(inputs, outputs, now_ms());
        tx.sign_inputs(signer.private_key());
        Ok(tx)
    }

    /// Lock funds for staking
    ///
    /// Builds a locking transaction returning the staked amount to the
    /// staker, mines it (best effort - when local mining is not possible
    /// the transaction stays pending for the next proposer), then
    /// registers the stake.
    pub fn stake(&self, address: &str, amount: u64, signer: &KeyPair) -> Result<(), LedgerError> {
        {
            let st = self.lock();
            if amount < MIN_STAKE_AMOUNT {
                return Err(StateError::BelowMinimumStake.into());
            }
            if st.utxo.balance(address) < amount {
                return Err(StateError::InsufficientBalanceForStaking.into());
            }
        }

        let lock_tx = self.create_transaction(address, address, amount, signer)?;
        {
            let mut st = self.lock();
            st.pending.push(lock_tx);
        }

        if let Err(e) = self.mine_pending(address) {
            log::warn!("stake lock transaction left pending: {e}");
        }

        let mut st = self.lock();
        st.stakes.register(address, amount, now_ms());
        Ok(())
    }

    /// Register stake observed from the network (no local signer)
    pub fn register_stake(&self, address: &str, amount: u64) -> Result<(), LedgerError> {
        let mut st = self.lock();
        if amount < MIN_STAKE_AMOUNT {
            return Err(StateError::BelowMinimumStake.into());
        }
        if st.utxo.balance(address) < amount {
            return Err(StateError::InsufficientBalanceForStaking.into());
        }
        st.stakes.register(address, amount, now_ms());
        Ok(())
    }

    /// Release staked funds
    pub fn unstake(&self, address: &str, amount: u64) -> Result<(), LedgerError> {
        let mut st = self.lock();
        st.stakes.withdraw(address, amount)?;
        Ok(())
    }

    /// Mine the pending pool into the next block (test convenience)
    pub fn mine_pending(&self, miner: &str) -> Result<Block, LedgerError> {
        self.mine_pending_at(miner, now_ms())
    }

    /// Deterministic variant of [`Self::mine_pending`] with an explicit clock
    pub fn mine_pending_at(&self, miner: &str, now: u64) -> Result<Block, LedgerError> {
        let mut st = self.lock();

        let pow_phase = st.chain.len() < POW_CUTOFF as usize;
        let block = if pow_phase || st.stakes.get(miner).is_none() {
            // Past the cutoff this is the transition block of a miner who
            // has not staked yet.
            assemble_pow_block(&st, miner, now)
        } else {
            self.generate_locked(&st, miner, now).ok_or_else(|| {
                ValidationError::BadStake("no eligible stake proposal".into())
            })?
        };

        self.append_locked(&mut st, block.clone(), now)?;
        Ok(block)
    }

    /// Attempt a PoS proposal for `address`
    ///
    /// `None` when the address has no stake, is not yet eligible, loses
    /// the lottery, or holds no mature output covering its stake.
    pub fn generate_stake_block(&self, address: &str) -> Option<Block> {
        let st = self.lock();
        self.generate_locked(&st, address, now_ms())
    }

    fn generate_locked(&self, st: &ChainState, address: &str, now: u64) -> Option<Block> {
        let info = *st.stakes.get(address)?;

        if !self.deterministic_pos {
            if !eligible_to_propose(&info, now) {
                return None;
            }
            let total = st.stakes.total_weight();
            if total == 0 {
                return None;
            }
            let probability = stake_weight(&info) as f64 / total as f64;
            if rand::random::<f64>() > probability {
                return None;
            }
        }

        // Any mature unspent output covering the stake can be bound, as
        // long as no pending transaction (the block will carry them all)
        // is already spending it.
        let reserved: HashSet<(Hash, u32)> = st
            .pending
            .iter()
            .flat_map(|tx| tx.inputs.iter())
            .map(|input| (input.previous_tx, input.output_index))
            .collect();

        let staked = st.utxo.find(address).iter().find(|u| {
            u.output.amount >= info.amount
                && !reserved.contains(&(u.tx_hash, u.output_index))
                && find_transaction(&st.chain, &u.tx_hash)
                    .map(|tx| now.saturating_sub(tx.timestamp) >= MIN_STAKE_AGE_SECS * 1000)
                    .unwrap_or(false)
        })?;

        let parent = st.chain.last()?;
        let timestamp = now.max(parent.timestamp + BLOCK_TIME_MS + 1);

        let mut transactions = vec![
            Transaction::coinbase(address, POS_BLOCK_REWARD, timestamp),
            Transaction::coinstake(
                staked.tx_hash,
                staked.output_index,
                address,
                staked.output.amount,
                timestamp,
            ),
        ];
        transactions.extend(st.pending.iter().cloned());

        Some(Block::seal(
            st.chain.len() as u32,
            timestamp,
            parent.hash.clone(),
            0,
            expected_difficulty(&st.chain),
            transactions,
        ))
    }

    /// Current chain head
    pub fn latest_block(&self) -> Block {
        self.lock().chain.last().cloned().expect("chain holds genesis")
    }

    /// Copy of the whole chain
    pub fn chain_snapshot(&self) -> Vec<Block> {
        self.lock().chain.clone()
    }

    /// Current chain length
    pub fn chain_len(&self) -> usize {
        self.lock().chain.len()
    }

    /// Copy of the pending pool
    pub fn pending_snapshot(&self) -> Vec<Transaction> {
        self.lock().pending.clone()
    }

    /// Spendable balance from the UTXO index
    pub fn balance(&self, address: &str) -> u64 {
        self.lock().utxo.balance(address)
    }

    /// Balance recomputed by historical replay (consistency checks)
    pub fn total_balance(&self, address: &str) -> u64 {
        use std::collections::HashMap;

        let st = self.lock();
        let mut seen: HashMap<Hash, &Transaction> = HashMap::new();
        let mut balance: i128 = 0;

        for block in &st.chain {
            for tx in &block.transactions {
                for input in &tx.inputs {
                    if let Some(prev) = seen.get(&input.previous_tx) {
                        if let Some(out) = prev.outputs.get(input.output_index as usize) {
                            if out.address == address {
                                balance -= out.amount as i128;
                            }
                        }
                    }
                }
                for out in &tx.outputs {
                    if out.address == address {
                        balance += out.amount as i128;
                    }
                }
                seen.insert(tx.hash(), tx);
            }
        }

        balance.max(0) as u64
    }

    /// Registered stake of an address (0 when none)
    pub fn get_stake(&self, address: &str) -> u64 {
        self.lock().stakes.get(address).map(|i| i.amount).unwrap_or(0)
    }

    /// Re-validate the whole chain from genesis
    pub fn is_chain_valid(&self) -> bool {
        let st = self.lock();
        validate_chain(&st.chain, now_ms()).is_ok()
    }
}

/// Assemble and solve a PoW block over the current pending pool
fn assemble_pow_block(st: &ChainState, miner: &str, now: u64) -> Block {
    let parent = st.chain.last().expect("chain holds genesis");
    let timestamp = now.max(parent.timestamp + BLOCK_TIME_MS + 1);

    let mut transactions = vec![Transaction::coinbase(miner, POW_BLOCK_REWARD, timestamp)];
    transactions.extend(st.pending.iter().cloned());

    let difficulty = expected_difficulty(&st.chain);
    let prefix = hash_preimage_prefix(timestamp, &transactions, &parent.hash);

    let mut nonce = 0u64;
    let hash = loop {
        let hash = hash_with_nonce(&prefix, nonce);
        if meets_difficulty(&hash, difficulty) {
            break hash;
        }
        nonce += 1;
    };

    Block {
        index: st.chain.len() as u32,
        timestamp,
        previous_hash: parent.hash.clone(),
        nonce,
        difficulty,
        transactions,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{GENESIS_TIMESTAMP, MIN_STAKE_AMOUNT};
    use tempfile::TempDir;

    fn fresh_ledger(dir: &TempDir) -> Ledger {
        let store = ChainStore::new(dir.path().join("chain.json"));
        Ledger::open(store).unwrap().with_deterministic_pos()
    }

    // Deterministic clock: blocks spaced 11 minutes apart from genesis.
    fn block_clock(i: u64) -> u64 {
        GENESIS_TIMESTAMP + i * 660_000
    }

    fn mine_blocks(ledger: &Ledger, miner: &str, count: u64) {
        let start = ledger.chain_len() as u64;
        for i in 0..count {
            ledger
                .mine_pending_at(miner, block_clock(start + i))
                .unwrap();
        }
    }

    #[test]
    fn test_fresh_node_is_genesis_only() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = fresh_ledger(&dir);

        let chain = ledger.chain_snapshot();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].previous_hash, "0");
        assert_eq!(chain[0].index, 0);
        assert!(chain[0].is_pow());
        assert!(ledger.is_chain_valid());
    }

    #[test]
    fn test_pow_reward_accrual() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = fresh_ledger(&dir);

        mine_blocks(&ledger, "miner1", 50);

        assert_eq!(ledger.chain_len(), 51);
        assert_eq!(ledger.total_balance("miner1"), 50 * POW_BLOCK_REWARD);
        assert_eq!(ledger.balance("miner1"), ledger.total_balance("miner1"));
        assert!(ledger.is_chain_valid());
    }

    #[test]
    fn test_snapshot_reload_replays_identically() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::new(dir.path().join("chain.json"));
        {
            let ledger = Ledger::open(store.clone()).unwrap().with_deterministic_pos();
            mine_blocks(&ledger, "miner1", 5);
        }

        let reloaded = Ledger::open(store).unwrap();
        assert_eq!(reloaded.chain_len(), 6);
        assert_eq!(reloaded.balance("miner1"), 5 * POW_BLOCK_REWARD);
        assert!(reloaded.is_chain_valid());
    }

    #[test]
    fn test_transition_to_pos() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = fresh_ledger(&dir);
        let signer = KeyPair::generate();

        mine_blocks(&ledger, "miner1", POW_CUTOFF as u64);
        assert_eq!(ledger.chain_len(), POW_CUTOFF as usize + 1);

        ledger.stake("miner1", MIN_STAKE_AMOUNT, &signer).unwrap();
        assert_eq!(ledger.get_stake("miner1"), MIN_STAKE_AMOUNT);

        let head = ledger.mine_pending("miner1").unwrap();
        assert!(head.is_pos());
        assert_eq!(ledger.latest_block().hash, head.hash);
        assert!(ledger.is_chain_valid());
    }

    #[test]
    fn test_stake_below_minimum_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = fresh_ledger(&dir);
        let signer = KeyPair::generate();

        mine_blocks(&ledger, "miner1", 2);
        let len_before = ledger.chain_len();

        let err = ledger.stake("miner1", 50, &signer).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::State(StateError::BelowMinimumStake)
        ));
        assert_eq!(ledger.chain_len(), len_before);
        assert_eq!(ledger.get_stake("miner1"), 0);
    }

    #[test]
    fn test_stake_without_balance_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = fresh_ledger(&dir);
        let signer = KeyPair::generate();

        let err = ledger.stake("pauper", 100, &signer).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::State(StateError::InsufficientBalanceForStaking)
        ));
    }

    #[test]
    fn test_unstake_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = fresh_ledger(&dir);
        let signer = KeyPair::generate();

        mine_blocks(&ledger, "miner1", 2);
        ledger.stake("miner1", 150, &signer).unwrap();

        ledger.unstake("miner1", 50).unwrap();
        assert_eq!(ledger.get_stake("miner1"), 100);

        let err = ledger.unstake("miner1", 500).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::State(StateError::InsufficientStake)
        ));

        ledger.unstake("miner1", 100).unwrap();
        assert_eq!(ledger.get_stake("miner1"), 0);
        assert!(matches!(
            ledger.unstake("miner1", 1).unwrap_err(),
            LedgerError::State(StateError::NoStake)
        ));
    }

    #[test]
    fn test_create_transaction_with_change() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = fresh_ledger(&dir);
        let signer = KeyPair::generate();

        mine_blocks(&ledger, "miner1", 1);

        let tx = ledger
            .create_transaction("miner1", "bob", 500, &signer)
            .unwrap();
        assert_eq!(tx.outputs[0].address, "bob");
        assert_eq!(tx.outputs[0].amount, 500);
        assert_eq!(tx.outputs[1].address, "miner1");
        assert_eq!(tx.outputs[1].amount, POW_BLOCK_REWARD - 500);
        assert!(tx.verify_signatures());

        ledger.add_transaction(tx).unwrap();
        assert_eq!(ledger.pending_snapshot().len(), 1);
    }

    #[test]
    fn test_create_transaction_omits_zero_change() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = fresh_ledger(&dir);
        let signer = KeyPair::generate();

        mine_blocks(&ledger, "miner1", 1);

        let tx = ledger
            .create_transaction("miner1", "bob", POW_BLOCK_REWARD, &signer)
            .unwrap();
        assert_eq!(tx.outputs.len(), 1);
    }

    #[test]
    fn test_create_transaction_insufficient_funds() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = fresh_ledger(&dir);
        let signer = KeyPair::generate();

        let err = ledger
            .create_transaction("nobody", "bob", 10, &signer)
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::State(StateError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_mined_block_spends_pending() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = fresh_ledger(&dir);
        let signer = KeyPair::generate();

        mine_blocks(&ledger, "miner1", 1);
        let tx = ledger
            .create_transaction("miner1", "bob", 500, &signer)
            .unwrap();
        ledger.add_transaction(tx).unwrap();

        mine_blocks(&ledger, "miner1", 1);

        assert!(ledger.pending_snapshot().is_empty());
        assert_eq!(ledger.balance("bob"), 500);
        assert_eq!(
            ledger.balance("miner1"),
            2 * POW_BLOCK_REWARD - 500
        );
        assert_eq!(ledger.balance("miner1"), ledger.total_balance("miner1"));
    }

    #[test]
    fn test_replace_chain_with_longer() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let local = fresh_ledger(&dir_a);
        let remote = fresh_ledger(&dir_b);

        mine_blocks(&local, "miner1", 2);
        mine_blocks(&remote, "miner2", 3);

        let replaced = local.replace_chain(remote.chain_snapshot()).unwrap();
        assert!(replaced);
        assert_eq!(local.chain_len(), 4);
        assert_eq!(local.balance("miner2"), 3 * POW_BLOCK_REWARD);
        // The abandoned miner's rewards are gone with the old chain
        assert_eq!(local.balance("miner1"), 0);
        assert!(local.is_chain_valid());
    }

    #[test]
    fn test_replace_chain_rejects_not_longer() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let local = fresh_ledger(&dir_a);
        let remote = fresh_ledger(&dir_b);

        mine_blocks(&local, "miner1", 3);
        mine_blocks(&remote, "miner2", 3);

        let replaced = local.replace_chain(remote.chain_snapshot()).unwrap();
        assert!(!replaced);
        assert_eq!(local.balance("miner1"), 3 * POW_BLOCK_REWARD);
    }

    #[test]
    fn test_replace_chain_rejects_tampered() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let local = fresh_ledger(&dir_a);
        let remote = fresh_ledger(&dir_b);

        mine_blocks(&local, "miner1", 1);
        mine_blocks(&remote, "miner2", 3);

        let mut forged = remote.chain_snapshot();
        forged[2].previous_hash = "f".repeat(64);

        assert!(local.replace_chain(forged).is_err());
        assert_eq!(local.chain_len(), 2);
    }

    #[test]
    fn test_replace_chain_drops_confirmed_pending() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let local = fresh_ledger(&dir_a);
        let remote = fresh_ledger(&dir_b);

        // The same transaction sits pending locally and confirmed remotely.
        mine_blocks(&remote, "miner2", 1);
        let signer = KeyPair::generate();
        let tx = remote
            .create_transaction("miner2", "bob", 100, &signer)
            .unwrap();
        local.add_transaction(tx.clone()).unwrap();
        remote.add_transaction(tx).unwrap();
        mine_blocks(&remote, "miner2", 1);

        local.replace_chain(remote.chain_snapshot()).unwrap();
        assert!(local.pending_snapshot().is_empty());
    }

    #[test]
    fn test_peer_block_append_and_idempotence() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let local = fresh_ledger(&dir_a);
        let remote = fresh_ledger(&dir_b);

        let block = remote.mine_pending_at("miner2", block_clock(1)).unwrap();

        local.try_append_peer_block(block.clone()).unwrap();
        assert_eq!(local.chain_len(), 2);

        // Receiving the same block again is fine
        local.try_append_peer_block(block).unwrap();
        assert_eq!(local.chain_len(), 2);
    }

    #[test]
    fn test_peer_block_with_bad_parent_rejected() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let local = fresh_ledger(&dir_a);
        let remote = fresh_ledger(&dir_b);

        let mut block = remote.mine_pending_at("miner2", block_clock(1)).unwrap();
        block.previous_hash = "f".repeat(64);

        let err = local.try_append_peer_block(block).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::WrongParent)
        ));
        assert_eq!(local.chain_len(), 1);
    }

    #[test]
    fn test_second_pow_block_past_cutoff_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = fresh_ledger(&dir);

        // Nobody ever stakes; the cutoff-height block is the one PoW
        // block still tolerated.
        mine_blocks(&ledger, "miner1", POW_CUTOFF as u64);
        assert_eq!(ledger.chain_len(), POW_CUTOFF as usize + 1);

        let err = ledger
            .mine_pending_at("miner2", block_clock(POW_CUTOFF as u64 + 1))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::PowAfterCutoff)
        ));
        assert_eq!(ledger.chain_len(), POW_CUTOFF as usize + 1);

        // The same never-staked miner is refused a second one too.
        let err = ledger
            .mine_pending_at("miner1", block_clock(POW_CUTOFF as u64 + 2))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::PowAfterCutoff)
        ));
    }

    #[test]
    fn test_pow_rejected_after_cutoff_with_stakers() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = fresh_ledger(&dir);
        let signer = KeyPair::generate();

        mine_blocks(&ledger, "miner1", POW_CUTOFF as u64);
        ledger.stake("miner1", MIN_STAKE_AMOUNT, &signer).unwrap();

        // With a registered staker, another miner cannot push PoW blocks.
        let err = ledger
            .mine_pending_at("latecomer", block_clock(POW_CUTOFF as u64 + 5))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::PowAfterCutoff)
        ));
    }
}
