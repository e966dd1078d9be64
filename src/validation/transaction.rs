//! Transaction structure and validation
//!
//! UTXO-based transactions with ECDSA signatures. Three kinds are
//! distinguished structurally: coinbase (no inputs, one output), coinstake
//! (inputs present, two or more outputs, zero-amount marker first) and
//! normal (everything else).

use serde::{Deserialize, Serialize};
use crate::crypto::{sha256, verify_signature, Hash, PrivateKey};

/// A transaction input referencing a previous output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Hash of the transaction containing the output
    pub previous_tx: Hash,
    /// Index of the output in that transaction
    pub output_index: u32,
    /// Signature binding this input to the transaction hash
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    /// SEC1 public key of the signer; empty for coinbase/coinstake inputs
    #[serde(with = "hex_bytes", default)]
    pub public_key: Vec<u8>,
}

/// A transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Recipient address (opaque to the ledger)
    pub address: String,
    /// Amount in minor units
    pub amount: u64,
}

/// A complete transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction inputs
    pub inputs: Vec<TxInput>,
    /// Transaction outputs
    pub outputs: Vec<TxOutput>,
    /// Creation time, milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Uniqueness nonce
    pub nonce: u64,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        hex::decode(&text).map_err(serde::de::Error::custom)
    }
}

impl Transaction {
    /// Create an unsigned transaction
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>, timestamp: u64) -> Self {
        Self {
            inputs,
            outputs,
            timestamp,
            nonce: rand::random(),
        }
    }

    /// Create a coinbase transaction paying a block reward
    pub fn coinbase(address: &str, amount: u64, timestamp: u64) -> Self {
        Self {
            inputs: vec![],
            outputs: vec![TxOutput {
                address: address.to_string(),
                amount,
            }],
            timestamp,
            nonce: 0,
        }
    }

    /// Create a coinstake spending one UTXO and returning its amount
    ///
    /// `outputs[0]` is the zero-amount marker; `outputs[1]` returns the
    /// full staked amount to the staker.
    pub fn coinstake(
        previous_tx: Hash,
        output_index: u32,
        address: &str,
        amount: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            inputs: vec![TxInput {
                previous_tx,
                output_index,
                signature: vec![],
                public_key: vec![],
            }],
            outputs: vec![
                TxOutput {
                    address: address.to_string(),
                    amount: 0,
                },
                TxOutput {
                    address: address.to_string(),
                    amount,
                },
            ],
            timestamp,
            nonce: 0,
        }
    }

    /// Check if this is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty() && self.outputs.len() == 1
    }

    /// Check if this is a coinstake transaction
    pub fn is_coinstake(&self) -> bool {
        !self.inputs.is_empty() && self.outputs.len() >= 2 && self.outputs[0].amount == 0
    }

    /// Canonical byte form, fixed across platforms and versions
    ///
    /// Layout: u32-LE input count, then per input the 32-byte previous
    /// transaction hash and u32-LE output index (signatures and public keys
    /// excluded, so signing an input never moves the hash); u32-LE output
    /// count, then per output a u32-LE address length, the address UTF-8
    /// bytes and the u64-LE amount; u64-LE timestamp; u64-LE nonce.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        bytes.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            bytes.extend_from_slice(&input.previous_tx.0);
            bytes.extend_from_slice(&input.output_index.to_le_bytes());
        }

        bytes.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            bytes.extend_from_slice(&(output.address.len() as u32).to_le_bytes());
            bytes.extend_from_slice(output.address.as_bytes());
            bytes.extend_from_slice(&output.amount.to_le_bytes());
        }

        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());

        bytes
    }

    /// Canonical transaction hash
    pub fn hash(&self) -> Hash {
        sha256(&self.canonical_bytes())
    }

    /// Sign every input with the given key
    pub fn sign_inputs(&mut self, key: &PrivateKey) {
        let digest = self.hash();
        let public_key = key.public_key();
        for input in &mut self.inputs {
            input.signature = key.sign(&digest);
            input.public_key = public_key.clone();
        }
    }

    /// Structural validity
    ///
    /// Coinbase and coinstake are valid by construction; a normal
    /// transaction must carry a signature on every input.
    pub fn is_valid(&self) -> bool {
        if self.is_coinbase() || self.is_coinstake() {
            return true;
        }
        !self.inputs.is_empty() && self.inputs.iter().all(|i| !i.signature.is_empty())
    }

    /// Cryptographic verification of every input signature
    ///
    /// Applied when a normal transaction enters the pending pool; coinbase
    /// and coinstake carry no signatures.
    pub fn verify_signatures(&self) -> bool {
        if self.is_coinbase() || self.is_coinstake() {
            return true;
        }

        let digest = self.hash();
        self.inputs
            .iter()
            .all(|input| verify_signature(&input.public_key, &digest, &input.signature))
    }

    /// Total value of all outputs
    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount).sum()
    }
}
