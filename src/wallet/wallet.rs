//! Wallet implementation
//!
//! Key generation, address derivation and transaction signing. The wallet
//! never touches consensus: the ledger only sees opaque addresses and
//! finished signatures.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::crypto::{address_from_public_key, Hash, PrivateKey, SignatureError};

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wallet file is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid key material: {0}")]
    InvalidKey(#[from] SignatureError),
    #[error("invalid key encoding")]
    BadEncoding,
}

/// A signing key with its derived identity
#[derive(Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    /// Compressed SEC1 public key
    pub public_key: Vec<u8>,
    /// Base58Check address
    pub address: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair({})", self.address)
    }
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self::from_private(PrivateKey::generate())
    }

    /// Import from raw private key bytes
    pub fn from_private_key_bytes(bytes: &[u8; 32]) -> Result<Self, WalletError> {
        Ok(Self::from_private(PrivateKey::from_bytes(bytes)?))
    }

    fn from_private(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        let address = address_from_public_key(&public_key);
        Self {
            private_key,
            public_key,
            address,
        }
    }

    /// The signing key, for transaction construction
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Sign a 32-byte digest
    pub fn sign(&self, digest: &Hash) -> Vec<u8> {
        self.private_key.sign(digest)
    }
}

/// A collection of keypairs, persisted as JSON
#[derive(Default)]
pub struct Wallet {
    keys: HashMap<String, KeyPair>,
}

impl Wallet {
    /// Create an empty wallet
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a key and return its address
    pub fn create_key(&mut self) -> String {
        let keypair = KeyPair::generate();
        let address = keypair.address.clone();
        self.keys.insert(address.clone(), keypair);
        address
    }

    /// Look up the keypair of an address
    pub fn get(&self, address: &str) -> Option<&KeyPair> {
        self.keys.get(address)
    }

    /// All addresses in this wallet
    pub fn addresses(&self) -> Vec<&str> {
        self.keys.keys().map(String::as_str).collect()
    }

    /// Save as a JSON map of address to hex private key
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), WalletError> {
        let map: HashMap<&str, String> = self
            .keys
            .iter()
            .map(|(address, kp)| (address.as_str(), hex::encode(kp.private_key.to_bytes())))
            .collect();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(&map)?)?;
        Ok(())
    }

    /// Load a wallet saved with [`Self::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let json = fs::read_to_string(path)?;
        let map: HashMap<String, String> = serde_json::from_str(&json)?;

        let mut keys = HashMap::new();
        for (_, hex_key) in map {
            let bytes = hex::decode(&hex_key).map_err(|_| WalletError::BadEncoding)?;
            let bytes: [u8; 32] = bytes.try_into().map_err(|_| WalletError::BadEncoding)?;
            let keypair = KeyPair::from_private_key_bytes(&bytes)?;
            keys.insert(keypair.address.clone(), keypair);
        }

        Ok(Self { keys })
    }
}
