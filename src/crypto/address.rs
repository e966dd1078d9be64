//! Base58Check address codec
//!
//! An address is Base58Check over `version || RIPEMD160(SHA256(pubkey))`
//! with a 4-byte double-SHA256 checksum. Addresses are opaque strings to
//! the ledger; only the wallet and this codec know their structure.

use super::{double_sha256, ripemd160, sha256};

const VERSION: u8 = 0x00;
const CHECKSUM_LEN: usize = 4;

/// Derive the 20-byte public key hash used in addresses
pub fn hash_public_key(public_key: &[u8]) -> [u8; 20] {
    let sha = sha256(public_key);
    ripemd160(&sha.0)
}

/// Derive a printable address from a SEC1-encoded public key
pub fn address_from_public_key(public_key: &[u8]) -> String {
    let pubkey_hash = hash_public_key(public_key);

    let mut payload = Vec::with_capacity(1 + 20 + CHECKSUM_LEN);
    payload.push(VERSION);
    payload.extend_from_slice(&pubkey_hash);

    let checksum = double_sha256(&payload);
    payload.extend_from_slice(&checksum.0[..CHECKSUM_LEN]);

    bs58::encode(payload).into_string()
}

/// Check that an address decodes and its checksum matches
pub fn validate_address(address: &str) -> bool {
    let payload = match bs58::decode(address).into_vec() {
        Ok(payload) => payload,
        Err(_) => return false,
    };

    if payload.len() < 1 + CHECKSUM_LEN {
        return false;
    }

    let (body, actual_checksum) = payload.split_at(payload.len() - CHECKSUM_LEN);
    let expected = double_sha256(body);

    actual_checksum == &expected.0[..CHECKSUM_LEN]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;

    #[test]
    fn test_address_derivation_deterministic() {
        let key = PrivateKey::generate();
        let public = key.public_key();

        assert_eq!(
            address_from_public_key(&public),
            address_from_public_key(&public)
        );
    }

    #[test]
    fn test_valid_address_roundtrip() {
        let key = PrivateKey::generate();
        let address = address_from_public_key(&key.public_key());

        assert!(validate_address(&address));
    }

    #[test]
    fn test_tampered_address_rejected() {
        let key = PrivateKey::generate();
        let address = address_from_public_key(&key.public_key());

        // Flip one character; Base58Check must catch it
        let mut tampered: Vec<char> = address.chars().collect();
        let i = tampered.len() / 2;
        tampered[i] = if tampered[i] == '2' { '3' } else { '2' };
        let tampered: String = tampered.into_iter().collect();

        assert!(!validate_address(&tampered));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(!validate_address(""));
        assert!(!validate_address("0OIl"));
        assert!(!validate_address("not-base58!"));
    }
}
