//! Cryptography module - SHA-256 hashing, ECDSA signatures, Base58Check addresses

mod address;
mod hash;
mod keys;

pub use address::*;
pub use hash::*;
pub use keys::*;
