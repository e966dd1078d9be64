//! Wallet module - key management and signing

mod wallet;

pub use wallet::*;
