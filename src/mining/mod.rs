//! Mining module - PoW search worker and the miner driving it

mod miner;
mod worker;

pub use miner::*;
pub use worker::*;
