//! Transaction model - inputs, outputs, canonical hashing, signatures

mod transaction;

pub use transaction::*;
