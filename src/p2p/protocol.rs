//! Gossip protocol messages
//!
//! One JSON object per WebSocket text frame, tagged by `type` with the
//! payload under `data`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::Block;
use crate::validation::Transaction;

/// Protocol errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
}

/// Stake / unstake request payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRequest {
    pub address: String,
    pub amount: u64,
}

/// Gossip message kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GossipMessage {
    /// Snapshot of the sender's whole chain
    Chain(Vec<Block>),
    /// A newly produced block
    Block(Block),
    /// A transaction for the pending pool
    Transaction(Transaction),
    /// Register stake for an address
    Stake(StakeRequest),
    /// Withdraw stake
    Unstake(StakeRequest),
    /// Ask a peer for its head
    GetLatestBlock,
    /// Head probe response
    LatestBlock(Block),
}

const KNOWN_TYPES: [&str; 7] = [
    "CHAIN",
    "BLOCK",
    "TRANSACTION",
    "STAKE",
    "UNSTAKE",
    "GET_LATEST_BLOCK",
    "LATEST_BLOCK",
];

/// Serialize a message to one text frame
pub fn encode(msg: &GossipMessage) -> String {
    serde_json::to_string(msg).unwrap_or_default()
}

/// Parse a text frame
///
/// An unrecognized `type` tag is reported separately from a payload that
/// fails to parse, so handlers can log the two apart.
pub fn decode(text: &str) -> Result<GossipMessage, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ProtocolError::MalformedMessage(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ProtocolError::MalformedMessage("missing type tag".to_string()))?;

    if !KNOWN_TYPES.contains(&kind) {
        return Err(ProtocolError::UnknownMessageType(kind.to_string()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
}
