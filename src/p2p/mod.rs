//! P2P module - WebSocket gossip overlay, message codec, peer table

mod peer;
mod protocol;
mod server;

pub use peer::*;
pub use protocol::*;
pub use server::*;
