//! WebSocket gossip server
//!
//! Listens for inbound peers and dials outbound ones; both sides run the
//! same accept flow: register the socket, record the peer, send our chain,
//! then handle frames sequentially so per-peer ordering is preserved.
//! Unexpected closes on dialed peers trigger exponential-backoff
//! reconnects.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async, WebSocketStream};

use crate::ledger::Ledger;
use crate::p2p::{
    decode, encode, host_port_of, normalize_peer_url, reconnect_delay, GossipMessage, PeerHub,
    PeerSender, ProtocolError, MAX_RECONNECT_ATTEMPTS,
};

/// Transport-level failures; both schedule reconnects on dialed peers
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to dial {url}: {reason}")]
    DialFailed { url: String, reason: String },
    #[error("peer connection closed unexpectedly")]
    PeerClosed,
}

/// The gossip server
pub struct Server {
    ledger: Arc<Ledger>,
    hub: Arc<PeerHub>,
}

impl Server {
    /// Wire a server to the ledger and peer hub
    pub fn new(ledger: Arc<Ledger>, hub: Arc<PeerHub>) -> Arc<Self> {
        Arc::new(Self { ledger, hub })
    }

    /// Accept inbound peers forever
    pub async fn run(self: Arc<Self>, port: u16) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!("p2p listening on port {port}");

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        match accept_async(stream).await {
                            Ok(ws) => server.handle_socket(ws, addr.to_string()).await,
                            Err(e) => warn!("websocket handshake failed with {addr}: {e}"),
                        }
                    });
                }
                Err(e) => warn!("inbound connection error: {e}"),
            }
        }
    }

    /// Dial a peer, deduplicating concurrent dials to the same URL
    pub fn connect(self: &Arc<Self>, raw_url: &str) {
        let url = normalize_peer_url(raw_url);
        if !self.hub.hold_peer(&url) {
            debug!("already connected to {url}");
            return;
        }

        let server = Arc::clone(self);
        tokio::spawn(async move {
            server.dial_loop(&url).await;
            server.hub.release_peer(&url);
        });
    }

    /// Connect and reconnect with exponential backoff, then give up
    async fn dial_loop(&self, url: &str) {
        let mut attempt = 0u32;
        loop {
            match connect_async(url).await {
                Ok((ws, _)) => {
                    attempt = 0;
                    self.handle_socket(ws, host_port_of(url)).await;
                    warn!("{} ({url})", TransportError::PeerClosed);
                }
                Err(e) => {
                    let err = TransportError::DialFailed {
                        url: url.to_string(),
                        reason: e.to_string(),
                    };
                    warn!("{err}");
                }
            }

            attempt += 1;
            if attempt > MAX_RECONNECT_ATTEMPTS {
                warn!("giving up on {url} after {MAX_RECONNECT_ATTEMPTS} reconnect attempts");
                return;
            }
            let delay = reconnect_delay(attempt);
            debug!("reconnecting to {url} in {delay:?} (attempt {attempt})");
            tokio::time::sleep(delay).await;
        }
    }

    /// Shared accept flow for inbound and outbound sockets
    async fn handle_socket<S>(&self, ws: WebSocketStream<S>, peer: String)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut stream) = ws.split();
        let (sender, mut outbound) = mpsc::unbounded_channel::<Message>();

        let id = self.hub.register(sender.clone());
        self.hub.log_peer(&peer);
        info!("peer connected: {peer}");

        // Writer half: drain the queue into the socket.
        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
        });

        // Greet the peer with our full chain.
        let greeting = GossipMessage::Chain(self.ledger.chain_snapshot());
        let _ = sender.send(Message::Text(encode(&greeting)));

        // Sequential reads keep per-peer message order.
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Err(e) = self.handle_frame(&text, &sender) {
                        warn!("dropped message from {peer}: {e}");
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("read error from {peer}: {e}");
                    break;
                }
            }
        }

        self.hub.unregister(id);
        writer.abort();
        info!("peer disconnected: {peer}");
    }

    /// Dispatch one frame; errors are per-message, never per-connection
    fn handle_frame(&self, text: &str, reply: &PeerSender) -> Result<(), ProtocolError> {
        match decode(text)? {
            GossipMessage::Chain(blocks) => match self.ledger.replace_chain(blocks) {
                Ok(true) => {
                    info!("adopted longer chain, height {}", self.ledger.chain_len() - 1)
                }
                Ok(false) => debug!("peer chain not longer; ignored"),
                Err(e) => warn!("peer chain rejected: {e}"),
            },
            GossipMessage::Block(block) | GossipMessage::LatestBlock(block) => {
                self.handle_peer_block(block);
            }
            GossipMessage::Transaction(tx) => {
                if let Err(e) = self.ledger.add_transaction(tx) {
                    warn!("peer transaction rejected: {e}");
                }
            }
            GossipMessage::Stake(req) => {
                if let Err(e) = self.ledger.register_stake(&req.address, req.amount) {
                    warn!("peer stake rejected: {e}");
                }
            }
            GossipMessage::Unstake(req) => {
                if let Err(e) = self.ledger.unstake(&req.address, req.amount) {
                    warn!("peer unstake rejected: {e}");
                }
            }
            GossipMessage::GetLatestBlock => {
                let head = GossipMessage::LatestBlock(self.ledger.latest_block());
                let _ = reply.send(Message::Text(encode(&head)));
            }
        }
        Ok(())
    }

    /// Append-if-next handling of a single peer block
    fn handle_peer_block(&self, block: crate::consensus::Block) {
        if block.index as usize > self.ledger.chain_len() {
            // We are behind by more than one block; probe for full chains.
            self.hub.broadcast(&GossipMessage::GetLatestBlock);
            return;
        }

        match self.ledger.try_append_peer_block(block.clone()) {
            // Broadcast only after a successful local append.
            Ok(true) => self.hub.broadcast(&GossipMessage::Block(block)),
            Ok(false) => debug!("peer block {} already known", block.index),
            Err(e) => warn!("peer block rejected: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChainStore, PeerLog};

    fn server() -> (Arc<Server>, Arc<PeerHub>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(
            Ledger::open(ChainStore::new(dir.path().join("chain.json"))).unwrap(),
        );
        let hub = Arc::new(PeerHub::new(PeerLog::open(dir.path().join("peers.json"))));
        (Server::new(ledger, Arc::clone(&hub)), hub, dir)
    }

    #[test]
    fn test_get_latest_block_is_answered_directly() {
        let (server, _hub, _dir) = server();
        let (reply, mut rx) = mpsc::unbounded_channel();

        server
            .handle_frame(&encode(&GossipMessage::GetLatestBlock), &reply)
            .unwrap();

        match rx.try_recv().unwrap() {
            Message::Text(text) => match decode(&text).unwrap() {
                GossipMessage::LatestBlock(block) => assert_eq!(block.index, 0),
                other => panic!("wrong reply: {other:?}"),
            },
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_peer_block_is_dropped_quietly() {
        let (server, hub, _dir) = server();
        let (watcher, mut rx) = mpsc::unbounded_channel();
        hub.register(watcher);
        let (reply, _reply_rx) = mpsc::unbounded_channel();

        let mut forged = server.ledger.latest_block();
        forged.index = 1;
        forged.previous_hash = "f".repeat(64);

        server
            .handle_frame(&encode(&GossipMessage::Block(forged)), &reply)
            .unwrap();

        // Chain unchanged, nothing re-broadcast
        assert_eq!(server.ledger.chain_len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_far_ahead_block_triggers_probe() {
        let (server, hub, _dir) = server();
        let (watcher, mut rx) = mpsc::unbounded_channel();
        hub.register(watcher);
        let (reply, _reply_rx) = mpsc::unbounded_channel();

        let mut ahead = server.ledger.latest_block();
        ahead.index = 10;

        server
            .handle_frame(&encode(&GossipMessage::Block(ahead)), &reply)
            .unwrap();

        match rx.try_recv().unwrap() {
            Message::Text(text) => assert!(matches!(
                decode(&text).unwrap(),
                GossipMessage::GetLatestBlock
            )),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_frame_is_a_protocol_error() {
        let (server, _hub, _dir) = server();
        let (reply, _reply_rx) = mpsc::unbounded_channel();

        let err = server
            .handle_frame(r#"{"type":"NOPE"}"#, &reply)
            .unwrap_err();
        assert_eq!(err, ProtocolError::UnknownMessageType("NOPE".into()));
    }
}
