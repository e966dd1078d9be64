//! Peer bookkeeping
//!
//! Tracks live sockets for broadcast, the set of URLs currently being
//! dialed or held (so one remote never gets two outbound connections),
//! and the persisted peer log.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::p2p::{encode, GossipMessage};
use crate::storage::PeerLog;

/// Reconnect attempts before a peer is given up on
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Backoff ceiling
const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

/// Outbound frame queue of one socket
pub type PeerSender = mpsc::UnboundedSender<Message>;

/// Shared table of live peers
pub struct PeerHub {
    sockets: Mutex<HashMap<u64, PeerSender>>,
    connected_peers: Mutex<HashSet<String>>,
    peer_log: Mutex<PeerLog>,
    next_id: AtomicU64,
}

impl PeerHub {
    /// Create a hub around a persisted peer log
    pub fn new(peer_log: PeerLog) -> Self {
        Self {
            sockets: Mutex::new(HashMap::new()),
            connected_peers: Mutex::new(HashSet::new()),
            peer_log: Mutex::new(peer_log),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a socket's outbound queue; returns its id
    pub fn register(&self, sender: PeerSender) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_sockets().insert(id, sender);
        id
    }

    /// Drop a closed socket
    pub fn unregister(&self, id: u64) {
        self.lock_sockets().remove(&id);
    }

    /// Number of live sockets
    pub fn socket_count(&self) -> usize {
        self.lock_sockets().len()
    }

    /// Record a `host:port` sighting in the persisted log
    pub fn log_peer(&self, host_port: &str) {
        let mut log = self
            .peer_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log.record(host_port);
    }

    /// Send a message to every open socket
    pub fn broadcast(&self, msg: &GossipMessage) {
        let frame = Message::Text(encode(msg));
        let mut sockets = self.lock_sockets();
        // A failed send means the reader side already went away.
        sockets.retain(|_, sender| sender.send(frame.clone()).is_ok());
    }

    /// Send a message to one socket
    pub fn send_to(&self, id: u64, msg: &GossipMessage) -> bool {
        let frame = Message::Text(encode(msg));
        self.lock_sockets()
            .get(&id)
            .map(|sender| sender.send(frame).is_ok())
            .unwrap_or(false)
    }

    /// Claim an outbound URL; false when a dial is already in flight
    pub fn hold_peer(&self, url: &str) -> bool {
        self.lock_connected().insert(url.to_string())
    }

    /// Release an outbound URL after its dial loop ends
    pub fn release_peer(&self, url: &str) {
        self.lock_connected().remove(url);
    }

    fn lock_sockets(&self) -> std::sync::MutexGuard<'_, HashMap<u64, PeerSender>> {
        self.sockets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_connected(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.connected_peers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Normalize a peer URL: default the `ws://` scheme, strip trailing slashes
pub fn normalize_peer_url(raw: &str) -> String {
    let mut url = raw.trim().to_string();
    if !url.contains("://") {
        url = format!("ws://{url}");
    }
    while url.ends_with('/') {
        url.pop();
    }
    url
}

/// Strip the scheme back off for the `host:port` peer log
pub fn host_port_of(url: &str) -> String {
    url.split("://").last().unwrap_or(url).to_string()
}

/// Exponential backoff: 1s, 2s, 4s, ... capped at 30s
pub fn reconnect_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(15);
    let ms = 1000u64.saturating_mul(1 << exp).min(MAX_RECONNECT_DELAY_MS);
    Duration::from_millis(ms)
}
