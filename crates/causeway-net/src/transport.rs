//! Transport abstraction and an in-memory implementation.

use crate::error::{NetError, Result};
use crate::peer::PeerAddr;
use async_trait::async_trait;
use causeway_clock::Message;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outbound half of a peer-to-peer transport.
///
/// Implementations must keep posts to the same peer in call order when the
/// caller awaits each one before issuing the next.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Hand `msg` to the peer at `to`.
    async fn post(&self, to: &PeerAddr, msg: &Message) -> Result<()>;
}

/// Type alias for the inbound receiver, taken once by the owning node.
type SharedInbox = Arc<Mutex<Option<mpsc::Receiver<Message>>>>;
/// Type alias for the outgoing senders shared across threads.
type SharedOutgoing = Arc<RwLock<HashMap<PeerAddr, mpsc::Sender<Message>>>>;

/// In-memory transport for testing and simulation.
#[derive(Clone)]
pub struct MemoryTransport {
    local: PeerAddr,
    inbox_tx: mpsc::Sender<Message>,
    inbox_rx: SharedInbox,
    outgoing: SharedOutgoing,
}

impl MemoryTransport {
    pub fn new(local: PeerAddr) -> Self {
        let (tx, rx) = mpsc::channel(1024);
        Self {
            local,
            inbox_tx: tx,
            inbox_rx: Arc::new(Mutex::new(Some(rx))),
            outgoing: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn local(&self) -> PeerAddr {
        self.local
    }

    /// Wire two memory transports together in both directions.
    pub fn connect_to(&self, other: &MemoryTransport) {
        self.outgoing
            .write()
            .insert(other.local, other.inbox_tx.clone());
        other
            .outgoing
            .write()
            .insert(self.local, self.inbox_tx.clone());
    }

    /// Make `peer` unreachable from this transport.
    pub fn disconnect(&self, peer: &PeerAddr) {
        self.outgoing.write().remove(peer);
    }

    /// Take the inbound receiver. Returns `None` after the first call.
    pub fn subscribe(&self) -> Option<mpsc::Receiver<Message>> {
        self.inbox_rx.lock().take()
    }

    pub fn connected_peers(&self) -> Vec<PeerAddr> {
        let mut peers: Vec<_> = self.outgoing.read().keys().copied().collect();
        peers.sort();
        peers
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn post(&self, to: &PeerAddr, msg: &Message) -> Result<()> {
        let tx = {
            let outgoing = self.outgoing.read();
            outgoing.get(to).cloned()
        };

        match tx {
            Some(tx) => tx
                .send(msg.clone())
                .await
                .map_err(|e| NetError::SendFailed {
                    peer: to.to_string(),
                    reason: e.to_string(),
                }),
            None => Err(NetError::PeerNotFound(to.to_string())),
        }
    }
}

/// Create a fully connected mesh of memory transports, one per member.
pub fn create_network(members: &[PeerAddr]) -> Vec<MemoryTransport> {
    let transports: Vec<_> = members.iter().map(|m| MemoryTransport::new(*m)).collect();

    for i in 0..transports.len() {
        for j in (i + 1)..transports.len() {
            transports[i].connect_to(&transports[j]);
        }
    }

    transports
}
