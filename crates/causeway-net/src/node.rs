//! A chat room participant: delivery engine plus outbound multicast.

use crate::config::{Membership, NodeConfig};
use crate::error::Result;
use crate::multicast::{MulticastReport, Multicaster};
use crate::transport::Transport;
use causeway_clock::{Message, VectorClock};
use causeway_delivery::{DeliveryEngine, SharedEngine};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One member of the chat room.
///
/// Messages this node sends are stamped but not delivered locally. Messages
/// from peers come in through [`ChatNode::receive`] (or a spawned receiver)
/// and reach the application through [`ChatNode::events`] in causal order.
pub struct ChatNode<T: Transport> {
    membership: Arc<Membership>,
    config: NodeConfig,
    transport: Arc<T>,
    engine: SharedEngine,
    multicaster: Multicaster,
    events: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
}

impl<T: Transport> ChatNode<T> {
    /// Create a node and spawn its outbound workers. Must run inside a Tokio
    /// runtime.
    pub fn new(membership: Membership, transport: Arc<T>, config: NodeConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = DeliveryEngine::with_callback(membership.new_clock(), move |msg: &Message| {
            // The receiver is gone only during shutdown.
            let _ = tx.send(msg.clone());
        });
        let multicaster = Multicaster::spawn(transport.clone(), &membership, &config);

        Self {
            membership: Arc::new(membership),
            config,
            transport,
            engine: SharedEngine::new(engine),
            multicaster,
            events: Mutex::new(Some(rx)),
        }
    }

    /// How this node names itself in the `origin` of its messages.
    pub fn identity(&self) -> String {
        self.membership.self_addr().to_string()
    }

    /// Stamp `payload` and multicast it to every peer.
    ///
    /// Stamping and queueing happen under the engine lock, so each peer's
    /// queue holds this node's messages in stamp order even when `send` is
    /// called from several tasks.
    pub async fn send(&self, payload: impl Into<String>) -> MulticastReport {
        let origin = self.identity();
        self.engine.with(|engine| {
            let msg = engine.stamp(payload, origin);
            debug!(id = %msg.id(), clock = %msg.timestamp(), "sending");
            self.multicaster.multicast(msg)
        })
    }

    /// Hand an inbound message to the delivery engine.
    pub fn receive(&self, msg: Message) -> Result<usize> {
        Ok(self.engine.submit(msg)?)
    }

    /// Feed every message from `inbox` into this node until the channel
    /// closes.
    pub fn spawn_receiver(&self, mut inbox: mpsc::Receiver<Message>) -> JoinHandle<()> {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            while let Some(msg) = inbox.recv().await {
                if let Err(e) = engine.submit(msg) {
                    warn!(error = %e, "dropping inbound message");
                }
            }
        })
    }

    /// Take the stream of delivered messages. Returns `None` after the first
    /// call.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<Message>> {
        self.events.lock().take()
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    pub fn clock(&self) -> VectorClock {
        self.engine.clock()
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }
}
