//! Thread-safe handle over a [`DeliveryEngine`].
//!
//! The clock, buffer and log form one unit of state. Every `submit` runs the
//! whole fixed-point loop under a single exclusive lock, so concurrent
//! inbound connections are serialized and no two callers can deliver the
//! same buffered entry. The delivery callback runs while the lock is held
//! and must not block.

use crate::engine::DeliveryEngine;
use crate::error::DeliveryError;
use causeway_clock::{Message, Readiness, Ulid, VectorClock};
use parking_lot::Mutex;
use std::sync::Arc;

/// Cloneable, lock-guarded engine shared between the transport and the CLI.
#[derive(Clone, Debug)]
pub struct SharedEngine {
    inner: Arc<Mutex<DeliveryEngine>>,
}

impl SharedEngine {
    pub fn new(engine: DeliveryEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Submit an inbound message as one atomic transaction.
    pub fn submit(&self, msg: Message) -> Result<usize, DeliveryError> {
        self.inner.lock().submit(msg)
    }

    /// Stamp an outgoing message as one atomic transaction.
    pub fn stamp(&self, payload: impl Into<String>, origin: impl Into<String>) -> Message {
        self.inner.lock().stamp(payload, origin)
    }

    /// Snapshot of the local clock.
    pub fn clock(&self) -> VectorClock {
        self.inner.lock().clock().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending_count()
    }

    pub fn delivered_count(&self) -> usize {
        self.inner.lock().delivered_count()
    }

    /// Copy of the delivered log, in delivery order.
    pub fn delivered(&self) -> Vec<Message> {
        self.inner.lock().delivered().as_slice().to_vec()
    }

    pub fn pending_report(&self) -> Vec<(Ulid, Readiness)> {
        self.inner.lock().pending_report()
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut DeliveryEngine) -> R) -> R {
        f(&mut *self.inner.lock())
    }
}

impl From<DeliveryEngine> for SharedEngine {
    fn from(engine: DeliveryEngine) -> Self {
        Self::new(engine)
    }
}
