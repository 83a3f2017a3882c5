//! Causal delivery engine
//!
//! Owns the local [`VectorClock`], the [`PendingBuffer`] and the
//! [`DeliveredLog`]. Inbound messages enter through [`DeliveryEngine::submit`];
//! outbound messages are stamped through [`DeliveryEngine::stamp`].
//!
//! # Fixed-point delivery
//!
//! ```text
//! loop:
//!     delivered := ∅
//!     for m in pending:
//!         if canDeliver(clock, m.ts, m.sender):
//!             clock := clock ⊔ m.ts
//!             log.push(m); callback(m)
//!             delivered := delivered ∪ {m}
//!     pending := pending \ delivered
//!     if delivered = ∅: break
//! ```
//!
//! Each pass evaluates against the clock as it stands at that point in the
//! pass, so a delivery early in a pass can unblock an entry later in the same
//! pass. With `B` held messages the loop runs at most `B + 1` passes.
//!
//! Per message the state machine is `Pending → Delivered`, one-way.

use crate::buffer::{DeliveredLog, PendingBuffer};
use crate::error::DeliveryError;
use causeway_clock::{Message, Readiness, Ulid, VectorClock};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, trace};

/// Invoked once per delivered message, in delivery order.
pub type DeliveryCallback = Box<dyn FnMut(&Message) + Send + 'static>;

/// Causal delivery state of one process.
pub struct DeliveryEngine {
    clock: VectorClock,
    pending: PendingBuffer,
    delivered: DeliveredLog,
    /// Ids currently pending or already delivered.
    seen: HashSet<Ulid>,
    on_deliver: Option<DeliveryCallback>,
}

impl DeliveryEngine {
    /// Create an engine around a freshly built local clock.
    pub fn new(clock: VectorClock) -> Self {
        Self {
            clock,
            pending: PendingBuffer::new(),
            delivered: DeliveredLog::new(),
            seen: HashSet::new(),
            on_deliver: None,
        }
    }

    /// Create an engine that reports every delivery to `callback`.
    pub fn with_callback<F>(clock: VectorClock, callback: F) -> Self
    where
        F: FnMut(&Message) + Send + 'static,
    {
        let mut engine = Self::new(clock);
        engine.set_callback(callback);
        engine
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&Message) + Send + 'static,
    {
        self.on_deliver = Some(Box::new(callback));
    }

    /// Stamp an outgoing message.
    ///
    /// Advances the local slot first, so the snapshot attached to the message
    /// already accounts for it.
    pub fn stamp(&mut self, payload: impl Into<String>, origin: impl Into<String>) -> Message {
        let timestamp = self.clock.increment();
        let msg = Message::new(payload, origin, timestamp);
        trace!(id = %msg.id(), clock = %self.clock, "stamped outgoing message");
        msg
    }

    /// Accept an inbound message and deliver everything that became ready.
    ///
    /// Returns how many messages were delivered by this call, which may be
    /// zero (the message is held) or more than one (it unblocked others).
    /// Re-submitting a message id that is already pending or delivered is
    /// ignored, so no message is ever in both the buffer and the log.
    pub fn submit(&mut self, msg: Message) -> Result<usize, DeliveryError> {
        msg.validate(self.clock.len())
            .map_err(|source| DeliveryError::Malformed {
                id: msg.id().to_string(),
                source,
            })?;
        if msg.sender_index() == self.clock.self_index() {
            return Err(DeliveryError::Loopback {
                id: msg.id().to_string(),
                slot: msg.sender_index(),
            });
        }

        if !self.seen.insert(msg.id()) {
            debug!(id = %msg.id(), origin = msg.origin(), "ignoring resubmitted message");
            return Ok(0);
        }

        self.pending.push(msg);
        let delivered = self.attempt_delivery();

        if delivered == 0 {
            if let Some(held) = self.pending.iter().last() {
                debug!(
                    id = %held.id(),
                    origin = held.origin(),
                    timestamp = %held.timestamp(),
                    clock = %self.clock,
                    reason = %self.clock.readiness(held.timestamp(), held.sender_index()),
                    pending = self.pending.len(),
                    "holding message"
                );
            }
        }
        Ok(delivered)
    }

    /// Run the delivery loop to a fixed point.
    ///
    /// Calling it again without an intervening `submit` delivers nothing.
    pub fn attempt_delivery(&mut self) -> usize {
        let mut total = 0;
        loop {
            let mut marked = Vec::new();

            for (index, msg) in self.pending.iter().enumerate() {
                if !self.clock.can_deliver(msg.timestamp(), msg.sender_index()) {
                    continue;
                }
                // Validated on submit, so the sizes always agree.
                if self.clock.merge(msg.timestamp()).is_err() {
                    continue;
                }
                trace!(id = %msg.id(), origin = msg.origin(), clock = %self.clock, "delivered");
                self.delivered.push(msg.clone());
                if let Some(callback) = self.on_deliver.as_mut() {
                    callback(msg);
                }
                marked.push(index);
            }

            if marked.is_empty() {
                break;
            }
            total += marked.len();
            self.pending.remove_marked(&marked);
        }
        total
    }

    /// Why each held message is still held, evaluated against the current clock.
    pub fn pending_report(&self) -> Vec<(Ulid, Readiness)> {
        self.pending
            .iter()
            .map(|m| (m.id(), self.clock.readiness(m.timestamp(), m.sender_index())))
            .collect()
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    pub fn pending(&self) -> &PendingBuffer {
        &self.pending
    }

    pub fn delivered(&self) -> &DeliveredLog {
        &self.delivered
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }
}

impl fmt::Debug for DeliveryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("clock", &self.clock)
            .field("pending", &self.pending.len())
            .field("delivered", &self.delivered.len())
            .field("has_callback", &self.on_deliver.is_some())
            .finish()
    }
}
