//! Causally stamped chat messages.

use crate::clock::VectorClock;
use crate::error::ClockError;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// A chat message stamped with its sender's clock at send time.
///
/// Messages are immutable once built. The timestamp is an owned snapshot,
/// never a view of the sender's live clock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: Ulid,
    payload: String,
    origin: String,
    sender_index: usize,
    timestamp: VectorClock,
}

impl Message {
    /// Build a message; the sender slot is the timestamp's owner slot.
    pub fn new(payload: impl Into<String>, origin: impl Into<String>, timestamp: VectorClock) -> Self {
        Message {
            id: Ulid::new(),
            payload: payload.into(),
            origin: origin.into(),
            sender_index: timestamp.self_index(),
            timestamp,
        }
    }

    /// Check the shape invariants a message read off the wire may violate.
    pub fn validate(&self, expected_size: usize) -> Result<(), ClockError> {
        if self.timestamp.len() != expected_size {
            return Err(ClockError::SizeMismatch {
                expected: expected_size,
                found: self.timestamp.len(),
            });
        }
        if self.sender_index != self.timestamp.self_index() {
            return Err(ClockError::SenderMismatch {
                sender: self.sender_index,
                owner: self.timestamp.self_index(),
            });
        }
        if self.sender_index >= expected_size {
            return Err(ClockError::SelfIndexOutOfRange {
                index: self.sender_index,
                size: expected_size,
            });
        }
        Ok(())
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Identity of the sending peer (`ip/port`).
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn sender_index(&self) -> usize {
        self.sender_index
    }

    pub fn timestamp(&self) -> &VectorClock {
        &self.timestamp
    }

    /// True if `self` causally precedes `other`.
    pub fn happened_before(&self, other: &Message) -> bool {
        self.timestamp.happened_before(&other.timestamp)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin, self.payload)
    }
}
