//! Error types for the delivery engine.

use causeway_clock::ClockError;
use thiserror::Error;

/// Errors surfaced by [`DeliveryEngine::submit`](crate::DeliveryEngine::submit).
///
/// Causal evaluation itself never fails: an undeliverable message is held.
/// Only messages whose shape cannot fit the local clock are refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Malformed message {id}: {source}")]
    Malformed {
        id: String,
        #[source]
        source: ClockError,
    },

    #[error("Message {id} carries our own sender slot {slot}")]
    Loopback { id: String, slot: usize },
}

pub type Result<T> = std::result::Result<T, DeliveryError>;

/// A delivered log in which a message appears after one it causally precedes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Causal order violated: {cause} (position {cause_pos}) precedes {effect} (position {effect_pos}) but was delivered after it")]
pub struct CausalViolation {
    pub cause: String,
    pub cause_pos: usize,
    pub effect: String,
    pub effect_pos: usize,
}
