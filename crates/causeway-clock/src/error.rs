//! Error types for clocks and messages.

use thiserror::Error;

/// Errors raised when a clock or message violates its shape invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("A vector clock needs at least one slot")]
    Empty,

    #[error("Self index {index} out of range for clock of size {size}")]
    SelfIndexOutOfRange { index: usize, size: usize },

    #[error("Clock size mismatch: expected {expected}, found {found}")]
    SizeMismatch { expected: usize, found: usize },

    #[error("Sender index {sender} does not match timestamp owner {owner}")]
    SenderMismatch { sender: usize, owner: usize },
}

pub type Result<T> = std::result::Result<T, ClockError>;
