//! Causeway Clock - logical time for causal broadcast
//!
//! - [`VectorClock`]: one slot per peer, incremented on send and merged on
//!   delivery, with the causal delivery condition
//! - [`Message`]: an immutable chat message carrying a clock snapshot

pub mod clock;
pub mod error;
pub mod message;

pub use clock::{Readiness, Tick, VectorClock};
pub use error::{ClockError, Result};
pub use message::Message;
pub use ulid::Ulid;
