//! Causeway Delivery - causal broadcast delivery engine
//!
//! This crate decides *when* a received chat message may be handed to the
//! application:
//! - Postponed buffer for messages whose causal predecessors are missing
//! - Fixed-point delivery loop that cascades through unblocked messages
//! - Lock-guarded shared handle for concurrent inbound connections
//! - Cluster simulator and causal-order checker for testing
//!
//! # Example
//!
//! ```rust
//! use causeway_clock::VectorClock;
//! use causeway_delivery::DeliveryEngine;
//!
//! let mut alice = DeliveryEngine::new(VectorClock::new(2, 0).unwrap());
//! let mut bob = DeliveryEngine::new(VectorClock::new(2, 1).unwrap());
//!
//! let first = alice.stamp("hi", "alice");
//! let second = alice.stamp("anyone there?", "alice");
//!
//! // Arrives out of order: held until its predecessor shows up.
//! assert_eq!(bob.submit(second).unwrap(), 0);
//! assert_eq!(bob.submit(first).unwrap(), 2);
//! assert_eq!(bob.delivered().len(), 2);
//! ```

pub mod buffer;
pub mod engine;
pub mod error;
pub mod shared;
pub mod sim;

pub use buffer::{DeliveredLog, PendingBuffer};
pub use engine::{DeliveryCallback, DeliveryEngine};
pub use error::{CausalViolation, DeliveryError, Result};
pub use shared::SharedEngine;
pub use sim::{check_causal_order, InFlight, SimCluster, SimNetwork};
