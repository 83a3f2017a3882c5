//! Causeway Net - peers, transports and multicast for the causal chat room
//!
//! This crate connects delivery engines across processes:
//! - Static membership loaded from a peers file, fixing each peer's clock slot
//! - A [`Transport`] trait with in-memory and TCP implementations
//! - Per-peer outbound workers so one dead peer never stalls the rest
//! - [`ChatNode`], which stamps, multicasts and delivers chat lines
//!
//! # Example
//!
//! ```rust
//! use causeway_net::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> causeway_net::Result<()> {
//! let members: Vec<PeerAddr> = vec!["127.0.0.1/9001".parse()?, "127.0.0.1/9002".parse()?];
//! let mut network = create_network(&members);
//! let bob_transport = network.pop().unwrap();
//! let alice_transport = network.pop().unwrap();
//!
//! let bob_inbox = bob_transport.subscribe().unwrap();
//! let alice = ChatNode::new(
//!     Membership::from_members(members.clone(), members[0])?,
//!     Arc::new(alice_transport),
//!     NodeConfig::default(),
//! );
//! let bob = ChatNode::new(
//!     Membership::from_members(members.clone(), members[1])?,
//!     Arc::new(bob_transport),
//!     NodeConfig::default(),
//! );
//! bob.spawn_receiver(bob_inbox);
//! let mut delivered = bob.events().unwrap();
//!
//! alice.send("hello bob").await.wait().await;
//! assert_eq!(delivered.recv().await.unwrap().payload(), "hello bob");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod multicast;
pub mod node;
pub mod peer;
pub mod tcp;
pub mod transport;
pub mod wire;

pub use config::{Membership, NodeConfig, NodeConfigBuilder, DEFAULT_PEERS_FILE, DEFAULT_PORT};
pub use error::{NetError, Result};
pub use multicast::{MulticastReport, Multicaster, SendOutcome};
pub use node::ChatNode;
pub use peer::PeerAddr;
pub use tcp::{TcpServer, TcpTransport};
pub use transport::{create_network, MemoryTransport, Transport};
pub use wire::{Frame, MAX_FRAME_LEN};

/// Commonly used imports.
pub mod prelude {
    pub use crate::config::{Membership, NodeConfig, NodeConfigBuilder};
    pub use crate::error::{NetError, Result};
    pub use crate::node::ChatNode;
    pub use crate::peer::PeerAddr;
    pub use crate::tcp::{TcpServer, TcpTransport};
    pub use crate::transport::{create_network, MemoryTransport, Transport};
    pub use causeway_clock::{Message, VectorClock};
    pub use causeway_delivery::SharedEngine;
}
