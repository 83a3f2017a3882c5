//! Static membership and node configuration.
//!
//! Membership is read once at start-up from a newline-delimited peers file:
//!
//! ```text
//! # chat room
//! 10.0.0.1/8081
//! 10.0.0.2/8081
//! 10.0.0.3/8081
//! ```
//!
//! Each entry's position among the entries is that peer's clock slot. Blank
//! lines and `#` comments are skipped and do not consume a slot. The entry
//! matching this process fixes its own slot and is left out of the
//! multicast list.

use crate::error::{NetError, Result};
use crate::peer::PeerAddr;
use causeway_clock::VectorClock;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port a node listens on when none is given.
pub const DEFAULT_PORT: u16 = 8081;

/// Default peers file name, relative to the working directory.
pub const DEFAULT_PEERS_FILE: &str = "peers.txt";

/// The fixed peer set as seen from one process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    self_addr: PeerAddr,
    self_index: usize,
    members: Vec<PeerAddr>,
    initial_clock: VectorClock,
}

impl Membership {
    /// Build a membership from an ordered member list.
    pub fn from_members(members: Vec<PeerAddr>, self_addr: PeerAddr) -> Result<Self> {
        let mut seen = HashSet::new();
        for (index, addr) in members.iter().enumerate() {
            if !seen.insert(*addr) {
                return Err(NetError::DuplicatePeer {
                    line: index + 1,
                    entry: addr.to_string(),
                });
            }
        }
        let self_index = members
            .iter()
            .position(|addr| *addr == self_addr)
            .ok_or_else(|| NetError::SelfNotListed(self_addr.to_string()))?;
        let initial_clock = VectorClock::new(members.len(), self_index)?;

        Ok(Self {
            self_addr,
            self_index,
            members,
            initial_clock,
        })
    }

    /// Parse the contents of a peers file.
    pub fn parse(text: &str, self_addr: PeerAddr) -> Result<Self> {
        let mut members = Vec::new();
        let mut seen = HashSet::new();

        for (lineno, raw) in text.lines().enumerate() {
            let entry = raw.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            let line = lineno + 1;
            let addr = PeerAddr::parse_entry(entry, line)?;
            if !seen.insert(addr) {
                return Err(NetError::DuplicatePeer {
                    line,
                    entry: entry.to_string(),
                });
            }
            members.push(addr);
        }

        Self::from_members(members, self_addr)
    }

    /// Read and parse a peers file. Failure here is fatal for a node.
    pub fn load(path: impl AsRef<Path>, self_addr: PeerAddr) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| NetError::PeerFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, self_addr)
    }

    pub fn self_addr(&self) -> PeerAddr {
        self.self_addr
    }

    pub fn self_index(&self) -> usize {
        self.self_index
    }

    /// Number of clock slots: every other peer plus ourselves.
    pub fn clock_size(&self) -> usize {
        self.members.len()
    }

    /// Every member in slot order, including ourselves.
    pub fn members(&self) -> &[PeerAddr] {
        &self.members
    }

    /// Multicast targets: every member but ourselves, with their slots.
    pub fn peers(&self) -> impl Iterator<Item = (usize, PeerAddr)> + '_ {
        self.members
            .iter()
            .copied()
            .enumerate()
            .filter(move |(index, _)| *index != self.self_index)
    }

    pub fn peer_count(&self) -> usize {
        self.members.len() - 1
    }

    pub fn index_of(&self, addr: &PeerAddr) -> Option<usize> {
        self.members.iter().position(|m| m == addr)
    }

    /// A fresh all-zero clock sized for this membership.
    pub fn new_clock(&self) -> VectorClock {
        self.initial_clock.clone()
    }
}

/// Tunables for a chat node.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Port the inbound server binds to.
    pub listen_port: u16,
    /// Location of the peers file.
    pub peers_file: PathBuf,
    /// Optional artificial delay before sending to the peer in slot `i`,
    /// applied as `i * stagger`. Useful for provoking reordering.
    pub send_stagger: Option<Duration>,
    /// Upper bound on dialing a peer.
    pub connect_timeout: Duration,
    /// Upper bound on writing a post and reading the peer's reply.
    pub request_timeout: Duration,
    /// Depth of each per-peer outbound queue.
    pub outbound_queue: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            peers_file: PathBuf::from(DEFAULT_PEERS_FILE),
            send_stagger: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            outbound_queue: 256,
        }
    }
}

impl NodeConfig {
    /// Delay before sending to the peer in `slot`.
    pub fn delay_for(&self, slot: usize) -> Option<Duration> {
        self.send_stagger
            .map(|stagger| stagger.saturating_mul(slot as u32))
            .filter(|d| !d.is_zero())
    }
}

/// Builder for node configuration.
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
        }
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.listen_port = port;
        self
    }

    pub fn peers_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.peers_file = path.into();
        self
    }

    pub fn send_stagger(mut self, stagger: Duration) -> Self {
        self.config.send_stagger = Some(stagger);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn outbound_queue(mut self, depth: usize) -> Self {
        self.config.outbound_queue = depth.max(1);
        self
    }

    pub fn build(self) -> NodeConfig {
        self.config
    }
}

impl Default for NodeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
