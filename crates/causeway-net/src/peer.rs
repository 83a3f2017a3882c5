//! Peer addresses in the `ip/port` notation used by the peers file.

use crate::error::NetError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Address and identity of one chat peer.
///
/// The textual form `ip/port` doubles as the peer's identity: it is the
/// origin string stamped on every message the peer sends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerAddr {
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Parse one peers-file entry, reporting failures against `line`.
    pub fn parse_entry(entry: &str, line: usize) -> Result<Self, NetError> {
        let malformed = |reason: &str| NetError::MalformedPeer {
            line,
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let (ip, port) = entry
            .split_once('/')
            .ok_or_else(|| malformed("expected <ip>/<port>"))?;
        let ip: IpAddr = ip.trim().parse().map_err(|_| malformed("invalid IP address"))?;
        let port: u16 = port.trim().parse().map_err(|_| malformed("invalid port"))?;
        if port == 0 {
            return Err(malformed("port must be non-zero"));
        }
        Ok(Self { ip, port })
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl FromStr for PeerAddr {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_entry(s, 0)
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.port)
    }
}
