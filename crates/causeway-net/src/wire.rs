//! Newline-delimited JSON frames exchanged between peers.

use crate::error::Result;
use causeway_clock::Message;
use serde::{Deserialize, Serialize};

/// Longest frame a peer will read, newline excluded.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// One line on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Hand a chat message to the receiving peer.
    Post { message: Message },
    /// The message was accepted (delivered or held).
    Ack,
    /// The message was refused and will never be delivered.
    Reject { reason: String },
}

impl Frame {
    /// Serialize to a single line, newline included.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    pub fn decode(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}
