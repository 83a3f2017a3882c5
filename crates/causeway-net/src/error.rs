//! Error types for membership, transports and the chat node.

use causeway_clock::ClockError;
use causeway_delivery::DeliveryError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the networking layer.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Could not read peers file {path}: {source}")]
    PeerFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed peer entry on line {line} ({entry:?}): {reason}")]
    MalformedPeer {
        line: usize,
        entry: String,
        reason: String,
    },

    #[error("Duplicate peer entry on line {line}: {entry}")]
    DuplicatePeer { line: usize, entry: String },

    #[error("This process ({0}) is not listed in the peers file")]
    SelfNotListed(String),

    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Connection to {peer} failed: {reason}")]
    ConnectionFailed { peer: String, reason: String },

    #[error("Send to {peer} failed: {reason}")]
    SendFailed { peer: String, reason: String },

    #[error("Peer {peer} rejected message: {reason}")]
    Rejected { peer: String, reason: String },

    #[error("Outbound worker for {0} has shut down")]
    WorkerClosed(String),

    #[error("Outbound queue for {0} is full")]
    QueueFull(String),

    #[error("Frame exceeds {0} bytes")]
    FrameTooLong(usize),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Result type for networking operations.
pub type Result<T> = std::result::Result<T, NetError>;
