//! Relay error types

use std::io;

use crate::protocol::ConnectionId;

/// Relay result type
pub type Result<T> = std::result::Result<T, Error>;

/// Relay errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid config value for {key}: {reason}")]
    Config { key: &'static str, reason: String },

    #[error("Connection {0} is already registered")]
    DuplicateConnection(ConnectionId),

    #[error("Malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Channel to connection {0} is closed")]
    ChannelClosed(ConnectionId),
}
