//! Error types for streamwall-protocols.

use crate::connection::ConnectionState;
use thiserror::Error;

/// Result type for streamwall-protocols operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding, decoding or tracking a connection.
#[derive(Debug, Error)]
pub enum Error {
    /// A text frame was not a valid control message.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The connection state machine does not allow this step.
    #[error("invalid connection transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// The connection was closed and will not reconnect.
    #[error("connection closed")]
    Closed,
}
