//! Error types for the control plane.

use streamwall_protocols::Role;
use thiserror::Error;

/// Result type for control plane operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in control plane operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Replicated view store error
    #[error("View store error: {0}")]
    Store(#[from] streamwall_crdt::Error),

    /// Control protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] streamwall_protocols::Error),

    /// Uplink WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A peer connection failed while sending
    #[error("Transport error: {0}")]
    Transport(String),

    /// The sender's role does not allow the command
    #[error("{role} may not send {command}")]
    Forbidden { role: Role, command: &'static str },

    /// A URL that may not be opened
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The engine task has stopped
    #[error("Engine stopped")]
    EngineClosed,
}
