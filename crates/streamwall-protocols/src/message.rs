//! Control messages and frames.

use crate::error::Result;
use crate::roles::Role;
use crate::state::StreamwallState;
use serde::{Deserialize, Serialize};
use streamwall_streams::{StreamData, StreamId};

/// A transport-neutral frame on a control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON control message
    Text(String),
    /// Encoded store delta or snapshot
    Binary(Vec<u8>),
    Close,
}

/// Commands a control surface sends to the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Command {
    /// Make one view the only listening view, or silence all with `None`.
    SetListeningView { view_idx: Option<usize> },
    SetViewBackgroundListening { view_idx: usize, listening: bool },
    SetViewBlurred { view_idx: usize, blurred: bool },
    RotateStream { url: String, rotation: f64 },
    UpdateCustomStream { url: String, data: StreamData },
    DeleteCustomStream { url: String },
    ReloadView { view_idx: usize },
    Browse { url: String },
    DevTools { view_idx: usize },
    SetStreamCensored { is_censored: bool },
    SetStreamRunning { is_stream_running: bool },
    CreateInvite { role: Role, name: String },
    DeleteToken { token_id: String },
    /// Assign a stream to a view slot without speaking the binary protocol.
    SetViewStream { view_idx: usize, stream_id: Option<StreamId> },
}

impl Command {
    /// The wire tag of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetListeningView { .. } => "set-listening-view",
            Self::SetViewBackgroundListening { .. } => "set-view-background-listening",
            Self::SetViewBlurred { .. } => "set-view-blurred",
            Self::RotateStream { .. } => "rotate-stream",
            Self::UpdateCustomStream { .. } => "update-custom-stream",
            Self::DeleteCustomStream { .. } => "delete-custom-stream",
            Self::ReloadView { .. } => "reload-view",
            Self::Browse { .. } => "browse",
            Self::DevTools { .. } => "dev-tools",
            Self::SetStreamCensored { .. } => "set-stream-censored",
            Self::SetStreamRunning { .. } => "set-stream-running",
            Self::CreateInvite { .. } => "create-invite",
            Self::DeleteToken { .. } => "delete-token",
            Self::SetViewStream { .. } => "set-view-stream",
        }
    }
}

/// A command with its message id and sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandMessage {
    pub id: u64,
    pub client_id: String,
    #[serde(flatten)]
    pub command: Command,
}

impl CommandMessage {
    pub fn new(id: u64, client_id: impl Into<String>, command: Command) -> Self {
        Self {
            id,
            client_id: client_id.into(),
            command,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Updates the authority pushes to control surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Update {
    /// Complete state snapshot; always replaces what the client had.
    State { state: Box<StreamwallState> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    pub id: u64,
    pub client_id: String,
    #[serde(flatten)]
    pub update: Update,
}

impl UpdateMessage {
    /// A full state update.
    pub fn state(id: u64, client_id: impl Into<String>, state: StreamwallState) -> Self {
        Self {
            id,
            client_id: client_id.into(),
            update: Update::State { state: Box::new(state) },
        }
    }

    pub fn snapshot(&self) -> &StreamwallState {
        match &self.update {
            Update::State { state } => state,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Monotonic message id source for one sender.
#[derive(Debug, Default)]
pub struct MessageCounter {
    last: u64,
}

impl MessageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        self.last += 1;
        self.last
    }
}
