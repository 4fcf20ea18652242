//! Streamwall Protocols - Control Channel Wire Format and Connection Lifecycle
//!
//! This crate defines everything two ends of a control connection have to
//! agree on: the JSON command/update messages, the state snapshot they
//! carry, which roles may issue which commands, and how a client backs off
//! and tracks its connection while reconnecting.
//!
//! # Framing
//!
//! A control connection is message oriented. The frame type alone decides
//! how a payload is read:
//!
//! ```text
//!   client                                   authority
//!     │ ── Text   {id, clientId, type, ...}  ──→ │   Command
//!     │ ←─ Text   {id, clientId, type:"state"} ─ │   Update (full snapshot)
//!     │ ←─ Binary <store delta / snapshot>   ──→ │   replicated view store
//! ```
//!
//! # Connection Lifecycle
//!
//! ```text
//!   Disconnected ──→ Connecting ──→ Connected ──→ Synced
//!        ↑               │              │            │
//!        └───────────────┴──────────────┴────────────┘   (error / close, backoff)
//!
//!   any state ──→ Closed   (explicit shutdown, terminal)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use streamwall_protocols::{CommandMessage, Frame, Role};
//!
//! if let Frame::Text(text) = frame {
//!     let msg = CommandMessage::from_json(&text)?;
//!     if Role::Operator.can(&msg.command) {
//!         // apply
//!     }
//! }
//! ```

pub mod backoff;
pub mod connection;
pub mod error;
pub mod message;
pub mod roles;
pub mod state;

pub use backoff::{Backoff, ReconnectPolicy};
pub use connection::{ConnectionState, ConnectionTracker};
pub use error::{Error, Result};
pub use message::{Command, CommandMessage, Frame, MessageCounter, Update, UpdateMessage};
pub use roles::Role;
pub use state::{
    AudioState, AuthState, AuthTokenInfo, ContentViewInfo, Identity, PlaybackState, StreamDelayStatus,
    StreamWindowConfig, StreamwallState, TokenKind, VideoState, ViewContent, ViewContext, ViewPos, ViewState,
    ViewStateValue,
};
