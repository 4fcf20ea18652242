//! Streamwall control plane.
//!
//! The authority for a video wall: which stream is shown in which grid slot,
//! which view is audible, what the operators may do, and what survives a
//! restart. The wall itself renders behind [`WallSurface`].
//!
//! # Architecture
//!
//! ```text
//!   JSON urls ─┐
//!   TOML files ┼─→ SourceAggregator ─→ ┌────────┐ ─→ StateBroadcaster ─→ local UI
//!   custom    ─┤                       │ Engine │
//!   overlay   ─┘      peers (ws) ────→ │        │ ─→ peers: state + deltas
//!                     uplink relay ──→ └────────┘ ─→ Storage (throttled)
//! ```
//!
//! - **Engine**: single task owning the view store, flags, tokens and streams
//! - **Server**: `/ws?token=` endpoint for direct peers
//! - **Uplink**: outbound relay connection with backoff
//! - **Storage**: JSON file with custom streams and a view store snapshot
//!
//! # Example
//!
//! ```no_run
//! use streamwall_control::{ControlConfig, StreamwallNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = StreamwallNode::new(ControlConfig::default())?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod broadcaster;
mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod node;
pub mod peer;
pub mod server;
pub mod storage;
pub mod surface;
pub mod uplink;
pub mod views;

pub use auth::{AuthTokens, Invite};
pub use broadcaster::{StateBroadcaster, StatePatch, SubscriberId};
pub use commands::validate_browse_url;
pub use config::ControlConfig;
pub use engine::{CommandOrigin, CommandOutcome, Engine, EngineHandle, PeerAttachment, PeerId};
pub use error::{Error, Result};
pub use node::{RunningNode, StreamwallNode};
pub use peer::PeerSession;
pub use storage::{spawn_writer, PersistHandle, PersistSink, PersistedData, Storage};
pub use surface::{NullSurface, StreamDelay, WallSurface};
pub use views::{resolve_views, ViewFlags};
