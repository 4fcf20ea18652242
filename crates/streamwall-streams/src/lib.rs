//! Streamwall Streams - Feed Aggregation and Stream Identity
//!
//! Turns several independently refreshing stream feeds into one canonical,
//! deduplicated, identity-stable stream list.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  ┌──────────┐  ┌────────┐  ┌─────────┐
//! │ json-url │  │toml-file │  │ custom │  │ overlay │   feeds (full snapshots)
//! └────┬─────┘  └────┬─────┘  └───┬────┘  └────┬────┘
//!      └─────────────┴─────┬──────┴────────────┘
//!                          ↓
//!                 ┌──────────────────┐     ┌──────────────────────────┐
//!                 │ SourceAggregator │ ──→ │ StreamIdentityRegistry   │
//!                 └────────┬─────────┘     │ url → StreamId (forever) │
//!                          ↓               └──────────────────────────┘
//!                 CanonicalStreamList (complete replacement per emission)
//! ```
//!
//! # Precedence
//!
//! When a URL appears in more than one feed, feeds are walked in
//! registration order and each later occurrence overrides the display
//! fields it sets. The record is tagged with the label of the last feed
//! that contributed to it.
//!
//! # Example
//!
//! ```rust,ignore
//! use streamwall_streams::{feed, Feed, SourceAggregator, StreamIdentityRegistry};
//!
//! let feeds = vec![
//!     Feed::new("json-url", feed::poll_json_url(client, url, interval)),
//!     Feed::new("custom", custom.feed()),
//! ];
//! let mut lists = Box::pin(SourceAggregator::combine(feeds, StreamIdentityRegistry::new()));
//! while let Some(list) = lists.next().await {
//!     println!("{} streams", list.len());
//! }
//! ```

pub mod aggregator;
pub mod error;
pub mod feed;
pub mod local;
pub mod record;
pub mod registry;

pub use aggregator::SourceAggregator;
pub use error::{FeedError, Result};
pub use feed::{Feed, FeedEvent, FeedStream};
pub use local::LocalStreamData;
pub use record::{CanonicalStreamList, ContentKind, LabelPosition, StreamData, StreamId, StreamRecord};
pub use registry::StreamIdentityRegistry;
