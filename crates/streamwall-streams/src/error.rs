//! Error types for stream feeds.

use thiserror::Error;

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Errors a feed can report for a single refresh.
///
/// None of these are fatal: the aggregator keeps the feed's last good
/// snapshot and carries on.
#[derive(Debug, Error)]
pub enum FeedError {
    /// HTTP fetch or JSON body decode failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Reading a local file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A local stream file is not valid TOML
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The file watcher could not be installed
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}
