//! Feed sources.
//!
//! A feed is a lazy stream of [`FeedEvent`]s. Every snapshot it yields is
//! the feed's complete current list, never a diff. Dropping the stream
//! releases whatever timer or file watcher backs it.

use crate::error::{FeedError, Result};
use crate::record::StreamData;
use futures::stream::{self, BoxStream, StreamExt};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// One emission from a feed.
///
/// A feed stream that ends without [`FeedEvent::Terminated`] keeps its last
/// snapshot in the canonical list.
#[derive(Debug)]
pub enum FeedEvent {
    /// The feed's full current list
    Snapshot(Vec<StreamData>),
    /// A refresh failed; the previous snapshot stays in effect
    Failed(FeedError),
    /// The feed is gone for good; its streams leave the canonical list
    Terminated,
}

pub type FeedStream = BoxStream<'static, FeedEvent>;

/// A feed plus the label its records are tagged with.
pub struct Feed {
    pub label: String,
    pub stream: FeedStream,
}

impl Feed {
    pub fn new(label: impl Into<String>, stream: FeedStream) -> Self {
        Self {
            label: label.into(),
            stream,
        }
    }
}

/// A feed that emits `list` once.
pub fn static_list(list: Vec<StreamData>) -> FeedStream {
    stream::once(async move { FeedEvent::Snapshot(list) }).boxed()
}

/// Poll a URL returning a JSON array of stream descriptors.
///
/// The first fetch happens immediately, then once per `interval`.
pub fn poll_json_url(client: reqwest::Client, url: String, interval: Duration) -> FeedStream {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold((client, url, ticker), |(client, url, mut ticker)| async move {
        ticker.tick().await;
        let event = match fetch_json_list(&client, &url).await {
            Ok(list) => {
                debug!(%url, count = list.len(), "polled stream list");
                FeedEvent::Snapshot(list)
            }
            Err(e) => FeedEvent::Failed(e),
        };
        Some((event, (client, url, ticker)))
    })
    .boxed()
}

async fn fetch_json_list(client: &reqwest::Client, url: &str) -> Result<Vec<StreamData>> {
    let list = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<Vec<StreamData>>()
        .await?;
    Ok(list)
}

#[derive(Debug, Default, Deserialize)]
struct StreamFile {
    #[serde(default)]
    streams: Vec<StreamData>,
}

/// Parse a TOML stream file (`[[streams]]` tables).
pub fn parse_toml_streams(text: &str) -> Result<Vec<StreamData>> {
    let file: StreamFile = toml::from_str(text)?;
    Ok(file.streams)
}

async fn read_toml_streams(path: &Path) -> Result<Vec<StreamData>> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_toml_streams(&text)
}

struct TomlWatch {
    path: PathBuf,
    changes: mpsc::Receiver<()>,
    // Keeps the OS watch alive for as long as the stream is.
    _watcher: Option<RecommendedWatcher>,
    first: bool,
}

/// Read a TOML stream file now and again whenever it changes on disk.
///
/// The parent directory is watched rather than the file itself so that
/// editors that replace the file on save keep triggering reloads. If the
/// watcher cannot be installed the file is read once and the feed ends,
/// keeping that snapshot.
pub fn watch_toml_file(path: impl Into<PathBuf>) -> FeedStream {
    let path = path.into();
    let (tx, changes) = mpsc::channel(1);

    let watcher = match install_watcher(&path, tx) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "file watch unavailable, reading once");
            None
        }
    };

    let state = TomlWatch {
        path,
        changes,
        _watcher: watcher,
        first: true,
    };

    stream::unfold(state, |mut state| async move {
        if !state.first {
            state.changes.recv().await?;
        }
        state.first = false;
        let event = match read_toml_streams(&state.path).await {
            Ok(list) => {
                debug!(path = %state.path.display(), count = list.len(), "read stream file");
                FeedEvent::Snapshot(list)
            }
            Err(e) => FeedEvent::Failed(e),
        };
        Some((event, state))
    })
    .boxed()
}

fn install_watcher(path: &Path, tx: mpsc::Sender<()>) -> Result<RecommendedWatcher> {
    let file_name = path.file_name().map(|n| n.to_os_string());
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let touches_file = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if touches_file {
                    // Full channel means a reload is already pending.
                    let _ = tx.try_send(());
                }
            }
            Err(e) => warn!(error = %e, "file watch error"),
        },
        Config::default(),
    )?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_streams_parse() {
        let text = r#"
            [[streams]]
            link = "https://x/1"
            label = "One"
            kind = "video"

            [[streams]]
            link = "https://x/2"
            city = "Portland"
        "#;

        let list = parse_toml_streams(text).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].label.as_deref(), Some("One"));
        assert_eq!(list[1].city.as_deref(), Some("Portland"));
    }

    #[test]
    fn toml_without_streams_is_empty() {
        assert!(parse_toml_streams("").unwrap().is_empty());
        assert!(parse_toml_streams("streams = [").is_err());
    }

    #[tokio::test]
    async fn static_list_emits_once() {
        let mut feed = static_list(vec![StreamData::new("https://x/1")]);

        match feed.next().await {
            Some(FeedEvent::Snapshot(list)) => assert_eq!(list.len(), 1),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(feed.next().await.is_none());
    }

    #[tokio::test]
    async fn toml_file_initial_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streams.toml");
        std::fs::write(&path, "[[streams]]\nlink = \"https://x/1\"\n").unwrap();

        let mut feed = watch_toml_file(&path);
        match feed.next().await {
            Some(FeedEvent::Snapshot(list)) => assert_eq!(list[0].link, "https://x/1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_toml_file_fails_without_ending() {
        let dir = tempfile::tempdir().unwrap();
        let mut feed = watch_toml_file(dir.path().join("absent.toml"));

        assert!(matches!(feed.next().await, Some(FeedEvent::Failed(FeedError::Io(_)))));
    }
}
