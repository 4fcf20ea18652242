//! Persistent storage in a single JSON file.
//!
//! The file holds the custom stream list and a base64 snapshot of the
//! replicated view store:
//!
//! ```json
//! { "localStreamData": [["https://...", { "link": "https://..." }]], "stateDoc": "AAEC..." }
//! ```
//!
//! Writes go through [`spawn_writer`], which coalesces bursts so that at
//! most one write happens per interval and the latest state always lands.

use crate::error::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use streamwall_streams::StreamData;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedData {
    #[serde(default)]
    pub local_stream_data: Vec<(String, StreamData)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_doc: Option<String>,
}

impl PersistedData {
    pub fn new(local_stream_data: Vec<(String, StreamData)>, state_doc: &[u8]) -> Self {
        Self {
            local_stream_data,
            state_doc: Some(BASE64.encode(state_doc)),
        }
    }

    /// The stored view store snapshot, if present and decodable.
    pub fn decode_state_doc(&self) -> Option<Vec<u8>> {
        let encoded = self.state_doc.as_ref()?;
        match BASE64.decode(encoded) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "stored view state is not valid base64, starting empty");
                None
            }
        }
    }
}

/// Destination for persisted state.
pub trait PersistSink: Send + 'static {
    fn write(&mut self, data: &PersistedData) -> Result<()>;
}

/// JSON file storage.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an unreadable storage file is moved aside to.
    pub fn corrupt_path(&self) -> PathBuf {
        self.path.with_extension("json.corrupt")
    }

    /// Load stored data. A missing file or unparseable content yields empty data.
    ///
    /// Unparseable content is moved to [`corrupt_path`](Self::corrupt_path)
    /// first, so a later save cannot destroy it.
    pub fn load(&self) -> Result<PersistedData> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "no storage file yet");
                return Ok(PersistedData::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(data) => Ok(data),
            Err(e) => {
                let backup = self.corrupt_path();
                std::fs::rename(&self.path, &backup)?;
                warn!(path = ?self.path, ?backup, error = %e, "storage file is corrupt, moved aside and starting empty");
                Ok(PersistedData::default())
            }
        }
    }

    /// Write `data`, replacing the file atomically.
    pub fn save(&self, data: &PersistedData) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(data)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PersistSink for Storage {
    fn write(&mut self, data: &PersistedData) -> Result<()> {
        self.save(data)
    }
}

/// Queues state for the background writer.
///
/// Dropping the handle flushes the last queued state and stops the writer.
#[derive(Debug)]
pub struct PersistHandle {
    tx: watch::Sender<Option<PersistedData>>,
}

impl PersistHandle {
    /// Replace the pending state. Never blocks.
    pub fn persist(&self, data: PersistedData) {
        self.tx.send_replace(Some(data));
    }
}

/// Start a writer that writes at most once per `interval`.
///
/// Each write runs on the blocking pool.
pub fn spawn_writer<S: PersistSink>(mut sink: S, interval: Duration) -> (PersistHandle, JoinHandle<()>) {
    let (tx, mut rx) = watch::channel::<Option<PersistedData>>(None);

    let task = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let pending = rx.borrow_and_update().clone();
            if let Some(data) = pending {
                let written = tokio::task::spawn_blocking(move || {
                    let result = sink.write(&data);
                    (sink, result)
                })
                .await;
                match written {
                    Ok((returned, result)) => {
                        sink = returned;
                        match result {
                            Ok(()) => debug!("persisted state"),
                            Err(e) => error!(error = %e, "failed to persist state"),
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "persistence write panicked");
                        break;
                    }
                }
            }
            tokio::time::sleep(interval).await;
        }
        debug!("persistence writer stopped");
    });

    (PersistHandle { tx }, task)
}
