//! In-memory editable stream lists.

use crate::feed::{FeedEvent, FeedStream};
use crate::record::StreamData;
use futures::stream::{self, StreamExt};
use tokio::sync::watch;

/// An editable list of stream descriptors keyed by URL.
///
/// Backs the custom list (edited by operators, persisted across restarts)
/// and the overlay list (runtime-only display tweaks such as rotation).
/// Every edit re-emits the full list on all feeds handed out by [`feed`].
///
/// [`feed`]: LocalStreamData::feed
#[derive(Debug)]
pub struct LocalStreamData {
    entries: Vec<(String, StreamData)>,
    tx: watch::Sender<Vec<StreamData>>,
}

impl Default for LocalStreamData {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStreamData {
    pub fn new() -> Self {
        Self::from_entries(Vec::new())
    }

    /// Restore a list from `(url, data)` pairs, e.g. from persistence.
    pub fn from_entries(entries: Vec<(String, StreamData)>) -> Self {
        let mut list = Self {
            entries: Vec::new(),
            tx: watch::channel(Vec::new()).0,
        };
        for (url, data) in entries {
            list.upsert(url, data);
        }
        list.publish();
        list
    }

    /// Merge `data` into the entry for `url`, creating it if needed.
    ///
    /// If `data.link` names a different URL the entry moves to that URL.
    pub fn update(&mut self, url: &str, data: StreamData) {
        self.upsert(url.to_string(), data);
        self.publish();
    }

    /// Remove the entry for `url`. Returns whether it existed.
    pub fn delete(&mut self, url: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(key, _)| key != url);
        let removed = self.entries.len() != before;
        if removed {
            self.publish();
        }
        removed
    }

    pub fn get(&self, url: &str) -> Option<&StreamData> {
        self.entries.iter().find(|(key, _)| key == url).map(|(_, data)| data)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.get(url).is_some()
    }

    pub fn entries(&self) -> &[(String, StreamData)] {
        &self.entries
    }

    /// Current descriptors in insertion order.
    pub fn list(&self) -> Vec<StreamData> {
        self.entries.iter().map(|(_, data)| data.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A feed that emits the current list now and after every edit.
    ///
    /// When this `LocalStreamData` is dropped the feed yields
    /// [`FeedEvent::Terminated`] once and ends.
    pub fn feed(&self) -> FeedStream {
        let rx = self.tx.subscribe();
        stream::unfold(Some((rx, true)), |state| async move {
            let (mut rx, first) = state?;
            if !first && rx.changed().await.is_err() {
                return Some((FeedEvent::Terminated, None));
            }
            let list = rx.borrow_and_update().clone();
            Some((FeedEvent::Snapshot(list), Some((rx, false))))
        })
        .boxed()
    }

    fn upsert(&mut self, url: String, mut data: StreamData) {
        if data.link.is_empty() {
            data.link.clone_from(&url);
        }
        let target = data.link.clone();

        let mut merged = match self.entries.iter().position(|(key, _)| *key == url) {
            Some(idx) => self.entries.remove(idx).1,
            None => StreamData::new(target.clone()),
        };
        merged.merge_from(&data);

        match self.entries.iter().position(|(key, _)| *key == target) {
            Some(idx) => self.entries[idx].1 = merged,
            None => self.entries.push((target, merged)),
        }
    }

    fn publish(&self) {
        self.tx.send_replace(self.list());
    }
}
