//! Multi-feed aggregation into one canonical stream list.

use crate::feed::{Feed, FeedEvent};
use crate::record::{CanonicalStreamList, StreamData, StreamRecord};
use crate::registry::StreamIdentityRegistry;
use futures::stream::{self, Stream, StreamExt};
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct FeedSlot {
    label: String,
    latest: Option<Vec<StreamData>>,
    terminated: bool,
}

/// Merges the latest snapshot of every feed into a [`CanonicalStreamList`].
#[derive(Debug)]
pub struct SourceAggregator {
    feeds: Vec<FeedSlot>,
    registry: StreamIdentityRegistry,
    current: CanonicalStreamList,
}

impl SourceAggregator {
    /// Create an aggregator for feeds with the given labels, in precedence order.
    pub fn new<I, S>(labels: I, registry: StreamIdentityRegistry) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            feeds: labels
                .into_iter()
                .map(|label| FeedSlot {
                    label: label.into(),
                    latest: None,
                    terminated: false,
                })
                .collect(),
            registry,
            current: CanonicalStreamList::default(),
        }
    }

    /// Feed one event from feed `feed` into the aggregator.
    ///
    /// Returns the recomputed list when the event changes what the feeds
    /// contribute. Failures keep the last good snapshot and return `None`.
    pub fn apply(&mut self, feed: usize, event: FeedEvent) -> Option<CanonicalStreamList> {
        let Some(slot) = self.feeds.get_mut(feed) else {
            warn!(feed, "event for unknown feed");
            return None;
        };

        match event {
            FeedEvent::Snapshot(list) => {
                if slot.terminated {
                    debug!(feed = %slot.label, "ignoring snapshot from terminated feed");
                    return None;
                }
                slot.latest = Some(list);
            }
            FeedEvent::Failed(e) => {
                warn!(feed = %slot.label, error = %e, "feed refresh failed, keeping last snapshot");
                return None;
            }
            FeedEvent::Terminated => {
                if slot.terminated {
                    return None;
                }
                info!(feed = %slot.label, "feed terminated");
                slot.terminated = true;
                slot.latest = None;
            }
        }

        Some(self.recompute())
    }

    /// The most recently computed list.
    pub fn current(&self) -> &CanonicalStreamList {
        &self.current
    }

    pub fn registry(&self) -> &StreamIdentityRegistry {
        &self.registry
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }

    fn recompute(&mut self) -> CanonicalStreamList {
        let mut merged: Vec<(StreamData, String)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for feed in &self.feeds {
            let Some(list) = &feed.latest else {
                continue;
            };
            for data in list {
                if data.link.is_empty() {
                    debug!(feed = %feed.label, "skipping stream without link");
                    continue;
                }
                match positions.get(&data.link) {
                    Some(&idx) => {
                        let (existing, tag) = &mut merged[idx];
                        existing.merge_from(data);
                        tag.clone_from(&feed.label);
                    }
                    None => {
                        positions.insert(data.link.clone(), merged.len());
                        merged.push((data.clone(), feed.label.clone()));
                    }
                }
            }
        }

        let records = merged
            .into_iter()
            .map(|(data, tag)| {
                let id = self.registry.assign(&data.link);
                StreamRecord::new(id, tag, data)
            })
            .collect();

        self.current = CanonicalStreamList::from_records(records);
        debug!(streams = self.current.len(), "recomputed canonical stream list");
        self.current.clone()
    }

    /// Drive all `feeds` concurrently and yield a new list each time one changes.
    ///
    /// Feeds are registered in the order given, which is also their
    /// precedence order. The stream ends once every feed stream has ended.
    pub fn combine(
        feeds: Vec<Feed>,
        registry: StreamIdentityRegistry,
    ) -> impl Stream<Item = CanonicalStreamList> + Send + 'static {
        let labels: Vec<String> = feeds.iter().map(|f| f.label.clone()).collect();
        let aggregator = SourceAggregator::new(labels, registry);

        let tagged = stream::select_all(
            feeds
                .into_iter()
                .enumerate()
                .map(|(idx, feed)| feed.stream.map(move |event| (idx, event)).boxed()),
        );

        stream::unfold((aggregator, tagged), |(mut aggregator, mut events)| async move {
            loop {
                let (idx, event) = events.next().await?;
                if let Some(list) = aggregator.apply(idx, event) {
                    return Some((list, (aggregator, events)));
                }
            }
        })
    }
}
