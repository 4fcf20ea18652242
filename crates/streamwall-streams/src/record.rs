//! Stream descriptors and the canonical stream list.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Process-lifetime identity of a stream URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a view should do with a stream's URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    Video,
    Audio,
    Web,
    Background,
    Overlay,
}

/// Corner a stream label is drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelPosition {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

/// A raw stream descriptor as produced by a feed.
///
/// Everything except `link` is optional so that partial descriptors (for
/// example an overlay entry that only carries a rotation) can be layered on
/// top of a fuller one from another feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamData {
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_position: Option<LabelPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Region (US state, province) of the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Rotation in degrees applied by the wall
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
}

impl StreamData {
    /// Descriptor with only a link set.
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            ..Default::default()
        }
    }

    /// Shallow merge: every field `other` sets overrides ours.
    pub fn merge_from(&mut self, other: &StreamData) {
        fn take<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if src.is_some() {
                dst.clone_from(src);
            }
        }

        if !other.link.is_empty() {
            self.link.clone_from(&other.link);
        }
        take(&mut self.kind, &other.kind);
        take(&mut self.label, &other.label);
        take(&mut self.label_position, &other.label_position);
        take(&mut self.source, &other.source);
        take(&mut self.notes, &other.notes);
        take(&mut self.status, &other.status);
        take(&mut self.city, &other.city);
        take(&mut self.state, &other.state);
        take(&mut self.rotation, &other.rotation);
    }
}

/// A stream in the canonical list: a merged descriptor plus its identity
/// and the label of the feed that last contributed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRecord {
    #[serde(rename = "_id")]
    pub id: StreamId,
    #[serde(rename = "_dataSource")]
    pub source_tag: String,
    pub link: String,
    pub kind: ContentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_position: Option<LabelPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
}

impl StreamRecord {
    /// Build a record from a merged descriptor.
    pub fn new(id: StreamId, source_tag: impl Into<String>, data: StreamData) -> Self {
        Self {
            id,
            source_tag: source_tag.into(),
            link: data.link,
            kind: data.kind.unwrap_or_default(),
            label: data.label,
            label_position: data.label_position,
            source: data.source,
            notes: data.notes,
            status: data.status,
            city: data.city,
            state: data.state,
            rotation: data.rotation,
        }
    }

    /// The natural key of the record.
    pub fn url(&self) -> &str {
        &self.link
    }
}

/// Ordered, deduplicated stream list with lookups by URL and by id.
///
/// Serializes as a plain JSON array of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalStreamList {
    records: Vec<StreamRecord>,
    by_url: HashMap<String, usize>,
    by_id: HashMap<StreamId, usize>,
}

impl CanonicalStreamList {
    /// Build a list and its indexes. Later duplicates of a URL or id are dropped.
    pub fn from_records(records: Vec<StreamRecord>) -> Self {
        let mut list = Self::default();
        for record in records {
            if list.by_url.contains_key(&record.link) || list.by_id.contains_key(&record.id) {
                tracing::warn!(url = %record.link, id = %record.id, "dropping duplicate stream record");
                continue;
            }
            let idx = list.records.len();
            list.by_url.insert(record.link.clone(), idx);
            list.by_id.insert(record.id, idx);
            list.records.push(record);
        }
        list
    }

    pub fn get_by_url(&self, url: &str) -> Option<&StreamRecord> {
        self.by_url.get(url).map(|&idx| &self.records[idx])
    }

    pub fn get_by_id(&self, id: StreamId) -> Option<&StreamRecord> {
        self.by_id.get(&id).map(|&idx| &self.records[idx])
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.by_url.contains_key(url)
    }

    pub fn records(&self) -> &[StreamRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Serialize for CanonicalStreamList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.records.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CanonicalStreamList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<StreamRecord>::deserialize(deserializer).map(Self::from_records)
    }
}
