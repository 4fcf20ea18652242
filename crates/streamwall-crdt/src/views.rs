//! The replicated view-slot store.

use crate::clock::ReplicaId;
use crate::error::{Error, Result};
use crate::lww::{LwwMap, MapDelta};
use crate::ConvergentMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use streamwall_streams::StreamId;
use tracing::{debug, warn};

/// Position of a slot in the wall grid, row-major from 0.
pub type SlotIndex = usize;

type SlotDelta = MapDelta<u32, Option<StreamId>>;
type Observer = Box<dyn FnMut(&Change<'_>) + Send>;

/// One grid position and the stream assigned to it, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSlot {
    pub index: SlotIndex,
    pub stream_id: Option<StreamId>,
}

/// Where a mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOrigin {
    Local,
    /// A remote peer, identified by the transport's peer number
    Remote(u64),
}

/// A mutation as seen by observers.
#[derive(Debug)]
pub struct Change<'a> {
    /// Encoded delta containing exactly the entries that changed
    pub delta: &'a [u8],
    pub slots: &'a [SlotIndex],
    pub origin: ChangeOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Slot assignments for a fixed-size grid, replicated as an LWW map.
///
/// The slot count is fixed at construction. Remote entries for slots
/// outside the grid are ignored, never used to grow it.
pub struct ViewStore {
    map: LwwMap<u32, Option<StreamId>>,
    slot_count: usize,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
}

impl ViewStore {
    pub fn new(slot_count: usize, replica: ReplicaId) -> Self {
        Self {
            map: LwwMap::new(replica),
            slot_count,
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn replica(&self) -> ReplicaId {
        self.map.replica()
    }

    /// Stream assigned to `index`, or `None` if unassigned or out of range.
    pub fn get(&self, index: SlotIndex) -> Option<StreamId> {
        let key = u32::try_from(index).ok()?;
        self.map.get(&key).copied().flatten()
    }

    /// Every slot of the grid, in index order.
    pub fn slots(&self) -> Vec<ViewSlot> {
        (0..self.slot_count)
            .map(|index| ViewSlot {
                index,
                stream_id: self.get(index),
            })
            .collect()
    }

    /// Assign (or clear) a slot locally. Returns the encoded delta.
    pub fn set_slot(&mut self, index: SlotIndex, stream_id: Option<StreamId>) -> Result<Vec<u8>> {
        let key = self.check_index(index)?;
        let delta = self.map.set(key, stream_id)?;
        let bytes = encode(&delta)?;
        debug!(slot = index, stream = ?stream_id, "set view slot");
        self.notify(&bytes, &[index], ChangeOrigin::Local);
        Ok(bytes)
    }

    /// Merge a delta produced by another replica.
    ///
    /// Returns the slots whose assignment changed; re-applying a delta that
    /// is already reflected returns an empty list and notifies nobody.
    pub fn apply_remote_delta(&mut self, bytes: &[u8], origin: ChangeOrigin) -> Result<Vec<SlotIndex>> {
        let delta = decode(bytes)?;
        self.merge_delta(delta, origin)
    }

    /// Encode the full state, for persistence or a peer resync.
    pub fn encode_snapshot(&self) -> Result<Vec<u8>> {
        encode(&self.map.snapshot())
    }

    /// Merge a full snapshot into the current state.
    pub fn load_snapshot(&mut self, bytes: &[u8]) -> Result<Vec<SlotIndex>> {
        let delta = decode(bytes)?;
        self.merge_delta(delta, ChangeOrigin::Local)
    }

    /// Register a callback run after every mutation that changes state.
    pub fn on_change<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&Change<'_>) + Send + 'static,
    {
        self.next_observer += 1;
        let id = ObserverId(self.next_observer);
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    fn merge_delta(&mut self, mut delta: SlotDelta, origin: ChangeOrigin) -> Result<Vec<SlotIndex>> {
        let slot_count = self.slot_count;
        delta.entries.retain(|(key, _)| {
            let in_grid = (*key as usize) < slot_count;
            if !in_grid {
                warn!(slot = *key, slot_count, "ignoring delta entry outside the grid");
            }
            in_grid
        });

        let changed = self.map.merge(delta);
        if changed.is_empty() {
            return Ok(Vec::new());
        }

        let effective = MapDelta {
            entries: changed
                .iter()
                .filter_map(|key| self.map.entry(key).map(|entry| (*key, entry.clone())))
                .collect(),
        };
        let bytes = encode(&effective)?;
        let slots: Vec<SlotIndex> = changed.iter().map(|key| *key as SlotIndex).collect();
        debug!(?slots, ?origin, "merged view delta");
        self.notify(&bytes, &slots, origin);
        Ok(slots)
    }

    fn check_index(&self, index: SlotIndex) -> Result<u32> {
        if index >= self.slot_count {
            return Err(Error::SlotOutOfRange {
                index,
                slot_count: self.slot_count,
            });
        }
        u32::try_from(index).map_err(|_| Error::SlotOutOfRange {
            index,
            slot_count: self.slot_count,
        })
    }

    fn notify(&mut self, delta: &[u8], slots: &[SlotIndex], origin: ChangeOrigin) {
        let change = Change { delta, slots, origin };
        for (_, observer) in self.observers.iter_mut() {
            observer(&change);
        }
    }
}

impl fmt::Debug for ViewStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewStore")
            .field("slot_count", &self.slot_count)
            .field("replica", &self.map.replica())
            .field("assigned", &self.map.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

fn encode(delta: &SlotDelta) -> Result<Vec<u8>> {
    bincode::serialize(delta).map_err(Error::Encode)
}

fn decode(bytes: &[u8]) -> Result<SlotDelta> {
    bincode::deserialize(bytes).map_err(Error::Decode)
}
