//! Last-writer-wins map.

use crate::clock::{ReplicaId, Stamp};
use crate::error::{Error, Result};
use crate::ConvergentMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// A value together with the stamp of the write that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwEntry<V> {
    pub value: V,
    pub stamp: Stamp,
}

impl<V> LwwEntry<V> {
    pub fn new(value: V, stamp: Stamp) -> Self {
        Self { value, stamp }
    }

    /// Check if this entry was written after another.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.stamp > other.stamp
    }

    /// Merge with another entry, keeping the newer one.
    /// Returns true if self was updated.
    pub fn merge(&mut self, other: Self) -> bool {
        if other.is_newer_than(self) {
            *self = other;
            true
        } else {
            false
        }
    }
}

/// Entries exchanged between replicas. A snapshot is a delta with every key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapDelta<K, V> {
    pub entries: Vec<(K, LwwEntry<V>)>,
}

impl<K, V> Default for MapDelta<K, V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<K, V> MapDelta<K, V> {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Map of last-writer-wins registers.
#[derive(Debug, Clone)]
pub struct LwwMap<K, V> {
    entries: BTreeMap<K, LwwEntry<V>>,
    replica: ReplicaId,
    clock: u64,
}

impl<K: Ord + Clone, V: Clone> LwwMap<K, V> {
    pub fn new(replica: ReplicaId) -> Self {
        Self {
            entries: BTreeMap::new(),
            replica,
            clock: 0,
        }
    }

    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    /// Highest counter observed locally or in merged deltas.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn entry(&self, key: &K) -> Option<&LwwEntry<V>> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, e)| (k, &e.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge a single entry. Returns true if it replaced the stored one.
    ///
    /// Entries stamped above [`Stamp::MAX_COUNTER`] are dropped on every
    /// replica alike, so the clock can never be pushed to overflow.
    fn merge_entry(&mut self, key: K, entry: LwwEntry<V>) -> bool {
        if entry.stamp.counter > Stamp::MAX_COUNTER {
            warn!(counter = entry.stamp.counter, replica = %entry.stamp.replica, "dropping entry with out-of-range stamp");
            return false;
        }
        self.clock = self.clock.max(entry.stamp.counter);
        match self.entries.get_mut(&key) {
            Some(existing) => existing.merge(entry),
            None => {
                self.entries.insert(key, entry);
                true
            }
        }
    }
}

impl<K: Ord + Clone, V: Clone> ConvergentMap<K, V> for LwwMap<K, V> {
    type Delta = MapDelta<K, V>;

    fn set(&mut self, key: K, value: V) -> Result<MapDelta<K, V>> {
        let counter = self
            .clock
            .checked_add(1)
            .filter(|c| *c <= Stamp::MAX_COUNTER)
            .ok_or(Error::ClockExhausted { clock: self.clock })?;
        self.clock = counter;
        let entry = LwwEntry::new(value, Stamp::new(counter, self.replica));
        self.entries.insert(key.clone(), entry.clone());
        Ok(MapDelta {
            entries: vec![(key, entry)],
        })
    }

    fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    fn merge(&mut self, delta: MapDelta<K, V>) -> Vec<K> {
        let mut changed = Vec::new();
        for (key, entry) in delta.entries {
            if self.merge_entry(key.clone(), entry) && !changed.contains(&key) {
                changed.push(key);
            }
        }
        changed
    }

    fn snapshot(&self) -> MapDelta<K, V> {
        MapDelta {
            entries: self
                .entries
                .iter()
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type Map = LwwMap<u32, Option<u64>>;

    fn state(map: &Map) -> Vec<(u32, Option<u64>)> {
        map.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn entry_merge_keeps_newer() {
        let mut entry = LwwEntry::new("new", Stamp::new(2, ReplicaId(1)));
        assert!(!entry.merge(LwwEntry::new("old", Stamp::new(1, ReplicaId(1)))));
        assert_eq!(entry.value, "new");

        assert!(entry.merge(LwwEntry::new("newer", Stamp::new(3, ReplicaId(0)))));
        assert_eq!(entry.value, "newer");
    }

    #[test]
    fn set_advances_clock() {
        let mut map = Map::new(ReplicaId(1));
        map.set(0, Some(1)).unwrap();
        map.set(0, Some(2)).unwrap();

        assert_eq!(map.clock(), 2);
        assert_eq!(map.get(&0), Some(&Some(2)));
    }

    #[test]
    fn merge_advances_clock_past_remote() {
        let mut a = Map::new(ReplicaId(1));
        let mut b = Map::new(ReplicaId(2));
        for i in 0..5 {
            b.set(0, Some(i)).unwrap();
        }
        a.merge(b.snapshot());

        let delta = a.set(0, Some(99)).unwrap();
        b.merge(delta);
        assert_eq!(b.get(&0), Some(&Some(99)));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut source = Map::new(ReplicaId(1));
        let delta = source.set(3, Some(7)).unwrap();

        let mut target = Map::new(ReplicaId(2));
        assert_eq!(target.merge(delta.clone()), vec![3]);
        assert!(target.merge(delta).is_empty());
        assert_eq!(target.get(&3), Some(&Some(7)));
    }

    #[test]
    fn oversized_remote_stamp_is_dropped() {
        let mut map = Map::new(ReplicaId(1));
        let hostile = MapDelta {
            entries: vec![(0, LwwEntry::new(Some(5), Stamp::new(u64::MAX, ReplicaId(2))))],
        };

        assert!(map.merge(hostile).is_empty());
        assert_eq!(map.clock(), 0);
        assert_eq!(map.get(&0), None);

        map.set(0, Some(1)).unwrap();
        assert_eq!(map.get(&0), Some(&Some(1)));
    }

    #[test]
    fn exhausted_clock_refuses_writes() {
        let mut map = Map::new(ReplicaId(1));
        let at_limit = MapDelta {
            entries: vec![(1, LwwEntry::new(Some(5), Stamp::new(Stamp::MAX_COUNTER, ReplicaId(2))))],
        };
        assert_eq!(map.merge(at_limit), vec![1]);

        assert!(matches!(map.set(0, Some(1)), Err(Error::ClockExhausted { .. })));
        assert_eq!(map.get(&0), None);
    }

    #[test]
    fn concurrent_writes_pick_same_winner() {
        let mut a = Map::new(ReplicaId(1));
        let mut b = Map::new(ReplicaId(2));
        let da = a.set(0, Some(10)).unwrap();
        let db = b.set(0, Some(20)).unwrap();

        a.merge(db);
        b.merge(da);

        assert_eq!(state(&a), state(&b));
        assert_eq!(a.get(&0), Some(&Some(20)));
    }

    fn arb_delta() -> impl Strategy<Value = MapDelta<u32, Option<u64>>> {
        prop::collection::vec(
            (0u32..6, prop::option::of(0u64..4), 0u64..8, 0u64..3),
            0..6,
        )
        .prop_map(|entries| MapDelta {
            entries: entries
                .into_iter()
                .map(|(k, v, counter, replica)| {
                    (k, LwwEntry::new(v, Stamp::new(counter, ReplicaId(replica))))
                })
                .collect(),
        })
    }

    fn normalize(delta: MapDelta<u32, Option<u64>>) -> MapDelta<u32, Option<u64>> {
        // A (key, stamp) pair can only ever carry one value.
        let mut seen: BTreeMap<(u32, Stamp), Option<u64>> = BTreeMap::new();
        MapDelta {
            entries: delta
                .entries
                .into_iter()
                .map(|(k, e)| {
                    let value = *seen.entry((k, e.stamp)).or_insert(e.value);
                    (k, LwwEntry::new(value, e.stamp))
                })
                .collect(),
        }
    }

    proptest! {
        #[test]
        fn merge_commutes(a in arb_delta(), b in arb_delta()) {
            let combined = normalize(MapDelta { entries: a.entries.iter().chain(b.entries.iter()).cloned().collect() });
            let (na, nb) = combined.entries.split_at(a.len());
            let (a, b) = (MapDelta { entries: na.to_vec() }, MapDelta { entries: nb.to_vec() });

            let mut ab = Map::new(ReplicaId(9));
            ab.merge(a.clone());
            ab.merge(b.clone());

            let mut ba = Map::new(ReplicaId(9));
            ba.merge(b);
            ba.merge(a);

            prop_assert_eq!(state(&ab), state(&ba));
        }

        #[test]
        fn merge_idempotent(a in arb_delta()) {
            let a = normalize(a);
            let mut once = Map::new(ReplicaId(9));
            once.merge(a.clone());

            let mut twice = Map::new(ReplicaId(9));
            twice.merge(a.clone());
            twice.merge(a);

            prop_assert_eq!(state(&once), state(&twice));
        }

        #[test]
        fn merge_associates(a in arb_delta(), b in arb_delta(), c in arb_delta()) {
            let all = normalize(MapDelta {
                entries: a.entries.iter().chain(&b.entries).chain(&c.entries).cloned().collect(),
            });
            let (na, rest) = all.entries.split_at(a.len());
            let (nb, nc) = rest.split_at(b.len());

            // (a ∪ b) then c
            let mut left = Map::new(ReplicaId(9));
            let mut ab = Map::new(ReplicaId(8));
            ab.merge(MapDelta { entries: na.to_vec() });
            ab.merge(MapDelta { entries: nb.to_vec() });
            left.merge(ab.snapshot());
            left.merge(MapDelta { entries: nc.to_vec() });

            // a then (b ∪ c)
            let mut right = Map::new(ReplicaId(9));
            let mut bc = Map::new(ReplicaId(7));
            bc.merge(MapDelta { entries: nb.to_vec() });
            bc.merge(MapDelta { entries: nc.to_vec() });
            right.merge(MapDelta { entries: na.to_vec() });
            right.merge(bc.snapshot());

            prop_assert_eq!(state(&left), state(&right));
        }
    }
}
