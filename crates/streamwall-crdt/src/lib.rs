//! Streamwall CRDT - Convergent View-Slot Assignments
//!
//! The wall's slot assignments are replicated between the authority process
//! and every control surface. Any replica may assign a slot at any time;
//! replicas exchange opaque deltas and converge regardless of delivery
//! order or duplication.
//!
//! # Merge Laws
//!
//! Every [`ConvergentMap`] implementation guarantees, for any deltas A, B, C:
//!
//! - **Idempotent**: merge(A); merge(A) ≡ merge(A)
//! - **Commutative**: merge(A); merge(B) ≡ merge(B); merge(A)
//! - **Associative**: grouping of merges does not matter
//!
//! # Conflict Resolution
//!
//! [`LwwMap`] keeps one last-writer-wins register per key. Writes are
//! stamped with a Lamport counter and the writing replica's id; the
//! highest `(counter, replica)` stamp wins. Stamps form a total order, so
//! the winner is the same on every replica.
//!
//! # Example
//!
//! ```rust,ignore
//! use streamwall_crdt::{ChangeOrigin, ReplicaId, ViewStore};
//!
//! let mut local = ViewStore::new(9, ReplicaId::random());
//! let delta = local.set_slot(4, Some(stream_id))?;
//!
//! let mut remote = ViewStore::new(9, ReplicaId::random());
//! remote.apply_remote_delta(&delta, ChangeOrigin::Remote(1))?;
//! ```

pub mod clock;
pub mod error;
pub mod lww;
pub mod views;

pub use clock::{ReplicaId, Stamp};
pub use error::{Error, Result};
pub use lww::{LwwEntry, LwwMap, MapDelta};
pub use views::{Change, ChangeOrigin, ObserverId, SlotIndex, ViewSlot, ViewStore};

/// A replicated map whose replicas converge under delta exchange.
pub trait ConvergentMap<K, V> {
    /// Incremental state produced by a local write and consumed by `merge`.
    type Delta;

    /// Write `value` at `key` and return the delta describing the write.
    fn set(&mut self, key: K, value: V) -> Result<Self::Delta>;

    fn get(&self, key: &K) -> Option<&V>;

    /// Merge a delta from any replica. Returns the keys whose value changed.
    fn merge(&mut self, delta: Self::Delta) -> Vec<K>;

    /// A delta covering the full state, for resynchronizing a fresh replica.
    fn snapshot(&self) -> Self::Delta;
}
