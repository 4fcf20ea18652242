//! Error types for the replicated store.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Delta or snapshot bytes could not be decoded
    #[error("decode error: {0}")]
    Decode(bincode::Error),

    /// State could not be encoded
    #[error("encode error: {0}")]
    Encode(bincode::Error),

    /// Slot index outside the fixed grid
    #[error("slot {index} out of range (grid has {slot_count} slots)")]
    SlotOutOfRange { index: usize, slot_count: usize },

    /// The logical clock reached its ceiling; no further local writes
    #[error("logical clock exhausted at {clock}")]
    ClockExhausted { clock: u64 },
}
