use serde::{Deserialize, Serialize};

/// Bits consumed by one radix sort pass.
pub const RADIX_BITS: u32 = 4;

/// Buckets per radix pass (`1 << RADIX_BITS`).
pub const RADIX_BUCKETS: u32 = 1 << RADIX_BITS;

/// Mask selecting every key bit. The pipeline always sorts on the full range.
pub const FULL_KEY_MASK: u32 = u32::MAX;

/// Key assigned to particles outside the visible depth range.
///
/// Ascending sort moves these to the tail, past `valid_count`.
pub const CULLED_KEY: u32 = u32::MAX;

/// One side of a double-buffered key/value pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Side {
    #[default]
    A,
    B,
}

impl Side {
    /// Buffer slot index (0 or 1).
    pub fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    /// Side holding the data after `passes` ping-pong passes that started on `A`.
    pub fn after_passes(passes: u32) -> Self {
        if passes % 2 == 0 { Side::A } else { Side::B }
    }
}

/// Result of one key-generation + sort round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOutcome {
    /// Side of the pair holding the sorted order.
    pub side: Side,
    /// Leading entries that are visible and ordered back-to-front.
    pub valid_count: u32,
}

impl SortOutcome {
    pub fn is_empty(&self) -> bool {
        self.valid_count == 0
    }
}
