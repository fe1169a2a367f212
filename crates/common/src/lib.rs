//! Shared vocabulary for the splat sort pipeline.
//!
//! # Invariants
//! - Only one [`Side`] of a double buffer holds a valid order at a time.
//! - The side is reported by the sort, never inferred by callers.

mod types;

pub use types::{CULLED_KEY, FULL_KEY_MASK, RADIX_BITS, RADIX_BUCKETS, Side, SortOutcome};

pub fn crate_info() -> &'static str {
    "gsplat-common v0.1.0"
}
