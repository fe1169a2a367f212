//! Depth sort: key generation and a double-buffered radix sort.
//!
//! # Invariants
//! - After a sort, the leading `valid_count` keys of the result side are
//!   non-decreasing and belong to visible particles, farthest first.
//! - The result side's values are a permutation of `0..n`.
//! - Each radix pass is stable; ties keep their key-generation order.
//!
//! [`SortBackend`] is the seam between the frame driver and where sorting
//! happens. [`CpuSortBackend`] is the host reference; GPU backends live in
//! their own crates.

mod backend;
mod config;
mod cpu;
mod keygen;
mod radix;

pub use backend::{BackendError, SortBackend, SortedPairs};
pub use config::SortConfig;
pub use cpu::CpuSortBackend;
pub use keygen::{DEPTH_ONE_BITS, GeneratedKeys, depth_key, generate, generate_into};
pub use radix::{SortBuffers, radix_passes};

pub fn crate_info() -> &'static str {
    "gsplat-sort v0.1.0"
}
