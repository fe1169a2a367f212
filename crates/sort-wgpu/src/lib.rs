//! wgpu compute backend for the splat depth sort.
//!
//! Key generation, per-tile digit histograms, the offset scan and the
//! stable scatter all run as compute dispatches. Sorted indices stay on the
//! device, where the draw binds them directly.
//!
//! # Invariants
//! - Every radix pass ping-pongs between the two key/value pairs.
//! - Validation failures surface as [`gsplat_sort::BackendError::Dispatch`].
//! - The order matches [`gsplat_sort::CpuSortBackend`] for distinct keys.

mod backend;
mod channels;
mod context;
mod shaders;

pub use backend::WgpuSortBackend;
pub use channels::{ChannelBuffer, GpuChannelBuffers};
pub use context::GpuContext;
pub use shaders::TILE_SIZE;

pub fn crate_info() -> &'static str {
    "gsplat-sort-wgpu v0.1.0"
}
