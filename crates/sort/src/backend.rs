use glam::{Mat4, Vec4};
use gsplat_common::Side;

/// Failures of a sort backend.
///
/// [`BackendError::buffers_intact`] tells the caller whether the order from
/// the previous successful sort can still be drawn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("sort buffers are not prepared")]
    NotPrepared,
    #[error("compute device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

impl BackendError {
    /// True when nothing was written, so the last sorted order is still valid.
    pub fn buffers_intact(&self) -> bool {
        !matches!(self, BackendError::Dispatch(_))
    }
}

/// Sorted keys and values copied back from a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedPairs {
    pub keys: Vec<u32>,
    pub values: Vec<u32>,
}

/// A place that can generate depth keys and radix-sort them.
///
/// Implementations own two key/value pairs of equal capacity. Key
/// generation writes side A; [`SortBackend::sort`] reports which side holds
/// the result. The index buffer handle is what a draw consumes.
pub trait SortBackend {
    /// Handle to one side's index buffer, as the draw stage binds it.
    type IndexBuffer: ?Sized;

    /// Allocate both pairs for `positions.len()` particles and keep the positions.
    /// Replaces anything prepared before.
    fn prepare(&mut self, positions: &[Vec4]) -> Result<(), BackendError>;

    /// Drop the buffers. Safe to call when nothing is prepared.
    fn release(&mut self);

    /// Particles the current buffers hold, `0` when unprepared.
    fn capacity(&self) -> u32;

    /// Write keys and identity indices into side A and return the visible count.
    fn generate_keys(&mut self, view_proj: &Mat4) -> Result<u32, BackendError>;

    /// Sort the leading `count` pairs of side A by `key & key_mask`, stably.
    ///
    /// # Panics
    /// If `count` exceeds [`SortBackend::capacity`].
    fn sort(&mut self, key_mask: u32, count: u32) -> Result<Side, BackendError>;

    fn index_buffer(&self, side: Side) -> Option<&Self::IndexBuffer>;

    /// Copy the leading `count` pairs of one side back to the host.
    fn read_back(&self, side: Side, count: u32) -> Result<SortedPairs, BackendError>;
}
