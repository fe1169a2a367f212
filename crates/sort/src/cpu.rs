use glam::{Mat4, Vec4};
use gsplat_common::Side;

use crate::backend::{BackendError, SortBackend, SortedPairs};
use crate::keygen;
use crate::radix::SortBuffers;

/// Host-memory backend. Produces the reference order the GPU backend must match.
#[derive(Debug, Default)]
pub struct CpuSortBackend {
    positions: Vec<Vec4>,
    buffers: Option<SortBuffers>,
    dispatches: u64,
}

impl CpuSortBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key generations plus sorts run since creation.
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    fn buffers(&self) -> Result<&SortBuffers, BackendError> {
        self.buffers.as_ref().ok_or(BackendError::NotPrepared)
    }
}

impl SortBackend for CpuSortBackend {
    type IndexBuffer = [u32];

    fn prepare(&mut self, positions: &[Vec4]) -> Result<(), BackendError> {
        self.positions = positions.to_vec();
        self.buffers = Some(SortBuffers::new(positions.len()));
        tracing::debug!(capacity = positions.len(), "cpu sort buffers prepared");
        Ok(())
    }

    fn release(&mut self) {
        self.positions = Vec::new();
        self.buffers = None;
    }

    fn capacity(&self) -> u32 {
        self.buffers.as_ref().map_or(0, |b| b.capacity() as u32)
    }

    fn generate_keys(&mut self, view_proj: &Mat4) -> Result<u32, BackendError> {
        let buffers = self.buffers.as_mut().ok_or(BackendError::NotPrepared)?;
        let (keys, values) = buffers.side_mut(Side::A);
        let valid = keygen::generate_into(view_proj, &self.positions, keys, values);
        self.dispatches += 1;
        Ok(valid)
    }

    fn sort(&mut self, key_mask: u32, count: u32) -> Result<Side, BackendError> {
        let buffers = self.buffers.as_mut().ok_or(BackendError::NotPrepared)?;
        let side = buffers.sort(key_mask, count as usize);
        self.dispatches += 1;
        Ok(side)
    }

    fn index_buffer(&self, side: Side) -> Option<&[u32]> {
        self.buffers.as_ref().map(|b| b.values(side))
    }

    fn read_back(&self, side: Side, count: u32) -> Result<SortedPairs, BackendError> {
        let buffers = self.buffers()?;
        let n = (count as usize).min(buffers.capacity());
        Ok(SortedPairs {
            keys: buffers.keys(side)[..n].to_vec(),
            values: buffers.values(side)[..n].to_vec(),
        })
    }
}
