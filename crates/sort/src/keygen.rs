//! Depth keys: one sortable `u32` per particle from the view-projection transform.
//!
//! Ascending key order is back-to-front. Visible particles get
//! `bits(1.0) - bits(ndc_depth)`, so the farthest visible particle has the
//! smallest key. Particles outside `0 <= z <= w` in clip space get
//! [`CULLED_KEY`] and sort past every visible key.

use glam::{Mat4, Vec4};
use gsplat_common::CULLED_KEY;
use rayon::prelude::*;

/// Bit pattern of `1.0f32`, the largest visible NDC depth.
pub const DEPTH_ONE_BITS: u32 = 0x3f80_0000;

/// Sort key for one particle. The stored opacity in `w` is ignored.
pub fn depth_key(view_proj: &Mat4, position: Vec4) -> u32 {
    let clip = *view_proj * position.truncate().extend(1.0);
    let in_range = clip.w > 0.0 && clip.z >= 0.0 && clip.z <= clip.w;
    if !in_range {
        return CULLED_KEY;
    }
    let depth = clip.z / clip.w;
    let bits = if depth > 0.0 { depth.to_bits() } else { 0 };
    DEPTH_ONE_BITS - bits.min(DEPTH_ONE_BITS)
}

/// Keys, identity indices and the visible count for a set of positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKeys {
    pub keys: Vec<u32>,
    pub indices: Vec<u32>,
    pub valid_count: u32,
}

pub fn generate(view_proj: &Mat4, positions: &[Vec4]) -> GeneratedKeys {
    let mut keys = vec![0; positions.len()];
    let mut indices = vec![0; positions.len()];
    let valid_count = generate_into(view_proj, positions, &mut keys, &mut indices);
    GeneratedKeys {
        keys,
        indices,
        valid_count,
    }
}

/// Fill the leading `positions.len()` slots of `keys`/`indices` and return the visible count.
pub fn generate_into(
    view_proj: &Mat4,
    positions: &[Vec4],
    keys: &mut [u32],
    indices: &mut [u32],
) -> u32 {
    let n = positions.len();
    keys[..n]
        .par_iter_mut()
        .zip(indices[..n].par_iter_mut())
        .zip(positions.par_iter())
        .enumerate()
        .for_each(|(i, ((key, index), position))| {
            *key = depth_key(view_proj, *position);
            *index = i as u32;
        });
    keys[..n].par_iter().filter(|&&k| k != CULLED_KEY).count() as u32
}
