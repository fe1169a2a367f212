//! Synthetic splat files for tests and demos.
//!
//! Values are deterministic so assertions can name them:
//! `f_dc_c = 100 + c`, `f_rest_k = k + 0.5 * record`.

use gsplat_ply::{Format, PlyWriter};

use crate::plan::REST_COLUMN_COUNT;

/// A writer holding every column the loader queries, for `n` records.
pub fn splat_writer(n: usize, format: Format) -> PlyWriter {
    let col = |f: &dyn Fn(usize) -> f32| (0..n).map(f).collect::<Vec<f32>>();

    let mut writer = PlyWriter::new(format)
        .comment("synthetic gaussian splats")
        .column("x", col(&|i| i as f32 * 0.1))
        .column("y", col(&|i| (i % 3) as f32 * -0.2))
        .column("z", col(&|i| 1.0 + i as f32 * 0.05))
        .column("opacity", col(&|i| ((i % 7) as f32 - 3.0) * 0.5))
        .column("rot_0", col(&|i| 1.0 + (i % 2) as f32))
        .column("rot_1", col(&|_| 0.5))
        .column("rot_2", col(&|i| (i % 3) as f32 * -0.25))
        .column("rot_3", col(&|i| (i % 4) as f32 * 0.1))
        .column("scale_0", col(&|i| -1.0 - (i % 5) as f32 * 0.3))
        .column("scale_1", col(&|i| -2.0 + (i % 2) as f32))
        .column("scale_2", col(&|_| -3.0));

    for c in 0..3 {
        writer = writer.column(format!("f_dc_{c}"), col(&|_| 100.0 + c as f32));
    }
    for k in 0..REST_COLUMN_COUNT {
        writer = writer.column(format!("f_rest_{k}"), col(&|i| k as f32 + 0.5 * i as f32));
    }
    writer
}

/// Like [`splat_writer`], with explicit file-space centers and opacity logits.
pub fn splat_writer_at(centers: &[[f32; 3]], opacity: &[f32], format: Format) -> PlyWriter {
    assert_eq!(centers.len(), opacity.len(), "one opacity per center");
    splat_writer(centers.len(), format)
        .without("x")
        .without("y")
        .without("z")
        .without("opacity")
        .column("x", centers.iter().map(|c| c[0]).collect::<Vec<f32>>())
        .column("y", centers.iter().map(|c| c[1]).collect::<Vec<f32>>())
        .column("z", centers.iter().map(|c| c[2]).collect::<Vec<f32>>())
        .column("opacity", opacity.to_vec())
}
