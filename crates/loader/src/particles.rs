use glam::{Vec3, Vec4};
use gsplat_ply::AttributeCollection;
use rayon::prelude::*;
use std::borrow::Cow;

use crate::LoadError;
use crate::plan::{ColorChannel, EXTRACTION_PLAN, ExtractionTask, ShBand};

/// Source files store meters; render space is centimeters.
pub const METERS_TO_CENTIMETERS: f32 = 100.0;

/// One spherical-harmonic band: four coefficients per particle for each color channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorBand {
    pub r: Vec<Vec4>,
    pub g: Vec<Vec4>,
    pub b: Vec<Vec4>,
}

impl ColorBand {
    pub fn channel(&self, channel: ColorChannel) -> &[Vec4] {
        match channel {
            ColorChannel::R => &self.r,
            ColorChannel::G => &self.g,
            ColorChannel::B => &self.b,
        }
    }

    fn channel_mut(&mut self, channel: ColorChannel) -> &mut Vec<Vec4> {
        match channel {
            ColorChannel::R => &mut self.r,
            ColorChannel::G => &mut self.g,
            ColorChannel::B => &mut self.b,
        }
    }
}

/// A decoded scene: per-particle channels, all of one fixed length.
///
/// Only [`decode`] builds one, so a set is always complete; reloading
/// replaces the whole set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplatParticleSet {
    position: Vec<Vec4>,
    rotation: Vec<Vec4>,
    scale: Vec<Vec4>,
    color_band0: ColorBand,
    color_bands1_3: [ColorBand; 3],
}

impl SplatParticleSet {
    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Render-space xyz, sigmoid opacity in `w`.
    pub fn position(&self) -> &[Vec4] {
        &self.position
    }

    /// Unit quaternions, in stored component order.
    pub fn rotation(&self) -> &[Vec4] {
        &self.rotation
    }

    /// Positive per-axis scale in xyz; `w` is zero.
    pub fn scale(&self) -> &[Vec4] {
        &self.scale
    }

    pub fn color_band0(&self) -> &ColorBand {
        &self.color_band0
    }

    pub fn color_band(&self, band: ShBand) -> &ColorBand {
        &self.color_bands1_3[band.index()]
    }

    /// Band 0 as `r, g, b` vectors per particle (`3 * len` entries).
    pub fn band0_interleaved(&self) -> Vec<Vec4> {
        let band = &self.color_band0;
        band.r
            .iter()
            .zip(&band.g)
            .zip(&band.b)
            .flat_map(|((r, g), b)| [*r, *g, *b])
            .collect()
    }

    /// Axis-aligned bounds of the particle centers, `None` for an empty set.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = self.position.first()?.truncate();
        Some(self.position.iter().fold((first, first), |(min, max), p| {
            let p = p.truncate();
            (min.min(p), max.max(p))
        }))
    }

    fn install(&mut self, task: ExtractionTask, data: Vec<Vec4>) {
        match task {
            ExtractionTask::Position => self.position = data,
            ExtractionTask::Rotation => self.rotation = data,
            ExtractionTask::Scale => self.scale = data,
            ExtractionTask::Band0(channel) => *self.color_band0.channel_mut(channel) = data,
            ExtractionTask::HigherBand(channel, band) => {
                *self.color_bands1_3[band.index()].channel_mut(channel) = data
            }
        }
    }
}

/// Logistic function mapping stored opacity logits to `(0, 1)`.
///
/// In `f32` the result saturates: logits above about 17 give exactly `1.0`
/// and logits below about -88 give `0.0`. Scale decoding has the same limit,
/// `exp` of a log-scale below about -104 is `0.0`. Both are kept as computed.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decode every channel of a particle set from an attribute collection.
///
/// Extraction tasks run in parallel on the rayon pool; each writes its own
/// output vector. Any missing or malformed column fails the whole decode.
pub fn decode(collection: &AttributeCollection) -> Result<SplatParticleSet, LoadError> {
    let count = collection.record_count();
    let _span = tracing::info_span!("splat_decode", particles = count).entered();

    let outputs = EXTRACTION_PLAN
        .par_iter()
        .map(|&task| extract(task, collection).map(|data| (task, data)))
        .collect::<Result<Vec<_>, LoadError>>()?;

    let mut set = SplatParticleSet::default();
    for (task, data) in outputs {
        debug_assert_eq!(data.len(), count);
        set.install(task, data);
    }

    tracing::info!(particles = set.len(), "splat particle set decoded");
    Ok(set)
}

fn extract(task: ExtractionTask, collection: &AttributeCollection) -> Result<Vec<Vec4>, LoadError> {
    let names = task.column_names();
    let columns = names
        .iter()
        .map(|name| collection.float_column(name))
        .collect::<Result<Vec<Cow<'_, [f32]>>, _>>()?;

    let output: Vec<Vec4> = match task {
        ExtractionTask::Position => {
            let [x, y, z, opacity] = columns_4(&columns);
            (0..collection.record_count())
                .map(|i| {
                    let p = Vec3::new(x[i], -z[i], -y[i]) * METERS_TO_CENTIMETERS;
                    p.extend(sigmoid(opacity[i]))
                })
                .collect()
        }
        ExtractionTask::Rotation => {
            let [q0, q1, q2, q3] = columns_4(&columns);
            (0..collection.record_count())
                .map(|i| {
                    let q = Vec4::new(q0[i], q1[i], q2[i], q3[i]);
                    let norm = q.length();
                    if norm == 0.0 || !norm.is_finite() {
                        return Err(LoadError::MalformedAttribute {
                            column: names.join(","),
                            reason: format!("record {i}: quaternion norm is {norm}"),
                        });
                    }
                    Ok(q / norm)
                })
                .collect::<Result<Vec<_>, LoadError>>()?
        }
        ExtractionTask::Scale => {
            let (sx, sy, sz) = (&*columns[0], &*columns[1], &*columns[2]);
            (0..collection.record_count())
                .map(|i| Vec4::new(sx[i].exp(), sy[i].exp(), sz[i].exp(), 0.0))
                .collect()
        }
        ExtractionTask::Band0(_) | ExtractionTask::HigherBand(..) => {
            let [c0, c1, c2, c3] = columns_4(&columns);
            (0..collection.record_count())
                .map(|i| Vec4::new(c0[i], c1[i], c2[i], c3[i]))
                .collect()
        }
    };
    Ok(output)
}

fn columns_4<'a>(columns: &'a [Cow<'_, [f32]>]) -> [&'a [f32]; 4] {
    [&*columns[0], &*columns[1], &*columns[2], &*columns[3]]
}
