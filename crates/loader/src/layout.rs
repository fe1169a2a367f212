//! GPU upload layout: one vertex stream per channel.
//!
//! Slots 0-2 hold position, rotation and scale. Slot 3 holds band 0 with
//! `r, g, b` interleaved per particle. Slots 4-12 hold bands 1-3, one stream
//! per band and channel, band-major.

use glam::Vec4;
use std::borrow::Cow;

use crate::particles::SplatParticleSet;
use crate::plan::{ColorChannel, ShBand};

/// Bytes for one vertex stream.
#[derive(Debug, Clone)]
pub struct ChannelStream<'a> {
    pub label: &'static str,
    pub slot: u32,
    /// Vec4 elements per particle in this stream.
    pub vectors_per_particle: u32,
    pub data: Cow<'a, [u8]>,
}

pub const STREAM_COUNT: usize = 13;

const HIGHER_BAND_LABELS: [[&str; 3]; 3] = [
    ["sh1_r", "sh1_g", "sh1_b"],
    ["sh2_r", "sh2_g", "sh2_b"],
    ["sh3_r", "sh3_g", "sh3_b"],
];

impl SplatParticleSet {
    /// Every channel as a byte stream ready for upload, ordered by slot.
    pub fn upload_streams(&self) -> Vec<ChannelStream<'_>> {
        let mut streams = Vec::with_capacity(STREAM_COUNT);
        streams.push(borrowed("position", 0, self.position()));
        streams.push(borrowed("rotation", 1, self.rotation()));
        streams.push(borrowed("scale", 2, self.scale()));
        streams.push(ChannelStream {
            label: "sh0_rgb",
            slot: 3,
            vectors_per_particle: 3,
            data: Cow::Owned(bytemuck::cast_slice(&self.band0_interleaved()).to_vec()),
        });
        for band in ShBand::ALL {
            for channel in ColorChannel::ALL {
                let slot = 4 + (band.index() * 3 + channel.index()) as u32;
                let label = HIGHER_BAND_LABELS[band.index()][channel.index()];
                streams.push(borrowed(label, slot, self.color_band(band).channel(channel)));
            }
        }
        streams
    }
}

fn borrowed<'a>(label: &'static str, slot: u32, data: &'a [Vec4]) -> ChannelStream<'a> {
    ChannelStream {
        label,
        slot,
        vectors_per_particle: 1,
        data: Cow::Borrowed(bytemuck::cast_slice(data)),
    }
}

#[cfg(test)]
mod tests {
    use crate::fixtures::splat_writer;
    use gsplat_ply::{AttributeCollection, Format};

    #[test]
    fn streams_are_sized_per_particle() {
        let bytes = splat_writer(5, Format::BinaryLittleEndian).to_bytes().unwrap();
        let set = crate::decode(&AttributeCollection::from_bytes(&bytes).unwrap()).unwrap();
        let streams = set.upload_streams();
        assert_eq!(streams.len(), super::STREAM_COUNT);
        for (slot, stream) in streams.iter().enumerate() {
            assert_eq!(stream.slot as usize, slot);
            assert_eq!(
                stream.data.len(),
                5 * 16 * stream.vectors_per_particle as usize,
                "{}",
                stream.label
            );
        }
        assert_eq!(streams[3].label, "sh0_rgb");
        assert_eq!(streams[12].label, "sh3_b");
    }
}
