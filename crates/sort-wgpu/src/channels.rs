use gsplat_loader::SplatParticleSet;
use wgpu::util::DeviceExt;

/// One uploaded particle channel, bound at `slot` when drawing.
pub struct ChannelBuffer {
    pub label: &'static str,
    pub slot: u32,
    pub vectors_per_particle: u32,
    pub buffer: wgpu::Buffer,
}

/// Device copies of every channel of a decoded scene.
pub struct GpuChannelBuffers {
    particle_count: u32,
    channels: Vec<ChannelBuffer>,
}

impl GpuChannelBuffers {
    pub fn create(device: &wgpu::Device, set: &SplatParticleSet) -> Self {
        let channels = set
            .upload_streams()
            .into_iter()
            .map(|stream| {
                // empty scenes still get a bindable buffer
                let contents: &[u8] = if stream.data.is_empty() {
                    &[0; 16]
                } else {
                    &stream.data
                };
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(stream.label),
                    contents,
                    usage: wgpu::BufferUsages::VERTEX
                        | wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_DST,
                });
                ChannelBuffer {
                    label: stream.label,
                    slot: stream.slot,
                    vectors_per_particle: stream.vectors_per_particle,
                    buffer,
                }
            })
            .collect();
        tracing::debug!(particles = set.len(), "particle channels uploaded");
        Self {
            particle_count: set.len() as u32,
            channels,
        }
    }

    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    pub fn channels(&self) -> &[ChannelBuffer] {
        &self.channels
    }

    pub fn slot(&self, slot: u32) -> Option<&ChannelBuffer> {
        self.channels.iter().find(|c| c.slot == slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsplat_loader::{STREAM_COUNT, fixtures};
    use gsplat_ply::Format;

    #[test]
    fn uploads_every_stream() {
        let Ok(context) = crate::GpuContext::headless() else {
            return;
        };
        let bytes = fixtures::splat_writer(10, Format::BinaryLittleEndian)
            .to_bytes()
            .unwrap();
        let set = gsplat_loader::load(bytes.as_slice()).unwrap();
        let channels = GpuChannelBuffers::create(&context.device, &set);

        assert_eq!(channels.particle_count(), 10);
        assert_eq!(channels.channels().len(), STREAM_COUNT);
        let sh0 = channels.slot(3).unwrap();
        assert_eq!(sh0.label, "sh0_rgb");
        assert_eq!(sh0.buffer.size(), 10 * 3 * 16);
    }
}
