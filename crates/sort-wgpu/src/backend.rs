use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use gsplat_common::{RADIX_BUCKETS, Side};
use gsplat_sort::{BackendError, SortBackend, SortedPairs, radix_passes};
use std::sync::mpsc;
use wgpu::util::DeviceExt;

use crate::context::GpuContext;
use crate::shaders::{
    HISTOGRAM_SHADER, KEYGEN_SHADER, SCAN_SHADER, SCATTER_SHADER, TILE_SIZE,
};

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct KeyGenParams {
    view_proj: [[f32; 4]; 4],
    count: u32,
    _pad: [u32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct PassParams {
    count: u32,
    shift: u32,
    key_mask: u32,
    num_tiles: u32,
}

struct SortPipelines {
    keygen: wgpu::ComputePipeline,
    histogram: wgpu::ComputePipeline,
    scan: wgpu::ComputePipeline,
    scatter: wgpu::ComputePipeline,
}

impl SortPipelines {
    fn new(device: &wgpu::Device) -> Self {
        Self {
            keygen: compute_pipeline(device, "keygen", KEYGEN_SHADER, "generate_keys"),
            histogram: compute_pipeline(device, "histogram", HISTOGRAM_SHADER, "histogram_tiles"),
            scan: compute_pipeline(device, "scan", SCAN_SHADER, "scan_histogram"),
            scatter: compute_pipeline(device, "scatter", SCATTER_SHADER, "scatter_keys"),
        }
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    name: &str,
    source: &str,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{name}_shader")),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&format!("{name}_pipeline")),
        layout: None,
        module: &module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Device-side key/value pairs plus scratch for one prepared scene.
struct GpuSortBuffers {
    capacity: u32,
    positions: wgpu::Buffer,
    keys: [wgpu::Buffer; 2],
    values: [wgpu::Buffer; 2],
    histogram: wgpu::Buffer,
    visible: wgpu::Buffer,
    visible_staging: wgpu::Buffer,
}

impl GpuSortBuffers {
    fn new(device: &wgpu::Device, positions: &[Vec4]) -> Self {
        let capacity = positions.len() as u32;
        // zero-sized storage bindings are invalid; keep one element at minimum
        let slots = positions.len().max(1) as u64;
        let tiles = capacity.div_ceil(TILE_SIZE).max(1) as u64;

        let padded;
        let position_data = if positions.is_empty() {
            padded = [Vec4::ZERO];
            &padded[..]
        } else {
            positions
        };
        let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("splat_positions"),
            contents: bytemuck::cast_slice(position_data),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let pair_buffer = |label: &str, usage: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: slots * 4,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | usage,
                mapped_at_creation: false,
            })
        };

        Self {
            capacity,
            positions,
            keys: [
                pair_buffer("sort_keys_a", wgpu::BufferUsages::empty()),
                pair_buffer("sort_keys_b", wgpu::BufferUsages::empty()),
            ],
            values: [
                pair_buffer("sort_indices_a", wgpu::BufferUsages::VERTEX),
                pair_buffer("sort_indices_b", wgpu::BufferUsages::VERTEX),
            ],
            histogram: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("radix_histogram"),
                size: tiles * RADIX_BUCKETS as u64 * 4,
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            }),
            visible: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("visible_count"),
                size: 4,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            visible_staging: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("visible_count_staging"),
                size: 4,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
        }
    }
}

/// Compute-shader implementation of [`SortBackend`].
///
/// Key generation and every radix pass are dispatched on the device; only
/// the visible count comes back to the host each frame.
pub struct WgpuSortBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines: SortPipelines,
    buffers: Option<GpuSortBuffers>,
}

impl WgpuSortBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let pipelines = SortPipelines::new(&device);
        Self {
            device,
            queue,
            pipelines,
            buffers: None,
        }
    }

    /// Open a surfaceless device and build the backend on it.
    pub fn headless() -> Result<Self, BackendError> {
        let context = GpuContext::headless()?;
        Ok(Self::new(context.device, context.queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn prepared(&self) -> Result<&GpuSortBuffers, BackendError> {
        self.buffers.as_ref().ok_or(BackendError::NotPrepared)
    }

    /// Submit work recorded under a validation scope and surface any error.
    fn submit_checked(&self, encoder: wgpu::CommandEncoder) -> Result<(), BackendError> {
        self.queue.submit(Some(encoder.finish()));
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(BackendError::Dispatch(err.to_string())),
            None => Ok(()),
        }
    }

    fn read_u32s(&self, staging: &wgpu::Buffer) -> Result<Vec<u32>, BackendError> {
        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| BackendError::Dispatch("map callback dropped".into()))?
            .map_err(|e| BackendError::Dispatch(format!("buffer mapping failed: {e}")))?;

        let data = slice.get_mapped_range();
        let out: Vec<u32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(out)
    }

    fn check_limits(&self, particles: usize) -> Result<(), BackendError> {
        let limits = self.device.limits();
        let tiles = (particles as u64).div_ceil(TILE_SIZE as u64);
        if tiles > limits.max_compute_workgroups_per_dimension as u64 {
            return Err(BackendError::DeviceUnavailable(format!(
                "{particles} particles need {tiles} workgroups, device allows {}",
                limits.max_compute_workgroups_per_dimension
            )));
        }
        let bytes = particles as u64 * std::mem::size_of::<Vec4>() as u64;
        if bytes > limits.max_storage_buffer_binding_size as u64 {
            return Err(BackendError::DeviceUnavailable(format!(
                "position buffer of {bytes} bytes exceeds storage binding limit {}",
                limits.max_storage_buffer_binding_size
            )));
        }
        Ok(())
    }
}

impl SortBackend for WgpuSortBackend {
    type IndexBuffer = wgpu::Buffer;

    fn prepare(&mut self, positions: &[Vec4]) -> Result<(), BackendError> {
        self.check_limits(positions.len())?;
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffers = GpuSortBuffers::new(&self.device, positions);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::Dispatch(err.to_string()));
        }
        tracing::debug!(capacity = buffers.capacity, "gpu sort buffers prepared");
        self.buffers = Some(buffers);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(buffers) = self.buffers.take() {
            for buffer in buffers.keys.iter().chain(&buffers.values) {
                buffer.destroy();
            }
        }
    }

    fn capacity(&self) -> u32 {
        self.buffers.as_ref().map_or(0, |b| b.capacity)
    }

    fn generate_keys(&mut self, view_proj: &Mat4) -> Result<u32, BackendError> {
        let buffers = self.prepared()?;
        let params = KeyGenParams {
            view_proj: view_proj.to_cols_array_2d(),
            count: buffers.capacity,
            _pad: [0; 3],
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("keygen_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("keygen_bind_group"),
            layout: &self.pipelines.keygen.get_bind_group_layout(0),
            entries: &[
                entry(0, &params_buffer),
                entry(1, &buffers.positions),
                entry(2, &buffers.keys[Side::A.index()]),
                entry(3, &buffers.values[Side::A.index()]),
                entry(4, &buffers.visible),
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("keygen_encoder"),
            });
        encoder.clear_buffer(&buffers.visible, 0, None);
        if buffers.capacity > 0 {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("keygen_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.keygen);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(buffers.capacity.div_ceil(TILE_SIZE), 1, 1);
        }
        encoder.copy_buffer_to_buffer(&buffers.visible, 0, &buffers.visible_staging, 0, 4);
        self.submit_checked(encoder)?;

        let visible = self.read_u32s(&buffers.visible_staging)?;
        Ok(visible.first().copied().unwrap_or(0))
    }

    fn sort(&mut self, key_mask: u32, count: u32) -> Result<Side, BackendError> {
        let buffers = self.prepared()?;
        assert!(
            count <= buffers.capacity,
            "sort of {count} entries exceeds buffer capacity {}",
            buffers.capacity
        );
        let passes = radix_passes(key_mask);
        let result = Side::after_passes(passes.len() as u32);
        if count == 0 || passes.is_empty() {
            return Ok(result);
        }
        let num_tiles = count.div_ceil(TILE_SIZE);
        let _span = tracing::trace_span!("gpu_radix_sort", count, passes = passes.len()).entered();

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("radix_sort_encoder"),
            });

        let mut from = Side::A;
        for &shift in &passes {
            let to = from.other();
            let params = PassParams {
                count,
                shift,
                key_mask,
                num_tiles,
            };
            let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("radix_pass_params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let histogram_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("histogram_bind_group"),
                layout: &self.pipelines.histogram.get_bind_group_layout(0),
                entries: &[
                    entry(0, &params_buffer),
                    entry(1, &buffers.keys[from.index()]),
                    entry(2, &buffers.histogram),
                ],
            });
            let scan_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("scan_bind_group"),
                layout: &self.pipelines.scan.get_bind_group_layout(0),
                entries: &[entry(0, &params_buffer), entry(1, &buffers.histogram)],
            });
            let scatter_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("scatter_bind_group"),
                layout: &self.pipelines.scatter.get_bind_group_layout(0),
                entries: &[
                    entry(0, &params_buffer),
                    entry(1, &buffers.keys[from.index()]),
                    entry(2, &buffers.values[from.index()]),
                    entry(3, &buffers.keys[to.index()]),
                    entry(4, &buffers.values[to.index()]),
                    entry(5, &buffers.histogram),
                ],
            });

            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("radix_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.histogram);
            pass.set_bind_group(0, &histogram_group, &[]);
            pass.dispatch_workgroups(num_tiles, 1, 1);
            pass.set_pipeline(&self.pipelines.scan);
            pass.set_bind_group(0, &scan_group, &[]);
            pass.dispatch_workgroups(1, 1, 1);
            pass.set_pipeline(&self.pipelines.scatter);
            pass.set_bind_group(0, &scatter_group, &[]);
            pass.dispatch_workgroups(num_tiles, 1, 1);
            drop(pass);

            from = to;
        }
        self.submit_checked(encoder)?;
        debug_assert_eq!(from, result);
        Ok(from)
    }

    fn index_buffer(&self, side: Side) -> Option<&wgpu::Buffer> {
        self.buffers.as_ref().map(|b| &b.values[side.index()])
    }

    fn read_back(&self, side: Side, count: u32) -> Result<SortedPairs, BackendError> {
        let buffers = self.prepared()?;
        let n = count.min(buffers.capacity) as u64;
        if n == 0 {
            return Ok(SortedPairs::default());
        }
        let staging = |label: &str| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: n * 4,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let keys = staging("sort_keys_readback");
        let values = staging("sort_indices_readback");

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        encoder.copy_buffer_to_buffer(&buffers.keys[side.index()], 0, &keys, 0, n * 4);
        encoder.copy_buffer_to_buffer(&buffers.values[side.index()], 0, &values, 0, n * 4);
        self.submit_checked(encoder)?;

        Ok(SortedPairs {
            keys: self.read_u32s(&keys)?,
            values: self.read_u32s(&values)?,
        })
    }
}

fn entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use gsplat_common::{CULLED_KEY, FULL_KEY_MASK};
    use gsplat_sort::CpuSortBackend;

    fn gpu_backend() -> Option<WgpuSortBackend> {
        match WgpuSortBackend::headless() {
            Ok(backend) => Some(backend),
            Err(err) => {
                eprintln!("skipping GPU test: {err}");
                None
            }
        }
    }

    fn view_proj() -> Mat4 {
        Mat4::perspective_rh(60f32.to_radians(), 1.0, 1.0, 1000.0)
            * Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Y, Vec3::Z)
    }

    #[test]
    fn pass_params_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<KeyGenParams>(), 80);
        assert_eq!(std::mem::size_of::<PassParams>(), 16);
    }

    #[test]
    fn gpu_sorts_back_to_front() {
        let Some(mut backend) = gpu_backend() else {
            return;
        };
        backend
            .prepare(&[
                Vec4::new(0.0, -100.0, 0.0, 0.5),
                Vec4::new(0.0, -200.0, 0.0, 0.5),
                Vec4::new(0.0, -300.0, 0.0, 0.5),
            ])
            .unwrap();
        let valid = backend.generate_keys(&view_proj()).unwrap();
        let side = backend.sort(FULL_KEY_MASK, 3).unwrap();
        assert_eq!(valid, 3);
        assert_eq!(side, Side::A);
        assert_eq!(backend.read_back(side, 3).unwrap().values, vec![2, 1, 0]);
    }

    #[test]
    fn gpu_order_matches_cpu_reference() {
        let Some(mut gpu) = gpu_backend() else {
            return;
        };
        // distinct depths, a third of them behind the camera
        let positions: Vec<Vec4> = (0..1500)
            .map(|i| {
                let depth = 2.0 + i as f32 * 0.17;
                let y = if i % 3 == 0 { depth } else { -depth };
                Vec4::new((i % 11) as f32, y, (i % 7) as f32, 0.5)
            })
            .collect();
        let mut cpu = CpuSortBackend::new();
        cpu.prepare(&positions).unwrap();
        gpu.prepare(&positions).unwrap();

        let vp = view_proj();
        let cpu_valid = cpu.generate_keys(&vp).unwrap();
        let gpu_valid = gpu.generate_keys(&vp).unwrap();
        assert_eq!(cpu_valid, gpu_valid);

        let n = positions.len() as u32;
        let cpu_side = cpu.sort(FULL_KEY_MASK, n).unwrap();
        let gpu_side = gpu.sort(FULL_KEY_MASK, n).unwrap();
        assert_eq!(cpu_side, gpu_side);

        let pairs = gpu.read_back(gpu_side, n).unwrap();
        assert!(pairs.keys.windows(2).all(|w| w[0] <= w[1]));
        assert!(pairs.keys[gpu_valid as usize..].iter().all(|&k| k == CULLED_KEY));
        let reference = cpu.read_back(cpu_side, n).unwrap();
        assert_eq!(pairs.values[..gpu_valid as usize], reference.values[..cpu_valid as usize]);
    }

    #[test]
    fn gpu_handles_empty_scene() {
        let Some(mut backend) = gpu_backend() else {
            return;
        };
        backend.prepare(&[]).unwrap();
        assert_eq!(backend.capacity(), 0);
        assert_eq!(backend.generate_keys(&view_proj()).unwrap(), 0);
        assert!(backend.sort(FULL_KEY_MASK, 0).is_ok());
        assert!(backend.read_back(Side::A, 0).unwrap().values.is_empty());
    }

    #[test]
    fn unprepared_gpu_backend_errors() {
        let Some(mut backend) = gpu_backend() else {
            return;
        };
        assert_eq!(
            backend.generate_keys(&Mat4::IDENTITY),
            Err(BackendError::NotPrepared)
        );
        assert!(backend.index_buffer(Side::A).is_none());
    }
}
