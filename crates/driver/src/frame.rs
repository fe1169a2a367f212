use glam::Mat4;
use gsplat_common::{Side, SortOutcome};
use gsplat_loader::SplatParticleSet;
use gsplat_ply::AttributeCollection;
use gsplat_sort::{BackendError, SortBackend};
use std::io::Read;
use std::path::Path;

use crate::{DriverConfig, DriverError};

/// Lifecycle of the scene a driver holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SceneState {
    #[default]
    Unloaded,
    Loading,
    Ready,
}

/// Everything the draw stage needs for one frame.
#[derive(Debug)]
pub struct DrawCall<'a, I: ?Sized> {
    pub side: Side,
    pub particle_count: u32,
    /// Leading entries of `index_buffer` to draw, farthest first.
    ///
    /// Exactly the visible particles only under the full key mask.
    pub valid_count: u32,
    /// Load generation the order belongs to.
    pub generation: u64,
    pub index_buffer: &'a I,
}

/// Where a frame's sort stopped.
///
/// Key generation overwrites the pair buffers, so only a key generation
/// failure that left them intact can fall back to the previous order.
enum SortFailure {
    KeyGen(BackendError),
    Sort(BackendError),
}

/// Owns one scene and its sort buffers, and decides per frame whether to re-sort.
///
/// Key generation and sorting only run when the view-projection transform
/// differs from the one the current order was built for. The first frame
/// after a load always sorts.
pub struct FrameDriver<B: SortBackend> {
    config: DriverConfig,
    backend: B,
    state: SceneState,
    particles: Option<SplatParticleSet>,
    generation: u64,
    previous_view_proj: Option<Mat4>,
    outcome: Option<SortOutcome>,
    sort_invocations: u64,
}

impl<B: SortBackend> FrameDriver<B> {
    pub fn new(backend: B, config: DriverConfig) -> Self {
        if !config.sort.orders_visible_prefix() {
            tracing::warn!(
                key_mask = config.sort.key_mask,
                "partial key mask, valid_count no longer bounds the visible set"
            );
        }
        Self {
            config,
            backend,
            state: SceneState::Unloaded,
            particles: None,
            generation: 0,
            previous_view_proj: None,
            outcome: None,
            sort_invocations: 0,
        }
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Particles in the loaded scene, `0` when nothing is loaded.
    pub fn particle_count(&self) -> u32 {
        self.particles.as_ref().map_or(0, |p| p.len() as u32)
    }

    pub fn particles(&self) -> Option<&SplatParticleSet> {
        self.particles.as_ref()
    }

    /// Times the sort routine has run since the driver was created.
    pub fn sort_invocations(&self) -> u64 {
        self.sort_invocations
    }

    /// Increments on every successful load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Outcome of the most recent successful sort for the current scene.
    pub fn last_outcome(&self) -> Option<SortOutcome> {
        self.outcome
    }

    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<(), DriverError> {
        self.begin_load();
        let decoded = gsplat_loader::load_path(path);
        self.finish_load(decoded)
    }

    pub fn load_reader(&mut self, reader: impl Read) -> Result<(), DriverError> {
        self.begin_load();
        let decoded = gsplat_loader::load(reader);
        self.finish_load(decoded)
    }

    pub fn load_collection(&mut self, collection: &AttributeCollection) -> Result<(), DriverError> {
        self.begin_load();
        let decoded = gsplat_loader::decode(collection);
        self.finish_load(decoded)
    }

    /// Install an already decoded scene, replacing any current one.
    pub fn install(&mut self, particles: SplatParticleSet) -> Result<(), DriverError> {
        self.begin_load();
        self.finish_load(Ok(particles))
    }

    /// Release all buffers and drop the scene.
    pub fn unload(&mut self) {
        if self.state != SceneState::Unloaded {
            tracing::info!(generation = self.generation, "scene unloaded");
        }
        self.backend.release();
        self.particles = None;
        self.previous_view_proj = None;
        self.outcome = None;
        self.state = SceneState::Unloaded;
    }

    fn begin_load(&mut self) {
        self.unload();
        self.state = SceneState::Loading;
    }

    fn finish_load(
        &mut self,
        decoded: Result<SplatParticleSet, gsplat_loader::LoadError>,
    ) -> Result<(), DriverError> {
        let particles = match decoded {
            Ok(particles) => particles,
            Err(err) => {
                tracing::warn!(error = %err, "scene load failed");
                self.state = SceneState::Unloaded;
                return Err(err.into());
            }
        };
        if let Err(err) = self.backend.prepare(particles.position()) {
            tracing::warn!(error = %err, "sort buffer allocation failed");
            self.backend.release();
            self.state = SceneState::Unloaded;
            return Err(err.into());
        }

        self.generation += 1;
        tracing::info!(
            particles = particles.len(),
            generation = self.generation,
            "scene ready"
        );
        self.particles = Some(particles);
        self.state = SceneState::Ready;
        Ok(())
    }

    /// Advance one frame. Returns `None` when there is nothing to draw.
    pub fn frame(&mut self, view_proj: &Mat4) -> Option<DrawCall<'_, B::IndexBuffer>> {
        if self.state != SceneState::Ready {
            return None;
        }
        let particle_count = self.particle_count();
        if particle_count == 0 {
            tracing::trace!("empty scene, nothing to draw");
            return None;
        }

        if self.previous_view_proj.as_ref() == Some(view_proj) {
            tracing::trace!("view unchanged, reusing sorted order");
        } else {
            match self.sort_frame(view_proj, particle_count) {
                Ok(outcome) => {
                    self.outcome = Some(outcome);
                    self.previous_view_proj = Some(*view_proj);
                }
                Err(SortFailure::KeyGen(err)) if err.buffers_intact() => {
                    tracing::warn!(error = %err, "sort skipped, reusing previous order");
                }
                Err(SortFailure::KeyGen(err) | SortFailure::Sort(err)) => {
                    tracing::warn!(error = %err, "sort failed, skipping frame");
                    self.outcome = None;
                    self.previous_view_proj = None;
                    return None;
                }
            }
        }

        let outcome = self.outcome?;
        if outcome.is_empty() {
            return None;
        }
        let index_buffer = self.backend.index_buffer(outcome.side)?;
        Some(DrawCall {
            side: outcome.side,
            particle_count,
            valid_count: outcome.valid_count,
            generation: self.generation,
            index_buffer,
        })
    }

    fn sort_frame(&mut self, view_proj: &Mat4, count: u32) -> Result<SortOutcome, SortFailure> {
        let _span = tracing::info_span!("frame_sort", particles = count).entered();
        let valid_count = self
            .backend
            .generate_keys(view_proj)
            .map_err(SortFailure::KeyGen)?;
        let side = self
            .backend
            .sort(self.config.sort.key_mask, count)
            .map_err(SortFailure::Sort)?;
        self.sort_invocations += 1;
        tracing::debug!(?side, valid_count, "sorted");
        Ok(SortOutcome { side, valid_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};
    use gsplat_loader::fixtures::{splat_writer, splat_writer_at};
    use gsplat_ply::Format;
    use gsplat_sort::{CpuSortBackend, SortedPairs};

    fn cpu_driver() -> FrameDriver<CpuSortBackend> {
        FrameDriver::new(CpuSortBackend::new(), DriverConfig::default())
    }

    fn camera(eye: Vec3) -> Mat4 {
        Mat4::perspective_rh(60f32.to_radians(), 1.0, 1.0, 1000.0)
            * Mat4::look_at_rh(eye, eye + Vec3::NEG_Y, Vec3::Z)
    }

    fn three_in_a_row() -> Vec<u8> {
        splat_writer_at(
            &[[0.0, 0.0, 1.0], [0.0, 0.0, 2.0], [0.0, 0.0, 3.0]],
            &[0.0, 0.0, 0.0],
            Format::BinaryLittleEndian,
        )
        .to_bytes()
        .unwrap()
    }

    #[test]
    fn starts_unloaded_and_draws_nothing() {
        let mut driver = cpu_driver();
        assert_eq!(driver.state(), SceneState::Unloaded);
        assert!(driver.frame(&camera(Vec3::ZERO)).is_none());
        assert_eq!(driver.sort_invocations(), 0);
    }

    #[test]
    fn farthest_particle_is_drawn_first() {
        let mut driver = cpu_driver();
        driver.load_reader(three_in_a_row().as_slice()).unwrap();
        assert_eq!(driver.state(), SceneState::Ready);

        let draw = driver.frame(&camera(Vec3::ZERO)).unwrap();
        assert_eq!(draw.particle_count, 3);
        assert_eq!(draw.valid_count, 3);
        assert_eq!(draw.generation, 1);
        assert_eq!(draw.index_buffer, &[2, 1, 0]);
    }

    #[test]
    fn identical_view_skips_sort() {
        let mut driver = cpu_driver();
        driver.load_reader(three_in_a_row().as_slice()).unwrap();
        let vp = camera(Vec3::ZERO);

        let first = driver.frame(&vp).map(|d| (d.side, d.valid_count));
        assert_eq!(driver.sort_invocations(), 1);
        let second = driver.frame(&vp).map(|d| (d.side, d.valid_count));
        assert_eq!(driver.sort_invocations(), 1);
        assert_eq!(first, second);
        assert_eq!(driver.backend().dispatch_count(), 2);

        driver.frame(&camera(Vec3::new(0.0, 10.0, 0.0)));
        assert_eq!(driver.sort_invocations(), 2);
    }

    #[test]
    fn moving_past_particles_culls_them() {
        let mut driver = cpu_driver();
        driver.load_reader(three_in_a_row().as_slice()).unwrap();
        // eye between the first and second particle
        let draw = driver.frame(&camera(Vec3::new(0.0, -150.0, 0.0))).unwrap();
        assert_eq!(draw.valid_count, 2);
        assert_eq!(&draw.index_buffer[..2], &[2, 1]);
    }

    #[test]
    fn empty_scene_is_ready_but_draws_nothing() {
        let mut driver = cpu_driver();
        let bytes = splat_writer(0, Format::Ascii).to_bytes().unwrap();
        driver.load_reader(bytes.as_slice()).unwrap();
        assert_eq!(driver.state(), SceneState::Ready);
        assert_eq!(driver.particle_count(), 0);
        assert!(driver.frame(&camera(Vec3::ZERO)).is_none());
        assert_eq!(driver.sort_invocations(), 0);
    }

    #[test]
    fn nothing_visible_draws_nothing() {
        let mut driver = cpu_driver();
        driver.load_reader(three_in_a_row().as_slice()).unwrap();
        let behind = Mat4::perspective_rh(60f32.to_radians(), 1.0, 1.0, 1000.0)
            * Mat4::look_at_rh(Vec3::ZERO, Vec3::Y, Vec3::Z);
        assert!(driver.frame(&behind).is_none());
        assert_eq!(driver.last_outcome().map(|o| o.valid_count), Some(0));
    }

    #[test]
    fn missing_rotation_leaves_driver_unloaded() {
        let mut driver = cpu_driver();
        let bytes = splat_writer(4, Format::BinaryLittleEndian)
            .without("rot_3")
            .to_bytes()
            .unwrap();
        let err = driver.load_reader(bytes.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Load(gsplat_loader::LoadError::MissingAttribute(_))
        ));
        assert_eq!(driver.state(), SceneState::Unloaded);
        assert!(driver.particles().is_none());
        assert_eq!(driver.backend().capacity(), 0);
    }

    #[test]
    fn reload_bumps_generation_and_resorts() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), three_in_a_row()).unwrap();

        let mut driver = cpu_driver();
        let vp = camera(Vec3::ZERO);
        driver.load_path(tmp.path()).unwrap();
        driver.frame(&vp);
        driver.load_path(tmp.path()).unwrap();
        assert_eq!(driver.generation(), 2);
        assert!(driver.last_outcome().is_none());

        let draw = driver.frame(&vp).unwrap();
        assert_eq!(draw.generation, 2);
        assert_eq!(driver.sort_invocations(), 2);
    }

    #[test]
    fn unload_releases_buffers() {
        let mut driver = cpu_driver();
        driver.load_reader(three_in_a_row().as_slice()).unwrap();
        assert_eq!(driver.backend().capacity(), 3);
        driver.unload();
        assert_eq!(driver.state(), SceneState::Unloaded);
        assert_eq!(driver.particle_count(), 0);
        assert_eq!(driver.backend().capacity(), 0);
        assert!(driver.frame(&camera(Vec3::ZERO)).is_none());
    }

    /// CPU backend that fails the next key generation or sort with a chosen error.
    #[derive(Default)]
    struct FlakyBackend {
        inner: CpuSortBackend,
        fail_next: Option<BackendError>,
        fail_sort: Option<BackendError>,
    }

    impl SortBackend for FlakyBackend {
        type IndexBuffer = [u32];

        fn prepare(&mut self, positions: &[Vec4]) -> Result<(), BackendError> {
            self.inner.prepare(positions)
        }

        fn release(&mut self) {
            self.inner.release()
        }

        fn capacity(&self) -> u32 {
            self.inner.capacity()
        }

        fn generate_keys(&mut self, view_proj: &Mat4) -> Result<u32, BackendError> {
            match self.fail_next.take() {
                Some(err) => Err(err),
                None => self.inner.generate_keys(view_proj),
            }
        }

        fn sort(&mut self, key_mask: u32, count: u32) -> Result<Side, BackendError> {
            match self.fail_sort.take() {
                Some(err) => Err(err),
                None => self.inner.sort(key_mask, count),
            }
        }

        fn index_buffer(&self, side: Side) -> Option<&[u32]> {
            self.inner.index_buffer(side)
        }

        fn read_back(&self, side: Side, count: u32) -> Result<SortedPairs, BackendError> {
            self.inner.read_back(side, count)
        }
    }

    fn flaky_driver() -> FrameDriver<FlakyBackend> {
        let mut driver = FrameDriver::new(FlakyBackend::default(), DriverConfig::default());
        driver.load_reader(three_in_a_row().as_slice()).unwrap();
        driver
    }

    #[test]
    fn intact_failure_reuses_previous_order() {
        let mut driver = flaky_driver();
        let first = driver.frame(&camera(Vec3::ZERO)).map(|d| d.side);
        assert!(first.is_some());

        driver.backend.fail_next = Some(BackendError::DeviceUnavailable("lost".into()));
        let moved = camera(Vec3::new(0.0, 5.0, 0.0));
        let draw = driver.frame(&moved).map(|d| d.side);
        assert_eq!(draw, first);
        assert_eq!(driver.sort_invocations(), 1);

        // the failed transform was never cached, so the same view retries
        assert!(driver.frame(&moved).is_some());
        assert_eq!(driver.sort_invocations(), 2);
    }

    #[test]
    fn dispatch_failure_skips_frame_and_forces_resort() {
        let mut driver = flaky_driver();
        let vp = camera(Vec3::ZERO);
        assert!(driver.frame(&vp).is_some());

        driver.backend.fail_next = Some(BackendError::Dispatch("oom".into()));
        assert!(driver.frame(&camera(Vec3::new(0.0, 5.0, 0.0))).is_none());
        assert!(driver.last_outcome().is_none());

        // the first view sorts again because no transform is cached
        assert!(driver.frame(&vp).is_some());
        assert_eq!(driver.sort_invocations(), 2);
    }

    #[test]
    fn sort_failure_after_key_generation_skips_frame() {
        let mut driver = flaky_driver();
        let vp = camera(Vec3::ZERO);
        assert_eq!(driver.frame(&vp).unwrap().index_buffer, &[2, 1, 0]);

        // keys and indices for the new view are already written, unsorted
        driver.backend.fail_sort = Some(BackendError::DeviceUnavailable("lost".into()));
        assert!(driver.frame(&camera(Vec3::new(0.0, 5.0, 0.0))).is_none());
        assert!(driver.last_outcome().is_none());

        let draw = driver.frame(&vp).unwrap();
        assert_eq!(draw.index_buffer, &[2, 1, 0]);
        assert_eq!(driver.sort_invocations(), 2);
    }

    #[test]
    fn install_prepared_set() {
        let bytes = splat_writer(6, Format::BinaryBigEndian).to_bytes().unwrap();
        let set = gsplat_loader::load(bytes.as_slice()).unwrap();
        let mut driver = cpu_driver();
        driver.install(set).unwrap();
        assert_eq!(driver.particle_count(), 6);
        assert_eq!(driver.backend().capacity(), 6);
    }
}
