//! Per-pixel isosurface ray marching over an SPH density field.
//!
//! A pass is driven in three calls:
//! 1. `prepare`: capture settings, camera, depth buffer, dataset and outputs
//! 2. `start`: pick the kernel strategy and dispatch one job per pixel
//! 3. `is_done`: poll until every pixel has been written
//!
//! Every pixel reads only the shared pass state and writes only its own output
//! slot, so the result does not depend on which worker handles which pixel.

use log::debug;
use nalgebra::Vector3;
use std::sync::Arc;
use thiserror::Error;

use crate::core::{
    FrameCamera, SettingsError, SurfaceBuffers, ThreadLocals, VisualizationSettings,
    BACKGROUND_DEPTH, DEFAULT_NEIGHBOR_CAPACITY,
};
use crate::dataset::ParticleDataset;
use crate::kernel::{AnisotropicKernel, CubicKernel, Deformation, KernelMode, WpcaEstimator};
use crate::pool::{default_thread_count, PoolError, WorkerPool};

/// Errors detected while setting up a pass.
#[derive(Debug, Error)]
pub enum MarchError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("snapshot {snapshot} out of range ({frames} frames available)")]
    SnapshotOutOfRange { snapshot: usize, frames: usize },

    #[error("depth buffer has {actual} pixels, frame needs {expected}")]
    DepthSize { expected: usize, actual: usize },

    #[error("output buffers are {actual:?}, frame is {expected:?}")]
    OutputSize { expected: (u32, u32), actual: (u32, u32) },

    #[error("invalid particle radius {0}")]
    InvalidRadius(f32),

    #[error("start called before prepare")]
    NotPrepared,
}

/// Construction-time choices for a marcher.
#[derive(Clone, Debug)]
pub struct MarcherConfig {
    /// Worker threads (the dispatching thread does not march)
    pub threads: usize,

    /// Neighbors kept per sample; the rest are dropped
    pub neighbor_capacity: usize,
}

impl Default for MarcherConfig {
    fn default() -> Self {
        Self {
            threads: default_thread_count(),
            neighbor_capacity: DEFAULT_NEIGHBOR_CAPACITY,
        }
    }
}

/// Density and (unnormalized) gradient at one sample.
#[derive(Clone, Copy, Debug)]
struct Sample {
    density: f32,
    gradient: Vector3<f32>,
}

/// Immutable state shared by every pixel of a pass.
struct PassState<D> {
    settings: VisualizationSettings,
    camera: FrameCamera,
    depth: Arc<[f32]>,
    dataset: Arc<D>,
    outputs: Arc<SurfaceBuffers>,
    kernel: CubicKernel,
    aniso_kernel: AnisotropicKernel,
    estimator: WpcaEstimator,
    radius: f32,
    radius_sq: f32,
}

impl<D: ParticleDataset> PassState<D> {
    fn march_pixel<F>(&self, pixel: usize, scratch: &mut ThreadLocals, sample: F)
    where
        F: Fn(&Self, &Vector3<f32>, &mut ThreadLocals, &mut Deformation) -> Sample,
    {
        let depth = self.depth[pixel];
        self.outputs.clear_pixel(pixel);
        if !depth.is_finite() || depth >= BACKGROUND_DEPTH {
            return;
        }

        let width = self.camera.width as usize;
        let (x, y) = ((pixel % width) as u32, (pixel / width) as u32);
        let start = self.camera.unproject(x, y, depth);
        if !start.iter().all(|c| c.is_finite()) {
            return;
        }
        let Some(direction) = (start - self.camera.position).try_normalize(1.0e-12) else {
            return;
        };
        let step = direction * self.settings.step_length;

        let max_steps = self.settings.max_steps as usize;
        let mut deformation = Deformation::isotropic(self.radius);
        let mut i = 0usize;

        while i < max_steps {
            i = self.skip_empty(&start, &step, i + 1);
            if i > max_steps {
                break;
            }

            // Positions are taken on the lattice start + i·step, so skipping
            // never shifts where the remaining samples land.
            let position = start + step * i as f32;
            let s = sample(self, &position, scratch, &mut deformation);

            if s.density >= self.settings.iso_density {
                let normal = s.gradient.try_normalize(1.0e-12).unwrap_or(-direction);
                self.outputs.write_hit(pixel, position, normal);
                return;
            }
        }
    }

    /// Advance the step index past density-grid cells that cannot hold surface.
    fn skip_empty(&self, start: &Vector3<f32>, step: &Vector3<f32>, mut i: usize) -> usize {
        let frame = self.settings.snapshot;
        let max_steps = self.settings.max_steps as usize;

        while i <= max_steps {
            let position = start + step * i as f32;
            match self.dataset.density_node(&position, frame) {
                Some(node) if !node.may_contain_surface => {
                    // A step too small to leave the cell gives an infinite exit,
                    // which saturates past max_steps and ends the ray.
                    let t_exit = node.bounds.exit_distance(&position, step);
                    i = i.saturating_add((t_exit.floor() as usize).saturating_add(1));
                }
                _ => break,
            }
        }
        i
    }

    fn sample_isotropic(&self, position: &Vector3<f32>, scratch: &mut ThreadLocals, _: &mut Deformation) -> Sample {
        let frame = self.settings.snapshot;
        let positions = self.dataset.positions(frame);

        scratch.clear();
        let neighbors = &mut scratch.neighbors;
        self.dataset.for_each_neighbor(position, frame, &mut |j| {
            neighbors.push(positions[j] - position);
        });

        let mut density = 0.0;
        let mut gradient = Vector3::zeros();
        for r in scratch.neighbors.as_slice() {
            density += self.kernel.w(r);
            gradient += self.kernel.grad_w(r);
        }
        Sample { density, gradient }
    }

    fn sample_anisotropic(
        &self,
        position: &Vector3<f32>,
        scratch: &mut ThreadLocals,
        deformation: &mut Deformation,
    ) -> Sample {
        let frame = self.settings.snapshot;
        let positions = self.dataset.positions(frame);

        scratch.clear();
        let ThreadLocals {
            neighbors_ext,
            neighbors,
        } = scratch;

        self.dataset.for_each_neighbor_ext(position, frame, &mut |j| {
            neighbors_ext.push(positions[j]);
        });
        for xj in neighbors_ext.as_slice() {
            let r = xj - position;
            if r.norm_squared() < self.radius_sq {
                neighbors.push(r);
            }
        }

        self.estimator.update(position, neighbors_ext.as_slice(), deformation);

        let mut density = 0.0;
        let mut gradient = Vector3::zeros();
        for r in neighbors.as_slice() {
            density += self.aniso_kernel.w(r, deformation);
            gradient += self.aniso_kernel.grad_w(r, deformation);
        }
        Sample { density, gradient }
    }
}

/// Drives marching passes on a persistent worker pool.
pub struct RayMarcher<D: ParticleDataset + 'static> {
    pool: WorkerPool<ThreadLocals>,
    pass: Option<Arc<PassState<D>>>,
}

impl<D: ParticleDataset + 'static> RayMarcher<D> {
    pub fn new(config: MarcherConfig) -> Result<Self, MarchError> {
        let capacity = config.neighbor_capacity;
        let pool = WorkerPool::new(config.threads, |_| ThreadLocals::new(capacity))?;
        Ok(Self { pool, pass: None })
    }

    pub fn thread_count(&self) -> usize {
        self.pool.thread_count()
    }

    /// Capture the inputs of the next pass. Must not be called while a pass runs.
    pub fn prepare(
        &mut self,
        settings: VisualizationSettings,
        camera: FrameCamera,
        depth: Arc<[f32]>,
        dataset: Arc<D>,
        outputs: Arc<SurfaceBuffers>,
    ) -> Result<(), MarchError> {
        debug_assert!(self.pool.is_done(), "prepare called during a pass");
        settings.validate()?;

        let frames = dataset.frame_count();
        if settings.snapshot >= frames {
            return Err(MarchError::SnapshotOutOfRange {
                snapshot: settings.snapshot,
                frames,
            });
        }
        let expected = camera.pixel_count();
        if depth.len() != expected {
            return Err(MarchError::DepthSize {
                expected,
                actual: depth.len(),
            });
        }
        if (outputs.width(), outputs.height()) != (camera.width, camera.height) {
            return Err(MarchError::OutputSize {
                expected: (camera.width, camera.height),
                actual: (outputs.width(), outputs.height()),
            });
        }

        let radius = dataset.particle_radius();
        if !(radius.is_finite() && radius > 0.0) {
            return Err(MarchError::InvalidRadius(radius));
        }
        let radius_ext = dataset.particle_radius_ext();
        if !(radius_ext.is_finite() && radius_ext > 0.0) {
            return Err(MarchError::InvalidRadius(radius_ext));
        }

        debug!(
            "prepared pass: {}x{} pixels, snapshot {}, anisotropy {}",
            camera.width, camera.height, settings.snapshot, settings.enable_anisotropy
        );

        let estimator = WpcaEstimator::new(radius, radius_ext, settings.anisotropy);
        self.pass = Some(Arc::new(PassState {
            settings,
            camera,
            depth,
            dataset,
            outputs,
            kernel: CubicKernel::new(radius),
            aniso_kernel: AnisotropicKernel::new(),
            estimator,
            radius,
            radius_sq: radius * radius,
        }));
        Ok(())
    }

    /// Kernel strategy the prepared pass will use.
    pub fn mode(&self) -> Option<KernelMode> {
        self.pass
            .as_ref()
            .map(|p| KernelMode::from_flag(p.settings.enable_anisotropy))
    }

    /// Dispatch the prepared pass and return immediately.
    pub fn start(&mut self) -> Result<(), MarchError> {
        let pass = self.pass.as_ref().ok_or(MarchError::NotPrepared)?;
        let pixel_count = pass.camera.pixel_count();
        let mode = KernelMode::from_flag(pass.settings.enable_anisotropy);
        let pass = Arc::clone(pass);

        match mode {
            KernelMode::Isotropic => self.pool.set_function(move |pixel, scratch| {
                pass.march_pixel(pixel, scratch, PassState::sample_isotropic)
            }),
            KernelMode::Anisotropic => self.pool.set_function(move |pixel, scratch| {
                pass.march_pixel(pixel, scratch, PassState::sample_anisotropic)
            }),
        }

        debug!("starting {:?} pass over {} pixels", mode, pixel_count);
        self.pool.start(pixel_count);
        Ok(())
    }

    /// True once every pixel of the last started pass has been written.
    pub fn is_done(&self) -> bool {
        self.pool.is_done()
    }

    pub fn wait(&self) {
        self.pool.wait()
    }

    /// `start` followed by `wait`.
    pub fn march(&mut self) -> Result<(), MarchError> {
        self.start()?;
        self.wait();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{background_depth, constant_depth};
    use crate::dataset::ParticleSnapshots;
    use nalgebra::Vector4;

    fn camera(size: u32) -> FrameCamera {
        FrameCamera::look_at(
            Vector3::new(0.0, 0.0, -5.0),
            Vector3::zeros(),
            Vector3::y(),
            1.0,
            0.1,
            50.0,
            size,
            size,
        )
        .unwrap()
    }

    fn marcher() -> RayMarcher<ParticleSnapshots> {
        RayMarcher::new(MarcherConfig {
            threads: 2,
            neighbor_capacity: 64,
        })
        .unwrap()
    }

    #[test]
    fn test_start_before_prepare() {
        let mut m = marcher();
        assert!(matches!(m.start(), Err(MarchError::NotPrepared)));
        assert!(m.mode().is_none());
    }

    #[test]
    fn test_prepare_rejects_bad_snapshot() {
        let mut m = marcher();
        let data = Arc::new(ParticleSnapshots::single(vec![Vector3::zeros()], 1.0, 2.0));
        let err = m
            .prepare(
                VisualizationSettings::default().with_snapshot(3),
                camera(4),
                background_depth(4, 4).into(),
                data,
                Arc::new(SurfaceBuffers::new(4, 4)),
            )
            .unwrap_err();
        assert!(matches!(err, MarchError::SnapshotOutOfRange { snapshot: 3, frames: 1 }));
    }

    #[test]
    fn test_prepare_rejects_size_mismatch() {
        let mut m = marcher();
        let data = Arc::new(ParticleSnapshots::single(vec![Vector3::zeros()], 1.0, 2.0));
        let err = m
            .prepare(
                VisualizationSettings::default(),
                camera(4),
                background_depth(4, 4).into(),
                data,
                Arc::new(SurfaceBuffers::new(4, 5)),
            )
            .unwrap_err();
        assert!(matches!(err, MarchError::OutputSize { .. }));
    }

    #[test]
    fn test_background_pixels_are_cleared() {
        let mut m = marcher();
        let data = Arc::new(ParticleSnapshots::single(vec![Vector3::zeros()], 1.0, 2.0));
        let outputs = Arc::new(SurfaceBuffers::new(4, 4));
        outputs.write_hit(5, Vector3::repeat(1.0), Vector3::x());

        m.prepare(
            VisualizationSettings::default(),
            camera(4),
            background_depth(4, 4).into(),
            data,
            Arc::clone(&outputs),
        )
        .unwrap();
        assert_eq!(m.mode(), Some(KernelMode::Isotropic));
        m.march().unwrap();

        assert!(outputs.positions_vec().iter().all(|p| *p == Vector4::zeros()));
        assert!(outputs.normals_vec().iter().all(|n| *n == Vector4::zeros()));
    }

    #[test]
    fn test_non_finite_depth_is_background() {
        let mut m = RayMarcher::new(MarcherConfig {
            threads: 1,
            neighbor_capacity: 64,
        })
        .unwrap();
        let data = Arc::new(ParticleSnapshots::single(vec![Vector3::zeros()], 1.0, 2.0));
        let outputs = Arc::new(SurfaceBuffers::new(4, 4));
        outputs.write_hit(5, Vector3::repeat(1.0), Vector3::x());

        let mut depth = constant_depth(4, 4, 0.0);
        depth[5] = f32::NAN;
        depth[6] = f32::INFINITY;
        depth[9] = f32::NEG_INFINITY;

        for anisotropic in [false, true] {
            m.prepare(
                VisualizationSettings::default()
                    .with_step_length(0.2)
                    .with_max_steps(64)
                    .with_anisotropy(anisotropic),
                camera(4),
                depth.clone().into(),
                Arc::clone(&data),
                Arc::clone(&outputs),
            )
            .unwrap();
            m.march().unwrap();
            assert!(m.is_done());

            for pixel in [5, 6, 9] {
                assert_eq!(outputs.position(pixel), Vector4::zeros());
                assert_eq!(outputs.normal(pixel), Vector4::zeros());
            }
        }

        // Outside the pool nothing catches a panic.
        let pass = m.pass.as_ref().unwrap();
        let mut scratch = ThreadLocals::new(64);
        for pixel in [5, 6, 9] {
            pass.march_pixel(pixel, &mut scratch, PassState::sample_isotropic);
            pass.march_pixel(pixel, &mut scratch, PassState::sample_anisotropic);
        }
    }

    #[test]
    fn test_degenerate_step_skips_past_the_ray() {
        let mut m = marcher();
        let data = Arc::new(ParticleSnapshots::single(
            vec![Vector3::zeros(), Vector3::new(2.0, 0.0, 0.0)],
            0.1,
            0.2,
        ));
        m.prepare(
            VisualizationSettings::default().with_max_steps(300),
            camera(4),
            background_depth(4, 4).into(),
            Arc::clone(&data),
            Arc::new(SurfaceBuffers::new(4, 4)),
        )
        .unwrap();
        let pass = m.pass.as_ref().unwrap();

        // Halfway between the particles, well outside both supports.
        let start = Vector3::new(1.0, 0.0, 0.0);
        assert!(!data.density_node(&start, 0).unwrap().may_contain_surface);

        for step in [Vector3::new(1.0e-30, 0.0, 0.0), Vector3::zeros()] {
            assert!(pass.skip_empty(&start, &step, 1) > 300);
        }
    }
}
