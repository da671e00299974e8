//! The render-loop facing side of the scene.
//!
//! [`SceneRenderer`] loads the assets of a manifest and owns everything the
//! ray-tracing stage binds. A host drives it once per frame:
//!
//! ```ignore
//! let mut scene = SceneRenderer::new(config);
//! scene.load_models_from_manifest(&ctx, "scene.toml").await?;
//! loop {
//!     scene.update(&ctx)?;
//!     if let Some(bindings) = scene.render(camera) {
//!         // bind and trace
//!     }
//! }
//! ```
//!
//! # Key types
//!
//! - [`LoadReport`] lists which manifest entries made it into the scene
//! - [`SceneBindings`] borrows the resources to bind for one frame
//! - [`RayTracingPushConstants`] carries the camera and lens

use std::{ops::Range, path::PathBuf};

use cgmath::SquareMatrix;

use crate::{
    config::SceneConfig,
    data_structures::{
        draw_call::DrawCallRecord, instance::Placement, material::MaterialGpuData,
    },
    error::{GpuError, LoadError, SceneError},
    geometry::build_asset_geometry,
    gpu::{BufferUsage, Command, Gpu, staged_buffer},
    resources::{
        load_asset, load_string,
        manifest::Manifest,
        material::convert_for_gpu_usage,
    },
    scene::{
        rebuild::{InFlightFrames, RebuildOutcome, RebuildProtocol, RebuildState},
        registry::{SceneRegistry, ViewLists},
    },
};

/// Camera and lens data pushed to the ray generation and hit shaders.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RayTracingPushConstants {
    pub camera_transform: [[f32; 4]; 4],
    pub inverse_camera_transform: [[f32; 4]; 4],
    pub half_fov: f32,
    pub focal_length: f32,
    pub focal_distance: f32,
    pub aperture_size: f32,
    pub max_coc_diameter: f32,
    pub far_plane_distance: f32,
    pub _padding: [f32; 2],
}

/// Everything the ray-tracing stage binds for one frame.
pub struct SceneBindings<'a, G: Gpu> {
    pub samplers: &'a [G::ImageSampler],
    pub materials: &'a G::Buffer,
    pub views: &'a ViewLists<G>,
    pub draw_calls: &'a [DrawCallRecord<G>],
    pub transforms: &'a G::Buffer,
    pub tlas: &'a G::Tlas,
    pub push_constants: RayTracingPushConstants,
}

#[derive(Debug, Clone)]
pub struct LoadedAsset {
    pub section: String,
    pub path: PathBuf,
    pub asset_index: usize,
    /// Instance ids of the asset in the registry.
    pub instances: Range<usize>,
    pub placement: Placement,
}

#[derive(Debug)]
pub struct FailedAsset {
    pub section: String,
    pub path: PathBuf,
    pub error: LoadError,
}

/// Outcome of loading a manifest. A failed asset never stops the others.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<LoadedAsset>,
    pub failed: Vec<FailedAsset>,
}

impl LoadReport {
    pub fn instance_count(&self) -> usize {
        self.loaded.iter().map(|a| a.instances.len()).sum()
    }
}

/// Scene sizes before a manifest load.
struct Checkpoint {
    instances: usize,
    materials: usize,
    samplers: usize,
    assets: usize,
}

pub struct SceneRenderer<G: Gpu> {
    config: SceneConfig,
    registry: SceneRegistry<G>,
    rebuild: RebuildProtocol,
    frames: InFlightFrames<G::Submission>,
    materials: Vec<MaterialGpuData>,
    samplers: Vec<G::ImageSampler>,
    material_buffer: Option<G::Buffer>,
    tlas: Option<G::Tlas>,
    tlas_built: bool,
    asset_count: usize,
}

impl<G: Gpu> SceneRenderer<G> {
    pub fn new(config: SceneConfig) -> Self {
        let frames = InFlightFrames::new(config.frames_in_flight);
        Self {
            config,
            registry: SceneRegistry::new(),
            rebuild: RebuildProtocol::new(),
            frames,
            materials: Vec::new(),
            samplers: Vec::new(),
            material_buffer: None,
            tlas: None,
            tlas_built: false,
            asset_count: 0,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn registry(&self) -> &SceneRegistry<G> {
        &self.registry
    }

    pub fn materials(&self) -> &[MaterialGpuData] {
        &self.materials
    }

    pub fn samplers(&self) -> &[G::ImageSampler] {
        &self.samplers
    }

    pub fn rebuild_state(&self) -> RebuildState {
        self.rebuild.state()
    }

    pub fn frames_in_flight(&self) -> &InFlightFrames<G::Submission> {
        &self.frames
    }

    /// Reads `manifest_name` from the asset root and loads every asset it lists.
    pub async fn load_models_from_manifest(
        &mut self,
        gpu: &G,
        manifest_name: &str,
    ) -> anyhow::Result<LoadReport> {
        let path = self.config.asset_root.join(manifest_name);
        let text = load_string(&path).await?;
        let manifest = Manifest::parse(&text)?;
        Ok(self.load_manifest(gpu, &manifest).await?)
    }

    /// Loads every entry of `manifest`, then uploads materials and transforms and
    /// creates a top-level structure large enough for every instance.
    ///
    /// An asset that fails is logged and reported; it leaves nothing behind in the
    /// scene. Only device failures abort the whole load, in which case every asset
    /// of this manifest is removed again and the scene is left as it was before.
    pub async fn load_manifest(&mut self, gpu: &G, manifest: &Manifest) -> Result<LoadReport, GpuError> {
        let checkpoint = Checkpoint {
            instances: self.registry.len(),
            materials: self.materials.len(),
            samplers: self.samplers.len(),
            assets: self.asset_count,
        };
        let result = self.load_entries(gpu, manifest).await;
        if let Err(e) = &result {
            log::error!(
                "manifest load aborted ({e}), dropping {} instance(s) loaded so far",
                self.registry.len() - checkpoint.instances
            );
            self.registry.truncate(checkpoint.instances);
            self.materials.truncate(checkpoint.materials);
            self.samplers.truncate(checkpoint.samplers);
            self.asset_count = checkpoint.assets;
        }
        result
    }

    async fn load_entries(&mut self, gpu: &G, manifest: &Manifest) -> Result<LoadReport, GpuError> {
        let start = instant::Instant::now();
        let mut report = LoadReport::default();
        let mut uploads: Vec<Command<'_, G>> = Vec::new();

        for entry in &manifest.entries {
            let path = self.config.asset_root.join(&entry.path);
            match self.load_single_asset(gpu, &path, &mut uploads).await {
                Ok(instances) => {
                    log::info!(
                        "[{}] loaded {} with {} instance(s)",
                        entry.section,
                        path.display(),
                        instances.len()
                    );
                    report.loaded.push(LoadedAsset {
                        section: entry.section.clone(),
                        path,
                        asset_index: self.asset_count - 1,
                        instances,
                        placement: entry.placement.clone(),
                    });
                }
                Err(LoadError::Gpu(e @ GpuError::DeviceLost(_))) => return Err(e),
                Err(error) => {
                    log::error!("[{}] could not load {}: {error}", entry.section, path.display());
                    report.failed.push(FailedAsset {
                        section: entry.section.clone(),
                        path,
                        error,
                    });
                }
            }
        }

        let (material_buffer, fill_materials) =
            staged_buffer(gpu, "materials", BufferUsage::Storage, &self.materials)?;
        uploads.push(fill_materials);
        gpu.submit_and_wait(uploads)?;
        self.material_buffer = Some(material_buffer);

        self.registry.finalize_transforms(gpu)?;
        self.tlas = Some(gpu.create_tlas("scene", self.registry.len() as u32)?);
        self.tlas_built = false;
        // The new structure is empty until the next rebuild, even if no asset was added
        self.registry.mark_structure_changed();

        log::info!(
            "loaded {} of {} asset(s): {} instance(s), {} material(s), {} sampler(s) in {:?}",
            report.loaded.len(),
            manifest.len(),
            self.registry.len(),
            self.materials.len(),
            self.samplers.len(),
            start.elapsed()
        );
        Ok(report)
    }

    /// Loads one asset. Nothing is added to the scene unless every step succeeded.
    async fn load_single_asset<'a>(
        &mut self,
        gpu: &G,
        path: &std::path::Path,
        uploads: &mut Vec<Command<'a, G>>,
    ) -> Result<Range<usize>, LoadError> {
        let asset = load_asset(path).await?;
        let staged = build_asset_geometry(gpu, &asset, self.registry.views().len())?;
        let batch = convert_for_gpu_usage(
            gpu,
            &asset.materials(),
            &asset.textures,
            self.samplers.len(),
            &self.config.textures,
        )?;
        log::debug!("{}: {:?}", asset.name, batch.stats);

        let first_instance = self.registry.len();
        let material_offset = self.materials.len();
        self.materials.extend(batch.materials);
        self.samplers.extend(batch.samplers);
        uploads.extend(batch.commands);
        self.registry.commit(staged, self.asset_count, material_offset);
        self.asset_count += 1;
        Ok(first_instance..self.registry.len())
    }

    /// Rebuilds the top-level structure if the active set changed. Call once per frame.
    pub fn update(&mut self, gpu: &G) -> Result<RebuildOutcome, GpuError> {
        let Some(tlas) = self.tlas.as_mut() else {
            return Ok(RebuildOutcome::Unchanged);
        };
        let outcome = self.rebuild.update(gpu, &mut self.registry, tlas, &mut self.frames)?;
        if let RebuildOutcome::Submitted { .. } = outcome {
            self.tlas_built = true;
        }
        Ok(outcome)
    }

    /// The resources to bind for this frame. `None` until the top-level structure
    /// has been built once. Never triggers a rebuild.
    pub fn render(&self, camera: cgmath::Matrix4<f32>) -> Option<SceneBindings<'_, G>> {
        if !self.tlas_built {
            return None;
        }
        let lens = &self.config.lens;
        let inverse = camera.invert().unwrap_or_else(cgmath::Matrix4::identity);
        Some(SceneBindings {
            samplers: &self.samplers,
            materials: self.material_buffer.as_ref()?,
            views: self.registry.views(),
            draw_calls: self.registry.draw_calls(),
            transforms: self.registry.transform_buffer()?,
            tlas: self.tlas.as_ref()?,
            push_constants: RayTracingPushConstants {
                camera_transform: camera.into(),
                inverse_camera_transform: inverse.into(),
                half_fov: lens.half_fov_radians(),
                focal_length: lens.focal_length,
                focal_distance: lens.focal_distance,
                aperture_size: lens.aperture_size,
                max_coc_diameter: lens.max_coc_diameter,
                far_plane_distance: lens.far_plane_distance,
                _padding: [0.0; 2],
            },
        })
    }

    pub fn set_active(&mut self, instance_id: usize, active: bool) -> Result<(), SceneError> {
        self.registry.set_active(instance_id, active)
    }

    pub fn set_transform(
        &mut self,
        gpu: &G,
        instance_id: usize,
        transform: cgmath::Matrix4<f32>,
    ) -> Result<(), SceneError> {
        self.registry.set_transform(gpu, instance_id, transform)
    }

    pub fn set_asset_transform(
        &mut self,
        gpu: &G,
        asset_index: usize,
        transform: cgmath::Matrix4<f32>,
    ) -> Result<(), SceneError> {
        self.registry.set_asset_transform(gpu, asset_index, transform)
    }
}
