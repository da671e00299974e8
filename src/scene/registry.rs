//! The scene registry: every geometry instance of the session, its activation
//! flag, its transform, the asset it came from and the buffers shaders read.
//!
//! Instances are appended when an asset has been loaded completely and are never
//! removed. Toggling activation marks the top-level structure for a rebuild;
//! transform edits only re-upload the transform buffer.

use crate::{
    data_structures::{
        draw_call::DrawCallRecord,
        instance::{GeometryInstance, TransformRaw},
    },
    error::{GpuError, SceneError},
    geometry::StagedGeometry,
    gpu::{BufferUsage, Command, Gpu, staged_buffer},
};

/// Per-attribute buffer lists, indexed by an instance's custom index.
pub struct ViewLists<G: Gpu> {
    pub positions: Vec<G::Buffer>,
    pub indices: Vec<G::Buffer>,
    pub normals: Vec<G::Buffer>,
    pub tangents: Vec<G::Buffer>,
    pub bitangents: Vec<G::Buffer>,
    pub tex_coords: Vec<G::Buffer>,
}

impl<G: Gpu> Default for ViewLists<G> {
    fn default() -> Self {
        Self {
            positions: Vec::new(),
            indices: Vec::new(),
            normals: Vec::new(),
            tangents: Vec::new(),
            bitangents: Vec::new(),
            tex_coords: Vec::new(),
        }
    }
}

impl<G: Gpu> ViewLists<G> {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

pub struct SceneRegistry<G: Gpu> {
    instances: Vec<GeometryInstance<G>>,
    active: Vec<bool>,
    asset_of_instance: Vec<usize>,
    transforms: Vec<TransformRaw>,
    views: ViewLists<G>,
    draw_calls: Vec<DrawCallRecord<G>>,
    blas: Vec<G::Blas>,
    transform_buffer: Option<G::Buffer>,
    pending: Vec<GeometryInstance<G>>,
    rebuild_required: bool,
}

impl<G: Gpu> Default for SceneRegistry<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Gpu> SceneRegistry<G> {
    pub fn new() -> Self {
        Self {
            instances: Vec::new(),
            active: Vec::new(),
            asset_of_instance: Vec::new(),
            transforms: Vec::new(),
            views: ViewLists::default(),
            draw_calls: Vec::new(),
            blas: Vec::new(),
            transform_buffer: None,
            pending: Vec::new(),
            rebuild_required: false,
        }
    }

    fn assert_parallel(&self) {
        let len = self.instances.len();
        assert!(
            self.active.len() == len
                && self.asset_of_instance.len() == len
                && self.transforms.len() == len,
            "instance bookkeeping out of sync: {} instances, {} flags, {} asset ids, {} transforms",
            len,
            self.active.len(),
            self.asset_of_instance.len(),
            self.transforms.len()
        );
    }

    /// Adds the geometry of a completely loaded asset. Its instances start active.
    ///
    /// * `material_offset` is the global index of the asset's first material
    pub fn commit(&mut self, staged: StagedGeometry<G>, asset_index: usize, material_offset: usize) {
        let StagedGeometry {
            instances,
            views,
            draw_calls,
            blas,
        } = staged;
        assert_eq!(instances.len(), views.len());
        assert_eq!(instances.len(), draw_calls.len());

        for (instance, view) in instances.into_iter().zip(views) {
            assert_eq!(
                instance.custom_index as usize,
                self.views.len(),
                "custom index must address the instance's own views"
            );
            self.transforms.push(TransformRaw::from(instance.transform));
            self.instances.push(instance);
            self.active.push(true);
            self.asset_of_instance.push(asset_index);
            self.views.positions.push(view.positions);
            self.views.indices.push(view.indices);
            self.views.normals.push(view.normals);
            self.views.tangents.push(view.tangents);
            self.views.bitangents.push(view.bitangents);
            self.views.tex_coords.push(view.tex_coords);
        }
        self.draw_calls.extend(draw_calls.into_iter().map(|mut dc| {
            dc.material_index += material_offset as u32;
            dc
        }));
        self.blas.extend(blas);
        self.rebuild_required = true;
        self.assert_parallel();
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> &[GeometryInstance<G>] {
        &self.instances
    }

    pub fn views(&self) -> &ViewLists<G> {
        &self.views
    }

    pub fn draw_calls(&self) -> &[DrawCallRecord<G>] {
        &self.draw_calls
    }

    pub fn blas_count(&self) -> usize {
        self.blas.len()
    }

    pub fn transforms(&self) -> &[TransformRaw] {
        &self.transforms
    }

    pub fn transform_buffer(&self) -> Option<&G::Buffer> {
        self.transform_buffer.as_ref()
    }

    pub fn is_active(&self, instance_id: usize) -> Option<bool> {
        self.active.get(instance_id).copied()
    }

    pub fn asset_of(&self, instance_id: usize) -> Option<usize> {
        self.asset_of_instance.get(instance_id).copied()
    }

    fn check_instance(&self, instance_id: usize) -> Result<(), SceneError> {
        if instance_id < self.instances.len() {
            Ok(())
        } else {
            Err(SceneError::UnknownInstance {
                index: instance_id,
                len: self.instances.len(),
            })
        }
    }

    /// Creates the transform buffer and uploads every transform.
    pub fn finalize_transforms(&mut self, gpu: &G) -> Result<(), GpuError> {
        let (buffer, fill) = staged_buffer(gpu, "transforms", BufferUsage::Storage, &self.transforms)?;
        gpu.submit_and_wait(vec![fill])?;
        self.transform_buffer = Some(buffer);
        Ok(())
    }

    fn upload_transforms(&mut self, gpu: &G) -> Result<(), GpuError> {
        match &self.transform_buffer {
            Some(buffer) => gpu.submit_and_wait(vec![Command::fill(buffer.clone(), &self.transforms)]),
            None => self.finalize_transforms(gpu),
        }
    }

    /// Replaces the transform of one instance and re-uploads the transform buffer.
    ///
    /// The top-level structure is not marked for a rebuild; it picks the new
    /// transform up with the next activation change.
    pub fn set_transform(
        &mut self,
        gpu: &G,
        instance_id: usize,
        transform: cgmath::Matrix4<f32>,
    ) -> Result<(), SceneError> {
        self.check_instance(instance_id)?;
        self.instances[instance_id].transform = transform;
        self.transforms[instance_id] = transform.into();
        self.upload_transforms(gpu)?;
        Ok(())
    }

    /// Applies `transform` to every instance of an asset with a single upload.
    pub fn set_asset_transform(
        &mut self,
        gpu: &G,
        asset_index: usize,
        transform: cgmath::Matrix4<f32>,
    ) -> Result<(), SceneError> {
        self.assert_parallel();
        let mut found = false;
        for (i, _) in self
            .asset_of_instance
            .iter()
            .enumerate()
            .filter(|(_, asset)| **asset == asset_index)
        {
            self.instances[i].transform = transform;
            self.transforms[i] = transform.into();
            found = true;
        }
        if !found {
            return Err(SceneError::UnknownAsset(asset_index));
        }
        self.upload_transforms(gpu)?;
        Ok(())
    }

    /// Includes or excludes an instance from the next top-level build.
    pub fn set_active(&mut self, instance_id: usize, active: bool) -> Result<(), SceneError> {
        self.check_instance(instance_id)?;
        self.active[instance_id] = active;
        self.rebuild_required = true;
        Ok(())
    }

    pub fn has_updated_geometry(&self) -> bool {
        self.rebuild_required
    }

    /// Requests a rebuild because the top-level structure itself was replaced.
    /// An empty registry has nothing to build.
    pub fn mark_structure_changed(&mut self) {
        if !self.instances.is_empty() {
            self.rebuild_required = true;
        }
    }

    /// Drops every instance from `len` on, together with its views, draw call
    /// and bottom-level structure. Used to undo a partially committed load.
    ///
    /// The transform buffer keeps its contents; entries past `len` are never read.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.instances.len() {
            return;
        }
        self.instances.truncate(len);
        self.active.truncate(len);
        self.asset_of_instance.truncate(len);
        self.transforms.truncate(len);
        self.views.positions.truncate(len);
        self.views.indices.truncate(len);
        self.views.normals.truncate(len);
        self.views.tangents.truncate(len);
        self.views.bitangents.truncate(len);
        self.views.tex_coords.truncate(len);
        self.draw_calls.truncate(len);
        self.blas.truncate(len);
        self.rebuild_required = true;
        self.assert_parallel();
    }

    /// If the active set changed, returns the active instances in registry order
    /// and clears the dirty flag. Returns `None` without doing any work otherwise.
    pub fn materialize_active_set(&mut self) -> Option<Vec<GeometryInstance<G>>> {
        if !self.rebuild_required {
            return None;
        }
        self.assert_parallel();

        self.pending.clear();
        self.pending.extend(
            self.instances
                .iter()
                .zip(&self.active)
                .filter(|(_, active)| **active)
                .map(|(instance, _)| instance.clone()),
        );
        self.rebuild_required = false;
        Some(std::mem::take(&mut self.pending))
    }
}
