use crate::gpu::Gpu;

/// Everything needed to shade the hits on one material group.
///
/// The index of a record equals the custom index of the instance built from
/// the same group.
pub struct DrawCallRecord<G: Gpu + ?Sized> {
    pub positions: G::Buffer,
    pub normals: G::Buffer,
    pub tangents: G::Buffer,
    pub bitangents: G::Buffer,
    pub tex_coords: G::Buffer,
    pub indices: G::Buffer,
    pub index_count: u32,
    /// Global index into the scene's material array.
    pub material_index: u32,
}

impl<G: Gpu + ?Sized> Clone for DrawCallRecord<G> {
    fn clone(&self) -> Self {
        Self {
            positions: self.positions.clone(),
            normals: self.normals.clone(),
            tangents: self.tangents.clone(),
            bitangents: self.bitangents.clone(),
            tex_coords: self.tex_coords.clone(),
            indices: self.indices.clone(),
            index_count: self.index_count,
            material_index: self.material_index,
        }
    }
}
