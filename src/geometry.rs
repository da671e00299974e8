//! Per-object geometry: buffers and bottom-level structures for one asset.

use crate::{
    data_structures::{draw_call::DrawCallRecord, instance::GeometryInstance},
    error::LoadError,
    gpu::{Access, Barrier, BufferUsage, Command, Gpu, Stage, staged_buffer},
    resources::SceneAsset,
};

/// Buffers of one material group. The index of an entry in the scene's view
/// lists is the custom index of the instance built from it.
pub struct AttributeViews<G: Gpu> {
    pub positions: G::Buffer,
    pub indices: G::Buffer,
    pub normals: G::Buffer,
    pub tangents: G::Buffer,
    pub bitangents: G::Buffer,
    pub tex_coords: G::Buffer,
}

/// Geometry of one asset, built and uploaded but not yet part of the scene.
pub struct StagedGeometry<G: Gpu> {
    pub instances: Vec<GeometryInstance<G>>,
    pub views: Vec<AttributeViews<G>>,
    pub draw_calls: Vec<DrawCallRecord<G>>,
    pub blas: Vec<G::Blas>,
}

impl<G: Gpu> StagedGeometry<G> {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Uploads every material group of `asset` and builds one static bottom-level
/// structure per group.
///
/// * `view_offset` is the number of attribute views the scene already holds; group `i`
///   gets custom index `view_offset + i`
///
/// Each group is submitted on its own and waited for. Draw calls reference material
/// `i` of the asset; the caller rebases them once the asset's materials are placed.
pub fn build_asset_geometry<G: Gpu>(
    gpu: &G,
    asset: &SceneAsset,
    view_offset: usize,
) -> Result<StagedGeometry<G>, LoadError> {
    let mut staged = StagedGeometry {
        instances: Vec::with_capacity(asset.groups.len()),
        views: Vec::with_capacity(asset.groups.len()),
        draw_calls: Vec::with_capacity(asset.groups.len()),
        blas: Vec::with_capacity(asset.groups.len()),
    };

    for (material_index, group) in asset.groups.iter().enumerate() {
        let mesh = &group.mesh;
        mesh.validate().map_err(|reason| LoadError::Malformed {
            asset: asset.name.clone(),
            reason: format!("material `{}`: {reason}", group.material.name),
        })?;
        if mesh.is_empty() {
            log::warn!(
                "{}: material `{}` has no triangles, skipping",
                asset.name,
                group.material.name
            );
            continue;
        }

        let label = format!("{}/{}", asset.name, group.material.name);
        let (positions, fill_positions) = staged_buffer(
            gpu,
            &format!("{label} positions"),
            BufferUsage::AccelerationInput,
            &mesh.positions,
        )?;
        let (indices, fill_indices) = staged_buffer(
            gpu,
            &format!("{label} indices"),
            BufferUsage::AccelerationInput,
            &mesh.indices,
        )?;
        let (normals, fill_normals) =
            staged_buffer(gpu, &format!("{label} normals"), BufferUsage::Attribute, &mesh.normals)?;
        let (tangents, fill_tangents) =
            staged_buffer(gpu, &format!("{label} tangents"), BufferUsage::Attribute, &mesh.tangents)?;
        let (bitangents, fill_bitangents) = staged_buffer(
            gpu,
            &format!("{label} bitangents"),
            BufferUsage::Attribute,
            &mesh.bitangents,
        )?;
        let (tex_coords, fill_tex_coords) = staged_buffer(
            gpu,
            &format!("{label} tex coords"),
            BufferUsage::Attribute,
            &mesh.tex_coords,
        )?;

        let blas = gpu.create_blas(&label, mesh.vertex_count() as u32, mesh.indices.len() as u32)?;

        gpu.submit_and_wait(vec![
            fill_positions,
            fill_indices,
            fill_normals,
            fill_tangents,
            fill_bitangents,
            fill_tex_coords,
            // Every buffer has to be transferred before the build reads it
            Command::Barrier(Barrier::memory(
                (Stage::Transfer, Access::TransferWrite),
                (Stage::AccelerationStructureBuild, Access::AccelerationStructureWrite),
            )),
            Command::BuildBlas {
                blas: blas.clone(),
                positions: positions.clone(),
                indices: indices.clone(),
            },
        ])?;

        let custom_index = (view_offset + staged.views.len()) as u32;
        log::debug!(
            "{label}: {} triangles, custom index {custom_index}",
            mesh.triangle_count()
        );

        staged.instances.push(GeometryInstance::new(blas.clone(), custom_index));
        staged.draw_calls.push(DrawCallRecord {
            positions: positions.clone(),
            normals: normals.clone(),
            tangents: tangents.clone(),
            bitangents: bitangents.clone(),
            tex_coords: tex_coords.clone(),
            indices: indices.clone(),
            index_count: mesh.indices.len() as u32,
            material_index: material_index as u32,
        });
        staged.views.push(AttributeViews {
            positions,
            indices,
            normals,
            tangents,
            bitangents,
            tex_coords,
        });
        staged.blas.push(blas);
    }

    Ok(staged)
}
