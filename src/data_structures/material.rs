//! Material descriptors in their asset form and their GPU form.

use crate::data_structures::texture::TextureRef;

/// Number of texture slots every material carries.
pub const TEXTURE_SLOT_COUNT: usize = 12;

/// Names a texture slot of a material. The discriminant is the slot's position
/// in [`MaterialGpuData::texture_indices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureSlot {
    Diffuse = 0,
    Specular,
    Ambient,
    Emissive,
    Height,
    Normals,
    Shininess,
    Opacity,
    Displacement,
    Reflection,
    Lightmap,
    Extra,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; TEXTURE_SLOT_COUNT] = [
        TextureSlot::Diffuse,
        TextureSlot::Specular,
        TextureSlot::Ambient,
        TextureSlot::Emissive,
        TextureSlot::Height,
        TextureSlot::Normals,
        TextureSlot::Shininess,
        TextureSlot::Opacity,
        TextureSlot::Displacement,
        TextureSlot::Reflection,
        TextureSlot::Lightmap,
        TextureSlot::Extra,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Missing normal maps get a flat normal instead of the neutral colour.
    pub fn is_normal_map(self) -> bool {
        self == TextureSlot::Normals
    }
}

/// Stable location of one texture slot inside a material array.
///
/// Slots are recorded before their sampler index is known and patched once it
/// is; an index pair stays valid no matter how the owning array moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotAddress {
    pub material: usize,
    pub slot: TextureSlot,
}

/// A distinct material configuration as read from an asset.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialConfig {
    pub name: String,

    pub diffuse_reflectivity: [f32; 4],
    pub ambient_reflectivity: [f32; 4],
    pub specular_reflectivity: [f32; 4],
    pub emissive_color: [f32; 4],
    pub transparent_color: [f32; 4],
    pub reflective_color: [f32; 4],
    pub albedo: [f32; 4],

    pub opacity: f32,
    pub bump_scaling: f32,
    pub shininess: f32,
    pub shininess_strength: f32,
    pub refraction_index: f32,
    pub reflectivity: f32,
    pub metallic: f32,
    pub smoothness: f32,
    pub sheen: f32,
    pub thickness: f32,
    pub roughness: f32,
    pub anisotropy: f32,
    pub transmission: f32,

    pub anisotropy_rotation: [f32; 4],
    pub custom_data: [f32; 4],

    pub textures: [Option<TextureRef>; TEXTURE_SLOT_COUNT],
    /// Per slot `[offset.u, offset.v, tiling.u, tiling.v]`.
    pub offset_tiling: [[f32; 4]; TEXTURE_SLOT_COUNT],
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse_reflectivity: [1.0, 1.0, 1.0, 1.0],
            ambient_reflectivity: [0.0; 4],
            specular_reflectivity: [0.0; 4],
            emissive_color: [0.0; 4],
            transparent_color: [0.0; 4],
            reflective_color: [0.0; 4],
            albedo: [1.0, 1.0, 1.0, 1.0],
            opacity: 1.0,
            bump_scaling: 1.0,
            shininess: 0.0,
            shininess_strength: 0.0,
            refraction_index: 1.0,
            reflectivity: 0.0,
            metallic: 0.0,
            smoothness: 0.0,
            sheen: 0.0,
            thickness: 0.0,
            roughness: 1.0,
            anisotropy: 0.0,
            transmission: 0.0,
            anisotropy_rotation: [0.0; 4],
            custom_data: [0.0; 4],
            textures: std::array::from_fn(|_| None),
            offset_tiling: [[0.0, 0.0, 1.0, 1.0]; TEXTURE_SLOT_COUNT],
        }
    }
}

impl MaterialConfig {
    pub fn texture(&self, slot: TextureSlot) -> Option<&TextureRef> {
        self.textures[slot.index()].as_ref()
    }

    pub fn set_texture(&mut self, slot: TextureSlot, texture: TextureRef) {
        self.textures[slot.index()] = Some(texture);
    }
}

/// The GPU layout of a material. Texture indices point into the scene's
/// combined image-sampler array.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialGpuData {
    pub diffuse_reflectivity: [f32; 4],
    pub ambient_reflectivity: [f32; 4],
    pub specular_reflectivity: [f32; 4],
    pub emissive_color: [f32; 4],
    pub transparent_color: [f32; 4],
    pub reflective_color: [f32; 4],
    pub albedo: [f32; 4],

    pub opacity: f32,
    pub bump_scaling: f32,
    pub shininess: f32,
    pub shininess_strength: f32,

    pub refraction_index: f32,
    pub reflectivity: f32,
    pub metallic: f32,
    pub smoothness: f32,

    pub sheen: f32,
    pub thickness: f32,
    pub roughness: f32,
    pub anisotropy: f32,

    pub transmission: f32,
    pub _padding: [f32; 3],

    pub anisotropy_rotation: [f32; 4],
    pub custom_data: [f32; 4],

    pub texture_indices: [i32; TEXTURE_SLOT_COUNT],
    pub offset_tiling: [[f32; 4]; TEXTURE_SLOT_COUNT],
}

impl MaterialGpuData {
    /// Marks a slot whose sampler has not been assigned yet.
    pub const UNRESOLVED: i32 = -1;

    pub fn texture_index(&self, slot: TextureSlot) -> i32 {
        self.texture_indices[slot.index()]
    }

    pub fn is_resolved(&self) -> bool {
        self.texture_indices.iter().all(|&index| index >= 0)
    }
}

impl From<&MaterialConfig> for MaterialGpuData {
    fn from(mc: &MaterialConfig) -> Self {
        Self {
            diffuse_reflectivity: mc.diffuse_reflectivity,
            ambient_reflectivity: mc.ambient_reflectivity,
            specular_reflectivity: mc.specular_reflectivity,
            emissive_color: mc.emissive_color,
            transparent_color: mc.transparent_color,
            reflective_color: mc.reflective_color,
            albedo: mc.albedo,
            opacity: mc.opacity,
            bump_scaling: mc.bump_scaling,
            shininess: mc.shininess,
            shininess_strength: mc.shininess_strength,
            refraction_index: mc.refraction_index,
            reflectivity: mc.reflectivity,
            metallic: mc.metallic,
            smoothness: mc.smoothness,
            sheen: mc.sheen,
            thickness: mc.thickness,
            roughness: mc.roughness,
            anisotropy: mc.anisotropy,
            transmission: mc.transmission,
            _padding: [0.0; 3],
            anisotropy_rotation: mc.anisotropy_rotation,
            custom_data: mc.custom_data,
            texture_indices: [Self::UNRESOLVED; TEXTURE_SLOT_COUNT],
            offset_tiling: mc.offset_tiling,
        }
    }
}
