//! Geometry instances and their transforms.
//!
//! A [`GeometryInstance`] places one bottom-level structure into the scene. Its
//! transform is kept as a column-major 4x4 matrix; the top-level build consumes
//! the row-major 3x4 form from [`GeometryInstance::transform_rows`].

use cgmath::{Matrix, One, SquareMatrix};

use crate::gpu::Gpu;

/// Position, rotation (as quaternion) and scale of a manifest entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Placement {
    /// Identity placement (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            // `Quaternion::one()` is the identity quaternion (no rotation)
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::new()
    }
}

impl From<cgmath::Vector3<f32>> for Placement {
    fn from(position: cgmath::Vector3<f32>) -> Self {
        Placement {
            position,
            ..Default::default()
        }
    }
}

/// One placement of a bottom-level structure in the scene.
pub struct GeometryInstance<G: Gpu + ?Sized> {
    pub blas: G::Blas,
    pub transform: cgmath::Matrix4<f32>,
    /// Index into the per-attribute buffer view arrays (and the draw calls).
    pub custom_index: u32,
    pub mask: u8,
}

impl<G: Gpu + ?Sized> Clone for GeometryInstance<G> {
    fn clone(&self) -> Self {
        Self {
            blas: self.blas.clone(),
            transform: self.transform,
            custom_index: self.custom_index,
            mask: self.mask,
        }
    }
}

impl<G: Gpu + ?Sized> GeometryInstance<G> {
    pub fn new(blas: G::Blas, custom_index: u32) -> Self {
        Self {
            blas,
            transform: cgmath::Matrix4::identity(),
            custom_index,
            mask: 0xff,
        }
    }

    pub fn set_transform_column_major(&mut self, columns: [[f32; 4]; 4]) -> &mut Self {
        self.transform = columns.into();
        self
    }

    /// The upper 3x4 part of the transform, row by row.
    pub fn transform_rows(&self) -> [f32; 12] {
        let rows = self.transform.transpose();
        let mut out = [0.0; 12];
        for (row, chunk) in [rows.x, rows.y, rows.z].iter().zip(out.chunks_exact_mut(4)) {
            chunk.copy_from_slice(&[row.x, row.y, row.z, row.w]);
        }
        out
    }
}

/// A transform as stored in the GPU-visible transform buffer.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TransformRaw {
    pub model: [[f32; 4]; 4],
}

impl From<cgmath::Matrix4<f32>> for TransformRaw {
    fn from(matrix: cgmath::Matrix4<f32>) -> Self {
        Self {
            model: matrix.into(),
        }
    }
}

impl Default for TransformRaw {
    fn default() -> Self {
        cgmath::Matrix4::identity().into()
    }
}
