//! The device seam.
//!
//! Everything that talks to the GPU goes through [`Gpu`]: resources are created
//! immediately, while data transfers, barriers and acceleration-structure builds
//! are described as a list of [`Command`]s that is submitted either blocking
//! ([`Gpu::submit_and_wait`], used while loading) or fire-and-forget
//! ([`Gpu::submit`], used by the per-frame rebuild).
//!
//! [`crate::context::Context`] implements the trait on top of wgpu.

use serde::{Deserialize, Serialize};

use crate::{
    data_structures::{instance::GeometryInstance, texture::ImageData},
    error::GpuError,
};

/// How a sampler treats texture coordinates outside of `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

/// Border handling for the U and V axis.
pub type BorderModes = [BorderMode; 2];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    NearestNeighbor,
    Bilinear,
    #[default]
    Trilinear,
}

/// What a buffer is going to be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Positions and indices that feed a bottom-level build and are also read by shaders.
    AccelerationInput,
    /// Per-vertex attributes read by shaders through the custom index.
    Attribute,
    /// Materials and transforms.
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Transfer,
    AccelerationStructureBuild,
    RayTracingShader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    TransferWrite,
    AccelerationStructureWrite,
    AccelerationStructureRead,
}

/// A queue-wide barrier. It covers every resource on the queue, not a single one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Barrier {
    Execution {
        src: Stage,
        dst: Stage,
    },
    Memory {
        src: (Stage, Access),
        dst: (Stage, Access),
    },
}

impl Barrier {
    pub fn execution(src: Stage, dst: Stage) -> Self {
        Barrier::Execution { src, dst }
    }

    pub fn memory(src: (Stage, Access), dst: (Stage, Access)) -> Self {
        Barrier::Memory { src, dst }
    }
}

/// One recorded step of a submission.
pub enum Command<'a, G: Gpu + ?Sized> {
    FillBuffer {
        buffer: G::Buffer,
        data: Vec<u8>,
    },
    UploadImage {
        image: G::Image,
        data: ImageData,
    },
    Barrier(Barrier),
    /// Static build, the structure is never refit afterwards.
    BuildBlas {
        blas: G::Blas,
        positions: G::Buffer,
        indices: G::Buffer,
    },
    /// Full rebuild of the top-level structure from `instances`.
    BuildTlas {
        tlas: &'a mut G::Tlas,
        instances: Vec<GeometryInstance<G>>,
    },
}

impl<G: Gpu + ?Sized> Command<'_, G> {
    pub fn fill<T: bytemuck::Pod>(buffer: G::Buffer, data: &[T]) -> Self {
        Command::FillBuffer {
            buffer,
            data: bytemuck::cast_slice(data).to_vec(),
        }
    }

    /// Short name used in trace logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::FillBuffer { .. } => "fill-buffer",
            Command::UploadImage { .. } => "upload-image",
            Command::Barrier(Barrier::Execution { .. }) => "execution-barrier",
            Command::Barrier(Barrier::Memory { .. }) => "memory-barrier",
            Command::BuildBlas { .. } => "build-blas",
            Command::BuildTlas { .. } => "build-tlas",
        }
    }
}

/// A GPU device plus its single submission queue.
pub trait Gpu {
    type Buffer: Clone;
    /// Reference counted: cloning shares the image, it never copies the payload.
    type Image: Clone;
    type ImageSampler: Clone;
    type Blas: Clone;
    type Tlas;
    type Submission;

    fn create_buffer(
        &self,
        label: &str,
        usage: BufferUsage,
        size: u64,
    ) -> Result<Self::Buffer, GpuError>;

    fn create_image(&self, label: &str, width: u32, height: u32) -> Result<Self::Image, GpuError>;

    fn create_image_sampler(
        &self,
        image: Self::Image,
        filter: FilterMode,
        border: BorderModes,
    ) -> Result<Self::ImageSampler, GpuError>;

    /// Bottom-level structure sized for one triangle list; built later via [`Command::BuildBlas`].
    fn create_blas(
        &self,
        label: &str,
        vertex_count: u32,
        index_count: u32,
    ) -> Result<Self::Blas, GpuError>;

    fn create_tlas(&self, label: &str, max_instances: u32) -> Result<Self::Tlas, GpuError>;

    /// Records and submits `commands`, then blocks until the device finished them.
    fn submit_and_wait(&self, commands: Vec<Command<'_, Self>>) -> Result<(), GpuError>;

    /// Records and submits `commands` without waiting.
    fn submit(&self, commands: Vec<Command<'_, Self>>) -> Result<Self::Submission, GpuError>;
}

/// Creates a buffer large enough for `data` and the command that fills it.
pub fn staged_buffer<'a, G: Gpu, T: bytemuck::Pod>(
    gpu: &G,
    label: &str,
    usage: BufferUsage,
    data: &[T],
) -> Result<(G::Buffer, Command<'a, G>), GpuError> {
    let size = std::mem::size_of_val(data) as u64;
    let buffer = gpu.create_buffer(label, usage, size)?;
    Ok((buffer.clone(), Command::fill(buffer, data)))
}
