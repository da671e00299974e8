//! The wgpu implementation of [`Gpu`].
//!
//! [`Context`] wraps a device and queue created by the host application. The
//! device must have been requested with [`Context::required_features`].
//!
//! wgpu tracks resource usage and inserts the necessary synchronization itself,
//! so [`Command::Barrier`] only shows up in trace logs here.

use std::sync::Arc;

use crate::{
    data_structures::texture::ImageData,
    error::GpuError,
    gpu::{BorderMode, BorderModes, BufferUsage, Command, FilterMode, Gpu},
};

/// Vertex positions are tightly packed `[f32; 3]`.
const VERTEX_STRIDE: u64 = std::mem::size_of::<[f32; 3]>() as u64;
const MIN_BUFFER_SIZE: u64 = 16;

#[derive(Debug)]
pub struct GpuImage {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// An image together with the sampler that reads it. Several samplers may share
/// one image.
#[derive(Debug, Clone)]
pub struct CombinedImageSampler {
    pub image: Arc<GpuImage>,
    pub sampler: wgpu::Sampler,
}

#[derive(Debug)]
pub struct BottomLevel {
    pub blas: wgpu::Blas,
    pub size: wgpu::BlasTriangleGeometrySizeDescriptor,
}

#[derive(Debug)]
pub struct TopLevel {
    pub tlas: wgpu::Tlas,
    pub max_instances: u32,
}

#[derive(Debug, Clone)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl Context {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    /// Features the device has to be created with.
    pub fn required_features() -> wgpu::Features {
        wgpu::Features::EXPERIMENTAL_RAY_QUERY
    }

    fn address_mode(&self, mode: BorderMode) -> wgpu::AddressMode {
        match mode {
            BorderMode::Repeat => wgpu::AddressMode::Repeat,
            BorderMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
            BorderMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            BorderMode::ClampToBorder
                if self
                    .device
                    .features()
                    .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER) =>
            {
                wgpu::AddressMode::ClampToBorder
            }
            BorderMode::ClampToBorder => wgpu::AddressMode::ClampToEdge,
        }
    }

    fn upload_image(&self, image: &GpuImage, data: &ImageData) {
        let size = wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            &data.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * data.width),
                rows_per_image: Some(data.height),
            },
            size,
        );
    }

    fn record(
        &self,
        commands: Vec<Command<'_, Self>>,
    ) -> Result<wgpu::CommandEncoder, GpuError> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene commands"),
            });

        for command in commands {
            log::trace!("recording {}", command.name());
            match command {
                Command::FillBuffer { buffer, mut data } => {
                    data.resize(data.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
                    if data.len() as u64 > buffer.size() {
                        return Err(GpuError::Resource(format!(
                            "{} bytes do not fit a buffer of {} bytes",
                            data.len(),
                            buffer.size()
                        )));
                    }
                    self.queue.write_buffer(&buffer, 0, &data);
                }
                Command::UploadImage { image, data } => self.upload_image(&image, &data),
                Command::Barrier(barrier) => log::trace!("{barrier:?} is tracked by wgpu"),
                Command::BuildBlas {
                    blas,
                    positions,
                    indices,
                } => {
                    let entry = wgpu::BlasBuildEntry {
                        blas: &blas.blas,
                        geometry: wgpu::BlasGeometries::TriangleGeometries(vec![
                            wgpu::BlasTriangleGeometry {
                                size: &blas.size,
                                vertex_buffer: &positions,
                                first_vertex: 0,
                                vertex_stride: VERTEX_STRIDE,
                                index_buffer: Some(&indices),
                                first_index: Some(0),
                                transform_buffer: None,
                                transform_buffer_offset: None,
                            },
                        ]),
                    };
                    encoder.build_acceleration_structures(std::iter::once(&entry), std::iter::empty());
                }
                Command::BuildTlas { tlas, instances } => {
                    if instances.len() > tlas.max_instances as usize {
                        return Err(GpuError::TooManyInstances {
                            requested: instances.len(),
                            capacity: tlas.max_instances as usize,
                        });
                    }
                    for (i, instance) in instances.iter().enumerate() {
                        tlas.tlas[i] = Some(wgpu::TlasInstance::new(
                            &instance.blas.blas,
                            instance.transform_rows(),
                            instance.custom_index,
                            instance.mask,
                        ));
                    }
                    for i in instances.len()..tlas.max_instances as usize {
                        tlas.tlas[i] = None;
                    }
                    encoder.build_acceleration_structures(std::iter::empty(), std::iter::once(&tlas.tlas));
                }
            }
        }
        Ok(encoder)
    }
}

/// Texel and mip-level filtering for a [`FilterMode`].
fn sampler_filters(filter: FilterMode) -> (wgpu::FilterMode, wgpu::MipmapFilterMode) {
    match filter {
        FilterMode::NearestNeighbor => (wgpu::FilterMode::Nearest, wgpu::MipmapFilterMode::Nearest),
        FilterMode::Bilinear => (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Nearest),
        FilterMode::Trilinear => (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Linear),
    }
}

impl Gpu for Context {
    type Buffer = wgpu::Buffer;
    type Image = Arc<GpuImage>;
    type ImageSampler = CombinedImageSampler;
    type Blas = Arc<BottomLevel>;
    type Tlas = TopLevel;
    type Submission = wgpu::SubmissionIndex;

    fn create_buffer(&self, label: &str, usage: BufferUsage, size: u64) -> Result<Self::Buffer, GpuError> {
        let usage = match usage {
            BufferUsage::AccelerationInput => {
                wgpu::BufferUsages::BLAS_INPUT | wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST
            }
            BufferUsage::Attribute => {
                wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST
            }
            BufferUsage::Storage => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        };
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size.max(MIN_BUFFER_SIZE).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
            usage,
            mapped_at_creation: false,
        }))
    }

    fn create_image(&self, label: &str, width: u32, height: u32) -> Result<Self::Image, GpuError> {
        if width == 0 || height == 0 {
            return Err(GpuError::Resource(format!("image `{label}` is {width}x{height}")));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Arc::new(GpuImage { texture, view }))
    }

    fn create_image_sampler(
        &self,
        image: Self::Image,
        filter: FilterMode,
        border: BorderModes,
    ) -> Result<Self::ImageSampler, GpuError> {
        let (filter, mipmap_filter) = sampler_filters(filter);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: self.address_mode(border[0]),
            address_mode_v: self.address_mode(border[1]),
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter,
            border_color: border
                .contains(&BorderMode::ClampToBorder)
                .then_some(wgpu::SamplerBorderColor::TransparentBlack),
            ..Default::default()
        });
        Ok(CombinedImageSampler { image, sampler })
    }

    fn create_blas(&self, label: &str, vertex_count: u32, index_count: u32) -> Result<Self::Blas, GpuError> {
        let size = wgpu::BlasTriangleGeometrySizeDescriptor {
            vertex_format: wgpu::VertexFormat::Float32x3,
            vertex_count,
            index_format: Some(wgpu::IndexFormat::Uint32),
            index_count: Some(index_count),
            flags: wgpu::AccelerationStructureGeometryFlags::OPAQUE,
        };
        let blas = self.device.create_blas(
            &wgpu::CreateBlasDescriptor {
                label: Some(label),
                flags: wgpu::AccelerationStructureFlags::PREFER_FAST_TRACE,
                // Static geometry, never refit
                update_mode: wgpu::AccelerationStructureUpdateMode::Build,
            },
            wgpu::BlasGeometrySizeDescriptors::Triangles {
                descriptors: vec![size.clone()],
            },
        );
        Ok(Arc::new(BottomLevel { blas, size }))
    }

    fn create_tlas(&self, label: &str, max_instances: u32) -> Result<Self::Tlas, GpuError> {
        let tlas = self.device.create_tlas(&wgpu::CreateTlasDescriptor {
            label: Some(label),
            max_instances: max_instances.max(1),
            flags: wgpu::AccelerationStructureFlags::PREFER_FAST_TRACE,
            update_mode: wgpu::AccelerationStructureUpdateMode::Build,
        });
        Ok(TopLevel {
            tlas,
            max_instances: max_instances.max(1),
        })
    }

    fn submit_and_wait(&self, commands: Vec<Command<'_, Self>>) -> Result<(), GpuError> {
        let index = self.submit(commands)?;

        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        self.queue.on_submitted_work_done(move || {
            // The receiver only goes away if the wait below already failed
            let _ = tx.send(());
        });
        #[cfg(target_arch = "wasm32")]
        self.device
            .poll(wgpu::PollType::Poll)
            .map_err(|e| GpuError::DeviceLost(e.to_string()))?;
        #[cfg(not(target_arch = "wasm32"))]
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index),
                timeout: None,
            })
            .map_err(|e| GpuError::DeviceLost(e.to_string()))?;
        futures::executor::block_on(rx.receive())
            .ok_or_else(|| GpuError::DeviceLost("submission never completed".to_string()))
    }

    fn submit(&self, commands: Vec<Command<'_, Self>>) -> Result<Self::Submission, GpuError> {
        let encoder = self.record(commands)?;
        Ok(self.queue.submit(Some(encoder.finish())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_modes_map_to_sampler_filters() {
        assert_eq!(
            sampler_filters(FilterMode::NearestNeighbor),
            (wgpu::FilterMode::Nearest, wgpu::MipmapFilterMode::Nearest)
        );
        assert_eq!(
            sampler_filters(FilterMode::Bilinear),
            (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Nearest)
        );
        assert_eq!(
            sampler_filters(FilterMode::Trilinear),
            (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Linear)
        );
    }
}
