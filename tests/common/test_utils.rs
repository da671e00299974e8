// Every test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use flow_rtx::{
    data_structures::{
        material::{MaterialConfig, TextureSlot},
        texture::{EncodedImage, ImageData, TextureRef},
    },
    error::GpuError,
    gpu::{BorderModes, BufferUsage, Command, FilterMode, Gpu},
    resources::{MaterialGroup, SceneAsset, mesh::MeshData},
};

#[derive(Debug, Clone, PartialEq)]
pub struct FakeBuffer {
    pub id: usize,
    pub label: String,
    pub usage: BufferUsage,
    pub size: u64,
}

#[derive(Debug, PartialEq)]
pub struct FakeImage {
    pub id: usize,
    pub label: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct FakeSampler {
    pub image: Rc<FakeImage>,
    pub filter: FilterMode,
    pub border: BorderModes,
}

#[derive(Debug, PartialEq)]
pub struct FakeBlas {
    pub id: usize,
    pub label: String,
    pub vertex_count: u32,
    pub index_count: u32,
}

/// Each build keeps `(custom index, row-major transform)` of its instances.
#[derive(Debug, Default)]
pub struct FakeTlas {
    pub max_instances: u32,
    pub builds: Vec<Vec<(u32, [f32; 12])>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub blocking: bool,
    pub commands: Vec<&'static str>,
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub buffers: Vec<FakeBuffer>,
    pub buffer_data: HashMap<usize, Vec<u8>>,
    pub images: Vec<Rc<FakeImage>>,
    pub uploads: Vec<(usize, ImageData)>,
    pub samplers: Vec<FakeSampler>,
    pub blas: Vec<Rc<FakeBlas>>,
    pub built_blas: Vec<usize>,
    pub submissions: Vec<SubmissionRecord>,
}

/// A [`Gpu`] that executes nothing and records everything.
#[derive(Default)]
pub struct RecordingGpu {
    pub log: RefCell<Recorded>,
    fail_submission: Cell<Option<usize>>,
}

impl RecordingGpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `n`th submission from now on (0 = the next one) fail.
    pub fn fail_submission(&self, n: usize) {
        let done = self.log.borrow().submissions.len();
        self.fail_submission.set(Some(done + n));
    }

    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.log.borrow().submissions.clone()
    }

    pub fn sampler_count(&self) -> usize {
        self.log.borrow().samplers.len()
    }

    pub fn image_count(&self) -> usize {
        self.log.borrow().images.len()
    }

    pub fn buffer_data_as<T: bytemuck::Pod>(&self, buffer: &FakeBuffer) -> Vec<T> {
        let log = self.log.borrow();
        let bytes = log.buffer_data.get(&buffer.id).cloned().unwrap_or_default();
        bytes
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    fn run(&self, commands: Vec<Command<'_, Self>>, blocking: bool) -> Result<usize, GpuError> {
        let index = self.log.borrow().submissions.len();
        let names = commands.iter().map(Command::name).collect();
        self.log.borrow_mut().submissions.push(SubmissionRecord {
            blocking,
            commands: names,
        });
        if self.fail_submission.get() == Some(index) {
            return Err(GpuError::DeviceLost(format!("injected failure of submission {index}")));
        }

        let mut log = self.log.borrow_mut();
        for command in commands {
            match command {
                Command::FillBuffer { buffer, data } => {
                    if data.len() as u64 > buffer.size {
                        return Err(GpuError::Resource(format!(
                            "{} bytes into `{}` of {} bytes",
                            data.len(),
                            buffer.label,
                            buffer.size
                        )));
                    }
                    log.buffer_data.insert(buffer.id, data);
                }
                Command::UploadImage { image, data } => log.uploads.push((image.id, data)),
                Command::Barrier(_) => {}
                Command::BuildBlas { blas, .. } => log.built_blas.push(blas.id),
                Command::BuildTlas { tlas, instances } => {
                    if instances.len() > tlas.max_instances as usize {
                        return Err(GpuError::TooManyInstances {
                            requested: instances.len(),
                            capacity: tlas.max_instances as usize,
                        });
                    }
                    tlas.builds.push(
                        instances
                            .iter()
                            .map(|i| (i.custom_index, i.transform_rows()))
                            .collect(),
                    );
                }
            }
        }
        Ok(index)
    }
}

impl Gpu for RecordingGpu {
    type Buffer = FakeBuffer;
    type Image = Rc<FakeImage>;
    type ImageSampler = FakeSampler;
    type Blas = Rc<FakeBlas>;
    type Tlas = FakeTlas;
    type Submission = usize;

    fn create_buffer(&self, label: &str, usage: BufferUsage, size: u64) -> Result<FakeBuffer, GpuError> {
        let mut log = self.log.borrow_mut();
        let buffer = FakeBuffer {
            id: log.buffers.len(),
            label: label.to_string(),
            usage,
            size,
        };
        log.buffers.push(buffer.clone());
        Ok(buffer)
    }

    fn create_image(&self, label: &str, width: u32, height: u32) -> Result<Rc<FakeImage>, GpuError> {
        let mut log = self.log.borrow_mut();
        let image = Rc::new(FakeImage {
            id: log.images.len(),
            label: label.to_string(),
            width,
            height,
        });
        log.images.push(image.clone());
        Ok(image)
    }

    fn create_image_sampler(
        &self,
        image: Rc<FakeImage>,
        filter: FilterMode,
        border: BorderModes,
    ) -> Result<FakeSampler, GpuError> {
        let sampler = FakeSampler {
            image,
            filter,
            border,
        };
        self.log.borrow_mut().samplers.push(sampler.clone());
        Ok(sampler)
    }

    fn create_blas(&self, label: &str, vertex_count: u32, index_count: u32) -> Result<Rc<FakeBlas>, GpuError> {
        let mut log = self.log.borrow_mut();
        let blas = Rc::new(FakeBlas {
            id: log.blas.len(),
            label: label.to_string(),
            vertex_count,
            index_count,
        });
        log.blas.push(blas.clone());
        Ok(blas)
    }

    fn create_tlas(&self, _label: &str, max_instances: u32) -> Result<FakeTlas, GpuError> {
        Ok(FakeTlas {
            max_instances,
            builds: Vec::new(),
        })
    }

    fn submit_and_wait(&self, commands: Vec<Command<'_, Self>>) -> Result<(), GpuError> {
        self.run(commands, true).map(|_| ())
    }

    fn submit(&self, commands: Vec<Command<'_, Self>>) -> Result<usize, GpuError> {
        self.run(commands, false)
    }
}

pub fn png_bytes(width: u32, height: u32, colour: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(colour));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn png_texture(width: u32, height: u32, colour: [u8; 4]) -> EncodedImage {
    EncodedImage::new(png_bytes(width, height, colour), Some("image/png"))
}

pub fn material(name: &str, textures: &[(TextureSlot, &str, BorderModes)]) -> MaterialConfig {
    let mut config = MaterialConfig {
        name: name.to_string(),
        ..Default::default()
    };
    for (slot, path, border) in textures {
        config.set_texture(*slot, TextureRef::new(*path, *border));
    }
    config
}

/// Two triangles in the z = 0 plane.
pub fn quad_mesh() -> MeshData {
    let mut mesh = MeshData {
        positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
        normals: vec![[0.0, 0.0, 1.0]; 4],
        tex_coords: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        indices: vec![0, 1, 2, 0, 2, 3],
        ..Default::default()
    };
    mesh.compute_tangents();
    mesh
}

/// An asset with one untextured quad per name.
pub fn quad_asset(name: &str, groups: &[&str]) -> SceneAsset {
    SceneAsset {
        name: name.to_string(),
        groups: groups
            .iter()
            .map(|g| MaterialGroup {
                material: material(g, &[]),
                mesh: quad_mesh(),
            })
            .collect(),
        textures: Default::default(),
    }
}
