//! Error types.
//!
//! Errors are split along the unit that fails: a single asset ([`LoadError`]),
//! the device ([`GpuError`]), a runtime scene edit ([`SceneError`]) or the
//! manifest ([`ManifestError`]). Internal invariant violations are not
//! represented here; they panic.

use thiserror::Error;

/// The device could not complete a submission.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("device lost: {0}")]
    DeviceLost(String),

    #[error("top-level structure holds {capacity} instances but {requested} were requested")]
    TooManyInstances { requested: usize, capacity: usize },

    #[error("GPU resource creation failed: {0}")]
    Resource(String),
}

/// Loading a single asset failed. Already loaded assets are unaffected.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read `{path}`: {message}")]
    Read { path: String, message: String },

    #[error("malformed asset `{asset}`: {reason}")]
    Malformed { asset: String, reason: String },

    #[error("unsupported asset format `{0}`")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Gltf(#[from] gltf::Error),

    #[error(transparent)]
    Obj(#[from] tobj::LoadError),

    #[error("embedded texture index {index} is out of range, the asset embeds {len} textures")]
    EmbeddedIndexOutOfRange { index: usize, len: usize },

    #[error("texture `{identity}` was referenced but its payload was never loaded")]
    MissingTexture { identity: String },

    #[error("texture `{identity}` could not be decoded: {source}")]
    TextureDecode {
        identity: String,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// A runtime edit addressed something the scene does not contain.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("instance {index} does not exist, the scene holds {len} instances")]
    UnknownInstance { index: usize, len: usize },

    #[error("asset {0} has no instances in the scene")]
    UnknownAsset(usize),

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// The asset manifest could not be parsed.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error(transparent)]
    Parse(#[from] toml::de::Error),

    #[error("manifest section `{section}`: {reason}")]
    Section { section: String, reason: String },
}
