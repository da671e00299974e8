//! Texture references and decoded image payloads.
//!
//! Assets name their textures either by a path relative to the asset file or by
//! an index into the asset's embedded-resource table (written `*N`). Both are
//! normalized into a [`TextureIdentity`] which is what deduplication keys on.

use std::{collections::HashMap, fmt};

use image::{GenericImageView, ImageFormat, load_from_memory_with_format};

use crate::{error::LoadError, gpu::BorderModes};

/// Where a texture payload comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureIdentity {
    /// Index into the asset's embedded-resource table.
    Embedded(usize),
    /// Path relative to the asset file.
    File(String),
}

impl TextureIdentity {
    /// Parses an asset texture path. `*3` (optionally preceded by a directory)
    /// names the fourth embedded texture, anything else is a relative file path.
    pub fn parse(path: &str) -> Self {
        let path = clean_up_path(path);
        let embedded = path.rsplit('/').next().and_then(|last| last.strip_prefix('*'));
        match embedded.map(str::parse::<usize>) {
            Some(Ok(index)) => TextureIdentity::Embedded(index),
            _ => TextureIdentity::File(path),
        }
    }
}

impl fmt::Display for TextureIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureIdentity::Embedded(index) => write!(f, "*{index}"),
            TextureIdentity::File(path) => f.write_str(path),
        }
    }
}

/// Normalizes separators so that `a\b.png`, `./a/b.png` and `a/b.png` compare equal.
pub fn clean_up_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    let mut path = path.as_str();
    while let Some(stripped) = path.strip_prefix("./") {
        path = stripped;
    }
    path.to_string()
}

/// A texture slot's reference as authored in the asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureRef {
    pub path: String,
    pub border: BorderModes,
}

impl TextureRef {
    pub fn new(path: impl Into<String>, border: BorderModes) -> Self {
        Self {
            path: path.into(),
            border,
        }
    }

    pub fn identity(&self) -> TextureIdentity {
        TextureIdentity::parse(&self.path)
    }
}

/// Still-encoded image file contents (PNG, JPEG, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, mime_type: Option<&str>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.map(str::to_string),
        }
    }
}

/// All texture payloads an asset can reference.
#[derive(Debug, Clone, Default)]
pub struct TextureTable {
    pub embedded: Vec<EncodedImage>,
    pub external: HashMap<String, EncodedImage>,
}

impl TextureTable {
    pub fn decode(&self, identity: &TextureIdentity) -> Result<ImageData, LoadError> {
        let encoded = match identity {
            TextureIdentity::Embedded(index) => {
                self.embedded
                    .get(*index)
                    .ok_or(LoadError::EmbeddedIndexOutOfRange {
                        index: *index,
                        len: self.embedded.len(),
                    })?
            }
            TextureIdentity::File(path) => {
                self.external
                    .get(path)
                    .ok_or_else(|| LoadError::MissingTexture {
                        identity: path.clone(),
                    })?
            }
        };
        ImageData::from_bytes(&encoded.bytes, encoded.mime_type.as_deref()).map_err(|source| {
            LoadError::TextureDecode {
                identity: identity.to_string(),
                source,
            }
        })
    }
}

/// Decoded RGBA8 pixels ready for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl ImageData {
    /// A 1x1 image of a single colour, used for the fallback textures.
    pub fn solid(colour: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: colour.to_vec(),
        }
    }

    /// Decodes image file contents.
    ///
    /// * `mime_type` is an optional hint such as `image/png`; without it the format is guessed
    pub fn from_bytes(bytes: &[u8], mime_type: Option<&str>) -> Result<Self, image::ImageError> {
        let format = mime_type.and_then(|mime| ImageFormat::from_mime_type(mime));
        let img = match format {
            None => image::load_from_memory(bytes)?,
            Some(fmt) => load_from_memory_with_format(bytes, fmt)?,
        };
        let (width, height) = img.dimensions();
        Ok(Self {
            width,
            height,
            pixels: img.to_rgba8().into_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_embedded_and_file_identities() {
        assert_eq!(TextureIdentity::parse("*3"), TextureIdentity::Embedded(3));
        assert_eq!(TextureIdentity::parse("model.glb/*12"), TextureIdentity::Embedded(12));
        assert_eq!(
            TextureIdentity::parse(".\\textures\\wood.png"),
            TextureIdentity::File("textures/wood.png".to_string())
        );
        assert_eq!(
            TextureIdentity::parse("*not-a-number"),
            TextureIdentity::File("*not-a-number".to_string())
        );
    }
}
