use std::path::{Path, PathBuf};

use crate::{
    data_structures::{
        material::MaterialConfig,
        texture::{EncodedImage, TextureIdentity, TextureTable},
    },
    error::LoadError,
    resources::mesh::MeshData,
};

/**
 * This module contains all logic for loading assets, their textures and the manifest
 * from external files, and for turning their materials into GPU form.
 */
pub mod gltf_loader;
pub mod manifest;
pub mod material;
pub mod mesh;
pub mod obj_loader;

/// Triangles of one asset that share a material.
#[derive(Debug, Clone)]
pub struct MaterialGroup {
    pub material: MaterialConfig,
    pub mesh: MeshData,
}

/// An asset as read from disk, before anything is uploaded.
#[derive(Debug, Clone, Default)]
pub struct SceneAsset {
    pub name: String,
    /// One group per distinct material, in the order the asset first uses them.
    pub groups: Vec<MaterialGroup>,
    pub textures: TextureTable,
}

impl SceneAsset {
    pub fn materials(&self) -> Vec<MaterialConfig> {
        self.groups.iter().map(|g| g.material.clone()).collect()
    }

    /// Distinct file textures referenced by any material, in first-reference order.
    pub fn referenced_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        for group in &self.groups {
            for texture in group.material.textures.iter().flatten() {
                if let TextureIdentity::File(path) = texture.identity() {
                    if !files.contains(&path) {
                        files.push(path);
                    }
                }
            }
        }
        files
    }
}

/// Loads a glTF, GLB or OBJ asset together with every texture it references.
pub async fn load_asset(path: &Path) -> Result<SceneAsset, LoadError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let mut asset = match extension.as_str() {
        "gltf" | "glb" => gltf_loader::load_gltf(path).await?,
        "obj" => obj_loader::load_obj(path).await?,
        _ => return Err(LoadError::UnsupportedFormat(path.display().to_string())),
    };

    for file in asset.referenced_files() {
        if asset.textures.external.contains_key(&file) {
            continue;
        }
        let bytes = load_binary(&sibling_path(path, &file)).await?;
        asset.textures.external.insert(file, EncodedImage::new(bytes, None));
    }

    log::debug!(
        "{}: {} material group(s), {} embedded and {} external texture(s)",
        asset.name,
        asset.groups.len(),
        asset.textures.embedded.len(),
        asset.textures.external.len()
    );
    Ok(asset)
}

pub(crate) fn asset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_error(path: &Path, message: impl ToString) -> LoadError {
    LoadError::Read {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

#[cfg(target_arch = "wasm32")]
fn format_url(path: &Path) -> Result<reqwest::Url, LoadError> {
    let window = web_sys::window().ok_or_else(|| read_error(path, "no window"))?;
    let origin = window
        .location()
        .origin()
        .map_err(|_| read_error(path, "no origin"))?;
    let base = reqwest::Url::parse(&format!("{}/", origin)).map_err(|e| read_error(path, e))?;
    base.join(&path.to_string_lossy())
        .map_err(|e| read_error(path, e))
}

pub async fn load_string(path: &Path) -> Result<String, LoadError> {
    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(path)?;
        reqwest::get(url)
            .await
            .map_err(|e| read_error(path, e))?
            .text()
            .await
            .map_err(|e| read_error(path, e))?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| read_error(path, e))?;

    Ok(txt)
}

pub async fn load_binary(path: &Path) -> Result<Vec<u8>, LoadError> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(path)?;
        reqwest::get(url)
            .await
            .map_err(|e| read_error(path, e))?
            .bytes()
            .await
            .map_err(|e| read_error(path, e))?
            .to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| read_error(path, e))?;

    Ok(data)
}

/// Resolves `relative` against the directory of `asset`.
pub(crate) fn sibling_path(asset: &Path, relative: &str) -> PathBuf {
    asset
        .parent()
        .map(|dir| dir.join(relative))
        .unwrap_or_else(|| PathBuf::from(relative))
}
