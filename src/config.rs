//! Scene configuration.
//!
//! Everything is optional when read from TOML; missing keys fall back to the
//! defaults below.
//!
//! ```toml
//! asset_root = "assets"
//! frames_in_flight = 2
//!
//! [textures]
//! filter = "bilinear"
//!
//! [lens]
//! aperture_size = 0.004
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::gpu::FilterMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Directory that manifest paths are relative to.
    pub asset_root: PathBuf,
    /// How many submissions of the top-level rebuild may be alive at once.
    pub frames_in_flight: usize,
    pub textures: TextureConfig,
    pub lens: LensConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            frames_in_flight: 1,
            textures: TextureConfig::default(),
            lens: LensConfig::default(),
        }
    }
}

impl SceneConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

/// Sampling of asset textures and the colours of the fallback textures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    pub filter: FilterMode,
    /// Used for every missing slot except normal maps.
    pub fallback_color: [u8; 4],
    /// A normal pointing straight out of the surface.
    pub fallback_normal: [u8; 4],
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            filter: FilterMode::Trilinear,
            fallback_color: [255, 255, 255, 255],
            fallback_normal: [127, 127, 255, 255],
        }
    }
}

/// Thin-lens camera parameters handed to the ray-tracing stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    pub focal_length: f32,
    pub focal_distance: f32,
    pub aperture_size: f32,
    pub max_coc_diameter: f32,
    pub far_plane_distance: f32,
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            focal_length: 0.02,
            focal_distance: 1.0,
            aperture_size: 0.001,
            max_coc_diameter: 0.02,
            far_plane_distance: 1000.0,
            field_of_view: 90.0,
        }
    }
}

impl LensConfig {
    pub fn half_fov_radians(&self) -> f32 {
        self.field_of_view.to_radians() * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SceneConfig::from_toml_str(
            r#"
            frames_in_flight = 3

            [textures]
            filter = "nearest_neighbor"
            "#,
        )
        .unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.textures.filter, FilterMode::NearestNeighbor);
        assert_eq!(config.textures.fallback_normal, [127, 127, 255, 255]);
        assert_eq!(config.asset_root, PathBuf::from("assets"));
        assert_eq!(config.lens, LensConfig::default());
    }
}
