//! The asset manifest.
//!
//! A manifest is a TOML document in which every table names one asset:
//!
//! ```toml
//! [sponza]
//! path = "sponza/sponza.gltf"
//!
//! [lamp]
//! path = "lamp.obj"
//! position = [1.0, 0.0, -2.5]
//! rotation = [0.0, 0.0, 0.0, 1.0] # x, y, z, w
//! scale = [0.5, 0.5, 0.5]
//! ```
//!
//! Sections are loaded in lexicographic order of their names. Placements are
//! parsed and handed out with each entry but not applied by the loader.

use crate::{data_structures::instance::Placement, error::ManifestError};

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub section: String,
    /// Relative to the configured asset root.
    pub path: String,
    pub placement: Placement,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn parse(source: &str) -> Result<Self, ManifestError> {
        let table: toml::Table = source.parse()?;
        let mut entries = table
            .iter()
            .map(|(section, value)| parse_section(section, value))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| a.section.cmp(&b.section));
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_section(section: &str, value: &toml::Value) -> Result<ManifestEntry, ManifestError> {
    let err = |reason: String| ManifestError::Section {
        section: section.to_string(),
        reason,
    };
    let table = value
        .as_table()
        .ok_or_else(|| err("expected a table".to_string()))?;
    let path = match table.get("path") {
        Some(toml::Value::String(path)) if !path.is_empty() => path.clone(),
        Some(toml::Value::String(_)) => return Err(err("`path` is empty".to_string())),
        Some(_) => return Err(err("`path` must be a string".to_string())),
        None => return Err(err("missing `path`".to_string())),
    };

    let mut placement = Placement::new();
    if let Some(value) = table.get("position") {
        placement.position = read_floats::<3>(value).map_err(|r| err(format!("`position` {r}")))?.into();
    }
    if let Some(value) = table.get("rotation") {
        let [x, y, z, w] = read_floats::<4>(value).map_err(|r| err(format!("`rotation` {r}")))?;
        placement.rotation = cgmath::Quaternion::new(w, x, y, z);
    }
    if let Some(value) = table.get("scale") {
        placement.scale = read_floats::<3>(value).map_err(|r| err(format!("`scale` {r}")))?.into();
    }

    Ok(ManifestEntry {
        section: section.to_string(),
        path,
        placement,
    })
}

fn read_floats<const N: usize>(value: &toml::Value) -> Result<[f32; N], String> {
    let array = value
        .as_array()
        .filter(|array| array.len() == N)
        .ok_or_else(|| format!("must be an array of {N} numbers"))?;
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(array) {
        *slot = match item {
            toml::Value::Float(f) => *f as f32,
            toml::Value::Integer(i) => *i as f32,
            other => return Err(format!("contains `{other}` which is not a number")),
        };
    }
    Ok(out)
}
