//! Wavefront OBJ/MTL loading.

use std::{
    collections::HashMap,
    io::{BufReader, Cursor},
    path::Path,
};

use crate::{
    data_structures::{
        material::{MaterialConfig, TextureSlot},
        texture::{TextureRef, TextureTable},
    },
    error::LoadError,
    gpu::BorderMode,
    resources::{MaterialGroup, SceneAsset, asset_name, load_string, mesh::MeshData, sibling_path},
};

pub async fn load_obj(path: &Path) -> Result<SceneAsset, LoadError> {
    let name = asset_name(path);
    let obj_text = load_string(path).await?;
    let obj_cursor = Cursor::new(obj_text);
    let mut obj_reader = BufReader::new(obj_cursor);

    let (models, obj_materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |p| {
            let mtl_path = sibling_path(path, &p);
            async move {
                let mat_text = load_string(&mtl_path).await.map_err(|e| {
                    log::warn!("{e}");
                    tobj::LoadError::OpenFileFailed
                })?;
                tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(mat_text)))
            }
        },
    )
    .await?;

    // A broken or missing material library still leaves usable geometry
    let obj_materials = obj_materials.unwrap_or_else(|e| {
        log::warn!("{name}: material library could not be loaded ({e}), using defaults");
        Vec::new()
    });
    let materials: Vec<MaterialConfig> = obj_materials.iter().map(material_config).collect();

    let mut group_of_material: HashMap<Option<usize>, usize> = HashMap::new();
    let mut groups: Vec<MaterialGroup> = Vec::new();
    for m in &models {
        let mesh = &m.mesh;
        if mesh.indices.is_empty() {
            continue;
        }
        let vertex_count = mesh.positions.len() / 3;
        let mut data = MeshData {
            positions: (0..vertex_count)
                .map(|i| [mesh.positions[i * 3], mesh.positions[i * 3 + 1], mesh.positions[i * 3 + 2]])
                .collect(),
            normals: (0..vertex_count)
                .map(|i| {
                    [
                        mesh.normals.get(i * 3).map_or(0.0, |f| *f),
                        mesh.normals.get(i * 3 + 1).map_or(0.0, |f| *f),
                        mesh.normals.get(i * 3 + 2).map_or(1.0, |f| *f),
                    ]
                })
                .collect(),
            tex_coords: (0..vertex_count)
                .map(|i| {
                    [
                        mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                        1.0 - mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
                    ]
                })
                .collect(),
            tangents: vec![[0.0; 3]; vertex_count],
            bitangents: vec![[0.0; 3]; vertex_count],
            indices: mesh.indices.clone(),
        };
        // Before the tangent pass, which indexes by vertex
        data.validate().map_err(|reason| LoadError::Malformed {
            asset: name.clone(),
            reason: format!("object `{}`: {reason}", m.name),
        })?;
        data.compute_tangents();

        let key = mesh.material_id.filter(|&id| id < materials.len());
        let group = *group_of_material.entry(key).or_insert_with(|| {
            let material = key.map_or_else(
                || MaterialConfig {
                    name: "default".to_string(),
                    ..Default::default()
                },
                |id| materials[id].clone(),
            );
            groups.push(MaterialGroup {
                material,
                mesh: MeshData::default(),
            });
            groups.len() - 1
        });
        groups[group].mesh.append(data);
    }

    Ok(SceneAsset {
        name,
        groups,
        textures: TextureTable::default(),
    })
}

fn rgb(colour: Option<[f32; 3]>, default: [f32; 4]) -> [f32; 4] {
    colour.map_or(default, |[r, g, b]| [r, g, b, 1.0])
}

fn material_config(m: &tobj::Material) -> MaterialConfig {
    let defaults = MaterialConfig::default();
    let mut config = MaterialConfig {
        name: m.name.clone(),
        diffuse_reflectivity: rgb(m.diffuse, defaults.diffuse_reflectivity),
        albedo: rgb(m.diffuse, defaults.albedo),
        ambient_reflectivity: rgb(m.ambient, defaults.ambient_reflectivity),
        specular_reflectivity: rgb(m.specular, defaults.specular_reflectivity),
        shininess: m.shininess.unwrap_or(defaults.shininess),
        opacity: m.dissolve.unwrap_or(defaults.opacity),
        refraction_index: m.optical_density.unwrap_or(defaults.refraction_index),
        ..defaults
    };

    let slots = [
        (TextureSlot::Diffuse, &m.diffuse_texture),
        (TextureSlot::Specular, &m.specular_texture),
        (TextureSlot::Ambient, &m.ambient_texture),
        (TextureSlot::Normals, &m.normal_texture),
        (TextureSlot::Shininess, &m.shininess_texture),
        (TextureSlot::Opacity, &m.dissolve_texture),
    ];
    for (slot, statement) in slots {
        if let Some(texture) = statement.as_deref().and_then(texture_statement) {
            config.set_texture(slot, texture);
        }
    }
    config
}

/// Parses the arguments of a `map_*` statement: texture options followed by the file name.
///
/// `-clamp on` selects clamp-to-edge in both directions; every other option is skipped.
fn texture_statement(statement: &str) -> Option<TextureRef> {
    let mut tokens = statement.split_whitespace().peekable();
    let mut border = [BorderMode::Repeat; 2];
    while let Some(&token) = tokens.peek() {
        let fixed_args = match token {
            "-clamp" => {
                tokens.next();
                if tokens.next() == Some("on") {
                    border = [BorderMode::ClampToEdge; 2];
                }
                continue;
            }
            "-blendu" | "-blendv" | "-bm" | "-boost" | "-cc" | "-imfchan" | "-texres" | "-type" => 1,
            "-mm" => 2,
            // One to three numbers
            "-o" | "-s" | "-t" => {
                tokens.next();
                for _ in 0..3 {
                    if tokens.next_if(|t| t.parse::<f32>().is_ok()).is_none() {
                        break;
                    }
                }
                continue;
            }
            _ => break,
        };
        tokens.next();
        for _ in 0..fixed_args {
            tokens.next();
        }
    }

    let path = tokens.collect::<Vec<_>>().join(" ");
    if path.is_empty() {
        return None;
    }
    Some(TextureRef::new(path, border))
}
