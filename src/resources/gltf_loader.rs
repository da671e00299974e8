//! glTF 2.0 and GLB loading.
//!
//! Images stored in buffer views or data URIs make up the asset's embedded
//! texture table and are referenced as `*N`; images with a plain URI are
//! referenced by that (file-relative) path. Node transforms of the default scene
//! are baked into the vertices.

use std::{collections::HashMap, path::Path};

use base64::Engine;
use cgmath::{InnerSpace, Matrix, SquareMatrix};

use crate::{
    data_structures::{
        material::{MaterialConfig, TextureSlot},
        texture::{EncodedImage, TextureRef, TextureTable},
    },
    error::LoadError,
    gpu::{BorderMode, BorderModes},
    resources::{MaterialGroup, SceneAsset, asset_name, load_binary, mesh::MeshData, sibling_path},
};

pub async fn load_gltf(path: &Path) -> Result<SceneAsset, LoadError> {
    let name = asset_name(path);
    let bytes = load_binary(path).await?;
    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(&bytes)?;
    let malformed = |reason: String| LoadError::Malformed {
        asset: name.clone(),
        reason,
    };

    // Load buffers
    let mut blob = blob;
    let mut buffer_data: Vec<Vec<u8>> = Vec::new();
    for buffer in document.buffers() {
        let data = match buffer.source() {
            gltf::buffer::Source::Bin => blob
                .take()
                .ok_or_else(|| malformed("binary chunk referenced but missing".to_string()))?,
            gltf::buffer::Source::Uri(uri) => match decode_data_uri(uri) {
                Some(decoded) => decoded.map_err(|e| malformed(format!("buffer {}: {e}", buffer.index())))?.1,
                None => load_binary(&sibling_path(path, uri)).await?,
            },
        };
        if data.len() < buffer.length() {
            return Err(malformed(format!(
                "buffer {} holds {} bytes, {} declared",
                buffer.index(),
                data.len(),
                buffer.length()
            )));
        }
        buffer_data.push(data);
    }

    // Images become embedded textures or file references
    let mut textures = TextureTable::default();
    let mut image_paths = Vec::new();
    for image in document.images() {
        let image_path = match image.source() {
            gltf::image::Source::View { view, mime_type } => {
                let start = view.offset();
                let end = start + view.length();
                let bytes = buffer_data
                    .get(view.buffer().index())
                    .and_then(|b| b.get(start..end))
                    .ok_or_else(|| malformed(format!("image {} exceeds its buffer", image.index())))?;
                textures.embedded.push(EncodedImage::new(bytes.to_vec(), Some(mime_type)));
                format!("*{}", textures.embedded.len() - 1)
            }
            gltf::image::Source::Uri { uri, mime_type } => match decode_data_uri(uri) {
                Some(decoded) => {
                    let (uri_mime, bytes) =
                        decoded.map_err(|e| malformed(format!("image {}: {e}", image.index())))?;
                    let mime = mime_type.map(str::to_string).or(uri_mime);
                    textures.embedded.push(EncodedImage::new(bytes, mime.as_deref()));
                    format!("*{}", textures.embedded.len() - 1)
                }
                None => uri.to_string(),
            },
        };
        image_paths.push(image_path);
    }

    let materials: Vec<MaterialConfig> = document
        .materials()
        .map(|m| material_config(&m, &image_paths))
        .collect();

    // Walk the node hierarchy and group triangles by material
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| malformed("no scene".to_string()))?;
    let mut group_of_material: HashMap<Option<usize>, usize> = HashMap::new();
    let mut groups: Vec<MaterialGroup> = Vec::new();
    let mut tangents_missing = vec![];
    let mut stack: Vec<(gltf::Node, cgmath::Matrix4<f32>)> = scene
        .nodes()
        .map(|node| (node, cgmath::Matrix4::identity()))
        .collect();
    while let Some((node, parent)) = stack.pop() {
        let transform = parent * cgmath::Matrix4::from(node.transform().matrix());
        for child in node.children() {
            stack.push((child, transform));
        }
        let Some(mesh) = node.mesh() else {
            continue;
        };
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "{name}: skipping primitive of mesh {:?} with mode {:?}",
                    mesh.name(),
                    primitive.mode()
                );
                continue;
            }
            let (data, has_tangents) = read_primitive(&primitive, &buffer_data, transform)
                .map_err(|reason| malformed(format!("mesh {:?}: {reason}", mesh.name())))?;
            if data.is_empty() {
                continue;
            }
            let key = primitive.material().index();
            let group = *group_of_material.entry(key).or_insert_with(|| {
                let material = key
                    .and_then(|i| materials.get(i).cloned())
                    .unwrap_or_else(|| MaterialConfig {
                        name: "default".to_string(),
                        ..Default::default()
                    });
                groups.push(MaterialGroup {
                    material,
                    mesh: MeshData::default(),
                });
                tangents_missing.push(false);
                groups.len() - 1
            });
            tangents_missing[group] |= !has_tangents;
            groups[group].mesh.append(data);
        }
    }

    for (group, missing) in groups.iter_mut().zip(tangents_missing) {
        if missing {
            group.mesh.compute_tangents();
        }
        group.mesh.validate().map_err(&malformed)?;
    }

    Ok(SceneAsset {
        name,
        groups,
        textures,
    })
}

/// Reads one triangle primitive with its transform applied.
fn read_primitive(
    primitive: &gltf::Primitive,
    buffers: &[Vec<u8>],
    transform: cgmath::Matrix4<f32>,
) -> Result<(MeshData, bool), String> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
    let normal_matrix = {
        let upper = cgmath::Matrix3::from_cols(
            transform.x.truncate(),
            transform.y.truncate(),
            transform.z.truncate(),
        );
        upper.invert().map(|m| m.transpose()).unwrap_or(upper)
    };

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or("primitive without positions")?
        .map(|p| (transform * cgmath::Vector3::from(p).extend(1.0)).truncate().into())
        .collect();
    let vertex_count = positions.len();

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..vertex_count as u32).collect(),
    };

    let mut mesh = MeshData {
        positions,
        indices,
        ..Default::default()
    };

    match reader.read_normals() {
        Some(normals) => {
            mesh.normals = normals
                .map(|n| safe_normalize(normal_matrix * cgmath::Vector3::from(n)).into())
                .collect();
        }
        None => mesh.normals = face_normals(&mesh),
    }

    mesh.tex_coords = match reader.read_tex_coords(0) {
        Some(tex_coords) => tex_coords.into_f32().collect(),
        None => vec![[0.0; 2]; vertex_count],
    };

    let has_tangents = match reader.read_tangents() {
        Some(tangents) => {
            let tangents: Vec<[f32; 4]> = tangents.collect();
            // GLTF represents tangents as vec4 where the 4th elem can be used to calculate the bitangent
            for (tangent, normal) in tangents.iter().zip(&mesh.normals) {
                let t: cgmath::Vector4<f32> = (*tangent).into();
                let t = safe_normalize(transform_direction(&transform, t.truncate()));
                let n: cgmath::Vector3<f32> = (*normal).into();
                mesh.tangents.push(t.into());
                mesh.bitangents.push((n.cross(t) * t_sign(tangent[3])).into());
            }
            true
        }
        None => {
            mesh.tangents = vec![[0.0; 3]; vertex_count];
            mesh.bitangents = vec![[0.0; 3]; vertex_count];
            false
        }
    };

    mesh.validate()?;
    Ok((mesh, has_tangents))
}

fn t_sign(w: f32) -> f32 {
    if w < 0.0 { -1.0 } else { 1.0 }
}

fn transform_direction(m: &cgmath::Matrix4<f32>, v: cgmath::Vector3<f32>) -> cgmath::Vector3<f32> {
    (m * v.extend(0.0)).truncate()
}

fn safe_normalize(v: cgmath::Vector3<f32>) -> cgmath::Vector3<f32> {
    if v.magnitude2() > f32::EPSILON {
        v.normalize()
    } else {
        v
    }
}

/// Area weighted vertex normals for primitives that don't ship their own.
fn face_normals(mesh: &MeshData) -> Vec<[f32; 3]> {
    let mut normals = vec![cgmath::Vector3::new(0.0f32, 0.0, 0.0); mesh.vertex_count()];
    for tri in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (Some(pa), Some(pb), Some(pc)) = (
            mesh.positions.get(a),
            mesh.positions.get(b),
            mesh.positions.get(c),
        ) else {
            // Out of range indices are reported by `validate`
            continue;
        };
        let pa = cgmath::Vector3::from(*pa);
        let face = (cgmath::Vector3::from(*pb) - pa).cross(cgmath::Vector3::from(*pc) - pa);
        for i in [a, b, c] {
            normals[i] += face;
        }
    }
    normals.into_iter().map(|n| safe_normalize(n).into()).collect()
}

fn border_mode(mode: gltf::texture::WrappingMode) -> BorderMode {
    match mode {
        gltf::texture::WrappingMode::ClampToEdge => BorderMode::ClampToEdge,
        gltf::texture::WrappingMode::MirroredRepeat => BorderMode::MirroredRepeat,
        gltf::texture::WrappingMode::Repeat => BorderMode::Repeat,
    }
}

fn texture_ref(texture: gltf::Texture, image_paths: &[String]) -> Option<TextureRef> {
    let path = image_paths.get(texture.source().index())?;
    let sampler = texture.sampler();
    let border: BorderModes = [border_mode(sampler.wrap_s()), border_mode(sampler.wrap_t())];
    Some(TextureRef::new(path.clone(), border))
}

fn material_config(material: &gltf::Material, image_paths: &[String]) -> MaterialConfig {
    let pbr = material.pbr_metallic_roughness();
    let base_color = pbr.base_color_factor();
    let [er, eg, eb] = material.emissive_factor();

    let mut config = MaterialConfig {
        name: material.name().unwrap_or("unnamed").to_string(),
        diffuse_reflectivity: base_color,
        albedo: base_color,
        emissive_color: [er, eg, eb, 1.0],
        opacity: base_color[3],
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        smoothness: 1.0 - pbr.roughness_factor(),
        ..Default::default()
    };
    if let Some(normal) = material.normal_texture() {
        config.bump_scaling = normal.scale();
    }

    let mut assign = |slot: TextureSlot, texture: Option<(gltf::Texture, u32)>| {
        if let Some((texture, tex_coord)) = texture {
            if tex_coord != 0 {
                log::warn!(
                    "material {}: {slot:?} texture uses coordinate set {tex_coord}, only set 0 is read",
                    config.name
                );
            }
            if let Some(texture) = texture_ref(texture, image_paths) {
                config.set_texture(slot, texture);
            }
        }
    };
    assign(
        TextureSlot::Diffuse,
        pbr.base_color_texture().map(|i| (i.texture(), i.tex_coord())),
    );
    assign(
        TextureSlot::Extra,
        pbr.metallic_roughness_texture().map(|i| (i.texture(), i.tex_coord())),
    );
    assign(
        TextureSlot::Emissive,
        material.emissive_texture().map(|i| (i.texture(), i.tex_coord())),
    );
    assign(
        TextureSlot::Ambient,
        material.occlusion_texture().map(|t| (t.texture(), t.tex_coord())),
    );
    assign(
        TextureSlot::Normals,
        material.normal_texture().map(|n| (n.texture(), n.tex_coord())),
    );
    config
}

type DataUri = (Option<String>, Vec<u8>);

/// `Some` if `uri` is a `data:` URI, carrying its mime type and payload.
fn decode_data_uri(uri: &str) -> Option<Result<DataUri, String>> {
    let rest = uri.strip_prefix("data:")?;
    let Some((header, payload)) = rest.split_once(',') else {
        return Some(Err("data URI without payload".to_string()));
    };
    let (mime, is_base64) = match header.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (header, false),
    };
    let mime = (!mime.is_empty()).then(|| mime.to_string());
    if !is_base64 {
        return Some(Ok((mime, payload.as_bytes().to_vec())));
    }
    Some(
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map(|bytes| (mime, bytes))
            .map_err(|e| e.to_string()),
    )
}
