mod common;

use std::rc::Rc;

use common::test_utils::*;
use flow_rtx::{
    config::TextureConfig,
    data_structures::{
        material::{MaterialGpuData, TextureSlot},
        texture::TextureTable,
    },
    error::LoadError,
    gpu::{BorderMode, Command, FilterMode},
    resources::material::convert_for_gpu_usage,
};

const REPEAT: [BorderMode; 2] = [BorderMode::Repeat; 2];
const CLAMP: [BorderMode; 2] = [BorderMode::ClampToEdge; 2];

fn table_with(files: &[&str]) -> TextureTable {
    let mut table = TextureTable::default();
    for (i, file) in files.iter().enumerate() {
        table
            .external
            .insert(file.to_string(), png_texture(2, 2, [i as u8 * 40, 0, 0, 255]));
    }
    table
}

fn assert_in_bounds(materials: &[MaterialGpuData], offset: usize, sampler_count: usize) {
    for material in materials {
        for slot in TextureSlot::ALL {
            let index = material.texture_index(slot);
            assert!(
                index >= offset as i32 && (index as usize) < offset + sampler_count,
                "{slot:?} has index {index}"
            );
        }
    }
}

#[test]
fn every_slot_is_resolved() {
    let gpu = RecordingGpu::new();
    let configs = vec![
        material("textured", &[(TextureSlot::Diffuse, "brick.png", REPEAT)]),
        material("plain", &[]),
    ];
    let batch =
        convert_for_gpu_usage(&gpu, &configs, &table_with(&["brick.png"]), 0, &TextureConfig::default())
            .unwrap();

    assert_eq!(batch.materials.len(), 2);
    assert!(batch.materials.iter().all(MaterialGpuData::is_resolved));
    assert_in_bounds(&batch.materials, 0, batch.samplers.len());
}

#[test]
fn textured_and_untextured_material() {
    let gpu = RecordingGpu::new();
    let configs = vec![
        material("textured", &[(TextureSlot::Diffuse, "brick.png", REPEAT)]),
        material("plain", &[]),
    ];
    let batch =
        convert_for_gpu_usage(&gpu, &configs, &table_with(&["brick.png"]), 0, &TextureConfig::default())
            .unwrap();

    // Colour fallback, normal fallback and the brick texture
    assert_eq!(batch.samplers.len(), 3);
    assert_eq!(batch.stats.fallback_samplers, 1);
    assert_eq!(batch.stats.normal_fallback_samplers, 1);
    assert_eq!(batch.stats.images, 3);

    let fallback = batch.materials[1].texture_index(TextureSlot::Diffuse);
    let normal_fallback = batch.materials[1].texture_index(TextureSlot::Normals);
    let brick = batch.materials[0].texture_index(TextureSlot::Diffuse);
    assert_ne!(fallback, normal_fallback);
    assert_ne!(brick, fallback);
    assert_ne!(brick, normal_fallback);

    // All other slots of both materials share the single colour fallback
    for material in &batch.materials {
        for slot in TextureSlot::ALL {
            match slot {
                TextureSlot::Normals => assert_eq!(material.texture_index(slot), normal_fallback),
                TextureSlot::Diffuse => {}
                _ => assert_eq!(material.texture_index(slot), fallback),
            }
        }
    }
    assert_eq!(batch.materials[1].texture_index(TextureSlot::Diffuse), fallback);

    let brick_sampler = &batch.samplers[brick as usize];
    assert_eq!(brick_sampler.image.width, 2);
    assert_eq!(brick_sampler.filter, FilterMode::Trilinear);
    let fallback_sampler = &batch.samplers[fallback as usize];
    assert_eq!(fallback_sampler.filter, FilterMode::NearestNeighbor);
    assert_eq!(fallback_sampler.image.width, 1);
}

#[test]
fn fallback_colours_come_from_config() {
    let gpu = RecordingGpu::new();
    let config = TextureConfig {
        fallback_color: [1, 2, 3, 4],
        fallback_normal: [5, 6, 7, 8],
        ..Default::default()
    };
    let batch =
        convert_for_gpu_usage(&gpu, &[material("plain", &[])], &TextureTable::default(), 0, &config)
            .unwrap();

    let uploads: Vec<Vec<u8>> = batch
        .commands
        .iter()
        .map(|c| match c {
            Command::UploadImage { data, .. } => data.pixels.clone(),
            other => panic!("unexpected {}", other.name()),
        })
        .collect();
    assert_eq!(uploads, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
}

#[test]
fn one_identity_with_two_border_modes_shares_the_image() {
    let gpu = RecordingGpu::new();
    let configs = vec![
        material("a", &[(TextureSlot::Diffuse, "wood.png", REPEAT)]),
        material("b", &[(TextureSlot::Diffuse, "./wood.png", CLAMP)]),
        material("c", &[(TextureSlot::Specular, "wood.png", REPEAT)]),
    ];
    let batch =
        convert_for_gpu_usage(&gpu, &configs, &table_with(&["wood.png"]), 0, &TextureConfig::default())
            .unwrap();

    let a = batch.materials[0].texture_index(TextureSlot::Diffuse) as usize;
    let b = batch.materials[1].texture_index(TextureSlot::Diffuse) as usize;
    let c = batch.materials[2].texture_index(TextureSlot::Specular) as usize;
    assert_ne!(a, b);
    assert_eq!(a, c);
    assert_eq!(batch.samplers[a].border, REPEAT);
    assert_eq!(batch.samplers[b].border, CLAMP);
    assert!(Rc::ptr_eq(&batch.samplers[a].image, &batch.samplers[b].image));

    // wood.png plus the two fallbacks, each decoded and uploaded once
    assert_eq!(gpu.image_count(), 3);
    let uploads = batch
        .commands
        .iter()
        .filter(|c| matches!(c, Command::UploadImage { .. }))
        .count();
    assert_eq!(uploads, 3);
    assert_eq!(batch.stats.samplers, 4);
}

#[test]
fn conversion_is_idempotent() {
    let configs = vec![
        material("a", &[(TextureSlot::Diffuse, "x.png", REPEAT), (TextureSlot::Normals, "n.png", REPEAT)]),
        material("b", &[(TextureSlot::Emissive, "x.png", CLAMP)]),
    ];
    let table = table_with(&["x.png", "n.png"]);

    let first = convert_for_gpu_usage(&RecordingGpu::new(), &configs, &table, 0, &TextureConfig::default())
        .unwrap();
    let second = convert_for_gpu_usage(&RecordingGpu::new(), &configs, &table, 0, &TextureConfig::default())
        .unwrap();

    assert_eq!(first.materials, second.materials);
    assert_eq!(first.stats, second.stats);
}

#[test]
fn sampler_offset_is_applied() {
    let gpu = RecordingGpu::new();
    let configs = vec![material("a", &[(TextureSlot::Diffuse, "x.png", REPEAT)])];
    let batch =
        convert_for_gpu_usage(&gpu, &configs, &table_with(&["x.png"]), 7, &TextureConfig::default())
            .unwrap();

    assert_in_bounds(&batch.materials, 7, batch.samplers.len());
    let diffuse = batch.materials[0].texture_index(TextureSlot::Diffuse);
    assert_eq!(batch.samplers[diffuse as usize - 7].image.label, "x.png");
}

#[test]
fn embedded_index_out_of_range() {
    let gpu = RecordingGpu::new();
    let mut table = TextureTable::default();
    table.embedded.push(png_texture(1, 1, [0, 0, 0, 255]));
    let configs = vec![material("a", &[(TextureSlot::Diffuse, "*3", REPEAT)])];

    let result = convert_for_gpu_usage(&gpu, &configs, &table, 0, &TextureConfig::default());
    assert!(matches!(
        result,
        Err(LoadError::EmbeddedIndexOutOfRange { index: 3, len: 1 })
    ));
}

#[test]
fn embedded_textures_are_decoded() {
    let gpu = RecordingGpu::new();
    let mut table = TextureTable::default();
    table.embedded.push(png_texture(1, 1, [0, 0, 0, 255]));
    table.embedded.push(png_texture(4, 2, [0, 255, 0, 255]));
    let configs = vec![material("a", &[(TextureSlot::Diffuse, "*1", REPEAT)])];

    let batch = convert_for_gpu_usage(&gpu, &configs, &table, 0, &TextureConfig::default()).unwrap();
    let diffuse = batch.materials[0].texture_index(TextureSlot::Diffuse) as usize;
    assert_eq!(batch.samplers[diffuse].image.width, 4);
    assert_eq!(batch.samplers[diffuse].image.height, 2);
}

#[test]
fn missing_external_payload() {
    let gpu = RecordingGpu::new();
    let configs = vec![material("a", &[(TextureSlot::Diffuse, "gone.png", REPEAT)])];
    let result = convert_for_gpu_usage(&gpu, &configs, &TextureTable::default(), 0, &TextureConfig::default());
    assert!(matches!(result, Err(LoadError::MissingTexture { .. })));
}
