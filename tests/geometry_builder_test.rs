mod common;

use common::test_utils::*;
use flow_rtx::{
    error::LoadError,
    geometry::build_asset_geometry,
    gpu::BufferUsage,
    resources::{MaterialGroup, SceneAsset, mesh::MeshData},
};

#[test]
fn each_group_is_uploaded_then_built() {
    let gpu = RecordingGpu::new();
    let staged = build_asset_geometry(&gpu, &quad_asset("crate", &["wood", "metal"]), 0).unwrap();

    assert_eq!(staged.len(), 2);
    let submissions = gpu.submissions();
    assert_eq!(submissions.len(), 2);
    for submission in &submissions {
        assert!(submission.blocking);
        let mut expected = vec!["fill-buffer"; 6];
        expected.extend(["memory-barrier", "build-blas"]);
        assert_eq!(submission.commands, expected);
    }
    assert_eq!(gpu.log.borrow().built_blas, vec![0, 1]);
}

#[test]
fn positions_and_indices_feed_the_bottom_level_build() {
    let gpu = RecordingGpu::new();
    let staged = build_asset_geometry(&gpu, &quad_asset("crate", &["wood"]), 0).unwrap();

    let views = &staged.views[0];
    assert_eq!(views.positions.usage, BufferUsage::AccelerationInput);
    assert_eq!(views.indices.usage, BufferUsage::AccelerationInput);
    assert_eq!(views.normals.usage, BufferUsage::Attribute);

    let positions: Vec<[f32; 3]> = gpu.buffer_data_as(&views.positions);
    assert_eq!(positions.len(), 4);
    let indices: Vec<u32> = gpu.buffer_data_as(&views.indices);
    assert_eq!(indices, vec![0, 1, 2, 0, 2, 3]);

    let log = gpu.log.borrow();
    let blas = &log.blas[0];
    assert_eq!(blas.vertex_count, 4);
    assert_eq!(blas.index_count, 6);
    assert_eq!(blas.label, "crate/wood");

    let draw_call = &staged.draw_calls[0];
    assert_eq!(draw_call.index_count, 6);
    assert_eq!(draw_call.material_index, 0);
}

#[test]
fn custom_indices_continue_after_existing_views() {
    let gpu = RecordingGpu::new();
    let staged = build_asset_geometry(&gpu, &quad_asset("crate", &["a", "b", "c"]), 5).unwrap();

    let custom: Vec<u32> = staged.instances.iter().map(|i| i.custom_index).collect();
    assert_eq!(custom, vec![5, 6, 7]);
    assert!(staged.instances.iter().all(|i| i.mask == 0xff));
}

#[test]
fn empty_groups_are_skipped() {
    let gpu = RecordingGpu::new();
    let mut asset = quad_asset("crate", &["a"]);
    asset.groups.insert(
        0,
        MaterialGroup {
            material: material("empty", &[]),
            mesh: MeshData::default(),
        },
    );

    let staged = build_asset_geometry(&gpu, &asset, 0).unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged.instances[0].custom_index, 0);
    // The draw call still names the group's material within the asset
    assert_eq!(staged.draw_calls[0].material_index, 1);
}

#[test]
fn malformed_mesh_is_rejected_before_upload() {
    let gpu = RecordingGpu::new();
    let mut mesh = quad_mesh();
    mesh.indices.push(42);
    mesh.indices.extend([0, 1]);
    let asset = SceneAsset {
        name: "broken".to_string(),
        groups: vec![MaterialGroup {
            material: material("m", &[]),
            mesh,
        }],
        textures: Default::default(),
    };

    assert!(matches!(
        build_asset_geometry(&gpu, &asset, 0),
        Err(LoadError::Malformed { .. })
    ));
    assert!(gpu.submissions().is_empty());
}

#[test]
fn device_failure_is_reported() {
    let gpu = RecordingGpu::new();
    gpu.fail_submission(1);

    let result = build_asset_geometry(&gpu, &quad_asset("crate", &["a", "b", "c"]), 0);
    assert!(matches!(result, Err(LoadError::Gpu(_))));
    assert_eq!(gpu.submissions().len(), 2);
}
