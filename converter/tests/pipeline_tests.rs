//! End-to-end conversion and export scenarios.
//!
//! Documents are built programmatically, converted with [`convert_document`]
//! and exported, then the exported descriptor and binary data are checked.

mod common;

use rstest::rstest;

use common::{
    add_rig, add_skinned_mesh, init_logger, linear_x_animation, quad_source,
    static_cube_document, uniform_skin,
};
use redlilium_converter::document::{Document, GeometryInstance, Node, NodeTransform};
use redlilium_converter::{
    convert_document, export_rmx, export_threejs, ConvertContext, ConverterOptions,
    ExportOptions,
};

// ============================================================================
// Static geometry
// ============================================================================

#[test]
fn test_static_cube_exports_without_bones() {
    init_logger();
    let mut doc = static_cube_document();
    let mut ctx = ConvertContext::default();
    let scene = convert_document(&mut doc, &mut ctx).unwrap();
    let asset = export_rmx(&scene, &ExportOptions::default()).unwrap();

    let json = &asset.json;
    assert_eq!(json.chunks.len(), 1);
    assert_eq!(json.chunks[0].vertex_count, 8);
    assert_eq!(json.chunks[0].triangle_count, 12);
    assert!(json.chunks[0].boneweight.is_none());
    assert!(json.bones.is_empty());
    assert!(json.animations.is_empty());
    assert_eq!(json.info.bounding_box.min, [0.0, 0.0, 0.0]);
    assert_eq!(json.info.bounding_box.max, [1.0, 1.0, 1.0]);

    let value: serde_json::Value = serde_json::from_str(&asset.to_json_string().unwrap()).unwrap();
    assert_eq!(value["bones"], serde_json::json!([]));
    assert_eq!(value["animations"], serde_json::json!([]));
}

/// Every exported triangle corner must land on the source position its
/// original index referenced.
#[test]
fn test_deindexed_cube_reproduces_source_triangles() {
    init_logger();
    let mut doc = static_cube_document();
    let source = common::cube_source();
    let source_positions = source.vertices.position.as_ref().unwrap().data.clone();
    let source_indices = source.primitives[0].indices.clone();

    let mut ctx = ConvertContext::default();
    let scene = convert_document(&mut doc, &mut ctx).unwrap();
    let asset = export_rmx(&scene, &ExportOptions::default()).unwrap();
    let chunk = &asset.json.chunks[0];
    let indices = chunk.indices.decode::<u16>(&asset.data).unwrap();
    let positions = chunk.position.decode::<f32>(&asset.data).unwrap();

    assert_eq!(indices.len(), source_indices.len());
    for (&exported, &original) in indices.iter().zip(&source_indices) {
        let e = exported as usize * 3;
        let o = original as usize * 3;
        assert_eq!(&positions[e..e + 3], &source_positions[o..o + 3]);
    }
}

// ============================================================================
// Skinning
// ============================================================================

#[test]
fn test_two_bone_skin_weights_are_normalized() {
    init_logger();
    let mut doc = Document::new();
    let rig = add_rig(&mut doc);
    doc.geometries.push(quad_source("quad"));
    doc.skins
        .push(uniform_skin(0, &["root", "child"], &[(0, 0.7), (1, 0.3)]));
    add_skinned_mesh(&mut doc, "quad-mesh", 0, &rig);

    let mut ctx = ConvertContext::default();
    let scene = convert_document(&mut doc, &mut ctx).unwrap();
    let asset = export_rmx(&scene, &ExportOptions::default()).unwrap();

    assert_eq!(asset.json.bones.len(), 2);
    assert_eq!(asset.json.bones[0].name, "root");
    assert_eq!(asset.json.bones[1].parent, 0);

    let chunk = &asset.json.chunks[0];
    let weights = chunk.boneweight.unwrap().decode::<f32>(&asset.data).unwrap();
    let bones = chunk.boneindex.unwrap().decode::<u8>(&asset.data).unwrap();
    assert_eq!(weights.len(), chunk.vertex_count * 4);
    for (w, b) in weights.chunks_exact(4).zip(bones.chunks_exact(4)) {
        let total: f32 = w.iter().sum();
        assert!((total - 1.0).abs() < 1e-5, "weights {w:?} sum to {total}");
        assert_eq!(&w[..2], &[0.7, 0.3]);
        assert_eq!(&b[..2], &[0, 1]);
    }
}

#[test]
fn test_merged_skeletons_share_equal_bones() {
    init_logger();
    let mut doc = Document::new();
    let rig = add_rig(&mut doc);
    doc.geometries.push(quad_source("a"));
    doc.geometries.push(quad_source("b"));
    // Joint order of A differs from the sorted skeleton so its indices must be rewritten.
    doc.skins.push(uniform_skin(0, &["child", "root"], &[(0, 1.0)]));
    doc.skins.push(uniform_skin(
        1,
        &["root", "child", "grandchild"],
        &[(2, 1.0)],
    ));
    add_skinned_mesh(&mut doc, "mesh-a", 0, &rig);
    add_skinned_mesh(&mut doc, "mesh-b", 1, &rig);

    let mut ctx = ConvertContext::default();
    let scene = convert_document(&mut doc, &mut ctx).unwrap();
    let skeleton = scene.skeleton().unwrap();
    let names: Vec<&str> = skeleton.bones.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["root", "child", "grandchild"]);
    assert_eq!(skeleton.bones[2].node, rig.grandchild);

    let asset = export_rmx(&scene, &ExportOptions::default()).unwrap();
    assert_eq!(asset.json.bones.len(), 3);
    let a = &asset.json.chunks[0];
    let b = &asset.json.chunks[1];
    let a_bones = a.boneindex.unwrap().decode::<u8>(&asset.data).unwrap();
    let b_bones = b.boneindex.unwrap().decode::<u8>(&asset.data).unwrap();
    assert!(a_bones.chunks_exact(4).all(|v| v[0] == 1));
    assert!(b_bones.chunks_exact(4).all(|v| v[0] == 2));
}

// ============================================================================
// Animation
// ============================================================================

fn animated_triangle(times: &[f32], values: &[f32]) -> Document {
    let mut doc = Document::new();
    doc.geometries.push(quad_source("quad"));
    let node = doc.add_node(
        Node::new("mover")
            .with_transform(NodeTransform::translate([0.0, 0.0, 0.0]))
            .with_geometry(GeometryInstance {
                geometry: 0,
                materials: vec![],
            }),
        None,
    );
    doc.animations
        .push(linear_x_animation("move", node, times, values));
    doc
}

/// Resampling a linear curve at any rate reproduces the curve exactly,
/// including both end points.
#[rstest]
#[case::source_rate(None, 3)]
#[case::two_fps(Some(2.0), 5)]
#[case::four_fps(Some(4.0), 9)]
#[case::fractional(Some(2.5), 6)]
fn test_resampled_linear_curve_is_exact(#[case] fps: Option<f32>, #[case] frames: usize) {
    init_logger();
    let mut doc = animated_triangle(&[0.0, 1.0, 2.0], &[0.0, 2.0, 4.0]);
    let mut ctx = ConvertContext::new(ConverterOptions {
        animation_fps: fps,
        ..Default::default()
    });
    let scene = convert_document(&mut doc, &mut ctx).unwrap();
    let clip = &scene.animations[0];
    assert_eq!(clip.name, "move");
    assert_eq!(clip.keyframes, frames);
    assert_eq!(clip.duration, 2.0);

    let pos = clip.tracks[0].pos.as_ref().unwrap();
    assert_eq!(pos.len(), frames);
    for (i, p) in pos.iter().enumerate() {
        let expected = 2.0 * clip.frame_time(i);
        assert!((p.x - expected).abs() < 1e-5, "frame {i}: {} != {expected}", p.x);
    }
    assert_eq!(pos[frames - 1].x, 4.0);
    // Sampling leaves the document at rest.
    assert_eq!(doc.nodes[0].transforms[0].data, vec![0.0, 0.0, 0.0]);
}

#[test]
fn test_threejs_export_inlines_animation_keys() {
    init_logger();
    let mut doc = animated_triangle(&[0.0, 1.0], &[0.0, 1.0]);
    let mut ctx = ConvertContext::default();
    let scene = convert_document(&mut doc, &mut ctx).unwrap();
    let model = export_threejs(&scene, &ExportOptions::default());

    assert_eq!(model.metadata.vertices, 4);
    assert_eq!(model.metadata.faces, 2);
    assert_eq!(model.bones.len(), 1);
    assert_eq!(model.skin_weights.len(), 4 * 4);
    let animation = model.animation.unwrap();
    let keys = &animation.hierarchy[0].keys;
    assert_eq!(keys.first().unwrap().time, 0.0);
    assert_eq!(keys.last().unwrap().time, 1.0);
    assert_eq!(keys.last().unwrap().pos, [1.0, 0.0, 0.0]);
}
