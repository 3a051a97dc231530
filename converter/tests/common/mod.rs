//! Shared document fixtures for the integration tests.

#![allow(dead_code)]

use redlilium_converter::document::{
    AnimationSource, ChannelSource, ChannelTarget, ControllerInstance, DataSource, Document,
    GeometryInstance, GeometrySource, Node, NodeId, NodeTransform, PrimitiveInput,
    PrimitiveSource, SamplerSource, SkinSource, VertexInputs,
};

pub const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Row-major translation matrix.
pub fn translation(x: f32, y: f32, z: f32) -> [f32; 16] {
    let mut m = IDENTITY;
    m[3] = x;
    m[7] = y;
    m[11] = z;
    m
}

/// Unit cube: 8 positions, 12 triangles, indices referencing positions only.
pub fn cube_source() -> GeometrySource {
    #[rustfmt::skip]
    let positions = vec![
        0.0, 0.0, 0.0,  1.0, 0.0, 0.0,  1.0, 1.0, 0.0,  0.0, 1.0, 0.0,
        0.0, 0.0, 1.0,  1.0, 0.0, 1.0,  1.0, 1.0, 1.0,  0.0, 1.0, 1.0,
    ];
    #[rustfmt::skip]
    let indices = vec![
        0, 2, 1,  0, 3, 2, // bottom
        4, 5, 6,  4, 6, 7, // top
        0, 1, 5,  0, 5, 4, // front
        2, 3, 7,  2, 7, 6, // back
        1, 2, 6,  1, 6, 5, // right
        3, 0, 4,  3, 4, 7, // left
    ];
    GeometrySource {
        name: "cube".into(),
        vertices: VertexInputs {
            position: Some(DataSource::new("cube-positions", positions, 3)),
            ..Default::default()
        },
        primitives: vec![PrimitiveSource::triangles(
            None,
            12,
            vec![PrimitiveInput::vertex(0)],
            indices,
        )],
    }
}

/// Unit quad in the XY plane: 4 positions, 2 triangles.
pub fn quad_source(name: &str) -> GeometrySource {
    GeometrySource {
        name: name.into(),
        vertices: VertexInputs {
            position: Some(DataSource::new(
                format!("{name}-positions"),
                vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
                3,
            )),
            ..Default::default()
        },
        primitives: vec![PrimitiveSource::triangles(
            None,
            2,
            vec![PrimitiveInput::vertex(0)],
            vec![0, 1, 2, 0, 2, 3],
        )],
    }
}

pub fn static_cube_document() -> Document {
    let mut doc = Document::new();
    doc.geometries.push(cube_source());
    doc.add_node(
        Node::new("cube").with_geometry(GeometryInstance {
            geometry: 0,
            materials: vec![],
        }),
        None,
    );
    doc
}

/// A chain of joints `root -> child -> grandchild`, one unit apart along Y.
pub struct Rig {
    pub root: NodeId,
    pub child: NodeId,
    pub grandchild: NodeId,
}

pub fn add_rig(doc: &mut Document) -> Rig {
    let root = doc.add_node(Node::new("root").with_sid("root"), None);
    let child = doc.add_node(
        Node::new("child")
            .with_sid("child")
            .with_transform(NodeTransform::translate([0.0, 1.0, 0.0])),
        Some(root),
    );
    let grandchild = doc.add_node(
        Node::new("grandchild")
            .with_sid("grandchild")
            .with_transform(NodeTransform::translate([0.0, 1.0, 0.0])),
        Some(child),
    );
    Rig {
        root,
        child,
        grandchild,
    }
}

/// Inverse bind matrix (row-major) of a rig joint by name.
pub fn rig_inv_bind(joint: &str) -> [f32; 16] {
    match joint {
        "child" => translation(0.0, -1.0, 0.0),
        "grandchild" => translation(0.0, -2.0, 0.0),
        _ => IDENTITY,
    }
}

/// Skin over `geometry` where every one of its 4 vertices carries the same
/// `(joint, weight)` influences.
pub fn uniform_skin(geometry: usize, joints: &[&str], influences: &[(i32, f32)]) -> SkinSource {
    let weights: Vec<f32> = influences.iter().map(|&(_, w)| w).collect();
    let mut v = Vec::new();
    for _ in 0..4 {
        for (k, &(joint, _)) in influences.iter().enumerate() {
            v.push(joint);
            v.push(k as i32);
        }
    }
    SkinSource {
        name: format!("skin-{geometry}"),
        geometry,
        bind_shape_matrix: IDENTITY,
        joints: Some(joints.iter().map(|j| j.to_string()).collect()),
        inv_bind_matrices: Some(joints.iter().flat_map(|j| rig_inv_bind(j)).collect()),
        weights: Some(weights),
        vcount: vec![influences.len(); 4],
        v,
    }
}

/// Attach skin `skin` to a new top-level node bound to the rig root.
pub fn add_skinned_mesh(doc: &mut Document, name: &str, skin: usize, rig: &Rig) -> NodeId {
    doc.add_node(
        Node::new(name).with_controller(ControllerInstance {
            skin,
            skeletons: vec![rig.root],
            materials: vec![],
        }),
        None,
    )
}

/// Linear curve on the X component of `node`'s first transform.
pub fn linear_x_animation(name: &str, node: NodeId, times: &[f32], values: &[f32]) -> AnimationSource {
    AnimationSource {
        name: name.into(),
        samplers: vec![SamplerSource {
            input: times.to_vec(),
            output: values.to_vec(),
            ..Default::default()
        }],
        channels: vec![ChannelSource {
            sampler: 0,
            target: Some(ChannelTarget { node, transform: 0 }),
            selector: ".X".into(),
        }],
        children: vec![],
    }
}
