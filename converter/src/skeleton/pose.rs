//! Bone poses and the global world correction applied to them.

use crate::document::Document;
use crate::math::{
    mat4_from_axis_angle_degrees, quat_to_array, to_scale_rotation_translation, Mat4, Quat, Vec3,
};
use crate::options::ConverterOptions;

use super::Skeleton;

/// Global rotation and uniform scale applied to the whole converted scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldTransform {
    pub rotation: Mat4,
    pub scale: f32,
}

impl Default for WorldTransform {
    fn default() -> Self {
        Self {
            rotation: Mat4::identity(),
            scale: 1.0,
        }
    }
}

impl WorldTransform {
    pub fn new(rotation: Mat4, scale: f32) -> Self {
        Self { rotation, scale }
    }

    /// Rotation around `axis` by `angle_degrees` followed by a uniform scale.
    pub fn from_axis_angle(axis: [f32; 3], angle_degrees: f32, scale: f32) -> Self {
        Self::new(mat4_from_axis_angle_degrees(Vec3::from(axis), angle_degrees), scale)
    }

    pub fn from_options(options: &ConverterOptions) -> Self {
        Self::new(options.world_rotation(), options.world_scale)
    }

    pub fn is_identity(&self) -> bool {
        self.rotation == Mat4::identity() && self.scale == 1.0
    }

    /// Correct a bone's local matrix: root bones are rotated, every
    /// translation is scaled.
    pub fn apply_to_pose(&self, local: &Mat4, is_root: bool) -> Mat4 {
        let mut m = if is_root { self.rotation * local } else { *local };
        for row in 0..3 {
            m[(row, 3)] *= self.scale;
        }
        m
    }
}

/// Decomposed local transform of a bone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BonePose {
    pub pos: Vec3,
    pub rot: Quat,
    pub scl: Vec3,
}

impl Default for BonePose {
    fn default() -> Self {
        Self {
            pos: Vec3::zeros(),
            rot: Quat::identity(),
            scl: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl BonePose {
    pub fn from_matrix(m: &Mat4) -> Self {
        let (scl, rot, pos) = to_scale_rotation_translation(m);
        Self { pos, rot, scl }
    }

    /// `[x, y, z, w]` rotation.
    pub fn rot_array(&self) -> [f32; 4] {
        quat_to_array(self.rot)
    }
}

/// Local matrix of every bone from the document's current transform values.
pub fn bone_local_matrices(doc: &Document, skeleton: &Skeleton, world: &WorldTransform) -> Vec<Mat4> {
    skeleton
        .bones
        .iter()
        .map(|bone| {
            let local = doc.node(bone.node).local_matrix();
            world.apply_to_pose(&local, bone.parent.is_none())
        })
        .collect()
}

/// Decomposed local pose of every bone from the document's current values.
pub fn bone_poses(doc: &Document, skeleton: &Skeleton, world: &WorldTransform) -> Vec<BonePose> {
    bone_local_matrices(doc, skeleton, world)
        .iter()
        .map(BonePose::from_matrix)
        .collect()
}
