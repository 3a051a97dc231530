//! Skinned joints.

use crate::document::NodeId;
use crate::math::{mat4_approx_eq, Mat4};

/// Per-component tolerance for comparing inverse bind matrices.
pub const BONE_MATRIX_EPSILON: f32 = 1e-5;

/// One joint of a skeleton.
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    /// Scene node whose transform drives this bone.
    pub node: NodeId,
    /// Index of the parent bone in the same skeleton.
    pub parent: Option<usize>,
    /// Position in the owning skeleton.
    pub index: usize,
    pub inv_bind_matrix: Mat4,
    /// Referenced by a skin joint list, as opposed to added to complete the hierarchy.
    pub attached_to_skin: bool,
}

impl Bone {
    /// Bone referenced by a skin.
    pub fn new(name: impl Into<String>, node: NodeId, inv_bind_matrix: Mat4) -> Self {
        Self {
            name: name.into(),
            node,
            parent: None,
            index: 0,
            inv_bind_matrix,
            attached_to_skin: true,
        }
    }

    /// Bone added only to complete the hierarchy.
    pub fn completion(name: impl Into<String>, node: NodeId, inv_bind_matrix: Mat4) -> Self {
        Self {
            attached_to_skin: false,
            ..Self::new(name, node, inv_bind_matrix)
        }
    }

    /// Merge equivalence: same node and inverse bind matrices equal within
    /// [`BONE_MATRIX_EPSILON`].
    pub fn same_bone(&self, other: &Bone) -> bool {
        self.node == other.node
            && mat4_approx_eq(&self.inv_bind_matrix, &other.inv_bind_matrix, BONE_MATRIX_EPSILON)
    }
}
