//! Bone hierarchies.
//!
//! A [`Skeleton`] is a flat list of [`Bone`]s whose parent links are indices
//! into the same list. Skeletons are built from skin joint lists or from a
//! single node, completed up to the scene roots, merged by bone equivalence
//! and finally sorted so that parents precede children.

mod bone;
mod pose;

pub use bone::{Bone, BONE_MATRIX_EPSILON};
pub use pose::{bone_local_matrices, bone_poses, BonePose, WorldTransform};

use crate::document::{Document, NodeId};
use crate::error::{ConvertError, Result};
use crate::math::{mat4_from_row_major, mat4_inverse_or_identity};
use crate::profiling::profile_function;

/// Ordered list of bones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

fn node_label(doc: &Document, node: NodeId) -> String {
    let n = doc.node(node);
    n.sid
        .clone()
        .or_else(|| n.id.clone())
        .unwrap_or_else(|| n.name.clone())
}

/// Resolve a skin's joints to bones, then complete the hierarchy.
///
/// Joint `j` becomes bone `j`. Each joint is searched in the candidate roots
/// in order. If any joint cannot be resolved, or the inverse bind array is too
/// short, no bones are returned.
pub fn create_skin_bones(
    doc: &Document,
    joints: &[String],
    skeleton_roots: &[NodeId],
    inv_bind_matrices: &[f32],
) -> Vec<Bone> {
    profile_function!();
    if inv_bind_matrices.len() < joints.len() * 16 {
        log::warn!(
            "Skin has {} joints but only {} inverse bind values",
            joints.len(),
            inv_bind_matrices.len()
        );
        return Vec::new();
    }
    let mut bones = Vec::with_capacity(joints.len());
    for (j, joint) in joints.iter().enumerate() {
        let Some(node) = skeleton_roots
            .iter()
            .find_map(|&root| doc.find_scoped(root, joint))
        else {
            log::warn!("Joint '{joint}' not found in any skeleton root");
            return Vec::new();
        };
        let inv_bind = mat4_from_row_major(&inv_bind_matrices[j * 16..j * 16 + 16]);
        bones.push(Bone::new(joint.clone(), node, inv_bind));
    }
    find_bone_parents(doc, &mut bones);
    update_indices(&mut bones);
    bones
}

/// Assign parents, adding completion bones for ancestors not in the list.
///
/// The list grows while it is scanned, so completion bones get their own
/// parents assigned too, up to the top-level nodes.
pub fn find_bone_parents(doc: &Document, bones: &mut Vec<Bone>) {
    let mut i = 0;
    while i < bones.len() {
        if bones[i].parent.is_none() {
            if let Some(parent_node) = doc.node(bones[i].node).parent {
                let parent = match bones.iter().position(|b| b.node == parent_node) {
                    Some(p) => p,
                    None => {
                        let inv_bind = mat4_inverse_or_identity(&doc.world_matrix(parent_node));
                        bones.push(Bone::completion(
                            node_label(doc, parent_node),
                            parent_node,
                            inv_bind,
                        ));
                        bones.len() - 1
                    }
                };
                bones[i].parent = Some(parent);
            }
        }
        i += 1;
    }
}

/// Set every bone's `index` to its position.
pub fn update_indices(bones: &mut [Bone]) {
    for (i, bone) in bones.iter_mut().enumerate() {
        bone.index = i;
    }
}

/// Insert `src[i]` into `dst`, merging with an equivalent bone if present,
/// and recursively insert its parent chain. Returns the position in `dst`.
pub fn append_bone(dst: &mut Vec<Bone>, src: &[Bone], i: usize) -> usize {
    let bone = &src[i];
    if let Some(existing) = dst.iter().position(|b| b.same_bone(bone)) {
        dst[existing].attached_to_skin |= bone.attached_to_skin;
        if let Some(p) = bone.parent {
            append_bone(dst, src, p);
        }
        return existing;
    }
    let pos = dst.len();
    dst.push(Bone {
        parent: None,
        ..bone.clone()
    });
    if let Some(p) = bone.parent {
        let parent = append_bone(dst, src, p);
        dst[pos].parent = Some(parent);
    }
    pos
}

/// Insert every bone of `src`. Returns the `src` to `dst` index map.
pub fn append_bones(dst: &mut Vec<Bone>, src: &[Bone]) -> Vec<usize> {
    (0..src.len()).map(|i| append_bone(dst, src, i)).collect()
}

impl Skeleton {
    pub fn new(bones: Vec<Bone>) -> Self {
        let mut skeleton = Self { bones };
        skeleton.update_indices();
        skeleton
    }

    /// Skeleton driving geometry rigidly attached to `node`.
    ///
    /// Bone 0 tracks the node itself; its ancestors are added as completion bones.
    pub fn create_from_node(doc: &Document, node: NodeId) -> Self {
        let inv_bind = mat4_inverse_or_identity(&doc.world_matrix(node));
        let mut bones = vec![Bone::new(node_label(doc, node), node, inv_bind)];
        find_bone_parents(doc, &mut bones);
        Self::new(bones)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn update_indices(&mut self) {
        update_indices(&mut self.bones);
    }

    /// Union of two skeletons with equivalent bones merged.
    pub fn merge(a: &Skeleton, b: &Skeleton) -> Skeleton {
        profile_function!();
        let mut bones = Vec::with_capacity(a.len() + b.len());
        append_bones(&mut bones, &a.bones);
        append_bones(&mut bones, &b.bones);
        Skeleton::new(bones)
    }

    /// For every bone of `self`, the index of its equivalent in `other`.
    pub fn get_bone_index_map(&self, other: &Skeleton) -> Result<Vec<usize>> {
        self.bones
            .iter()
            .map(|bone| {
                other
                    .bones
                    .iter()
                    .position(|b| b.same_bone(bone))
                    .ok_or_else(|| ConvertError::BoneNotFound {
                        bone: bone.name.clone(),
                    })
            })
            .collect()
    }

    /// Length of the parent chain of bone `i`.
    pub fn depth(&self, i: usize) -> usize {
        let mut depth = 0;
        let mut current = self.bones[i].parent;
        while let Some(p) = current {
            depth += 1;
            current = self.bones[p].parent;
            if depth > self.bones.len() {
                break;
            }
        }
        depth
    }

    /// Whether every parent precedes its children.
    pub fn bones_sorted(&self) -> bool {
        self.bones
            .iter()
            .enumerate()
            .all(|(i, b)| b.parent.map_or(true, |p| p < i))
    }

    /// Stable sort by `(depth, parent index, index)`.
    ///
    /// Returns the old-to-new index map.
    pub fn sort(&mut self) -> Result<Vec<usize>> {
        profile_function!();
        let mut order: Vec<usize> = (0..self.bones.len()).collect();
        let keys: Vec<(usize, Option<usize>, usize)> = (0..self.bones.len())
            .map(|i| (self.depth(i), self.bones[i].parent, i))
            .collect();
        order.sort_by_key(|&i| keys[i]);

        let mut old_to_new = vec![0; order.len()];
        for (new, &old) in order.iter().enumerate() {
            old_to_new[old] = new;
        }
        let bones = order
            .iter()
            .map(|&old| {
                let bone = &self.bones[old];
                Bone {
                    parent: bone.parent.map(|p| old_to_new[p]),
                    ..bone.clone()
                }
            })
            .collect();
        self.bones = bones;
        self.update_indices();

        if !self.bones_sorted() {
            return Err(ConvertError::SkeletonNotSorted);
        }
        Ok(old_to_new)
    }
}
