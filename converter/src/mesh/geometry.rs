//! Geometry orchestration: chunk creation, skinning and merging.

use std::collections::HashMap;

use crate::document::{Document, MaterialBinding, NodeId, SkinSource};
use crate::error::{ConvertError, Result};
use crate::math::{mat4_from_row_major, mat4_inverse_or_identity, Mat4};
use crate::options::SkinningOptions;
use crate::profiling::{profile_function, profile_scope};
use crate::skeleton::{create_skin_bones, Skeleton};

use super::bounding_box::BoundingBox;
use super::chunk::{merge_chunk_data, GeometryChunk};

/// Bone influences kept per vertex.
pub const MAX_INFLUENCES: usize = 4;

/// Bones addressable by the `u8` bone index buffer.
pub const MAX_BONES: usize = 256;

/// Converted mesh: chunks plus an optional skeleton.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub name: String,
    pub chunks: Vec<GeometryChunk>,
    pub skeleton: Option<Skeleton>,
    pub bounding_box: BoundingBox,
}

/// Insert `(bone, weight)` into four slots kept sorted by descending weight.
///
/// The new influence replaces the smallest slot if it is heavier, then moves
/// left past every lighter slot.
pub fn insert_bone(
    weights: &mut [f32; MAX_INFLUENCES],
    bones: &mut [u8; MAX_INFLUENCES],
    weight: f32,
    bone: u8,
) {
    let last = MAX_INFLUENCES - 1;
    if weight <= weights[last] {
        return;
    }
    weights[last] = weight;
    bones[last] = bone;
    let mut i = last;
    while i > 0 && weights[i] > weights[i - 1] {
        weights.swap(i, i - 1);
        bones.swap(i, i - 1);
        i -= 1;
    }
}

fn resolve_material(symbol: Option<&str>, bindings: &[MaterialBinding]) -> Option<usize> {
    let symbol = symbol?;
    bindings
        .iter()
        .find(|b| b.symbol == symbol)
        .map(|b| b.material)
}

impl Geometry {
    /// Geometry with the given chunks; the bounding box is computed.
    pub fn new(name: impl Into<String>, chunks: Vec<GeometryChunk>) -> Self {
        let mut geometry = Self {
            name: name.into(),
            chunks,
            skeleton: None,
            bounding_box: BoundingBox::EMPTY,
        };
        geometry.update_bounding_box();
        geometry
    }

    /// Unskinned geometry from a geometry source.
    ///
    /// Primitives that cannot be de-indexed are skipped. Returns `None` if no
    /// chunk survives.
    pub fn create_static(
        doc: &Document,
        geometry: usize,
        bindings: &[MaterialBinding],
    ) -> Option<Self> {
        profile_function!();
        let Some(source) = doc.geometries.get(geometry) else {
            log::warn!("Geometry #{geometry} does not exist");
            return None;
        };
        let chunks: Vec<GeometryChunk> = source
            .primitives
            .iter()
            .filter_map(|primitive| {
                let material = resolve_material(primitive.material.as_deref(), bindings);
                GeometryChunk::create(source, primitive, material)
            })
            .collect();
        if chunks.is_empty() {
            log::warn!("Geometry '{}' has no usable primitives", source.name);
            return None;
        }
        Some(Self::new(source.name.clone(), chunks))
    }

    /// Skinned geometry from a skin controller.
    ///
    /// Skinning is best effort: when joints, inverse bind matrices or weights
    /// are missing, or a joint cannot be found below the skeleton roots, the
    /// unskinned geometry is returned.
    pub fn create_skin(
        doc: &Document,
        skin: usize,
        skeleton_roots: &[NodeId],
        bindings: &[MaterialBinding],
        options: &SkinningOptions,
    ) -> Option<Self> {
        profile_function!();
        let Some(source) = doc.skins.get(skin) else {
            log::warn!("Skin #{skin} does not exist");
            return None;
        };
        let mut geometry = Self::create_static(doc, source.geometry, bindings)?;
        let bind_shape = mat4_from_row_major(&source.bind_shape_matrix);
        for chunk in &mut geometry.chunks {
            chunk.bind_shape_matrix = bind_shape;
        }

        let roots: Vec<NodeId> = if skeleton_roots.is_empty() {
            log::warn!(
                "Skin '{}' names no skeleton root, searching all top-level nodes",
                source.name
            );
            doc.roots.clone()
        } else {
            skeleton_roots.to_vec()
        };

        let (Some(joints), Some(inv_bind)) = (&source.joints, &source.inv_bind_matrices) else {
            log::warn!(
                "Skin '{}' lacks joints or inverse bind matrices, using unskinned geometry",
                source.name
            );
            return Some(geometry);
        };
        if source.weights.is_none() {
            log::warn!(
                "Skin '{}' has no weights, using unskinned geometry",
                source.name
            );
            return Some(geometry);
        }
        let bones = create_skin_bones(doc, joints, &roots, inv_bind);
        if bones.is_empty() {
            log::warn!(
                "Skin '{}': joints could not be resolved, using unskinned geometry",
                source.name
            );
            return Some(geometry);
        }
        if bones.len() > MAX_BONES {
            log::warn!(
                "Skin '{}' needs {} bones, at most {MAX_BONES} supported, using unskinned geometry",
                source.name,
                bones.len()
            );
            return Some(geometry);
        }

        geometry.compact_skinning_data(source, joints.len(), options);
        geometry.skeleton = Some(Skeleton::new(bones));
        Some(geometry)
    }

    /// Morph targets are not supported.
    pub fn create_morph(doc: &Document, geometry: usize) -> Option<Self> {
        let name = doc
            .geometries
            .get(geometry)
            .map_or("<missing>", |g| g.name.as_str());
        log::error!("Geometry '{name}': morph controllers are not supported");
        None
    }

    /// Reduce every source vertex's influences to four and distribute them
    /// to the de-indexed vertices of every chunk.
    ///
    /// Weights are renormalized to sum to one unless their total lies
    /// outside the configured bounds, in which case the vertex is left as is.
    pub fn compact_skinning_data(
        &mut self,
        skin: &SkinSource,
        joint_count: usize,
        options: &SkinningOptions,
    ) {
        profile_scope!("compact_skinning_data");
        let influences = skin.vertex_influences();

        let mut too_many = 0usize;
        let mut invalid = 0usize;
        let mut compacted: HashMap<usize, ([f32; MAX_INFLUENCES], [u8; MAX_INFLUENCES])> =
            HashMap::new();
        let mut compact = |source_vertex: usize| {
            *compacted.entry(source_vertex).or_insert_with(|| {
                let mut weights = [0.0f32; MAX_INFLUENCES];
                let mut bones = [0u8; MAX_INFLUENCES];
                let list = influences.get(source_vertex).map_or(&[][..], Vec::as_slice);
                if list.len() > MAX_INFLUENCES {
                    too_many += 1;
                }
                for &(joint, weight) in list {
                    if joint < joint_count {
                        insert_bone(&mut weights, &mut bones, weight, joint as u8);
                    }
                }
                let total: f32 = weights.iter().sum();
                if total < options.min_total_weight || total > options.max_total_weight {
                    invalid += 1;
                } else {
                    for w in &mut weights {
                        *w /= total;
                    }
                }
                (weights, bones)
            })
        };

        for chunk in &mut self.chunks {
            let local = chunk.local_indices();
            let mut weights = vec![0.0f32; chunk.vertex_count() * MAX_INFLUENCES];
            let mut bones = vec![0u8; chunk.vertex_count() * MAX_INFLUENCES];
            for (corner, &vertex) in local.iter().enumerate() {
                let Some(source_vertex) = chunk.source_indices.position_index(corner) else {
                    continue;
                };
                let (w, b) = compact(source_vertex as usize);
                let base = vertex as usize * MAX_INFLUENCES;
                weights[base..base + MAX_INFLUENCES].copy_from_slice(&w);
                bones[base..base + MAX_INFLUENCES].copy_from_slice(&b);
            }
            chunk.set_skin_data(&weights, &bones);
        }

        if too_many > 0 {
            log::warn!(
                "Geometry '{}': {too_many} vertices have more than {MAX_INFLUENCES} influences, extra influences dropped",
                self.name
            );
        }
        if invalid > 0 {
            log::warn!(
                "Geometry '{}': {invalid} vertices have a total weight outside [{}, {}], left unnormalized",
                self.name,
                options.min_total_weight,
                options.max_total_weight
            );
        }
    }

    /// Attach the whole geometry rigidly to `node` with a one-bone skeleton
    /// (plus the node's ancestors).
    pub fn bind_to_node(&mut self, doc: &Document, node: NodeId) {
        let skeleton = Skeleton::create_from_node(doc, node);
        for chunk in &mut self.chunks {
            let count = chunk.vertex_count();
            let mut weights = vec![0.0f32; count * MAX_INFLUENCES];
            for w in weights.chunks_exact_mut(MAX_INFLUENCES) {
                w[0] = 1.0;
            }
            chunk.set_skin_data(&weights, &vec![0u8; count * MAX_INFLUENCES]);
        }
        self.skeleton = Some(skeleton);
    }

    /// Whether the geometry carries a skeleton.
    pub fn is_skinned(&self) -> bool {
        self.skeleton.is_some()
    }

    /// Bake every chunk's bind shape matrix into its vertices.
    pub fn apply_bind_shape_matrices(&mut self) {
        for chunk in &mut self.chunks {
            chunk.apply_bind_shape_matrix();
        }
        self.update_bounding_box();
    }

    /// Fold the bind shape matrix into the inverse bind matrices instead of
    /// the vertices. Geometry without a skeleton is baked as usual.
    pub fn fold_bind_shape_into_bones(&mut self) {
        if self.skeleton.is_none() {
            self.apply_bind_shape_matrices();
            return;
        }
        let Some(bind_shape) = self.chunks.first().map(|c| c.bind_shape_matrix) else {
            return;
        };
        if bind_shape == Mat4::identity() {
            return;
        }
        if let Some(skeleton) = self.skeleton.as_mut() {
            for bone in &mut skeleton.bones {
                bone.inv_bind_matrix *= bind_shape;
            }
        }
        for chunk in &mut self.chunks {
            chunk.bind_shape_matrix = Mat4::identity();
        }
    }

    /// Transform every chunk by `m`.
    pub fn transform_geometry(&mut self, m: &Mat4) {
        profile_function!();
        for chunk in &mut self.chunks {
            chunk.transform(m);
        }
        self.update_bounding_box();
    }

    /// Absorb a world rotation and an optional node transform, already
    /// applied to the vertices, into the inverse bind matrices.
    pub fn setup_world_transform(&mut self, rotation: &Mat4, node: Option<&Mat4>) {
        let Some(skeleton) = self.skeleton.as_mut() else {
            return;
        };
        let inv_rotation = mat4_inverse_or_identity(rotation);
        let inv_node = node.map(mat4_inverse_or_identity);
        for bone in &mut skeleton.bones {
            if let Some(inv_node) = &inv_node {
                bone.inv_bind_matrix *= inv_node;
            }
            bone.inv_bind_matrix *= inv_rotation;
        }
    }

    /// Uniformly scale vertices and inverse bind translations.
    pub fn scale_geometry(&mut self, s: f32) {
        for chunk in &mut self.chunks {
            chunk.scale(s);
        }
        if let Some(skeleton) = self.skeleton.as_mut() {
            for bone in &mut skeleton.bones {
                for row in 0..3 {
                    bone.inv_bind_matrix[(row, 3)] *= s;
                }
            }
        }
        self.update_bounding_box();
    }

    /// Replace the skeleton, remapping bone indices of every chunk from the
    /// current skeleton to the new one.
    pub fn set_skeleton(&mut self, skeleton: Skeleton) -> Result<()> {
        if let Some(old) = &self.skeleton {
            let map = old.get_bone_index_map(&skeleton)?;
            for chunk in &mut self.chunks {
                chunk.remap_bone_indices(&map);
            }
        }
        self.skeleton = Some(skeleton);
        Ok(())
    }

    /// Sort the skeleton so that parents precede children.
    pub fn sort_skeleton(&mut self) -> Result<()> {
        let Some(skeleton) = self.skeleton.as_mut() else {
            return Ok(());
        };
        let map = skeleton.sort()?;
        for chunk in &mut self.chunks {
            chunk.remap_bone_indices(&map);
        }
        Ok(())
    }

    /// Pack all chunks into one shared buffer set.
    pub fn merge_chunk_data(&mut self) {
        merge_chunk_data(&mut self.chunks);
    }

    /// Recompute the union of chunk bounding boxes.
    pub fn update_bounding_box(&mut self) {
        self.bounding_box = self
            .chunks
            .iter()
            .fold(BoundingBox::EMPTY, |acc, c| acc.union(c.bounding_box()));
    }

    /// Total vertices over all chunks.
    pub fn vertex_count(&self) -> usize {
        self.chunks.iter().map(GeometryChunk::vertex_count).sum()
    }
}

/// Move all chunks of `geometries` into one geometry with a merged skeleton.
///
/// The source geometries are left without chunks. Fails if the merged
/// skeleton cannot be sorted, cannot be addressed by `u8` indices, or a
/// source skeleton cannot be mapped onto it.
pub fn merge_geometries(
    name: impl Into<String>,
    geometries: &mut [Geometry],
    sort_bones: bool,
) -> Result<Geometry> {
    profile_function!();
    let mut merged_skeleton: Option<Skeleton> = None;
    for skeleton in geometries.iter().filter_map(|g| g.skeleton.as_ref()) {
        merged_skeleton = Some(match merged_skeleton {
            Some(acc) => Skeleton::merge(&acc, skeleton),
            None => Skeleton::merge(&Skeleton::default(), skeleton),
        });
    }

    if let Some(skeleton) = merged_skeleton.as_mut() {
        if skeleton.len() > MAX_BONES {
            return Err(ConvertError::TooManyBones {
                count: skeleton.len(),
            });
        }
        if sort_bones {
            skeleton.sort()?;
        }
    }

    let mut chunks = Vec::new();
    for geometry in geometries.iter_mut() {
        if let Some(skeleton) = &merged_skeleton {
            if geometry.skeleton.is_some() {
                geometry.set_skeleton(skeleton.clone())?;
            }
        }
        chunks.append(&mut geometry.chunks);
        geometry.update_bounding_box();
    }

    let mut result = Geometry::new(name, chunks);
    result.skeleton = merged_skeleton;
    log::info!(
        "Merged {} geometries into '{}': {} chunks, {} bones",
        geometries.len(),
        result.name,
        result.chunks.len(),
        result.skeleton.as_ref().map_or(0, Skeleton::len)
    );
    Ok(result)
}
