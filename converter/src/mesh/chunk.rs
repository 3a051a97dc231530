//! De-indexed vertex/index buffers and the chunk views into them.
//!
//! A [`GeometryChunk`] is one single-material slice of triangle data. Right
//! after creation each chunk owns its [`GeometryData`]; after
//! [`merge_chunk_data`] every chunk is a view into one shared buffer set and
//! only touches its own `(vertex_offset, vertex_count)` range.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::document::{DataSource, GeometrySource, PrimitiveKind, PrimitiveSource, Semantic};
use crate::math::{normal_matrix, transform_point, Mat4, Vec3};
use crate::profiling::profile_function;

use super::bounding_box::BoundingBox;

/// Parallel per-vertex buffers plus a triangle index buffer.
///
/// All present per-vertex buffers describe the same number of vertices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryData {
    /// Triangle indices, three per triangle.
    pub indices: Vec<u32>,
    /// `xyz` per vertex.
    pub position: Vec<f32>,
    /// `xyz` per vertex.
    pub normal: Option<Vec<f32>>,
    /// `uv` per vertex.
    pub texcoord: Option<Vec<f32>>,
    /// Four weights per vertex, sorted descending.
    pub boneweight: Option<Vec<f32>>,
    /// Four bone indices per vertex, parallel to `boneweight`.
    pub boneindex: Option<Vec<u8>>,
}

impl GeometryData {
    /// Number of vertices described by the position buffer.
    pub fn vertex_count(&self) -> usize {
        self.position.len() / 3
    }
}

/// Buffer set shared between chunks.
pub type SharedGeometryData = Arc<RwLock<GeometryData>>;

/// Copy of a primitive's multi-stream index block.
///
/// Kept so that per-source-vertex data (skin weights) can be redistributed to
/// de-indexed vertices after chunk creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceIndices {
    /// Indices per corner.
    pub stride: usize,
    /// Offset of the position index inside a corner.
    pub offset: usize,
    pub indices: Vec<u32>,
}

impl SourceIndices {
    /// Source position index of triangle corner `corner`.
    pub fn position_index(&self, corner: usize) -> Option<u32> {
        self.indices.get(corner * self.stride + self.offset).copied()
    }
}

/// One single-material slice of a geometry.
#[derive(Debug, Clone)]
pub struct GeometryChunk {
    pub name: String,
    /// Index into the document material list.
    pub material: Option<usize>,
    data: SharedGeometryData,
    vertex_offset: usize,
    vertex_count: usize,
    index_offset: usize,
    triangle_count: usize,
    bounding_box: BoundingBox,
    /// Pending bind shape matrix; identity once applied.
    pub bind_shape_matrix: Mat4,
    pub source_indices: SourceIndices,
}

/// First corner of a de-indexed vertex, by input kind.
fn attribute_value(
    per_vertex: Option<&DataSource>,
    per_corner: Option<(&DataSource, usize)>,
    source_indices: &SourceIndices,
    corner: usize,
    position_index: u32,
    components: usize,
    out: &mut Vec<f32>,
) {
    let (source, index) = match (per_vertex, per_corner) {
        (Some(src), _) => (src, position_index as usize),
        (None, Some((src, offset))) => {
            let i = source_indices
                .indices
                .get(corner * source_indices.stride + offset)
                .copied()
                .unwrap_or(u32::MAX);
            (src, i as usize)
        }
        (None, None) => {
            out.extend(std::iter::repeat(0.0).take(components));
            return;
        }
    };
    for c in 0..components {
        out.push(source.get(index, c).unwrap_or(0.0));
    }
}

impl GeometryChunk {
    /// De-index one triangle primitive of `geometry`.
    ///
    /// Returns `None` (with an error logged) if the primitive is not made of
    /// triangles, has no usable position input, or its index block does not
    /// match the declared triangle count. Missing normals and texture
    /// coordinates are zero-filled with a warning.
    pub fn create(
        geometry: &GeometrySource,
        primitive: &PrimitiveSource,
        material: Option<usize>,
    ) -> Option<Self> {
        profile_function!();
        let name = geometry.name.clone();

        match primitive.kind {
            PrimitiveKind::Triangles => {}
            PrimitiveKind::Polylist
                if primitive.vcount.len() == primitive.count
                    && primitive.vcount.iter().all(|&n| n == 3) => {}
            kind => {
                log::error!("Geometry '{name}': unsupported primitive {kind:?}, chunk skipped");
                return None;
            }
        }

        let Some(vertex_input) = primitive.input(Semantic::Vertex) else {
            log::error!("Geometry '{name}': primitive has no VERTEX input, chunk skipped");
            return None;
        };
        let Some(position) = geometry.vertices.position.as_ref() else {
            log::error!("Geometry '{name}': missing POSITION source, chunk skipped");
            return None;
        };
        if position.stride != 3 {
            log::error!(
                "Geometry '{name}': POSITION stride is {}, expected 3, chunk skipped",
                position.stride
            );
            return None;
        }

        let stride = primitive.index_stride();
        let corner_count = primitive.count * 3;
        if primitive.indices.len() != corner_count * stride {
            log::error!(
                "Geometry '{name}': {} indices do not match {} triangles with stride {stride}, chunk skipped",
                primitive.indices.len(),
                primitive.count
            );
            return None;
        }

        let source_indices = SourceIndices {
            stride,
            offset: vertex_input.offset,
            indices: primitive.indices.clone(),
        };

        // Position-index deduplication: each distinct source position becomes
        // one output vertex, numbered in order of first appearance.
        let mut remap: HashMap<u32, u32> = HashMap::new();
        let mut first_corner: Vec<(usize, u32)> = Vec::new();
        let mut indices = Vec::with_capacity(corner_count);
        for corner in 0..corner_count {
            let Some(pos_index) = source_indices.position_index(corner) else {
                log::error!("Geometry '{name}': truncated index block, chunk skipped");
                return None;
            };
            if pos_index as usize >= position.count {
                log::error!(
                    "Geometry '{name}': position index {pos_index} out of range ({}), chunk skipped",
                    position.count
                );
                return None;
            }
            let next = first_corner.len() as u32;
            let vertex = *remap.entry(pos_index).or_insert_with(|| {
                first_corner.push((corner, pos_index));
                next
            });
            indices.push(vertex);
        }
        let vertex_count = first_corner.len();

        let mut positions = Vec::with_capacity(vertex_count * 3);
        for &(corner, pos_index) in &first_corner {
            attribute_value(
                Some(position),
                None,
                &source_indices,
                corner,
                pos_index,
                3,
                &mut positions,
            );
        }

        let per_vertex_normal = geometry.vertices.normal.as_ref().filter(|s| s.stride == 3);
        let per_corner_normal = primitive
            .input(Semantic::Normal)
            .and_then(|i| i.source.as_ref().filter(|s| s.stride == 3).map(|s| (s, i.offset)));
        if per_vertex_normal.is_none() && per_corner_normal.is_none() {
            log::warn!("Geometry '{name}': no usable NORMAL input, normals zero-filled");
        }
        let mut normals = Vec::with_capacity(vertex_count * 3);
        for &(corner, pos_index) in &first_corner {
            attribute_value(
                per_vertex_normal,
                per_corner_normal,
                &source_indices,
                corner,
                pos_index,
                3,
                &mut normals,
            );
        }

        let per_vertex_uv = geometry.vertices.texcoord.as_ref().filter(|s| s.stride >= 2);
        let per_corner_uv = primitive
            .input(Semantic::Texcoord)
            .and_then(|i| i.source.as_ref().filter(|s| s.stride >= 2).map(|s| (s, i.offset)));
        if per_vertex_uv.is_none() && per_corner_uv.is_none() {
            log::warn!("Geometry '{name}': no usable TEXCOORD input, texture coordinates zero-filled");
        }
        let mut texcoords = Vec::with_capacity(vertex_count * 2);
        for &(corner, pos_index) in &first_corner {
            attribute_value(
                per_vertex_uv,
                per_corner_uv,
                &source_indices,
                corner,
                pos_index,
                2,
                &mut texcoords,
            );
        }

        let data = GeometryData {
            indices,
            position: positions,
            normal: Some(normals),
            texcoord: Some(texcoords),
            boneweight: None,
            boneindex: None,
        };
        log::debug!(
            "Geometry '{name}': chunk with {vertex_count} vertices, {} triangles",
            primitive.count
        );
        Some(Self::from_data(name, material, data, source_indices))
    }

    /// Chunk owning the given buffers.
    pub fn from_data(
        name: impl Into<String>,
        material: Option<usize>,
        data: GeometryData,
        source_indices: SourceIndices,
    ) -> Self {
        let bounding_box = BoundingBox::from_positions(&data.position);
        let vertex_count = data.vertex_count();
        let triangle_count = data.indices.len() / 3;
        Self {
            name: name.into(),
            material,
            data: Arc::new(RwLock::new(data)),
            vertex_offset: 0,
            vertex_count,
            index_offset: 0,
            triangle_count,
            bounding_box,
            bind_shape_matrix: Mat4::identity(),
            source_indices,
        }
    }

    /// Buffer set this chunk views.
    pub fn data(&self) -> &SharedGeometryData {
        &self.data
    }

    /// First vertex of this chunk inside its buffer set.
    pub fn vertex_offset(&self) -> usize {
        self.vertex_offset
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// First index (not triangle) of this chunk inside its buffer set.
    pub fn index_offset(&self) -> usize {
        self.index_offset
    }

    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    fn vertex_range(&self, components: usize) -> std::ops::Range<usize> {
        self.vertex_offset * components..(self.vertex_offset + self.vertex_count) * components
    }

    fn index_range(&self) -> std::ops::Range<usize> {
        self.index_offset..self.index_offset + self.triangle_count * 3
    }

    /// Triangle indices relative to this chunk's first vertex.
    pub fn local_indices(&self) -> Vec<u32> {
        let data = self.data.read();
        let base = self.vertex_offset as u32;
        data.indices[self.index_range()]
            .iter()
            .map(|&i| i - base)
            .collect()
    }

    /// Positions of this chunk.
    pub fn positions(&self) -> Vec<f32> {
        self.data.read().position[self.vertex_range(3)].to_vec()
    }

    pub fn normals(&self) -> Option<Vec<f32>> {
        let range = self.vertex_range(3);
        self.data.read().normal.as_ref().map(|n| n[range].to_vec())
    }

    pub fn texcoords(&self) -> Option<Vec<f32>> {
        let range = self.vertex_range(2);
        self.data.read().texcoord.as_ref().map(|t| t[range].to_vec())
    }

    pub fn bone_weights(&self) -> Option<Vec<f32>> {
        let range = self.vertex_range(4);
        self.data.read().boneweight.as_ref().map(|w| w[range].to_vec())
    }

    pub fn bone_indices(&self) -> Option<Vec<u8>> {
        let range = self.vertex_range(4);
        self.data.read().boneindex.as_ref().map(|b| b[range].to_vec())
    }

    /// Whether the chunk carries skinning buffers.
    pub fn is_skinned(&self) -> bool {
        let data = self.data.read();
        data.boneweight.is_some() && data.boneindex.is_some()
    }

    /// Write four weights and four bone indices per vertex into this chunk's range.
    ///
    /// Skinning buffers are allocated for the whole buffer set if absent.
    pub fn set_skin_data(&mut self, weights: &[f32], bones: &[u8]) {
        let range = self.vertex_range(4);
        let mut data = self.data.write();
        let total = data.vertex_count() * 4;
        let boneweight = data.boneweight.get_or_insert_with(|| vec![0.0; total]);
        boneweight[range.clone()].copy_from_slice(&weights[..range.len()]);
        let boneindex = data.boneindex.get_or_insert_with(|| vec![0; total]);
        boneindex[range.clone()].copy_from_slice(&bones[..range.len()]);
    }

    /// Rewrite bone indices through an old-to-new index map.
    ///
    /// Chunks without bone indices are left untouched.
    pub fn remap_bone_indices(&mut self, map: &[usize]) {
        let range = self.vertex_range(4);
        let mut data = self.data.write();
        if let Some(boneindex) = data.boneindex.as_mut() {
            for b in &mut boneindex[range] {
                if let Some(&new) = map.get(*b as usize) {
                    *b = new as u8;
                }
            }
        }
    }

    /// Apply an affine transform: positions by `m`, normals by its inverse-transpose.
    pub fn transform(&mut self, m: &Mat4) {
        let normal_m = normal_matrix(m);
        {
            let range3 = self.vertex_range(3);
            let mut data = self.data.write();
            for p in data.position[range3.clone()].chunks_exact_mut(3) {
                let t = transform_point(m, Vec3::new(p[0], p[1], p[2]));
                p.copy_from_slice(t.as_slice());
            }
            if let Some(normals) = data.normal.as_mut() {
                for n in normals[range3].chunks_exact_mut(3) {
                    let t = normal_m * Vec3::new(n[0], n[1], n[2]);
                    let len = t.norm();
                    let t = if len > 1e-12 { t / len } else { t };
                    n.copy_from_slice(t.as_slice());
                }
            }
        }
        self.update_bounding_box();
    }

    /// Multiply every position component by `s`.
    pub fn scale(&mut self, s: f32) {
        {
            let range = self.vertex_range(3);
            let mut data = self.data.write();
            for v in &mut data.position[range] {
                *v *= s;
            }
        }
        self.update_bounding_box();
    }

    /// Transform by the pending bind shape matrix and reset it to identity.
    pub fn apply_bind_shape_matrix(&mut self) {
        if self.bind_shape_matrix == Mat4::identity() {
            return;
        }
        let m = self.bind_shape_matrix;
        self.transform(&m);
        self.bind_shape_matrix = Mat4::identity();
    }

    /// Recompute the bounding box from current positions.
    pub fn update_bounding_box(&mut self) {
        let range = self.vertex_range(3);
        self.bounding_box = BoundingBox::from_positions(&self.data.read().position[range]);
    }
}

/// Pack all chunks into one shared buffer set.
///
/// An optional attribute is kept only if every chunk has it. Index values are
/// rebased onto the merged vertex numbering and every chunk is repointed at
/// the shared buffers with its new offsets.
pub fn merge_chunk_data(chunks: &mut [GeometryChunk]) {
    profile_function!();
    if chunks.is_empty() {
        return;
    }
    let total_vertices: usize = chunks.iter().map(|c| c.vertex_count).sum();
    let total_triangles: usize = chunks.iter().map(|c| c.triangle_count).sum();

    let (has_normal, has_texcoord, has_skin) = chunks.iter().fold((true, true, true), |acc, c| {
        let d = c.data.read();
        (
            acc.0 && d.normal.is_some(),
            acc.1 && d.texcoord.is_some(),
            acc.2 && d.boneweight.is_some() && d.boneindex.is_some(),
        )
    });

    let mut merged = GeometryData {
        indices: Vec::with_capacity(total_triangles * 3),
        position: Vec::with_capacity(total_vertices * 3),
        normal: has_normal.then(|| Vec::with_capacity(total_vertices * 3)),
        texcoord: has_texcoord.then(|| Vec::with_capacity(total_vertices * 2)),
        boneweight: has_skin.then(|| Vec::with_capacity(total_vertices * 4)),
        boneindex: has_skin.then(|| Vec::with_capacity(total_vertices * 4)),
    };

    let mut placements = Vec::with_capacity(chunks.len());
    for chunk in chunks.iter() {
        let vertex_offset = merged.vertex_count();
        let index_offset = merged.indices.len();
        let src = chunk.data.read();
        let r3 = chunk.vertex_range(3);
        let r2 = chunk.vertex_range(2);
        let r4 = chunk.vertex_range(4);
        merged.position.extend_from_slice(&src.position[r3.clone()]);
        if let (Some(dst), Some(s)) = (merged.normal.as_mut(), src.normal.as_ref()) {
            dst.extend_from_slice(&s[r3]);
        }
        if let (Some(dst), Some(s)) = (merged.texcoord.as_mut(), src.texcoord.as_ref()) {
            dst.extend_from_slice(&s[r2]);
        }
        if let (Some(dst), Some(s)) = (merged.boneweight.as_mut(), src.boneweight.as_ref()) {
            dst.extend_from_slice(&s[r4.clone()]);
        }
        if let (Some(dst), Some(s)) = (merged.boneindex.as_mut(), src.boneindex.as_ref()) {
            dst.extend_from_slice(&s[r4]);
        }
        let old_base = chunk.vertex_offset as u32;
        let new_base = vertex_offset as u32;
        merged.indices.extend(
            src.indices[chunk.index_range()]
                .iter()
                .map(|&i| i - old_base + new_base),
        );
        placements.push((vertex_offset, index_offset));
    }

    log::debug!(
        "Merged {} chunks into {total_vertices} vertices, {total_triangles} triangles",
        chunks.len()
    );
    let shared = Arc::new(RwLock::new(merged));
    for (chunk, (vertex_offset, index_offset)) in chunks.iter_mut().zip(placements) {
        chunk.data = Arc::clone(&shared);
        chunk.vertex_offset = vertex_offset;
        chunk.index_offset = index_offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{PrimitiveInput, VertexInputs};

    fn quad_source() -> GeometrySource {
        GeometrySource {
            name: "quad".into(),
            vertices: VertexInputs {
                position: Some(DataSource::new(
                    "pos",
                    vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
                    3,
                )),
                ..Default::default()
            },
            primitives: vec![PrimitiveSource::triangles(
                None,
                2,
                vec![
                    PrimitiveInput::vertex(0),
                    PrimitiveInput::corner(
                        Semantic::Normal,
                        1,
                        DataSource::new("n", vec![0.0, 0.0, 1.0, 0.0, 0.0, -1.0], 3),
                    ),
                ],
                vec![0, 0, 1, 0, 2, 0, 0, 1, 2, 1, 3, 1],
            )],
        }
    }

    #[test]
    fn deindex_dedups_positions() {
        let src = quad_source();
        let chunk = GeometryChunk::create(&src, &src.primitives[0], None).unwrap();
        assert_eq!(chunk.vertex_count(), 4);
        assert_eq!(chunk.triangle_count(), 2);
        assert_eq!(chunk.local_indices(), vec![0, 1, 2, 0, 2, 3]);
        // First corner wins for per-corner attributes.
        assert_eq!(&chunk.normals().unwrap()[..3], &[0.0, 0.0, 1.0]);
        assert_eq!(&chunk.normals().unwrap()[9..], &[0.0, 0.0, -1.0]);
        assert_eq!(chunk.texcoords().unwrap(), vec![0.0; 8]);
    }

    #[test]
    fn index_count_mismatch_is_rejected() {
        let mut src = quad_source();
        src.primitives[0].count = 3;
        assert!(GeometryChunk::create(&src, &src.primitives[0], None).is_none());
    }

    #[test]
    fn non_triangles_rejected_but_triangle_polylist_accepted() {
        let mut src = quad_source();
        src.primitives[0].kind = PrimitiveKind::Lines;
        assert!(GeometryChunk::create(&src, &src.primitives[0], None).is_none());
        src.primitives[0].kind = PrimitiveKind::Polylist;
        src.primitives[0].vcount = vec![3, 3];
        assert!(GeometryChunk::create(&src, &src.primitives[0], None).is_some());
        src.primitives[0].vcount = vec![4];
        assert!(GeometryChunk::create(&src, &src.primitives[0], None).is_none());
    }

    #[test]
    fn transform_rotates_normals_and_updates_box() {
        let src = quad_source();
        let mut chunk = GeometryChunk::create(&src, &src.primitives[0], None).unwrap();
        let m = Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 1.0, 1.0));
        chunk.transform(&m);
        assert_eq!(chunk.bounding_box().max, [2.0, 1.0, 0.0]);
        let n = chunk.normals().unwrap();
        assert!((n[2] - 1.0).abs() < 1e-6);
        chunk.scale(0.5);
        assert_eq!(chunk.bounding_box().max, [1.0, 0.5, 0.0]);
    }

    #[test]
    fn merge_rebases_indices_and_shares_buffers() {
        let src = quad_source();
        let a = GeometryChunk::create(&src, &src.primitives[0], Some(0)).unwrap();
        let b = GeometryChunk::create(&src, &src.primitives[0], Some(1)).unwrap();
        let mut chunks = vec![a, b];
        merge_chunk_data(&mut chunks);
        assert!(Arc::ptr_eq(chunks[0].data(), chunks[1].data()));
        assert_eq!(chunks[1].vertex_offset(), 4);
        assert_eq!(chunks[1].index_offset(), 6);
        assert_eq!(chunks[1].local_indices(), vec![0, 1, 2, 0, 2, 3]);
        let data = chunks[0].data().read();
        assert_eq!(data.vertex_count(), 8);
        assert_eq!(&data.indices[6..], &[4, 5, 6, 4, 6, 7]);
        assert!(data.boneweight.is_none());
    }

    #[test]
    fn merge_drops_attribute_missing_in_one_chunk() {
        let src = quad_source();
        let a = GeometryChunk::create(&src, &src.primitives[0], None).unwrap();
        let b = GeometryChunk::create(&src, &src.primitives[0], None).unwrap();
        b.data().write().texcoord = None;
        let mut chunks = vec![a, b];
        merge_chunk_data(&mut chunks);
        assert!(chunks[0].texcoords().is_none());
        assert!(chunks[0].normals().is_some());
    }

    #[test]
    fn transform_after_merge_touches_only_own_range() {
        let src = quad_source();
        let a = GeometryChunk::create(&src, &src.primitives[0], None).unwrap();
        let b = GeometryChunk::create(&src, &src.primitives[0], None).unwrap();
        let mut chunks = vec![a, b];
        merge_chunk_data(&mut chunks);
        chunks[1].scale(10.0);
        assert_eq!(chunks[0].bounding_box().max, [1.0, 1.0, 0.0]);
        assert_eq!(chunks[1].bounding_box().max, [10.0, 10.0, 0.0]);
        assert_eq!(chunks[0].positions()[3], 1.0);
    }
}
