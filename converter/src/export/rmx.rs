//! Compact asset format.
//!
//! Produces a [`DocumentJson`] descriptor and the binary buffer its
//! [`DataChunk`]s point into. Chunk indices are local to the chunk; they are
//! written as `uint16` when the chunk has at most 65536 vertices and as
//! `uint32` otherwise.

use std::path::Path;

use serde::Serialize;

use crate::animation::AnimationData;
use crate::convert::ConvertedScene;
use crate::document::MaterialSource;
use crate::error::{ConvertError, Result};
use crate::math::{mat4_to_col_major, quat_to_array};
use crate::mesh::{BoundingBox, GeometryChunk, MAX_BONES};
use crate::options::{ExportOptions, ExportPrecision};
use crate::profiling::profile_function;

use super::data_chunk::{DataChunk, DataChunkBuilder};
use super::round_array;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentJson {
    pub info: InfoJson,
    pub materials: Vec<MaterialJson>,
    pub chunks: Vec<ChunkJson>,
    pub bones: Vec<BoneJson>,
    pub animations: Vec<AnimationJson>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoJson {
    /// Extents of all chunks.
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialJson {
    pub name: String,
    pub diffuse: Option<String>,
    pub specular: Option<String>,
    pub normal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkJson {
    pub name: String,
    /// Index into `materials`.
    pub material: Option<usize>,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub indices: DataChunk,
    pub position: DataChunk,
    pub normal: Option<DataChunk>,
    pub texcoord: Option<DataChunk>,
    pub boneweight: Option<DataChunk>,
    pub boneindex: Option<DataChunk>,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoneJson {
    pub name: String,
    /// Parent bone index, `-1` for roots.
    pub parent: i64,
    /// Whether skin data references the bone.
    pub skinned: bool,
    /// Column-major inverse bind matrix.
    pub inv_bind_mat: [f32; 16],
    pub pos: [f32; 3],
    /// `[x, y, z, w]`.
    pub rot: [f32; 4],
    pub scl: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationJson {
    pub name: String,
    pub frames: usize,
    pub fps: f32,
    pub tracks: Vec<TrackJson>,
}

/// Sampled components of one bone. Pruned components are `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackJson {
    pub bone: usize,
    pub pos: Option<DataChunk>,
    pub rot: Option<DataChunk>,
    pub scl: Option<DataChunk>,
}

/// Descriptor plus the binary buffer it references.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedAsset {
    pub json: DocumentJson,
    pub data: Vec<u8>,
}

impl ExportedAsset {
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.json)?)
    }

    /// Write the descriptor and the binary buffer to two files.
    pub fn write(&self, json_path: &Path, data_path: &Path) -> Result<()> {
        std::fs::write(json_path, self.to_json_string()?)?;
        std::fs::write(data_path, &self.data)?;
        log::info!(
            "Wrote {} ({} bytes of chunk data)",
            json_path.display(),
            self.data.len()
        );
        Ok(())
    }
}

struct RmxWriter {
    builder: DataChunkBuilder,
    precision: ExportPrecision,
}

impl RmxWriter {
    // -- Step 1: Materials ---------------------------------------------------

    fn build_materials(materials: &[MaterialSource]) -> Vec<MaterialJson> {
        materials
            .iter()
            .map(|m| MaterialJson {
                name: m.name.clone(),
                diffuse: m.diffuse.clone(),
                specular: m.specular.clone(),
                normal: m.normal.clone(),
            })
            .collect()
    }

    // -- Step 2: Chunks ------------------------------------------------------

    fn build_chunk(&mut self, chunk: &GeometryChunk) -> ChunkJson {
        let p = self.precision;
        let local = chunk.local_indices();
        let indices = if chunk.vertex_count() <= u16::MAX as usize + 1 {
            let narrow: Vec<u16> = local.iter().map(|&i| i as u16).collect();
            self.builder.push(&narrow, 3)
        } else {
            self.builder.push(&local, 3)
        };
        let position = self.builder.push_rounded(&chunk.positions(), 3, p.position);
        let normal = chunk
            .normals()
            .map(|n| self.builder.push_rounded(&n, 3, p.normal));
        let texcoord = chunk
            .texcoords()
            .map(|t| self.builder.push_rounded(&t, 2, p.texcoord));
        let (boneweight, boneindex) = match (chunk.bone_weights(), chunk.bone_indices()) {
            (Some(weights), Some(bones)) => (
                Some(self.builder.push_rounded(&weights, 4, p.boneweight)),
                Some(self.builder.push(&bones, 4)),
            ),
            _ => (None, None),
        };

        ChunkJson {
            name: chunk.name.clone(),
            material: chunk.material,
            vertex_count: chunk.vertex_count(),
            triangle_count: chunk.triangle_count(),
            indices,
            position,
            normal,
            texcoord,
            boneweight,
            boneindex,
            bounding_box: *chunk.bounding_box(),
        }
    }

    // -- Step 3: Bones -------------------------------------------------------

    fn build_bones(&self, scene: &ConvertedScene) -> Result<Vec<BoneJson>> {
        let Some(skeleton) = scene.skeleton() else {
            return Ok(Vec::new());
        };
        if skeleton.len() > MAX_BONES {
            return Err(ConvertError::TooManyBones {
                count: skeleton.len(),
            });
        }
        let p = self.precision;
        Ok(skeleton
            .bones
            .iter()
            .enumerate()
            .map(|(i, bone)| {
                let rest = scene.bone_rest_pose(i);
                let inv_bind_mat = mat4_to_col_major(&bone.inv_bind_matrix);
                BoneJson {
                    name: bone.name.clone(),
                    parent: bone.parent.map_or(-1, |parent| parent as i64),
                    skinned: bone.attached_to_skin,
                    inv_bind_mat: round_array(inv_bind_mat, p.matrix),
                    pos: round_array(rest.pos.into(), p.translation),
                    rot: round_array(rest.rot_array(), p.rotation),
                    scl: round_array(rest.scl.into(), p.scale),
                }
            })
            .collect())
    }

    // -- Step 4: Animations --------------------------------------------------

    fn build_animation(&mut self, clip: &AnimationData) -> AnimationJson {
        let p = self.precision;
        let tracks = clip
            .tracks
            .iter()
            .map(|track| TrackJson {
                bone: track.bone,
                pos: track.pos.as_ref().map(|v| {
                    let flat: Vec<f32> = v.iter().flat_map(|t| [t.x, t.y, t.z]).collect();
                    self.builder.push_rounded(&flat, 3, p.translation)
                }),
                rot: track.rot.as_ref().map(|v| {
                    let flat: Vec<f32> = v.iter().flat_map(|&q| quat_to_array(q)).collect();
                    self.builder.push_rounded(&flat, 4, p.rotation)
                }),
                scl: track.scl.as_ref().map(|v| {
                    let flat: Vec<f32> = v.iter().flat_map(|s| [s.x, s.y, s.z]).collect();
                    self.builder.push_rounded(&flat, 3, p.scale)
                }),
            })
            .collect();
        AnimationJson {
            name: clip.name.clone(),
            frames: clip.keyframes,
            fps: clip.fps,
            tracks,
        }
    }
}

/// Export a converted scene to the compact format.
///
/// Fails only if the skeleton cannot be addressed with 8-bit bone indices.
pub fn export_rmx(scene: &ConvertedScene, options: &ExportOptions) -> Result<ExportedAsset> {
    profile_function!();
    let mut writer = RmxWriter {
        builder: DataChunkBuilder::new(),
        precision: options.precision,
    };

    let materials = RmxWriter::build_materials(&scene.materials);
    let chunks: Vec<ChunkJson> = scene
        .geometry
        .iter()
        .flat_map(|g| g.chunks.iter())
        .map(|chunk| writer.build_chunk(chunk))
        .collect();
    let bones = writer.build_bones(scene)?;
    let animations = scene
        .animations
        .iter()
        .map(|clip| writer.build_animation(clip))
        .collect();

    let mut bounding_box = chunks
        .iter()
        .fold(BoundingBox::EMPTY, |acc, c| acc.union(&c.bounding_box));
    // Infinite extents would serialize as null.
    if bounding_box.is_empty() {
        bounding_box = BoundingBox::new([0.0; 3], [0.0; 3]);
    }

    let data = writer.builder.finish();
    log::info!(
        "Exported {} chunks, {} bones, {} animations ({} bytes)",
        chunks.len(),
        bones.len(),
        scene.animations.len(),
        data.len()
    );
    Ok(ExportedAsset {
        json: DocumentJson {
            info: InfoJson { bounding_box },
            materials,
            chunks,
            bones,
            animations,
        },
        data,
    })
}
