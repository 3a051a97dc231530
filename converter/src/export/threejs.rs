//! three.js JSON model format 3.1.
//!
//! All chunks are flattened into one vertex list. An attribute is written only
//! if every chunk carries it. Only the first animation clip is exported since
//! the format holds a single `animation` block.

use std::path::Path;

use serde::Serialize;

use crate::animation::AnimationData;
use crate::convert::ConvertedScene;
use crate::error::Result;
use crate::math::{quat_to_array, Vec3};
use crate::mesh::{GeometryChunk, MAX_INFLUENCES};
use crate::options::{ExportOptions, ExportPrecision};
use crate::profiling::profile_function;

use super::{round_array, round_decimals, round_slice};

pub const FORMAT_VERSION: f32 = 3.1;

/// Face type bits.
const FACE_HAS_MATERIAL: u32 = 1 << 1;
const FACE_HAS_VERTEX_UVS: u32 = 1 << 3;
const FACE_HAS_VERTEX_NORMALS: u32 = 1 << 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreeJsMetadata {
    pub format_version: f32,
    pub generated_by: String,
    pub vertices: usize,
    pub faces: usize,
    pub normals: usize,
    pub uvs: usize,
    pub materials: usize,
    pub morph_targets: usize,
    pub bones: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreeJsMaterial {
    #[serde(rename = "DbgIndex")]
    pub dbg_index: usize,
    #[serde(rename = "DbgName")]
    pub dbg_name: String,
    #[serde(rename = "mapDiffuse", skip_serializing_if = "Option::is_none")]
    pub map_diffuse: Option<String>,
    #[serde(rename = "mapSpecular", skip_serializing_if = "Option::is_none")]
    pub map_specular: Option<String>,
    #[serde(rename = "mapNormal", skip_serializing_if = "Option::is_none")]
    pub map_normal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreeJsBone {
    pub parent: i64,
    pub name: String,
    pub pos: [f32; 3],
    pub rotq: [f32; 4],
    pub scl: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreeJsKey {
    /// Seconds from the clip start.
    pub time: f32,
    pub pos: [f32; 3],
    pub rot: [f32; 4],
    pub scl: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreeJsHierarchy {
    pub parent: i64,
    pub keys: Vec<ThreeJsKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreeJsAnimation {
    pub name: String,
    pub fps: f32,
    pub length: f32,
    pub hierarchy: Vec<ThreeJsHierarchy>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreeJsModel {
    pub metadata: ThreeJsMetadata,
    pub scale: f32,
    pub materials: Vec<ThreeJsMaterial>,
    pub vertices: Vec<f32>,
    pub normals: Vec<f32>,
    pub colors: Vec<f32>,
    pub uvs: Vec<Vec<f32>>,
    pub faces: Vec<u32>,
    pub skin_indices: Vec<u32>,
    pub skin_weights: Vec<f32>,
    pub influences_per_vertex: usize,
    pub bones: Vec<ThreeJsBone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation: Option<ThreeJsAnimation>,
}

impl ThreeJsModel {
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        log::info!("Wrote {}", path.display());
        Ok(())
    }
}

/// Flattened vertex and face data of all chunks.
#[derive(Default)]
struct MeshArrays {
    vertices: Vec<f32>,
    normals: Vec<f32>,
    uvs: Vec<f32>,
    faces: Vec<u32>,
    skin_indices: Vec<u32>,
    skin_weights: Vec<f32>,
    face_count: usize,
}

fn build_mesh(
    chunks: &[GeometryChunk],
    precision: &ExportPrecision,
    influences: usize,
) -> MeshArrays {
    let has_normals = !chunks.is_empty() && chunks.iter().all(|c| c.normals().is_some());
    let has_uvs = !chunks.is_empty() && chunks.iter().all(|c| c.texcoords().is_some());
    let has_skin = !chunks.is_empty() && chunks.iter().all(GeometryChunk::is_skinned);

    let mut face_type = FACE_HAS_MATERIAL;
    if has_uvs {
        face_type |= FACE_HAS_VERTEX_UVS;
    }
    if has_normals {
        face_type |= FACE_HAS_VERTEX_NORMALS;
    }

    let mut mesh = MeshArrays::default();
    let mut base = 0u32;
    for chunk in chunks {
        mesh.vertices.extend(round_slice(&chunk.positions(), precision.position));
        if has_normals {
            if let Some(normals) = chunk.normals() {
                mesh.normals.extend(round_slice(&normals, precision.normal));
            }
        }
        if has_uvs {
            if let Some(uvs) = chunk.texcoords() {
                mesh.uvs.extend(round_slice(&uvs, precision.texcoord));
            }
        }
        if has_skin {
            if let (Some(weights), Some(bones)) = (chunk.bone_weights(), chunk.bone_indices()) {
                append_influences(&mut mesh, &weights, &bones, influences, precision.boneweight);
            }
        }

        let material = chunk.material.unwrap_or(0) as u32;
        for tri in chunk.local_indices().chunks_exact(3) {
            let corners = [tri[0] + base, tri[1] + base, tri[2] + base];
            mesh.faces.push(face_type);
            mesh.faces.extend(corners);
            mesh.faces.push(material);
            if has_uvs {
                mesh.faces.extend(corners);
            }
            if has_normals {
                mesh.faces.extend(corners);
            }
            mesh.face_count += 1;
        }
        base += chunk.vertex_count() as u32;
    }
    mesh
}

/// Keep the strongest `influences` weights of each vertex, renormalized.
fn append_influences(
    mesh: &mut MeshArrays,
    weights: &[f32],
    bones: &[u8],
    influences: usize,
    decimals: u32,
) {
    for (w, b) in weights
        .chunks_exact(MAX_INFLUENCES)
        .zip(bones.chunks_exact(MAX_INFLUENCES))
    {
        let kept = &w[..influences];
        let total: f32 = kept.iter().sum();
        let scale = if total > 0.0 { 1.0 / total } else { 0.0 };
        mesh.skin_weights
            .extend(kept.iter().map(|&x| round_decimals(x * scale, decimals)));
        mesh.skin_indices
            .extend(b[..influences].iter().map(|&i| i as u32));
    }
}

fn build_animation(
    scene: &ConvertedScene,
    clip: &AnimationData,
    precision: &ExportPrecision,
) -> ThreeJsAnimation {
    let parents: Vec<i64> = scene
        .skeleton()
        .map(|s| {
            s.bones
                .iter()
                .map(|b| b.parent.map_or(-1, |p| p as i64))
                .collect()
        })
        .unwrap_or_default();

    let hierarchy = clip
        .tracks
        .iter()
        .map(|track| {
            let rest = scene.bone_rest_pose(track.bone);
            let keys = (0..clip.keyframes)
                .map(|frame| {
                    let pose = track.pose(frame, &rest);
                    ThreeJsKey {
                        time: round_decimals(clip.frame_time(frame), precision.time),
                        pos: round_vec3(pose.pos, precision.translation),
                        rot: round_array(quat_to_array(pose.rot), precision.rotation),
                        scl: round_vec3(pose.scl, precision.scale),
                    }
                })
                .collect();
            ThreeJsHierarchy {
                parent: parents.get(track.bone).copied().unwrap_or(-1),
                keys,
            }
        })
        .collect();

    ThreeJsAnimation {
        name: clip.name.clone(),
        fps: clip.fps,
        length: round_decimals(clip.duration, precision.time),
        hierarchy,
    }
}

fn round_vec3(v: Vec3, decimals: u32) -> [f32; 3] {
    round_array([v.x, v.y, v.z], decimals)
}

/// Export a converted scene to the three.js JSON model format.
pub fn export_threejs(scene: &ConvertedScene, options: &ExportOptions) -> ThreeJsModel {
    profile_function!();
    let precision = &options.precision;
    let influences = options
        .threejs_influences_per_vertex
        .clamp(1, MAX_INFLUENCES);
    let chunks = scene
        .geometry
        .as_ref()
        .map(|g| g.chunks.as_slice())
        .unwrap_or_default();
    let mesh = build_mesh(chunks, precision, influences);

    let bones: Vec<ThreeJsBone> = scene
        .skeleton()
        .map(|skeleton| {
            skeleton
                .bones
                .iter()
                .enumerate()
                .map(|(i, bone)| {
                    let rest = scene.bone_rest_pose(i);
                    ThreeJsBone {
                        parent: bone.parent.map_or(-1, |p| p as i64),
                        name: bone.name.clone(),
                        pos: round_vec3(rest.pos, precision.translation),
                        rotq: round_array(rest.rot_array(), precision.rotation),
                        scl: round_vec3(rest.scl, precision.scale),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    if scene.animations.len() > 1 {
        log::warn!(
            "three.js model holds one animation, dropping {} clips",
            scene.animations.len() - 1
        );
    }
    let animation = scene
        .animations
        .first()
        .map(|clip| build_animation(scene, clip, precision));

    let materials: Vec<ThreeJsMaterial> = scene
        .materials
        .iter()
        .enumerate()
        .map(|(i, m)| ThreeJsMaterial {
            dbg_index: i,
            dbg_name: m.name.clone(),
            map_diffuse: m.diffuse.clone(),
            map_specular: m.specular.clone(),
            map_normal: m.normal.clone(),
        })
        .collect();

    let uvs = if mesh.uvs.is_empty() {
        Vec::new()
    } else {
        vec![mesh.uvs]
    };

    ThreeJsModel {
        metadata: ThreeJsMetadata {
            format_version: FORMAT_VERSION,
            generated_by: format!("redlilium-converter {}", crate::VERSION),
            vertices: mesh.vertices.len() / 3,
            faces: mesh.face_count,
            normals: mesh.normals.len() / 3,
            uvs: uvs.len(),
            materials: materials.len(),
            morph_targets: 0,
            bones: bones.len(),
        },
        scale: 1.0,
        materials,
        vertices: mesh.vertices,
        normals: mesh.normals,
        colors: Vec::new(),
        uvs,
        faces: mesh.faces,
        skin_indices: mesh.skin_indices,
        skin_weights: mesh.skin_weights,
        influences_per_vertex: influences,
        bones,
        animation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::AnimationDataTrack;
    use crate::document::NodeId;
    use crate::math::{Mat4, Quat};
    use crate::mesh::{Geometry, GeometryData, SourceIndices};
    use crate::skeleton::{Bone, BonePose, Skeleton};

    fn quad_chunk(name: &str, material: usize) -> GeometryChunk {
        let data = GeometryData {
            indices: vec![0, 1, 2, 0, 2, 3],
            position: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            normal: Some([0.0, 0.0, 1.0].repeat(4)),
            texcoord: Some(vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]),
            boneweight: Some([0.5, 0.3, 0.2, 0.0].repeat(4)),
            boneindex: Some([0, 1, 0, 0].repeat(4)),
        };
        GeometryChunk::from_data(name, Some(material), data, SourceIndices::default())
    }

    fn scene() -> ConvertedScene {
        let mut geometry = Geometry::new("scene", vec![quad_chunk("a", 0), quad_chunk("b", 1)]);
        let mut child = Bone::new("child", NodeId(1), Mat4::identity());
        child.parent = Some(0);
        geometry.skeleton = Some(Skeleton::new(vec![
            Bone::new("root", NodeId(0), Mat4::identity()),
            child,
        ]));
        let rest = BonePose {
            pos: Vec3::new(0.0, 2.0, 0.0),
            ..Default::default()
        };
        ConvertedScene {
            geometry: Some(geometry),
            rest_pose: vec![BonePose::default(), rest],
            animations: vec![AnimationData {
                name: "bend".into(),
                start_time: 0.5,
                duration: 2.0,
                keyframes: 3,
                fps: 1.0,
                original_fps: 1.0,
                tracks: vec![
                    AnimationDataTrack {
                        bone: 0,
                        ..Default::default()
                    },
                    AnimationDataTrack {
                        bone: 1,
                        rot: Some(vec![Quat::identity(); 3]),
                        ..Default::default()
                    },
                ],
            }],
            materials: Vec::new(),
        }
    }

    #[test]
    fn faces_use_material_uv_and_normal_layout() {
        let model = export_threejs(&scene(), &ExportOptions::default());
        assert_eq!(model.metadata.vertices, 8);
        assert_eq!(model.metadata.faces, 4);
        assert_eq!(model.faces.len(), 4 * 11);
        // second chunk's faces point past the first chunk's vertices
        assert_eq!(&model.faces[22..33], &[42, 4, 5, 6, 1, 4, 5, 6, 4, 5, 6]);
        assert_eq!(model.uvs.len(), 1);
        assert_eq!(model.uvs[0].len(), 16);
    }

    #[test]
    fn influences_are_truncated_and_renormalized() {
        let options = ExportOptions {
            threejs_influences_per_vertex: 2,
            ..Default::default()
        };
        let model = export_threejs(&scene(), &options);
        assert_eq!(model.influences_per_vertex, 2);
        assert_eq!(model.skin_indices.len(), 16);
        assert_eq!(&model.skin_weights[..2], &[0.625, 0.375]);
    }

    #[test]
    fn keys_fall_back_to_rest_pose() {
        let model = export_threejs(&scene(), &ExportOptions::default());
        let animation = model.animation.unwrap();
        assert_eq!(animation.length, 2.0);
        assert_eq!(animation.hierarchy[0].parent, -1);
        assert_eq!(animation.hierarchy[1].parent, 0);
        let keys = &animation.hierarchy[1].keys;
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[1].time, 1.0);
        assert_eq!(keys[2].pos, [0.0, 2.0, 0.0]);
        assert_eq!(keys[2].rot, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(model.bones[1].pos, [0.0, 2.0, 0.0]);
    }

    #[test]
    fn json_uses_threejs_field_names() {
        let model = export_threejs(&scene(), &ExportOptions::default());
        let json: serde_json::Value = serde_json::from_str(&model.to_json_string().unwrap()).unwrap();
        assert!(json["metadata"]["formatVersion"].is_number());
        assert!(json["skinIndices"].is_array());
        assert_eq!(json["influencesPerVertex"], 4);
        assert!(json["bones"][0]["rotq"].is_array());
    }
}
