//! Conversion pipeline.
//!
//! Runs the full data flow from a resolved [`Document`] to a [`ConvertedScene`]:
//!
//! 1. Every geometry and controller instance becomes a [`Geometry`], with
//!    bind shape, node and world transforms applied
//! 2. All geometries are merged into one, with a merged and sorted skeleton
//! 3. Animations are resampled for the merged skeleton

use crate::animation::{collect_channels, AnimationChannel, AnimationData};
use crate::context::ConvertContext;
use crate::document::{Document, MaterialSource, NodeId};
use crate::error::Result;
use crate::mesh::{merge_geometries, Geometry};
use crate::options::ConverterOptions;
use crate::profiling::{profile_function, profile_plot, profile_scope};
use crate::skeleton::{bone_poses, BonePose, Skeleton, WorldTransform};

/// Name of the clip combining every top-level animation.
pub const COMBINED_ANIMATION_NAME: &str = "default";

/// Output of [`convert_document`].
#[derive(Debug, Clone, Default)]
pub struct ConvertedScene {
    /// All scene geometry merged into one, `None` for a scene without geometry.
    pub geometry: Option<Geometry>,
    /// Rest pose of every bone of the merged skeleton.
    pub rest_pose: Vec<BonePose>,
    pub animations: Vec<AnimationData>,
    pub materials: Vec<MaterialSource>,
}

impl ConvertedScene {
    /// Skeleton of the merged geometry.
    pub fn skeleton(&self) -> Option<&Skeleton> {
        self.geometry.as_ref().and_then(|g| g.skeleton.as_ref())
    }

    /// Rest pose of bone `i`, identity when missing.
    pub fn bone_rest_pose(&self, i: usize) -> BonePose {
        self.rest_pose.get(i).copied().unwrap_or_default()
    }
}

/// Whether static geometry should be bound to its node with a one-bone
/// skeleton so that it follows node animation and merges with skinned geometry.
fn needs_rigid_binding(doc: &Document) -> bool {
    !doc.animations.is_empty() || doc.nodes.iter().any(|n| !n.controllers.is_empty())
}

fn finish_static(
    doc: &Document,
    node: NodeId,
    mut geometry: Geometry,
    rigid: bool,
    world: &WorldTransform,
) -> Geometry {
    let node_world = doc.world_matrix(node);
    if rigid {
        geometry.bind_to_node(doc, node);
    }
    geometry.transform_geometry(&(world.rotation * node_world));
    geometry.setup_world_transform(&world.rotation, None);
    geometry
}

/// Build one geometry per geometry or controller instance in the scene.
///
/// Instances that cannot be converted are skipped with a warning.
pub fn extract_geometries(
    doc: &Document,
    options: &ConverterOptions,
    world: &WorldTransform,
) -> Vec<Geometry> {
    profile_function!();
    let rigid = needs_rigid_binding(doc);
    let mut geometries = Vec::new();
    for node_id in doc.traverse() {
        let node = doc.node(node_id);
        for instance in &node.geometries {
            let geometry = Geometry::create_static(doc, instance.geometry, &instance.materials);
            if let Some(geometry) = geometry {
                geometries.push(finish_static(doc, node_id, geometry, rigid, world));
            }
        }
        for instance in &node.controllers {
            let Some(mut geometry) = Geometry::create_skin(
                doc,
                instance.skin,
                &instance.skeletons,
                &instance.materials,
                &options.skinning,
            ) else {
                continue;
            };
            if options.apply_bind_shape {
                geometry.apply_bind_shape_matrices();
            } else {
                geometry.fold_bind_shape_into_bones();
            }
            if geometry.is_skinned() {
                geometry.transform_geometry(&world.rotation);
                geometry.setup_world_transform(&world.rotation, None);
                geometries.push(geometry);
            } else {
                geometries.push(finish_static(doc, node_id, geometry, rigid, world));
            }
        }
    }
    if world.scale != 1.0 {
        for geometry in &mut geometries {
            geometry.scale_geometry(world.scale);
        }
    }
    log::info!("Extracted {} geometries", geometries.len());
    geometries
}

fn resample(
    doc: &mut Document,
    skeleton: &Skeleton,
    world: &WorldTransform,
    ctx: &mut ConvertContext,
) -> Result<Vec<AnimationData>> {
    profile_scope!("resample_animations");
    let source: &Document = doc;
    let clips: Vec<(String, Vec<AnimationChannel>)> = if ctx.options.single_animation {
        let channels = source
            .animations
            .iter()
            .flat_map(|a| collect_channels(source, a))
            .collect();
        let name = match source.animations.as_slice() {
            [single] if !single.name.is_empty() => single.name.clone(),
            _ => COMBINED_ANIMATION_NAME.to_string(),
        };
        vec![(name, channels)]
    } else {
        source
            .animations
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let name = if a.name.is_empty() {
                    format!("animation_{i}")
                } else {
                    a.name.clone()
                };
                (name, collect_channels(source, a))
            })
            .collect()
    };

    let mut animations = Vec::with_capacity(clips.len());
    for (name, channels) in clips {
        if let Some(clip) =
            AnimationData::create(name, doc, skeleton, &channels, None, None, world, ctx)?
        {
            animations.push(clip);
        }
    }
    Ok(animations)
}

/// Convert a resolved document.
///
/// Recoverable problems degrade the output and are logged; only internal
/// invariant violations are returned as errors.
pub fn convert_document(doc: &mut Document, ctx: &mut ConvertContext) -> Result<ConvertedScene> {
    profile_function!();
    let world = WorldTransform::from_options(&ctx.options);
    let mut geometries = extract_geometries(doc, &ctx.options, &world);

    let geometry = if geometries.is_empty() {
        log::warn!("Document contains no convertible geometry");
        None
    } else {
        let mut merged = merge_geometries("scene", &mut geometries, ctx.options.sort_bones)?;
        if ctx.options.merge_chunk_data {
            merged.merge_chunk_data();
        }
        profile_plot!("merged_vertices", merged.vertex_count());
        Some(merged)
    };

    let skeleton = geometry.as_ref().and_then(|g| g.skeleton.clone());
    let (rest_pose, animations) = match &skeleton {
        Some(skeleton) => {
            let rest_pose = bone_poses(doc, skeleton, &world);
            let animations = if doc.animations.is_empty() {
                Vec::new()
            } else {
                resample(doc, skeleton, &world, ctx)?
            };
            (rest_pose, animations)
        }
        None => {
            if !doc.animations.is_empty() {
                log::warn!("Document has animations but no skeleton, animations dropped");
            }
            (Vec::new(), Vec::new())
        }
    };

    Ok(ConvertedScene {
        geometry,
        rest_pose,
        animations,
        materials: doc.materials.clone(),
    })
}
