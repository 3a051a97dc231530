//! Converter and exporter configuration.
//!
//! Options are plain serde structs so that they can be loaded from a TOML
//! file. Every field has a default; unknown keys are rejected.
//!
//! ```toml
//! animation_fps = 30.0
//! world_scale = 0.01
//!
//! [pruning]
//! rotation = 0.01
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{ConvertError, Result};
use crate::math::{mat4_from_axis_angle_degrees, Mat4, Vec3};

/// Options controlling the conversion pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterOptions {
    /// Resampling rate. `None` derives the rate from the source keyframes.
    pub animation_fps: Option<f32>,
    /// Combine all top-level animations into a single clip.
    pub single_animation: bool,
    /// Sort the merged skeleton so that parents precede children.
    pub sort_bones: bool,
    /// Pack all chunks of the merged geometry into one shared buffer set.
    pub merge_chunk_data: bool,
    /// Bake bind shape matrices into skinned vertices. When off they are
    /// folded into the inverse bind matrices instead.
    pub apply_bind_shape: bool,
    /// Uniform world scale applied to geometry and bone translations.
    pub world_scale: f32,
    /// Axis of the global world rotation.
    pub world_rotation_axis: [f32; 3],
    /// Angle of the global world rotation, in degrees.
    pub world_rotation_angle: f32,
    /// Skin weight compaction bounds.
    pub skinning: SkinningOptions,
    /// Constant-track pruning tolerances.
    pub pruning: PruningOptions,
    /// Iteration cap for Bezier/Hermite curve inversion.
    pub bisection_max_iterations: usize,
    /// Number of warnings of one kind logged before suppression.
    pub warning_limit: usize,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self {
            animation_fps: None,
            single_animation: true,
            sort_bones: true,
            merge_chunk_data: true,
            apply_bind_shape: true,
            world_scale: 1.0,
            world_rotation_axis: [1.0, 0.0, 0.0],
            world_rotation_angle: 0.0,
            skinning: SkinningOptions::default(),
            pruning: PruningOptions::default(),
            bisection_max_iterations: 100,
            warning_limit: 10,
        }
    }
}

/// Total-weight bounds used when renormalizing skin weights.
///
/// A vertex whose total weight falls outside `[min_total_weight, max_total_weight]`
/// is left unnormalized and counted as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SkinningOptions {
    pub min_total_weight: f32,
    pub max_total_weight: f32,
}

impl Default for SkinningOptions {
    fn default() -> Self {
        Self {
            min_total_weight: 1e-6,
            max_total_weight: 1e6,
        }
    }
}

/// Tolerances below which an animation track is considered constant.
///
/// These are coarse and hand-picked; matrix-decomposed transforms carry more
/// noise than directly authored ones.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PruningOptions {
    pub enabled: bool,
    /// Maximum translation deviation, in scene units.
    pub position: f32,
    /// Maximum rotation deviation, in radians.
    pub rotation: f32,
    /// Maximum relative scale deviation (0.5 = 50%).
    pub scale: f32,
}

impl Default for PruningOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            position: 1e-4,
            rotation: 0.05,
            scale: 0.5,
        }
    }
}

impl ConverterOptions {
    /// Parse options from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let options: Self = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let options = Self::from_toml_str(&content)?;
        log::info!("Loaded converter options from {}", path.display());
        Ok(options)
    }

    /// Check option values for consistency.
    pub fn validate(&self) -> Result<()> {
        if let Some(fps) = self.animation_fps {
            if !(fps > 0.0) {
                return Err(ConvertError::InvalidOptions(format!(
                    "animation_fps must be positive, got {fps}"
                )));
            }
        }
        if !(self.world_scale > 0.0) {
            return Err(ConvertError::InvalidOptions(format!(
                "world_scale must be positive, got {}",
                self.world_scale
            )));
        }
        let axis = Vec3::from(self.world_rotation_axis);
        if self.world_rotation_angle != 0.0 && axis.norm() < 1e-12 {
            return Err(ConvertError::InvalidOptions(
                "world_rotation_axis must be non-zero when world_rotation_angle is set".into(),
            ));
        }
        if self.skinning.min_total_weight > self.skinning.max_total_weight {
            return Err(ConvertError::InvalidOptions(
                "skinning.min_total_weight exceeds skinning.max_total_weight".into(),
            ));
        }
        if self.bisection_max_iterations == 0 {
            return Err(ConvertError::InvalidOptions(
                "bisection_max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Global world rotation as a matrix.
    pub fn world_rotation(&self) -> Mat4 {
        mat4_from_axis_angle_degrees(
            Vec3::from(self.world_rotation_axis),
            self.world_rotation_angle,
        )
    }
}

/// Options controlling asset export.
///
/// Precisions are decimal places. Rounding only shrinks the output (it makes
/// the binary stream more compressible and the JSON shorter); it is lossy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportOptions {
    pub precision: ExportPrecision,
    /// Bone influences per vertex written to the engine-interchange format.
    pub threejs_influences_per_vertex: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            precision: ExportPrecision::default(),
            threejs_influences_per_vertex: 4,
        }
    }
}

/// Decimal places kept per exported field.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportPrecision {
    pub position: u32,
    pub normal: u32,
    pub texcoord: u32,
    pub boneweight: u32,
    pub matrix: u32,
    pub translation: u32,
    pub rotation: u32,
    pub scale: u32,
    pub time: u32,
}

impl Default for ExportPrecision {
    fn default() -> Self {
        Self {
            position: 5,
            normal: 3,
            texcoord: 4,
            boneweight: 4,
            matrix: 5,
            translation: 4,
            rotation: 4,
            scale: 3,
            time: 4,
        }
    }
}

impl ExportOptions {
    /// Parse export options from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
