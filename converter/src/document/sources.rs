//! Resolved source data: geometry, skins, animations and materials.
//!
//! These mirror what the document loader produces after all links have been
//! resolved. Index values always refer to arrays owned by the
//! [`Document`](super::Document).

use super::node::NodeId;

/// A flat float array with accessor layout.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    /// Source identifier, for diagnostics.
    pub id: String,
    /// Raw values.
    pub data: Vec<f32>,
    /// Values per element.
    pub stride: usize,
    /// Number of elements.
    pub count: usize,
    /// Offset of the first element in `data`.
    pub offset: usize,
}

impl DataSource {
    /// Create a tightly packed source.
    pub fn new(id: impl Into<String>, data: Vec<f32>, stride: usize) -> Self {
        let count = if stride > 0 { data.len() / stride } else { 0 };
        Self {
            id: id.into(),
            data,
            stride,
            count,
            offset: 0,
        }
    }

    /// Component `component` of element `index`, or `None` if out of range.
    pub fn get(&self, index: usize, component: usize) -> Option<f32> {
        if index >= self.count || component >= self.stride {
            return None;
        }
        self.data
            .get(self.offset + index * self.stride + component)
            .copied()
    }
}

/// Input semantics of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semantic {
    /// Refers to the per-vertex inputs of the geometry.
    Vertex,
    Normal,
    Texcoord,
    Color,
}

/// One index stream of a primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveInput {
    pub semantic: Semantic,
    /// Offset of this input inside each corner's index block.
    pub offset: usize,
    /// Input set (texcoord channel).
    pub set: usize,
    /// Resolved source. `None` for [`Semantic::Vertex`].
    pub source: Option<DataSource>,
}

impl PrimitiveInput {
    /// The `VERTEX` input at the given offset.
    pub fn vertex(offset: usize) -> Self {
        Self {
            semantic: Semantic::Vertex,
            offset,
            set: 0,
            source: None,
        }
    }

    /// A per-corner input with its own source.
    pub fn corner(semantic: Semantic, offset: usize, source: DataSource) -> Self {
        Self {
            semantic,
            offset,
            set: 0,
            source: Some(source),
        }
    }
}

/// Attributes indexed through the `VERTEX` input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexInputs {
    pub position: Option<DataSource>,
    pub normal: Option<DataSource>,
    pub texcoord: Option<DataSource>,
}

/// Primitive assembly kinds a source may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Triangles,
    Polylist,
    Polygons,
    Lines,
    LineStrips,
    Trifans,
    Tristrips,
}

/// A group of primitives sharing one material.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveSource {
    pub kind: PrimitiveKind,
    /// Material symbol, resolved through instance bindings.
    pub material: Option<String>,
    /// Declared primitive count.
    pub count: usize,
    /// Vertices per polygon (polylists only).
    pub vcount: Vec<usize>,
    pub inputs: Vec<PrimitiveInput>,
    /// Interleaved per-corner index block.
    pub indices: Vec<u32>,
}

impl PrimitiveSource {
    /// A triangle list.
    pub fn triangles(
        material: Option<String>,
        count: usize,
        inputs: Vec<PrimitiveInput>,
        indices: Vec<u32>,
    ) -> Self {
        Self {
            kind: PrimitiveKind::Triangles,
            material,
            count,
            vcount: Vec::new(),
            inputs,
            indices,
        }
    }

    /// Number of indices per corner.
    pub fn index_stride(&self) -> usize {
        self.inputs.iter().map(|i| i.offset + 1).max().unwrap_or(1)
    }

    /// First input with the given semantic.
    pub fn input(&self, semantic: Semantic) -> Option<&PrimitiveInput> {
        self.inputs.iter().find(|i| i.semantic == semantic)
    }
}

/// A mesh as declared by the source document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometrySource {
    pub name: String,
    pub vertices: VertexInputs,
    pub primitives: Vec<PrimitiveSource>,
}

/// Skin controller data.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinSource {
    pub name: String,
    /// Index into [`Document::geometries`](super::Document::geometries).
    pub geometry: usize,
    /// Bind shape matrix, 16 values row-major.
    pub bind_shape_matrix: [f32; 16],
    /// Joint scoped identifiers.
    pub joints: Option<Vec<String>>,
    /// Inverse bind matrices, 16 row-major values per joint.
    pub inv_bind_matrices: Option<Vec<f32>>,
    /// Weight values referenced by `v`.
    pub weights: Option<Vec<f32>>,
    /// Number of influences per source vertex.
    pub vcount: Vec<usize>,
    /// `(joint index, weight index)` pairs. Joint `-1` is the bind shape.
    pub v: Vec<i32>,
}

impl SkinSource {
    /// Influence list `(joint, weight)` of every source vertex.
    ///
    /// Pairs whose joint is negative or whose weight index is out of range are
    /// skipped.
    pub fn vertex_influences(&self) -> Vec<Vec<(usize, f32)>> {
        let weights = self.weights.as_deref().unwrap_or(&[]);
        let mut cursor = 0usize;
        let mut result = Vec::with_capacity(self.vcount.len());
        for &n in &self.vcount {
            let mut influences = Vec::with_capacity(n);
            for _ in 0..n {
                let (Some(&joint), Some(&weight_index)) =
                    (self.v.get(cursor), self.v.get(cursor + 1))
                else {
                    break;
                };
                cursor += 2;
                if joint < 0 || weight_index < 0 {
                    continue;
                }
                if let Some(&w) = weights.get(weight_index as usize) {
                    influences.push((joint as usize, w));
                }
            }
            result.push(influences);
        }
        result
    }
}

/// An animation curve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplerSource {
    /// Keyframe times, strictly increasing.
    pub input: Vec<f32>,
    /// Keyframe values, flattened.
    pub output: Vec<f32>,
    /// Interleaved `(time, value)` pairs per component.
    pub in_tangent: Option<Vec<f32>>,
    /// Interleaved `(time, value)` pairs per component.
    pub out_tangent: Option<Vec<f32>>,
    /// Interpolation name per keyframe (`"LINEAR"`, `"BEZIER"`, ...).
    pub interpolation: Option<Vec<String>>,
}

/// Resolved destination of an animation channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTarget {
    pub node: NodeId,
    /// Index into the node's transform list.
    pub transform: usize,
}

/// Binds a sampler to an animatable value.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSource {
    /// Index into the owning animation's samplers.
    pub sampler: usize,
    /// `None` if the loader could not resolve the target.
    pub target: Option<ChannelTarget>,
    /// Member selector following the transform sid: `""`, `".ANGLE"`, `"(0)(3)"`.
    pub selector: String,
}

/// An animation, possibly with nested child animations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationSource {
    pub name: String,
    pub samplers: Vec<SamplerSource>,
    pub channels: Vec<ChannelSource>,
    pub children: Vec<AnimationSource>,
}

/// Texture references of a material.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialSource {
    pub name: String,
    pub diffuse: Option<String>,
    pub specular: Option<String>,
    pub normal: Option<String>,
}
