//! Scene node types.
//!
//! Nodes are stored in an arena owned by [`Document`](super::Document) and
//! refer to each other by [`NodeId`]. Each node carries an ordered list of
//! transform components whose values may be overwritten by animation and
//! restored to their authored rest values.

use crate::math::{mat4_from_axis_angle_degrees, mat4_from_row_major, Mat4, Vec3};

/// Index of a node in the document arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// The fixed set of transform component kinds a node can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    /// Full 4x4 matrix, 16 values row-major.
    Matrix,
    /// Translation `[x, y, z]`.
    Translate,
    /// Axis-angle rotation `[axis_x, axis_y, axis_z, angle_degrees]`.
    Rotate,
    /// Non-uniform scale `[x, y, z]`.
    Scale,
}

impl TransformKind {
    /// Number of rows of the value, as addressed by animation selectors.
    pub fn rows(self) -> usize {
        match self {
            Self::Matrix => 4,
            Self::Translate | Self::Scale => 3,
            Self::Rotate => 4,
        }
    }

    /// Number of columns of the value, as addressed by animation selectors.
    pub fn columns(self) -> usize {
        match self {
            Self::Matrix => 4,
            Self::Translate | Self::Scale | Self::Rotate => 1,
        }
    }

    /// Total number of values.
    pub fn value_count(self) -> usize {
        self.rows() * self.columns()
    }
}

/// One transform component of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTransform {
    /// Scoped identifier used by animation targets.
    pub sid: Option<String>,
    /// Component kind.
    pub kind: TransformKind,
    /// Current values (written by animation).
    pub data: Vec<f32>,
    rest: Vec<f32>,
}

impl NodeTransform {
    fn new(kind: TransformKind, values: Vec<f32>) -> Self {
        Self {
            sid: None,
            kind,
            rest: values.clone(),
            data: values,
        }
    }

    /// Matrix component from 16 row-major values.
    pub fn matrix(rows: [f32; 16]) -> Self {
        Self::new(TransformKind::Matrix, rows.to_vec())
    }

    /// Translation component.
    pub fn translate(t: [f32; 3]) -> Self {
        Self::new(TransformKind::Translate, t.to_vec())
    }

    /// Rotation component around `axis` by `angle_degrees`.
    pub fn rotate(axis: [f32; 3], angle_degrees: f32) -> Self {
        Self::new(
            TransformKind::Rotate,
            vec![axis[0], axis[1], axis[2], angle_degrees],
        )
    }

    /// Scale component.
    pub fn scale(s: [f32; 3]) -> Self {
        Self::new(TransformKind::Scale, s.to_vec())
    }

    /// Set the scoped identifier.
    #[must_use]
    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    /// Authored (rest pose) values.
    pub fn rest(&self) -> &[f32] {
        &self.rest
    }

    /// Restore the authored values.
    pub fn reset(&mut self) {
        self.data.clone_from(&self.rest);
    }

    /// Matrix of the current values.
    pub fn to_matrix(&self) -> Mat4 {
        let d = &self.data;
        match self.kind {
            TransformKind::Matrix => mat4_from_row_major(d),
            TransformKind::Translate => Mat4::new_translation(&Vec3::new(d[0], d[1], d[2])),
            TransformKind::Rotate => mat4_from_axis_angle_degrees(Vec3::new(d[0], d[1], d[2]), d[3]),
            TransformKind::Scale => Mat4::new_nonuniform_scaling(&Vec3::new(d[0], d[1], d[2])),
        }
    }
}

/// Binds a material symbol used by a primitive to a document material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialBinding {
    /// Symbol referenced by the primitive.
    pub symbol: String,
    /// Index into [`Document::materials`](super::Document::materials).
    pub material: usize,
}

/// Placement of a static geometry on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryInstance {
    /// Index into [`Document::geometries`](super::Document::geometries).
    pub geometry: usize,
    /// Material bindings.
    pub materials: Vec<MaterialBinding>,
}

/// Placement of a skin controller on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerInstance {
    /// Index into [`Document::skins`](super::Document::skins).
    pub skin: usize,
    /// Candidate roots for joint lookup. Empty means "use every top-level node".
    pub skeletons: Vec<NodeId>,
    /// Material bindings.
    pub materials: Vec<MaterialBinding>,
}

/// A node in the scene graph.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Node name.
    pub name: String,
    /// Document-wide identifier.
    pub id: Option<String>,
    /// Scoped identifier (joint name).
    pub sid: Option<String>,
    /// Parent node, `None` for top-level nodes. Maintained by the document.
    pub parent: Option<NodeId>,
    /// Child nodes. Maintained by the document.
    pub children: Vec<NodeId>,
    /// Transform components, applied in order.
    pub transforms: Vec<NodeTransform>,
    /// Static geometry instances.
    pub geometries: Vec<GeometryInstance>,
    /// Skin controller instances.
    pub controllers: Vec<ControllerInstance>,
}

impl Node {
    /// Creates a new node with no transforms and no attachments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the document-wide identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the scoped identifier.
    #[must_use]
    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    /// Append a transform component.
    #[must_use]
    pub fn with_transform(mut self, transform: NodeTransform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Append a static geometry instance.
    #[must_use]
    pub fn with_geometry(mut self, instance: GeometryInstance) -> Self {
        self.geometries.push(instance);
        self
    }

    /// Append a skin controller instance.
    #[must_use]
    pub fn with_controller(mut self, instance: ControllerInstance) -> Self {
        self.controllers.push(instance);
        self
    }

    /// Local matrix: the product of all transform components in order.
    pub fn local_matrix(&self) -> Mat4 {
        self.transforms
            .iter()
            .fold(Mat4::identity(), |acc, t| acc * t.to_matrix())
    }

    /// Index of the transform component with the given scoped identifier.
    pub fn find_transform(&self, sid: &str) -> Option<usize> {
        self.transforms
            .iter()
            .position(|t| t.sid.as_deref() == Some(sid))
    }
}
