//! Resolved source document.
//!
//! The document is what the loader hands to the converter once every
//! cross-reference has been resolved to an index:
//!
//! - [`Document`] - node arena plus geometry, skin, animation and material sources
//! - [`Node`] / [`NodeTransform`] - scene graph with animatable transform components
//! - [`GeometrySource`] / [`PrimitiveSource`] - multi-indexed triangle data
//! - [`SkinSource`] - joints, inverse bind matrices and vertex weights
//! - [`AnimationSource`] / [`SamplerSource`] - keyframe curves and their targets

mod node;
mod sources;

use std::collections::VecDeque;

pub use node::{
    ControllerInstance, GeometryInstance, MaterialBinding, Node, NodeId, NodeTransform,
    TransformKind,
};
pub use sources::{
    AnimationSource, ChannelSource, ChannelTarget, DataSource, GeometrySource, MaterialSource,
    PrimitiveInput, PrimitiveKind, PrimitiveSource, SamplerSource, Semantic, SkinSource,
    VertexInputs,
};

use crate::math::Mat4;

/// A fully resolved scene document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Node arena, indexed by [`NodeId`].
    pub nodes: Vec<Node>,
    /// Top-level nodes of the visual scene.
    pub roots: Vec<NodeId>,
    pub geometries: Vec<GeometrySource>,
    pub skins: Vec<SkinSource>,
    pub animations: Vec<AnimationSource>,
    pub materials: Vec<MaterialSource>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node under `parent` (or as a top-level node) and return its id.
    pub fn add_node(&mut self, mut node: Node, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = parent;
        node.children.clear();
        self.nodes.push(node);
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Node by id.
    ///
    /// # Panics
    ///
    /// Panics if the id does not belong to this document.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Mutable node by id.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// World matrix of a node from its current transform values.
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let node = self.node(id);
        let local = node.local_matrix();
        match node.parent {
            Some(parent) => self.world_matrix(parent) * local,
            None => local,
        }
    }

    /// Scoped-identifier lookup: breadth-first search from `root` (inclusive)
    /// for a node whose `sid` matches, falling back to a node whose `id` matches.
    pub fn find_scoped(&self, root: NodeId, sid: &str) -> Option<NodeId> {
        let mut queue = VecDeque::from([root]);
        let mut by_id = None;
        while let Some(current) = queue.pop_front() {
            let node = self.node(current);
            if node.sid.as_deref() == Some(sid) {
                return Some(current);
            }
            if by_id.is_none() && node.id.as_deref() == Some(sid) {
                by_id = Some(current);
            }
            queue.extend(node.children.iter().copied());
        }
        by_id
    }

    /// Restore every transform component to its authored value.
    pub fn reset_animation(&mut self) {
        for node in &mut self.nodes {
            for transform in &mut node.transforms {
                transform.reset();
            }
        }
    }

    /// All nodes in depth-first order, parents before children.
    pub fn traverse(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        order
    }
}
