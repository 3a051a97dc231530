//! Animatable values.
//!
//! Every animatable value is one transform component of a node, so a target
//! is the node, the component index and the component kind.

use crate::document::{ChannelTarget, Document, NodeId, TransformKind};

/// A resolved animation destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationTarget {
    pub node: NodeId,
    /// Index into the node's transform components.
    pub transform: usize,
    pub kind: TransformKind,
}

impl AnimationTarget {
    /// Resolve a channel target against the document.
    pub fn resolve(doc: &Document, target: ChannelTarget) -> Option<Self> {
        let node = doc.nodes.get(target.node.0)?;
        let transform = node.transforms.get(target.transform)?;
        Some(Self {
            node: target.node,
            transform: target.transform,
            kind: transform.kind,
        })
    }

    /// Rows of the value, for `(row)(column)` addressing.
    pub fn rows(&self) -> usize {
        self.kind.rows()
    }

    /// Columns of the value.
    pub fn columns(&self) -> usize {
        self.kind.columns()
    }

    /// Number of values in the target.
    pub fn data_len(&self) -> usize {
        self.kind.value_count()
    }

    /// Current values of the target.
    pub fn data<'a>(&self, doc: &'a Document) -> &'a [f32] {
        &doc.node(self.node).transforms[self.transform].data
    }

    /// Mutable values of the target.
    pub fn data_mut<'a>(&self, doc: &'a mut Document) -> &'a mut [f32] {
        &mut doc.node_mut(self.node).transforms[self.transform].data
    }

    /// Overwrite `values.len()` values starting at `offset`.
    pub fn apply_animation(&self, doc: &mut Document, offset: usize, values: &[f32]) {
        let data = self.data_mut(doc);
        let end = (offset + values.len()).min(data.len());
        if offset < end {
            data[offset..end].copy_from_slice(&values[..end - offset]);
        }
    }
}
