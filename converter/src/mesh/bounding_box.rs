//! Axis-aligned bounding boxes.

use serde::Serialize;

use crate::math::Vec3;

/// Axis-aligned extents. An empty box has `min > max` on every axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    /// The box containing nothing; identity of [`extend_box`](Self::extend_box).
    pub const EMPTY: Self = Self {
        min: [f32::INFINITY; 3],
        max: [f32::NEG_INFINITY; 3],
    };

    /// Box with the given corners.
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    /// Fold min/max over a flat `xyz` position buffer.
    pub fn from_positions(positions: &[f32]) -> Self {
        positions
            .chunks_exact(3)
            .fold(Self::EMPTY, |mut bbox, p| {
                bbox.extend([p[0], p[1], p[2]]);
                bbox
            })
    }

    /// Whether the box contains no point.
    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    /// Grow the box to contain a point.
    pub fn extend(&mut self, p: [f32; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    /// Grow the box to contain another box.
    pub fn extend_box(&mut self, other: &BoundingBox) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(other.min[i]);
            self.max[i] = self.max[i].max(other.max[i]);
        }
    }

    /// Union of two boxes.
    #[must_use]
    pub fn union(mut self, other: &BoundingBox) -> Self {
        self.extend_box(other);
        self
    }

    /// Box center, zero for an empty box.
    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            return Vec3::zeros();
        }
        (Vec3::from(self.min) + Vec3::from(self.max)) * 0.5
    }

    /// Box size, zero for an empty box.
    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            return Vec3::zeros();
        }
        Vec3::from(self.max) - Vec3::from(self.min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_positions_reproduces_bounds() {
        let bbox = BoundingBox::from_positions(&[1.0, -2.0, 3.0, -1.0, 5.0, 0.0, 0.5, 0.5, 9.0]);
        assert_eq!(bbox.min, [-1.0, -2.0, 0.0]);
        assert_eq!(bbox.max, [1.0, 5.0, 9.0]);
        assert_eq!(bbox.size(), Vec3::new(2.0, 7.0, 9.0));
    }

    #[test]
    fn empty_positions_give_empty_box() {
        let bbox = BoundingBox::from_positions(&[]);
        assert!(bbox.is_empty());
        assert_eq!(bbox.center(), Vec3::zeros());
    }

    #[test]
    fn extend_box_commutative_and_associative() {
        let a = BoundingBox::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = BoundingBox::new([-1.0, 0.5, 0.0], [0.5, 2.0, 0.5]);
        let c = BoundingBox::new([2.0, -3.0, 1.0], [3.0, -2.0, 4.0]);
        assert_eq!(a.union(&b), b.union(&a));
        assert_eq!(a.union(&b).union(&c), a.union(&b.union(&c)));
        assert_eq!(BoundingBox::EMPTY.union(&a), a);
    }
}
