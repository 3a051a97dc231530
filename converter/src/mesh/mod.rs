//! Converted mesh data.
//!
//! This module provides:
//! - [`BoundingBox`] - axis-aligned extents
//! - [`GeometryData`] / [`GeometryChunk`] - de-indexed buffers and per-material views
//! - [`Geometry`] - chunks plus an optional skeleton, with skinning and merge operations

mod bounding_box;
mod chunk;
mod geometry;

pub use bounding_box::BoundingBox;
pub use chunk::{merge_chunk_data, GeometryChunk, GeometryData, SharedGeometryData, SourceIndices};
pub use geometry::{insert_bone, merge_geometries, Geometry, MAX_BONES, MAX_INFLUENCES};
