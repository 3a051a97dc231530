//! Asset exporters.
//!
//! Both formats consume a [`ConvertedScene`](crate::convert::ConvertedScene):
//!
//! - [`rmx`] - compact format: one little-endian binary buffer plus a JSON
//!   descriptor whose arrays are [`DataChunk`] references into that buffer
//! - [`threejs`] - three.js JSON model format 3.1 with every array inlined
//!
//! Numeric output is rounded to a per-field number of decimal places
//! ([`ExportPrecision`](crate::options::ExportPrecision)). Rounding is lossy
//! and only serves to shrink the output.

pub mod data_chunk;
pub mod rmx;
pub mod threejs;

pub use data_chunk::{ChunkElement, DataChunk, DataChunkBuilder, DataType};
pub use rmx::{export_rmx, ExportedAsset};
pub use threejs::{export_threejs, ThreeJsModel};

/// Round `value` to `decimals` decimal places.
pub fn round_decimals(value: f32, decimals: u32) -> f32 {
    let factor = 10f64.powi(decimals as i32);
    ((value as f64 * factor).round() / factor) as f32
}

pub fn round_slice(values: &[f32], decimals: u32) -> Vec<f32> {
    values.iter().map(|&v| round_decimals(v, decimals)).collect()
}

pub(crate) fn round_array<const N: usize>(values: [f32; N], decimals: u32) -> [f32; N] {
    values.map(|v| round_decimals(v, decimals))
}
