//! # RedLilium Converter
//!
//! Turns a resolved scene document into a runtime asset:
//!
//! - [`document`] - the resolved scene tree the converter consumes
//! - [`mesh`] - de-indexed, per-material geometry chunks and skin weights
//! - [`skeleton`] - bones, skeleton merge and topological sort
//! - [`animation`] - channel sampling and uniform-rate resampling
//! - [`convert`] - the pipeline driver producing a [`ConvertedScene`]
//! - [`export`] - the compact binary/JSON format and the three.js JSON format
//!
//! # Example
//!
//! ```ignore
//! use redlilium_converter::{convert_document, export_rmx, ConvertContext, ExportOptions};
//!
//! let mut ctx = ConvertContext::default();
//! let scene = convert_document(&mut document, &mut ctx)?;
//! let asset = export_rmx(&scene, &ExportOptions::default())?;
//! asset.write("model.json".as_ref(), "model.bin".as_ref())?;
//! ```

pub mod animation;
pub mod context;
pub mod convert;
pub mod document;
pub mod error;
pub mod export;
pub mod math;
pub mod mesh;
pub mod options;
pub mod profiling;
pub mod skeleton;

pub use context::{ConvertContext, WarningKind, WarningLimiter};
pub use convert::{convert_document, ConvertedScene};
pub use error::{ConvertError, Result};
pub use export::{export_rmx, export_threejs, ExportedAsset, ThreeJsModel};
pub use options::{ConverterOptions, ExportOptions};

/// Converter library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
