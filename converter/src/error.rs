//! Error types for conversion and export.
//!
//! Only internal invariant violations and I/O or configuration failures are
//! reported as errors. Bad or incomplete input degrades instead: creation
//! functions return `None` and log a warning.

use thiserror::Error;

/// Errors that abort a conversion.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A bone has no equivalent in the skeleton it is being re-indexed against.
    #[error("bone '{bone}' not found in target skeleton")]
    BoneNotFound {
        /// Name of the unmatched bone.
        bone: String,
    },
    /// The skeleton still has a child before its parent after sorting.
    #[error("skeleton bones are not sorted after topological sort")]
    SkeletonNotSorted,
    /// Curve inversion did not reach the requested tolerance.
    #[error("curve inversion did not converge after {iterations} iterations (time {time})")]
    BisectionDiverged {
        /// Iteration budget that was exhausted.
        iterations: usize,
        /// Sample time that could not be inverted.
        time: f64,
    },
    /// A skeleton cannot be addressed with 8-bit bone indices.
    #[error("skeleton has {count} bones, at most 256 are supported")]
    TooManyBones {
        /// Number of bones in the skeleton.
        count: usize,
    },
    /// Options failed validation.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    /// Options could not be parsed (includes unknown option keys).
    #[error("failed to parse options: {0}")]
    OptionsParse(#[from] toml::de::Error),
    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the converter.
pub type Result<T> = std::result::Result<T, ConvertError>;
