//! Conversion context: options plus rate-limited logging state.

use std::collections::HashMap;

use crate::options::ConverterOptions;

/// Categories of high-frequency warnings that are rate limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// A resample time fell outside a channel's keyframe range.
    TimeOutOfRange,
    /// A keyframe uses an interpolation kernel that is not implemented.
    UnsupportedInterpolation,
    /// A Bezier/Hermite keyframe has no tangents.
    MissingTangents,
}

impl WarningKind {
    fn label(self) -> &'static str {
        match self {
            Self::TimeOutOfRange => "animation time out of range",
            Self::UnsupportedInterpolation => "unsupported interpolation",
            Self::MissingTangents => "missing tangents",
        }
    }
}

/// Logs the first `limit` warnings of each kind, then one suppression notice.
#[derive(Debug)]
pub struct WarningLimiter {
    limit: usize,
    counts: HashMap<WarningKind, usize>,
}

impl WarningLimiter {
    /// Create a limiter that lets `limit` warnings of each kind through.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            counts: HashMap::new(),
        }
    }

    /// Log a warning of the given kind unless the kind is already suppressed.
    ///
    /// The message is built lazily, only when it is actually logged.
    /// Returns `true` if the message was logged.
    pub fn warn(&mut self, kind: WarningKind, message: impl FnOnce() -> String) -> bool {
        let count = self.counts.entry(kind).or_insert(0);
        *count += 1;
        if *count <= self.limit {
            log::warn!("{}", message());
            true
        } else {
            if *count == self.limit + 1 {
                log::warn!("Further '{}' warnings suppressed", kind.label());
            }
            false
        }
    }

    /// Number of warnings of this kind seen so far, logged or not.
    pub fn count(&self, kind: WarningKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

/// State threaded through every conversion stage.
#[derive(Debug)]
pub struct ConvertContext {
    pub options: ConverterOptions,
    pub warnings: WarningLimiter,
}

impl ConvertContext {
    /// Create a context for the given options.
    pub fn new(options: ConverterOptions) -> Self {
        let warnings = WarningLimiter::new(options.warning_limit);
        Self { options, warnings }
    }
}

impl Default for ConvertContext {
    fn default() -> Self {
        Self::new(ConverterOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_suppresses_after_limit() {
        let mut limiter = WarningLimiter::new(2);
        assert!(limiter.warn(WarningKind::TimeOutOfRange, || "a".into()));
        assert!(limiter.warn(WarningKind::TimeOutOfRange, || "b".into()));
        assert!(!limiter.warn(WarningKind::TimeOutOfRange, || "c".into()));
        assert!(!limiter.warn(WarningKind::TimeOutOfRange, || "d".into()));
        assert_eq!(limiter.count(WarningKind::TimeOutOfRange), 4);
    }

    #[test]
    fn limiter_counts_kinds_independently() {
        let mut limiter = WarningLimiter::new(1);
        assert!(limiter.warn(WarningKind::TimeOutOfRange, || "a".into()));
        assert!(limiter.warn(WarningKind::MissingTangents, || "b".into()));
        assert!(!limiter.warn(WarningKind::TimeOutOfRange, || "c".into()));
        assert_eq!(limiter.count(WarningKind::UnsupportedInterpolation), 0);
    }
}
