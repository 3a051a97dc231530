//! Profiling support via Tracy.
//!
//! Conversion stages are instrumented with the macros below. Profiling is
//! enabled through the `profiling` Cargo feature:
//!
//! ```toml
//! [dependencies]
//! redlilium-converter = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! Connect the [Tracy profiler](https://github.com/wolfpld/tracy) to a running
//! conversion to see per-stage spans and the plotted vertex and keyframe counts.
//!
//! When the feature is disabled (the default) every macro compiles to a no-op.

#[cfg(feature = "profiling")]
pub use tracy_client::{self, plot as tracy_plot, span};

/// Create a profiling span for the current scope.
///
/// ```ignore
/// {
///     profile_scope!("compact_skinning_data");
///     // ...
/// }
/// ```
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Create a profiling span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Create a profiling span for the entire function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::span!();
    };
}

/// Create a profiling span for function (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Plot a value in Tracy.
///
/// ```ignore
/// profile_plot!("merged_vertices", vertex_count);
/// ```
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        $crate::profiling::tracy_plot!($name, $value as f64)
    };
}

/// Plot a value (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        let _ = $value;
    };
}

pub use profile_function;
pub use profile_plot;
pub use profile_scope;

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_compile() {
        profile_scope!("test_scope");
        profile_function!();
        profile_plot!("test_value", 42usize);
    }
}
