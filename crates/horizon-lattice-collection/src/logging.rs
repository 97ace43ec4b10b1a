//! Tracing targets and spans for the collection coordinator.
//!
//! The coordinator is instrumented with the `tracing` crate. To see its
//! output, install a subscriber in your application and filter by the
//! targets below, e.g. `RUST_LOG=horizon_lattice_collection::edits=debug`.
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_lattice_collection=debug")
//!     .init();
//! ```

/// Span names used for coordinator operations.
pub mod span_names {
    /// Structural edit flush.
    pub const FLUSH: &str = "horizon_lattice_collection::flush";
    /// Full reload.
    pub const RELOAD: &str = "horizon_lattice_collection::reload";
    /// Working range recomputation.
    pub const RANGE: &str = "horizon_lattice_collection::range";
}

/// Target names for log filtering.
pub mod targets {
    /// Coordinator lifecycle.
    pub const COLLECTION: &str = "horizon_lattice_collection";
    /// Working range updates.
    pub const RANGE: &str = "horizon_lattice_collection::range";
    /// Cell construction pipeline.
    pub const CONSTRUCTION: &str = "horizon_lattice_collection::construction";
    /// Structural edit queue.
    pub const EDITS: &str = "horizon_lattice_collection::edits";
    /// Batch fetching.
    pub const BATCH: &str = "horizon_lattice_collection::batch";
    /// Data source and delegate access.
    pub const SOURCE: &str = "horizon_lattice_collection::source";
}

/// A performance tracing span that is active until dropped.
///
/// ```ignore
/// let _span = PerfSpan::new(span_names::FLUSH);
/// // ... expensive work ...
/// ```
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Enter a new performance span for `operation`.
    pub fn new(operation: &'static str) -> Self {
        let span = tracing::info_span!(
            target: "horizon_lattice_collection::perf",
            "perf",
            operation
        );
        Self {
            span: span.entered(),
        }
    }
}
