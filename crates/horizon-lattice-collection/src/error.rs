//! Error types for the collection coordinator.
//!
//! Only *detectable* misuse is reported here. Stale construction results,
//! completions on cancelled batch contexts and redundant triggers are
//! expected races and never surface as errors.

use crate::index_path::IndexPath;

/// Result type alias for collection operations.
pub type Result<T> = std::result::Result<T, CollectionError>;

/// Errors reported by the collection coordinator.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    /// A section's item count after applying the queued edits does not match
    /// what the data source reports.
    #[error(
        "Invalid update: section {section} should contain {expected} items after the update \
         (before-count plus inserts minus deletes), but the data source reports {actual}"
    )]
    InconsistentUpdate {
        section: usize,
        expected: usize,
        actual: usize,
    },

    /// The number of sections after applying the queued edits does not match
    /// what the data source reports.
    #[error(
        "Invalid update: expected {expected} sections after the update, but the data source reports {actual}"
    )]
    InconsistentSectionCount { expected: usize, actual: usize },

    /// An edit references a section that does not exist.
    #[error("Section {section} is out of bounds (section count is {count})")]
    SectionOutOfBounds { section: usize, count: usize },

    /// An edit references an item that does not exist.
    #[error("Index path {index_path} is out of bounds (section holds {count} items)")]
    IndexOutOfBounds { index_path: IndexPath, count: usize },

    /// Two edits in the same flush contradict each other.
    #[error("Conflicting edit: {0}")]
    ConflictingEdit(String),

    /// The data source has been dropped or was never attached.
    #[error("The data source is no longer available")]
    DataSourceUnavailable,

    /// The construction worker pool could not be created.
    #[error("Failed to create construction worker pool: {0}")]
    ThreadPool(String),

    /// The configuration could not be parsed.
    #[error("Invalid collection configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl CollectionError {
    /// Create a conflicting-edit error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::ConflictingEdit(message.into())
    }

    /// Whether this error is a precondition violation detected while
    /// validating a flush against the data source.
    pub fn is_inconsistent_update(&self) -> bool {
        matches!(
            self,
            Self::InconsistentUpdate { .. } | Self::InconsistentSectionCount { .. }
        )
    }
}
