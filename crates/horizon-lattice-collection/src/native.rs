//! Collaborators owned by the UI: cells, the layout engine, and the native
//! scrollable widget.
//!
//! The coordinator orchestrates *when* these are asked for things; it never
//! lays out, draws or animates anything itself.

use std::sync::Arc;

use crate::edit::UpdateBatch;
use crate::geometry::{Axis, Rect, Size};
use crate::identity::CollectionShape;
use crate::index_path::IndexPath;

/// A constructed, displayable unit for one index path.
///
/// Cells are built by the data source, possibly on a worker thread, and
/// measured on the same thread right after construction.
pub trait CellNode: Send + Sync {
    /// Compute the cell's size within `constrained`.
    fn measure(&self, constrained: Size) -> Size;
}

/// Shared handle to a constructed cell.
pub type Cell = Arc<dyn CellNode>;

/// The layout engine whose geometry the coordinator consumes.
///
/// Queries receive the coordinator's mirrored shape rather than reading the
/// data source, so geometry always matches what the native widget has been
/// told about.
pub trait CollectionLayout {
    /// The scrolling axis.
    fn scroll_axis(&self) -> Axis {
        Axis::Vertical
    }

    /// Total size of the scrollable content.
    fn content_size(&self, shape: &CollectionShape) -> Size;

    /// Index paths whose frames intersect `rect`.
    fn index_paths_in_rect(&self, rect: Rect, shape: &CollectionShape) -> Vec<IndexPath>;

    /// The size a cell at `index_path` is measured against.
    ///
    /// Defaults to the viewport's cross-axis extent with an unbounded main
    /// axis.
    fn constrained_size(&self, _index_path: IndexPath, viewport: Size) -> Size {
        match self.scroll_axis() {
            Axis::Vertical => Size::new(viewport.width, f32::INFINITY),
            Axis::Horizontal => Size::new(f32::INFINITY, viewport.height),
        }
    }
}

/// The platform's scrollable grid widget.
///
/// Every method is invoked on the UI thread.
pub trait NativeCollection {
    /// Discard everything and query the collection from scratch.
    fn reload_data(&mut self);

    /// Apply one flush worth of structural changes.
    fn perform_batch_updates(&mut self, updates: &UpdateBatch);

    /// A cell finished construction and is ready for display.
    fn cell_ready(&mut self, index_path: IndexPath, cell: &Cell);
}
