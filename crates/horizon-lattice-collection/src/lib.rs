//! Asynchronous collection view coordination for Horizon Lattice.
//!
//! This crate decouples data-source querying and cell construction from the
//! UI thread of a scrollable grid or list. The UI thread keeps ownership of
//! the native widget and of every structural change it sees, while cells are
//! constructed ahead of time, possibly on worker threads.
//!
//! - **Identity Map**: stable [`CellHandle`]s that survive structural edits
//! - **Working Range**: prefetches cells a few screens around the viewport
//! - **Construction Pipeline**: deduplicated, cancellable cell construction
//! - **Edit Queue**: batched, validated inserts, deletes, moves and reloads
//! - **Batch Fetching**: a single-slot "load more" handshake with the delegate
//! - **Data Source Lock**: tells the application when not to mutate its data
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_lattice_collection::{
//!     Cell, CellNode, CollectionConfig, CollectionDataSource, CollectionLayout,
//!     CollectionShape, CollectionView, ConstructionMode, IndexPath, NativeCollection, Rect,
//!     Size, UpdateBatch,
//! };
//!
//! struct Row;
//! impl CellNode for Row {
//!     fn measure(&self, constrained: Size) -> Size {
//!         Size::new(constrained.width, 20.0)
//!     }
//! }
//!
//! struct Rows(usize);
//! impl CollectionDataSource for Rows {
//!     fn number_of_items(&self, _section: usize) -> usize { self.0 }
//!     fn construct_cell(&self, _index_path: IndexPath) -> Cell { Arc::new(Row) }
//!     fn lock_data_source(&self) {}
//!     fn unlock_data_source(&self) {}
//! }
//!
//! struct List;
//! impl CollectionLayout for List {
//!     fn content_size(&self, shape: &CollectionShape) -> Size {
//!         Size::new(100.0, shape.total_items() as f32 * 20.0)
//!     }
//!     fn index_paths_in_rect(&self, rect: Rect, shape: &CollectionShape) -> Vec<IndexPath> {
//!         let first = (rect.top() / 20.0).floor().max(0.0) as usize;
//!         let last = (rect.bottom() / 20.0).ceil() as usize;
//!         (first..last.min(shape.item_count(0))).map(|item| IndexPath::new(0, item)).collect()
//!     }
//! }
//!
//! struct Native;
//! impl NativeCollection for Native {
//!     fn reload_data(&mut self) {}
//!     fn perform_batch_updates(&mut self, _updates: &UpdateBatch) {}
//!     fn cell_ready(&mut self, _index_path: IndexPath, _cell: &Cell) {}
//! }
//!
//! let config = CollectionConfig::default().with_construction_mode(ConstructionMode::Synchronous);
//! let mut view = CollectionView::new(config, Native, List).unwrap();
//! let rows = Arc::new(Rows(100));
//! view.set_data_source(&rows);
//! view.reload_all().unwrap();
//! view.update_viewport(Rect::new(0.0, 0.0, 100.0, 200.0));
//!
//! assert!(view.cell_at(IndexPath::new(0, 0)).is_some());
//! assert_eq!(view.size_of(IndexPath::new(0, 3)), Size::new(100.0, 20.0));
//! ```

pub mod batch;
pub mod config;
pub mod construction;
pub mod edit;
mod edit_queue;
mod error;
pub mod geometry;
pub mod identity;
mod index_path;
pub mod logging;
pub mod native;
pub mod range;
pub mod source;
pub mod thread_check;
pub mod threadpool;
mod view;

pub use batch::{BatchContext, BatchFetchContext, BatchOutcome, ScrollMetrics};
pub use config::{CollectionConfig, ConstructionMode};
pub use construction::{ConstructionState, ConstructionTicket};
pub use edit::{StructuralEdit, UpdateBatch};
pub use edit_queue::UpdateState;
pub use error::{CollectionError, Result};
pub use geometry::{Axis, Point, Rect, Size};
pub use identity::{CellHandle, CollectionShape};
pub use index_path::{section_set, IndexPath, SectionSet};
pub use logging::PerfSpan;
pub use native::{Cell, CellNode, CollectionLayout, NativeCollection};
pub use range::{RangeTuningParameters, ScrollDirection, WorkingRange};
pub use source::{CollectionDataSource, CollectionDelegate, DelegateCapabilities};
pub use view::{CollectionView, EditHandle};
