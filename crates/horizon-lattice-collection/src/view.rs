//! The collection coordinator.
//!
//! [`CollectionView`] sits between an application's data source, a layout
//! engine and a native scrollable widget. It lives on the UI thread and owns
//! the native widget; the state that workers and edit submitters touch is
//! shared behind one coordinator-wide mutex.
//!
//! # Driving the coordinator
//!
//! ```ignore
//! let mut view = CollectionView::new(CollectionConfig::default(), native, layout)?;
//! view.set_data_source(&source);
//! view.set_delegate(&delegate);
//! view.set_wake_handler(move || event_loop.request_turn());
//! view.reload_all()?;
//!
//! // On every scroll or layout change:
//! view.update_viewport(visible_rect);
//!
//! // At the end of every event loop turn:
//! view.process_pending()?;
//! ```
//!
//! Structural edits can be submitted from any thread through an
//! [`EditHandle`]. They are buffered until the next flush, which happens in
//! [`CollectionView::process_pending`] or an explicit
//! [`CollectionView::flush_updates`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::batch::{BatchFetchContext, ScrollMetrics};
use crate::config::{clamp_screens, CollectionConfig, ConstructionMode};
use crate::construction::{
    Completion, ConstructionEvent, ConstructionState, ConstructionTable, ConstructionTicket,
    Request,
};
use crate::edit::{Changeset, StructuralEdit, UpdateBatch};
use crate::edit_queue::{EditQueue, UpdateState};
use crate::error::{CollectionError, Result};
use crate::geometry::{Rect, Size};
use crate::identity::{CellHandle, CollectionShape, IdentityMap};
use crate::index_path::{section_set, IndexPath};
use crate::logging::{span_names, targets, PerfSpan};
use crate::native::{Cell, CollectionLayout, NativeCollection};
use crate::range::{RangeController, RangeTuningParameters, WorkingRange};
use crate::source::{
    CollectionDataSource, CollectionDelegate, DataSourceLock, DelegateCapabilities, DelegateRef,
    SourceRef,
};
use crate::thread_check::ThreadAffinity;
use crate::threadpool::ConstructionPool;

type WakeHandler = Arc<dyn Fn() + Send + Sync>;

/// Everything guarded by the coordinator-wide lock.
#[derive(Default)]
struct CoordinatorState {
    identity: IdentityMap,
    constructions: ConstructionTable,
    edits: EditQueue,
}

/// State shared with workers and edit handles.
struct Shared {
    state: Mutex<CoordinatorState>,
    source: RwLock<SourceRef>,
    source_lock: DataSourceLock,
    completions: Sender<ConstructionEvent>,
    wake: RwLock<Option<WakeHandler>>,
}

impl Shared {
    fn source(&self) -> Result<Arc<dyn CollectionDataSource>> {
        self.source
            .read()
            .upgrade()
            .ok_or(CollectionError::DataSourceUnavailable)
    }

    fn wake(&self) {
        let handler = self.wake.read().clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    fn submit(&self, edit: StructuralEdit) -> Result<()> {
        let woke = {
            let mut state = self.state.lock();
            let mirror = state.identity.shape();
            state.edits.submit(edit, &mirror)?
        };
        if woke {
            self.wake();
        }
        Ok(())
    }

    /// Build and measure the cell for `ticket`.
    ///
    /// The data source stays locked from before the ticket's coordinate is
    /// read until construction returns. Returns `None` when the ticket was
    /// cancelled before it started or the data source is gone.
    fn construct(
        &self,
        ticket: ConstructionTicket,
        constrained: Size,
    ) -> Option<ConstructionEvent> {
        let Ok(source) = self.source() else {
            self.state.lock().constructions.abandon(ticket);
            return None;
        };
        let guard = self.source_lock.acquire(source);
        let index_path = self.state.lock().constructions.begin(ticket)?;
        let cell = guard.source().construct_cell(index_path);
        drop(guard);
        let size = cell.measure(constrained);
        Some(ConstructionEvent { ticket, cell, size })
    }

    /// Validate `changeset` against `current`, the shape just read from the
    /// data source, and apply it to the mirror.
    fn resolve_flush(
        &self,
        state: &mut CoordinatorState,
        changeset: &Changeset,
        current: &CollectionShape,
    ) -> Result<UpdateBatch> {
        let transition = changeset.resolve(&state.identity.shape(), current)?;
        let remapping = state.identity.apply_transition(&transition);
        state.constructions.apply_transition(&transition);
        tracing::debug!(
            target: targets::EDITS,
            edits = changeset.len(),
            moved = remapping.moved().count(),
            removed = remapping.removed().count(),
            "flush applied"
        );
        Ok(changeset.native_updates())
    }
}

/// Submits structural edits from any thread.
///
/// Edits are validated against the coordinator's mirrored shape on
/// submission and applied at the next flush. Deletes, reloads and move
/// sources use pre-update coordinates; inserts and move destinations use
/// post-update coordinates.
#[derive(Clone)]
pub struct EditHandle {
    shared: Arc<Shared>,
}

impl EditHandle {
    /// Queue an arbitrary structural edit.
    pub fn submit(&self, edit: StructuralEdit) -> Result<()> {
        self.shared.submit(edit)
    }

    pub fn insert_sections(&self, sections: impl IntoIterator<Item = usize>) -> Result<()> {
        self.submit(StructuralEdit::InsertSections(section_set(sections)))
    }

    pub fn delete_sections(&self, sections: impl IntoIterator<Item = usize>) -> Result<()> {
        self.submit(StructuralEdit::DeleteSections(section_set(sections)))
    }

    pub fn reload_sections(&self, sections: impl IntoIterator<Item = usize>) -> Result<()> {
        self.submit(StructuralEdit::ReloadSections(section_set(sections)))
    }

    pub fn move_section(&self, from: usize, to: usize) -> Result<()> {
        self.submit(StructuralEdit::MoveSection { from, to })
    }

    pub fn insert_items(&self, index_paths: impl IntoIterator<Item = IndexPath>) -> Result<()> {
        self.submit(StructuralEdit::InsertItems(index_paths.into_iter().collect()))
    }

    pub fn delete_items(&self, index_paths: impl IntoIterator<Item = IndexPath>) -> Result<()> {
        self.submit(StructuralEdit::DeleteItems(index_paths.into_iter().collect()))
    }

    pub fn reload_items(&self, index_paths: impl IntoIterator<Item = IndexPath>) -> Result<()> {
        self.submit(StructuralEdit::ReloadItems(index_paths.into_iter().collect()))
    }

    pub fn move_item(&self, from: IndexPath, to: IndexPath) -> Result<()> {
        self.submit(StructuralEdit::MoveItem { from, to })
    }

    /// The edit queue's current state.
    pub fn update_state(&self) -> UpdateState {
        self.shared.state.lock().edits.state()
    }
}

impl std::fmt::Debug for EditHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditHandle")
            .field("update_state", &self.update_state())
            .finish()
    }
}

static_assertions::assert_impl_all!(EditHandle: Send, Sync);

/// Coordinates asynchronous cell construction, structural edits, working
/// range prefetching and batch fetching for one native collection widget.
///
/// Every method must be called on the thread that created the view, except
/// through an [`EditHandle`].
pub struct CollectionView<N: NativeCollection> {
    shared: Arc<Shared>,
    edits: EditHandle,
    native: N,
    layout: Box<dyn CollectionLayout>,
    delegate: DelegateRef,
    affinity: ThreadAffinity,
    mode: ConstructionMode,
    pool: Option<ConstructionPool>,
    completions: Receiver<ConstructionEvent>,
    range: RangeController,
    working: WorkingRange,
    viewport: Option<Rect>,
    visible: HashMap<CellHandle, IndexPath>,
    batch: BatchFetchContext,
    leading_screens_for_batching: f32,
}

impl<N: NativeCollection> CollectionView<N> {
    /// Create a coordinator for `native`, laid out by `layout`.
    ///
    /// In asynchronous mode this starts the construction worker pool.
    pub fn new(
        config: CollectionConfig,
        native: N,
        layout: impl CollectionLayout + 'static,
    ) -> Result<Self> {
        let config = config.sanitized();
        let pool = match config.construction_mode {
            ConstructionMode::Asynchronous => Some(ConstructionPool::new(config.pool_config())?),
            ConstructionMode::Synchronous => None,
        };
        let (sender, receiver) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            state: Mutex::new(CoordinatorState::default()),
            source: RwLock::new(SourceRef::default()),
            source_lock: DataSourceLock::default(),
            completions: sender,
            wake: RwLock::new(None),
        });

        tracing::debug!(
            target: targets::COLLECTION,
            mode = ?config.construction_mode,
            workers = pool.as_ref().map(ConstructionPool::num_threads),
            "collection view created"
        );

        Ok(Self {
            edits: EditHandle {
                shared: Arc::clone(&shared),
            },
            shared,
            native,
            layout: Box::new(layout),
            delegate: DelegateRef::default(),
            affinity: ThreadAffinity::current(),
            mode: config.construction_mode,
            pool,
            completions: receiver,
            range: RangeController::new(config.range_tuning, config.range_update_threshold),
            working: WorkingRange::default(),
            viewport: None,
            visible: HashMap::new(),
            batch: BatchFetchContext::new(),
            leading_screens_for_batching: config.leading_screens_for_batching,
        })
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// Attach the data source. The view holds it weakly.
    ///
    /// Call [`reload_all`](Self::reload_all) afterwards to mirror its shape.
    pub fn set_data_source<S: CollectionDataSource + 'static>(&mut self, source: &Arc<S>) {
        self.affinity.debug_assert_same_thread("set_data_source");
        *self.shared.source.write() = SourceRef::new(source);
    }

    /// Attach the delegate. The view holds it weakly and probes its
    /// capabilities once, here.
    pub fn set_delegate<D: CollectionDelegate + 'static>(&mut self, delegate: &Arc<D>) {
        self.affinity.debug_assert_same_thread("set_delegate");
        self.delegate = DelegateRef::new(delegate);
    }

    /// Install a hook invoked from any thread whenever the view has work for
    /// [`process_pending`](Self::process_pending): a construction completed or
    /// the first edit of a batch was queued.
    pub fn set_wake_handler(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.shared.wake.write() = Some(Arc::new(handler));
    }

    /// The optional callbacks the attached delegate reported.
    pub fn delegate_capabilities(&self) -> DelegateCapabilities {
        self.delegate.capabilities()
    }

    pub fn native(&self) -> &N {
        &self.native
    }

    pub fn native_mut(&mut self) -> &mut N {
        &mut self.native
    }

    /// A thread-safe handle for submitting structural edits.
    pub fn edit_handle(&self) -> EditHandle {
        self.edits.clone()
    }

    pub fn construction_mode(&self) -> ConstructionMode {
        self.mode
    }

    // =========================================================================
    // Full reload
    // =========================================================================

    /// Discard every cell, pending construction and queued edit, re-read
    /// the data source and rebuild from scratch.
    ///
    /// This is the most expensive operation the view offers; prefer
    /// structural edits whenever the change is known.
    pub fn reload_all(&mut self) -> Result<()> {
        self.affinity.debug_assert_same_thread("reload_all");
        let _span = PerfSpan::new(span_names::RELOAD);
        let source = self.shared.source()?;

        // The data source lock is never requested under the state mutex.
        let guard = self.shared.source_lock.acquire(source);
        let shape = guard.read_shape();
        let dropped_edits = {
            let mut state = self.shared.state.lock();
            let dropped_edits = state.edits.discard();
            state.constructions.cancel_all();
            state.identity.reset(&shape);
            dropped_edits
        };
        drop(guard);
        tracing::debug!(
            target: targets::COLLECTION,
            sections = shape.section_count(),
            items = shape.total_items(),
            dropped_edits,
            "full reload"
        );

        let mut ended: Vec<IndexPath> =
            self.visible.drain().map(|(_, index_path)| index_path).collect();
        ended.sort_unstable();
        for index_path in ended {
            self.delegate.did_end_displaying(index_path);
        }
        self.working = WorkingRange::default();
        self.range.invalidate();
        self.drain_completions();

        self.native.reload_data();
        self.refresh_viewport();
        Ok(())
    }

    // =========================================================================
    // Structural edits
    // =========================================================================

    pub fn insert_sections(&self, sections: impl IntoIterator<Item = usize>) -> Result<()> {
        self.edits.insert_sections(sections)
    }

    pub fn delete_sections(&self, sections: impl IntoIterator<Item = usize>) -> Result<()> {
        self.edits.delete_sections(sections)
    }

    pub fn reload_sections(&self, sections: impl IntoIterator<Item = usize>) -> Result<()> {
        self.edits.reload_sections(sections)
    }

    pub fn move_section(&self, from: usize, to: usize) -> Result<()> {
        self.edits.move_section(from, to)
    }

    pub fn insert_items(&self, index_paths: impl IntoIterator<Item = IndexPath>) -> Result<()> {
        self.edits.insert_items(index_paths)
    }

    pub fn delete_items(&self, index_paths: impl IntoIterator<Item = IndexPath>) -> Result<()> {
        self.edits.delete_items(index_paths)
    }

    pub fn reload_items(&self, index_paths: impl IntoIterator<Item = IndexPath>) -> Result<()> {
        self.edits.reload_items(index_paths)
    }

    pub fn move_item(&self, from: IndexPath, to: IndexPath) -> Result<()> {
        self.edits.move_item(from, to)
    }

    /// Apply every queued edit to the mirror and the native widget.
    ///
    /// Returns `Ok(false)` when nothing was queued. A batch that does not
    /// match the data source's shape is rejected whole with
    /// [`CollectionError::InconsistentUpdate`] or
    /// [`CollectionError::InconsistentSectionCount`]; the mirror is left as it
    /// was and the application should [`reload_all`](Self::reload_all).
    pub fn flush_updates(&mut self) -> Result<bool> {
        self.affinity.debug_assert_same_thread("flush_updates");
        if self.shared.state.lock().edits.state() == UpdateState::Idle {
            return Ok(false);
        }

        // Lock and read the data source before taking the state mutex; edit
        // submitters may hold the application's side of the lock while they
        // wait for it.
        let guard = self.shared.source_lock.acquire(self.shared.source()?);
        let current = guard.read_shape();
        let updates = {
            let mut state = self.shared.state.lock();
            let Some(changeset) = state.edits.begin_flush() else {
                return Ok(false);
            };
            let _span = PerfSpan::new(span_names::FLUSH);
            match self.shared.resolve_flush(&mut state, &changeset, &current) {
                Ok(updates) => updates,
                Err(error) => {
                    state.edits.finish_flush();
                    tracing::warn!(
                        target: targets::EDITS,
                        %error,
                        edits = changeset.len(),
                        "flush rejected"
                    );
                    return Err(error);
                }
            }
        };
        drop(guard);

        self.native.perform_batch_updates(&updates);
        self.shared.state.lock().edits.finish_flush();
        self.refresh_viewport();
        Ok(true)
    }

    /// End-of-turn processing: flush queued edits, then apply finished
    /// constructions.
    ///
    /// Returns the number of cells that became ready. Completions are
    /// applied even when the flush is rejected; the flush error is returned
    /// afterwards.
    pub fn process_pending(&mut self) -> Result<usize> {
        let flushed = self.flush_updates();
        let applied = self.drain_completions();
        flushed.map(|_| applied)
    }

    /// The edit queue's current state.
    pub fn update_state(&self) -> UpdateState {
        self.edits.update_state()
    }

    /// Number of edits waiting for the next flush.
    pub fn queued_edit_count(&self) -> usize {
        self.shared.state.lock().edits.pending_len()
    }

    // =========================================================================
    // Viewport and working range
    // =========================================================================

    /// Report the visible rectangle after a scroll or layout change.
    ///
    /// Recomputes the working range when the change exceeds the hysteresis
    /// threshold, fills it with constructions, updates display tracking and
    /// runs the batch fetch handshake.
    pub fn update_viewport(&mut self, visible: Rect) {
        self.affinity.debug_assert_same_thread("update_viewport");
        self.viewport = Some(visible);
        let shape = self.shape();
        let axis = self.layout.scroll_axis();
        let content = self.layout.content_size(&shape);

        if let Some(rect) = self.range.update(visible, content, axis) {
            self.update_working_range(rect, &shape);
        }
        self.sync_visible();
        self.evaluate_batch_fetch(visible, content);
    }

    fn refresh_viewport(&mut self) {
        if let Some(visible) = self.viewport {
            self.range.invalidate();
            self.update_viewport(visible);
        }
    }

    fn update_working_range(&mut self, rect: Rect, shape: &CollectionShape) {
        let _span = PerfSpan::new(span_names::RANGE);
        let next = WorkingRange::new(rect, self.layout.index_paths_in_rect(rect, shape));
        let entered = next.entered_since(&self.working).count();
        let cancelled = self
            .shared
            .state
            .lock()
            .constructions
            .cancel_outside(|index_path| next.contains(index_path));
        tracing::debug!(
            target: targets::RANGE,
            len = next.len(),
            entered,
            cancelled,
            direction = ?self.range.direction(),
            "working range updated"
        );
        self.working = next;

        let index_paths: Vec<IndexPath> = self.working.iter().collect();
        for index_path in index_paths {
            self.ensure(index_path);
        }
    }

    /// The current working range.
    pub fn working_range(&self) -> &WorkingRange {
        &self.working
    }

    /// The last reported visible rectangle.
    pub fn viewport(&self) -> Option<Rect> {
        self.viewport
    }

    pub fn range_tuning_parameters(&self) -> RangeTuningParameters {
        self.range.tuning()
    }

    /// Change the working range multipliers. Negative values are clamped to
    /// zero. The range is recomputed immediately.
    pub fn set_range_tuning_parameters(&mut self, tuning: RangeTuningParameters) {
        self.affinity.debug_assert_same_thread("set_range_tuning_parameters");
        self.range.set_tuning(tuning);
        self.refresh_viewport();
    }

    pub fn leading_screens_for_batching(&self) -> f32 {
        self.leading_screens_for_batching
    }

    pub fn set_leading_screens_for_batching(&mut self, screens: f32) {
        self.leading_screens_for_batching = clamp_screens(screens);
    }

    // =========================================================================
    // Cell construction
    // =========================================================================

    /// Make sure a cell exists or is being built for `index_path`.
    ///
    /// No-op when a cell is already materialized, a construction is already
    /// pending, or the coordinate is not part of the mirrored shape. While
    /// structural edits are queued nothing is started; the working range is
    /// filled again after the flush. In synchronous mode the cell is built
    /// before this returns.
    pub fn ensure(&mut self, index_path: IndexPath) {
        let ticket = {
            let mut state = self.shared.state.lock();
            if !state.identity.contains(index_path)
                || state.identity.resolve(index_path).is_some()
            {
                return;
            }
            if state.edits.state() != UpdateState::Idle {
                // The data source may already have its post-edit shape.
                tracing::trace!(
                    target: targets::CONSTRUCTION,
                    %index_path,
                    "edits queued, construction deferred to the next flush"
                );
                return;
            }
            match state.constructions.request(index_path) {
                Request::Scheduled(ticket) => ticket,
                Request::Absorbed | Request::Revived => return,
            }
        };
        self.schedule(ticket, index_path);
    }

    fn schedule(&mut self, ticket: ConstructionTicket, index_path: IndexPath) {
        let viewport = self.viewport.map_or(Size::ZERO, |visible| visible.size);
        let constrained = self.layout.constrained_size(index_path, viewport);

        if let Some(pool) = &self.pool {
            let shared = Arc::clone(&self.shared);
            pool.spawn(move || {
                if let Some(event) = shared.construct(ticket, constrained) {
                    // The receiver only disappears with the view.
                    if shared.completions.send(event).is_ok() {
                        shared.wake();
                    }
                }
            });
            return;
        }

        if let Some(event) = self.shared.construct(ticket, constrained) {
            self.apply_completion(event);
        }
    }

    /// Apply finished constructions. Returns the number of cells that became
    /// ready.
    fn drain_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.completions.try_recv() {
            if self.apply_completion(event) {
                applied += 1;
            }
        }
        if applied > 0 {
            self.sync_visible();
        }
        applied
    }

    fn apply_completion(&mut self, event: ConstructionEvent) -> bool {
        let ConstructionEvent { ticket, cell, size } = event;
        let completion = {
            let mut state = self.shared.state.lock();
            match state.constructions.finish(ticket) {
                Completion::Apply(index_path) if state.identity.resolve(index_path).is_some() => {
                    tracing::trace!(
                        target: targets::CONSTRUCTION,
                        %index_path,
                        "slot already filled, result discarded"
                    );
                    Completion::Discard
                }
                Completion::Apply(index_path) => {
                    match state.identity.insert(index_path, cell.clone(), size) {
                        Some(_) => Completion::Apply(index_path),
                        None => Completion::Discard,
                    }
                }
                other => other,
            }
        };

        match completion {
            Completion::Apply(index_path) => {
                tracing::trace!(target: targets::CONSTRUCTION, %index_path, "cell ready");
                self.native.cell_ready(index_path, &cell);
                true
            }
            Completion::Retry(index_path) => {
                self.schedule(ticket, index_path);
                false
            }
            Completion::Discard => false,
        }
    }

    /// Block until every queued construction has run or `timeout` elapses.
    ///
    /// Returns `true` if the workers drained in time. Results still have to
    /// be applied with [`process_pending`](Self::process_pending).
    pub fn wait_for_constructions(&self, timeout: Duration) -> bool {
        self.pool
            .as_ref()
            .is_none_or(|pool| pool.wait_idle(timeout))
    }

    /// Number of requested or in-flight constructions.
    pub fn pending_construction_count(&self) -> usize {
        self.shared.state.lock().constructions.len()
    }

    /// The state of the construction pending for `index_path`, if any.
    pub fn construction_state(&self, index_path: IndexPath) -> Option<ConstructionState> {
        self.shared.state.lock().constructions.state(index_path)
    }

    /// Whether the data source is currently inside a lock interval.
    pub fn is_data_source_locked(&self) -> bool {
        self.shared.source_lock.is_locked()
    }

    // =========================================================================
    // Cells
    // =========================================================================

    /// The mirrored shape, as last told to the native widget.
    pub fn shape(&self) -> CollectionShape {
        self.shared.state.lock().identity.shape()
    }

    /// The materialized cell at `index_path`.
    pub fn cell_at(&self, index_path: IndexPath) -> Option<Cell> {
        self.shared
            .state
            .lock()
            .identity
            .record_at(index_path)
            .map(|record| record.cell().clone())
    }

    /// The identity of the cell at `index_path`.
    pub fn handle_at(&self, index_path: IndexPath) -> Option<CellHandle> {
        self.shared.state.lock().identity.resolve(index_path)
    }

    /// Where the cell identified by `handle` currently sits.
    pub fn index_path_of(&self, handle: CellHandle) -> Option<IndexPath> {
        self.shared
            .state
            .lock()
            .identity
            .get(handle)
            .map(|record| record.index_path())
    }

    /// The measured size of the cell at `index_path`, or [`Size::ZERO`] if no
    /// cell is materialized there yet.
    pub fn size_of(&self, index_path: IndexPath) -> Size {
        self.shared
            .state
            .lock()
            .identity
            .record_at(index_path)
            .map_or(Size::ZERO, |record| record.size())
    }

    /// Number of materialized cells.
    pub fn cell_count(&self) -> usize {
        self.shared.state.lock().identity.len()
    }

    /// Index paths of displayed cells, in order.
    pub fn visible_index_paths(&self) -> Vec<IndexPath> {
        let mut index_paths: Vec<IndexPath> = self.visible.values().copied().collect();
        index_paths.sort_unstable();
        index_paths
    }

    /// Displayed cells, ordered by index path.
    pub fn visible_cells(&self) -> Vec<Cell> {
        let mut visible: Vec<(IndexPath, CellHandle)> =
            self.visible.iter().map(|(&handle, &index_path)| (index_path, handle)).collect();
        visible.sort_unstable_by_key(|&(index_path, _)| index_path);
        let state = self.shared.state.lock();
        visible
            .into_iter()
            .filter_map(|(_, handle)| {
                state.identity.get(handle).map(|record| record.cell().clone())
            })
            .collect()
    }

    /// Recompute which materialized cells intersect the viewport and notify
    /// the delegate of every change.
    fn sync_visible(&mut self) {
        let Some(viewport) = self.viewport else {
            return;
        };
        let shape = self.shape();
        let in_rect = self.layout.index_paths_in_rect(viewport, &shape);
        let now: HashMap<CellHandle, IndexPath> = {
            let state = self.shared.state.lock();
            in_rect
                .into_iter()
                .filter_map(|index_path| {
                    state
                        .identity
                        .resolve(index_path)
                        .map(|handle| (handle, index_path))
                })
                .collect()
        };

        let mut ended: Vec<IndexPath> = self
            .visible
            .iter()
            .filter(|(handle, _)| !now.contains_key(*handle))
            .map(|(_, &index_path)| index_path)
            .collect();
        let mut began: Vec<IndexPath> = now
            .iter()
            .filter(|(handle, _)| !self.visible.contains_key(*handle))
            .map(|(_, &index_path)| index_path)
            .collect();
        ended.sort_unstable();
        began.sort_unstable();
        self.visible = now;

        for index_path in ended {
            self.delegate.did_end_displaying(index_path);
        }
        for index_path in began {
            self.delegate.will_display(index_path);
        }
    }

    // =========================================================================
    // Batch fetching
    // =========================================================================

    fn evaluate_batch_fetch(&mut self, visible: Rect, content: Size) {
        if !self.delegate.can_batch_fetch() {
            return;
        }
        let axis = self.layout.scroll_axis();
        let metrics = ScrollMetrics {
            offset: visible.start(axis),
            viewport_extent: visible.size.extent(axis),
            content_extent: content.extent(axis),
        };
        let delegate = &self.delegate;
        if let Some(context) = self.batch.evaluate(metrics, self.leading_screens_for_batching, || {
            delegate.should_batch_fetch()
        }) {
            delegate.begin_batch_fetching(context);
        }
    }

    /// The single-slot batch fetch state.
    pub fn batch_fetch_context(&self) -> &BatchFetchContext {
        &self.batch
    }
}

impl<N: NativeCollection> std::fmt::Debug for CollectionView<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionView")
            .field("mode", &self.mode)
            .field("viewport", &self.viewport)
            .field("working_range", &self.working.len())
            .field("visible", &self.visible.len())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
