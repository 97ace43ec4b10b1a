//! Shared fixtures: an in-memory data source, a uniform list layout, a
//! recording native widget and a recording delegate.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use horizon_lattice_collection::{
    BatchContext, Cell, CellNode, CollectionConfig, CollectionDataSource, CollectionDelegate,
    CollectionLayout, CollectionShape, CollectionView, ConstructionMode, DelegateCapabilities,
    IndexPath, NativeCollection, RangeTuningParameters, Rect, Size, UpdateBatch,
};

pub const ROW_HEIGHT: f32 = 20.0;
pub const WIDTH: f32 = 100.0;

pub fn ip(section: usize, item: usize) -> IndexPath {
    IndexPath::new(section, item)
}

/// The viewport showing exactly `rows` rows starting at flat row `first`.
pub fn rows_rect(first: usize, rows: usize) -> Rect {
    Rect::new(0.0, first as f32 * ROW_HEIGHT, WIDTH, rows as f32 * ROW_HEIGHT)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Cells
// =============================================================================

pub struct TestCell {
    measure_gate: Option<Receiver<()>>,
    measuring: Option<Sender<IndexPath>>,
    index_path: IndexPath,
}

impl CellNode for TestCell {
    fn measure(&self, constrained: Size) -> Size {
        if let Some(measuring) = &self.measuring {
            let _ = measuring.send(self.index_path);
        }
        if let Some(gate) = &self.measure_gate {
            // Blocks until the test drops the sender.
            let _ = gate.recv();
        }
        Size::new(constrained.width, ROW_HEIGHT)
    }
}

// =============================================================================
// Data source
// =============================================================================

/// An in-memory data source. Measurement can be gated so tests control when
/// constructions complete; the data source itself is unlocked by then.
#[derive(Default)]
pub struct TestSource {
    sections: Mutex<Vec<usize>>,
    constructed: Mutex<HashMap<IndexPath, usize>>,
    built: Mutex<Vec<(IndexPath, Cell)>>,
    measure_gate: Mutex<Option<Receiver<()>>>,
    measuring: Mutex<Option<Sender<IndexPath>>>,
    depth: AtomicUsize,
    pub locks: AtomicUsize,
    pub unlocks: AtomicUsize,
    mutated_while_locked: AtomicBool,
}

impl TestSource {
    pub fn new(sections: &[usize]) -> Arc<Self> {
        let source = Self::default();
        *source.sections.lock() = sections.to_vec();
        Arc::new(source)
    }

    /// Block every subsequent measurement until the returned sender drops.
    /// Each measurement reports its index path on the returned receiver
    /// before blocking.
    pub fn gate_measurement(&self) -> (Sender<()>, Receiver<IndexPath>) {
        let (release, gate) = crossbeam_channel::bounded(0);
        let (measuring, started) = crossbeam_channel::unbounded();
        *self.measure_gate.lock() = Some(gate);
        *self.measuring.lock() = Some(measuring);
        (release, started)
    }

    pub fn set_sections(&self, sections: &[usize]) {
        self.check_unlocked();
        *self.sections.lock() = sections.to_vec();
    }

    pub fn insert_items(&self, section: usize, count: usize) {
        self.check_unlocked();
        self.sections.lock()[section] += count;
    }

    pub fn remove_items(&self, section: usize, count: usize) {
        self.check_unlocked();
        self.sections.lock()[section] -= count;
    }

    pub fn constructions(&self, index_path: IndexPath) -> usize {
        self.constructed.lock().get(&index_path).copied().unwrap_or(0)
    }

    pub fn total_constructions(&self) -> usize {
        self.constructed.lock().values().sum()
    }

    /// Every cell built so far, in construction order.
    pub fn built(&self) -> Vec<(IndexPath, Cell)> {
        self.built.lock().clone()
    }

    pub fn is_locked(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    pub fn mutated_while_locked(&self) -> bool {
        self.mutated_while_locked.load(Ordering::SeqCst)
    }

    fn check_unlocked(&self) {
        if self.is_locked() {
            self.mutated_while_locked.store(true, Ordering::SeqCst);
        }
    }
}

impl CollectionDataSource for TestSource {
    fn number_of_sections(&self) -> usize {
        self.sections.lock().len()
    }

    fn number_of_items(&self, section: usize) -> usize {
        self.sections.lock().get(section).copied().unwrap_or(0)
    }

    fn construct_cell(&self, index_path: IndexPath) -> Cell {
        *self.constructed.lock().entry(index_path).or_default() += 1;
        let cell: Cell = Arc::new(TestCell {
            measure_gate: self.measure_gate.lock().clone(),
            measuring: self.measuring.lock().clone(),
            index_path,
        });
        self.built.lock().push((index_path, cell.clone()));
        cell
    }

    fn lock_data_source(&self) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.locks.fetch_add(1, Ordering::SeqCst);
    }

    fn unlock_data_source(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
        self.unlocks.fetch_add(1, Ordering::SeqCst);
    }
}

/// A cell that measures to one row.
pub struct PlainCell;

impl CellNode for PlainCell {
    fn measure(&self, constrained: Size) -> Size {
        Size::new(constrained.width, ROW_HEIGHT)
    }
}

/// A data source whose lock interval is a real exclusion lock: an
/// application writer calling [`hold`](Self::hold) and the coordinator's lock
/// interval never overlap.
#[derive(Default)]
pub struct ExclusiveSource {
    sections: Mutex<Vec<usize>>,
    held: Mutex<bool>,
    released: Condvar,
}

impl ExclusiveSource {
    pub fn new(sections: &[usize]) -> Arc<Self> {
        let source = Self::default();
        *source.sections.lock() = sections.to_vec();
        Arc::new(source)
    }

    /// Take the exclusion lock, waiting for the coordinator to unlock.
    pub fn hold(&self) {
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
        *held = true;
    }

    pub fn release(&self) {
        *self.held.lock() = false;
        self.released.notify_all();
    }

    pub fn is_held(&self) -> bool {
        *self.held.lock()
    }

    /// Must be called while holding the exclusion lock.
    pub fn insert_items(&self, section: usize, count: usize) {
        assert!(self.is_held(), "mutated without holding the lock");
        self.sections.lock()[section] += count;
    }
}

impl CollectionDataSource for ExclusiveSource {
    fn number_of_sections(&self) -> usize {
        self.sections.lock().len()
    }

    fn number_of_items(&self, section: usize) -> usize {
        self.sections.lock().get(section).copied().unwrap_or(0)
    }

    fn construct_cell(&self, _index_path: IndexPath) -> Cell {
        Arc::new(PlainCell)
    }

    fn lock_data_source(&self) {
        self.hold();
    }

    fn unlock_data_source(&self) {
        self.release();
    }
}

// =============================================================================
// Layout
// =============================================================================

/// Every item is one fixed-height row; sections are stacked vertically.
pub struct ListLayout;

impl CollectionLayout for ListLayout {
    fn content_size(&self, shape: &CollectionShape) -> Size {
        Size::new(WIDTH, shape.total_items() as f32 * ROW_HEIGHT)
    }

    fn index_paths_in_rect(&self, rect: Rect, shape: &CollectionShape) -> Vec<IndexPath> {
        shape
            .index_paths()
            .enumerate()
            .filter(|(row, _)| {
                let frame = Rect::new(0.0, *row as f32 * ROW_HEIGHT, WIDTH, ROW_HEIGHT);
                frame.intersects(&rect)
            })
            .map(|(_, index_path)| index_path)
            .collect()
    }
}

// =============================================================================
// Native widget
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    ReloadData,
    BatchUpdates(UpdateBatch),
    CellReady(IndexPath),
}

#[derive(Default)]
pub struct RecordingNative {
    pub calls: Vec<NativeCall>,
}

impl RecordingNative {
    pub fn batches(&self) -> Vec<&UpdateBatch> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                NativeCall::BatchUpdates(batch) => Some(batch),
                _ => None,
            })
            .collect()
    }

    pub fn ready_count(&self, index_path: IndexPath) -> usize {
        self.calls
            .iter()
            .filter(|call| **call == NativeCall::CellReady(index_path))
            .count()
    }
}

impl NativeCollection for RecordingNative {
    fn reload_data(&mut self) {
        self.calls.push(NativeCall::ReloadData);
    }

    fn perform_batch_updates(&mut self, updates: &UpdateBatch) {
        self.calls.push(NativeCall::BatchUpdates(updates.clone()));
    }

    fn cell_ready(&mut self, index_path: IndexPath, _cell: &Cell) {
        self.calls.push(NativeCall::CellReady(index_path));
    }
}

// =============================================================================
// Delegate
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum DelegateEvent {
    WillDisplay(IndexPath),
    DidEndDisplaying(IndexPath),
    BeginBatchFetching,
}

pub struct RecordingDelegate {
    capabilities: DelegateCapabilities,
    pub allow_batch_fetch: AtomicBool,
    pub should_batch_fetch_calls: AtomicUsize,
    pub events: Mutex<Vec<DelegateEvent>>,
    pub context: Mutex<Option<BatchContext>>,
}

impl RecordingDelegate {
    pub fn new(capabilities: DelegateCapabilities) -> Arc<Self> {
        Arc::new(Self {
            capabilities,
            allow_batch_fetch: AtomicBool::new(true),
            should_batch_fetch_calls: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
            context: Mutex::new(None),
        })
    }

    pub fn events(&self) -> Vec<DelegateEvent> {
        self.events.lock().clone()
    }

    pub fn batch_begins(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| **event == DelegateEvent::BeginBatchFetching)
            .count()
    }

    pub fn take_context(&self) -> Option<BatchContext> {
        self.context.lock().take()
    }
}

impl CollectionDelegate for RecordingDelegate {
    fn capabilities(&self) -> DelegateCapabilities {
        self.capabilities
    }

    fn will_display_cell(&self, index_path: IndexPath) {
        self.events.lock().push(DelegateEvent::WillDisplay(index_path));
    }

    fn did_end_displaying_cell(&self, index_path: IndexPath) {
        self.events.lock().push(DelegateEvent::DidEndDisplaying(index_path));
    }

    fn should_batch_fetch(&self) -> bool {
        self.should_batch_fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.allow_batch_fetch.load(Ordering::SeqCst)
    }

    fn begin_batch_fetching(&self, context: BatchContext) {
        self.events.lock().push(DelegateEvent::BeginBatchFetching);
        *self.context.lock() = Some(context);
    }
}

// =============================================================================
// Views
// =============================================================================

pub fn config(mode: ConstructionMode) -> CollectionConfig {
    CollectionConfig::default()
        .with_construction_mode(mode)
        .with_worker_threads(2)
}

/// A view with no prefetching beyond the viewport.
pub fn tight_config(mode: ConstructionMode) -> CollectionConfig {
    config(mode).with_range_tuning(RangeTuningParameters::new(0.0, 0.0))
}

pub fn view_with(
    config: CollectionConfig,
    source: &Arc<TestSource>,
) -> CollectionView<RecordingNative> {
    init_tracing();
    let mut view = CollectionView::new(config, RecordingNative::default(), ListLayout).unwrap();
    view.set_data_source(source);
    view.reload_all().unwrap();
    view
}
