//! Data source and delegate collaborators.
//!
//! Both are held through non-owning [`Weak`] references: the coordinator
//! never extends their lifetime and treats a dropped collaborator as
//! unavailable instead of failing.
//!
//! # Data source lock protocol
//!
//! Before reading the data source from the coordinator (counts during a flush
//! or full reload, content during cell construction) the coordinator calls
//! [`CollectionDataSource::lock_data_source`], and it calls
//! [`CollectionDataSource::unlock_data_source`] only once the read and any
//! diff derived from it is complete. Overlapping reads share one lock
//! interval. Mutating the data source while it is locked is a caller error
//! the coordinator cannot detect.

use std::sync::{Arc, Weak};

use bitflags::bitflags;
use parking_lot::{Condvar, Mutex};

use crate::batch::BatchContext;
use crate::identity::CollectionShape;
use crate::index_path::IndexPath;
use crate::logging::targets;
use crate::native::Cell;

/// Supplies the collection's shape and constructs cells.
///
/// Implementations must be thread-safe: with asynchronous construction,
/// [`construct_cell`](Self::construct_cell) runs on worker threads.
pub trait CollectionDataSource: Send + Sync {
    /// Number of sections.
    fn number_of_sections(&self) -> usize {
        1
    }

    /// Number of items in `section`.
    fn number_of_items(&self, section: usize) -> usize;

    /// Build the cell for `index_path`.
    ///
    /// Called at most once per index path at a time and never reused. Must
    /// not touch the native widget. Failures should be handled by returning a
    /// placeholder cell.
    fn construct_cell(&self, index_path: IndexPath) -> Cell;

    /// The coordinator is about to read the data source.
    fn lock_data_source(&self);

    /// The coordinator finished reading the data source.
    fn unlock_data_source(&self);
}

bitflags! {
    /// Optional delegate operations, probed once when the delegate is attached.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DelegateCapabilities: u8 {
        /// Implements [`CollectionDelegate::will_display_cell`].
        const WILL_DISPLAY = 1 << 0;
        /// Implements [`CollectionDelegate::did_end_displaying_cell`].
        const DID_END_DISPLAYING = 1 << 1;
        /// Implements [`CollectionDelegate::should_batch_fetch`].
        const SHOULD_BATCH_FETCH = 1 << 2;
        /// Implements [`CollectionDelegate::begin_batch_fetching`].
        const BEGIN_BATCH_FETCHING = 1 << 3;
    }
}

/// Receives display and batch-fetch notifications on the UI thread.
///
/// Every callback is optional. Report the implemented ones from
/// [`capabilities`](Self::capabilities); unreported callbacks are never
/// invoked.
pub trait CollectionDelegate {
    /// The callbacks this delegate implements.
    fn capabilities(&self) -> DelegateCapabilities;

    fn will_display_cell(&self, _index_path: IndexPath) {}

    fn did_end_displaying_cell(&self, _index_path: IndexPath) {}

    /// Whether a batch fetch may begin now. Assumed `true` when unreported.
    fn should_batch_fetch(&self) -> bool {
        true
    }

    /// The scroll position approached the end of the content. The delegate
    /// must eventually call [`BatchContext::complete_batch_fetching`].
    fn begin_batch_fetching(&self, _context: BatchContext) {}
}

/// A weak data-source reference.
#[derive(Clone, Default)]
pub(crate) struct SourceRef {
    source: Option<Weak<dyn CollectionDataSource>>,
}

impl SourceRef {
    pub(crate) fn new<S: CollectionDataSource + 'static>(source: &Arc<S>) -> Self {
        let source: Arc<dyn CollectionDataSource> = source.clone();
        Self {
            source: Some(Arc::downgrade(&source)),
        }
    }

    /// The data source, if it is still alive.
    pub(crate) fn upgrade(&self) -> Option<Arc<dyn CollectionDataSource>> {
        let source = self.source.as_ref()?.upgrade();
        if source.is_none() {
            tracing::trace!(
                target: targets::SOURCE,
                "data source dropped, treating as unavailable"
            );
        }
        source
    }
}

/// A weak delegate reference with its capabilities cached at attach time.
#[derive(Clone, Default)]
pub(crate) struct DelegateRef {
    delegate: Option<Weak<dyn CollectionDelegate>>,
    capabilities: DelegateCapabilities,
}

impl DelegateRef {
    pub(crate) fn new<D: CollectionDelegate + 'static>(delegate: &Arc<D>) -> Self {
        let capabilities = delegate.capabilities();
        let delegate: Arc<dyn CollectionDelegate> = delegate.clone();
        tracing::debug!(target: targets::SOURCE, ?capabilities, "delegate attached");
        Self {
            delegate: Some(Arc::downgrade(&delegate)),
            capabilities,
        }
    }

    pub(crate) fn capabilities(&self) -> DelegateCapabilities {
        self.capabilities
    }

    fn get(&self, capability: DelegateCapabilities) -> Option<Arc<dyn CollectionDelegate>> {
        if !self.capabilities.contains(capability) {
            return None;
        }
        self.delegate.as_ref()?.upgrade()
    }

    pub(crate) fn will_display(&self, index_path: IndexPath) {
        if let Some(delegate) = self.get(DelegateCapabilities::WILL_DISPLAY) {
            delegate.will_display_cell(index_path);
        }
    }

    pub(crate) fn did_end_displaying(&self, index_path: IndexPath) {
        if let Some(delegate) = self.get(DelegateCapabilities::DID_END_DISPLAYING) {
            delegate.did_end_displaying_cell(index_path);
        }
    }

    /// Whether the delegate can receive batch fetches at all.
    pub(crate) fn can_batch_fetch(&self) -> bool {
        self.get(DelegateCapabilities::BEGIN_BATCH_FETCHING).is_some()
    }

    pub(crate) fn should_batch_fetch(&self) -> bool {
        match self.get(DelegateCapabilities::SHOULD_BATCH_FETCH) {
            Some(delegate) => delegate.should_batch_fetch(),
            None => true,
        }
    }

    pub(crate) fn begin_batch_fetching(&self, context: BatchContext) {
        if let Some(delegate) = self.get(DelegateCapabilities::BEGIN_BATCH_FETCHING) {
            delegate.begin_batch_fetching(context);
        }
    }
}

/// Reference-counted lock interval over the data source.
///
/// The first acquisition notifies the data source (`lock`), the last release
/// notifies it again (`unlock`). Overlapping readers share the interval.
///
/// The callbacks run with no internal lock held, so an application may block
/// in [`CollectionDataSource::lock_data_source`] on its own exclusion lock.
/// Acquisitions that arrive while a transition is running wait for it.
#[derive(Default)]
pub(crate) struct DataSourceLock {
    state: Mutex<LockState>,
    transition_done: Condvar,
}

#[derive(Default)]
struct LockState {
    depth: usize,
    /// The source that received `lock` and is owed `unlock`.
    locked: Option<Arc<dyn CollectionDataSource>>,
    in_transition: bool,
}

impl DataSourceLock {
    /// Enter the lock interval. Released when the guard drops, on every exit
    /// path.
    pub(crate) fn acquire(
        &self,
        source: Arc<dyn CollectionDataSource>,
    ) -> DataSourceLockGuard<'_> {
        let mut state = self.state.lock();
        while state.in_transition {
            self.transition_done.wait(&mut state);
        }
        if state.depth > 0 {
            state.depth += 1;
            return DataSourceLockGuard { lock: self, source };
        }

        state.in_transition = true;
        drop(state);
        tracing::trace!(target: targets::SOURCE, "locking data source");
        source.lock_data_source();

        let mut state = self.state.lock();
        state.depth = 1;
        state.locked = Some(Arc::clone(&source));
        state.in_transition = false;
        drop(state);
        self.transition_done.notify_all();
        DataSourceLockGuard { lock: self, source }
    }

    /// Whether any reader is inside the lock interval.
    pub(crate) fn is_locked(&self) -> bool {
        let state = self.state.lock();
        state.depth > 0 || state.in_transition
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.depth = state.depth.saturating_sub(1);
        if state.depth > 0 {
            return;
        }
        let Some(source) = state.locked.take() else {
            return;
        };
        state.in_transition = true;
        drop(state);
        tracing::trace!(target: targets::SOURCE, "unlocking data source");
        source.unlock_data_source();

        self.state.lock().in_transition = false;
        self.transition_done.notify_all();
    }
}

impl std::fmt::Debug for DataSourceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DataSourceLock")
            .field("depth", &state.depth)
            .field("in_transition", &state.in_transition)
            .finish()
    }
}

/// Scoped read access to the data source.
pub(crate) struct DataSourceLockGuard<'a> {
    lock: &'a DataSourceLock,
    source: Arc<dyn CollectionDataSource>,
}

impl DataSourceLockGuard<'_> {
    pub(crate) fn source(&self) -> &dyn CollectionDataSource {
        &*self.source
    }

    /// Read the authoritative shape.
    pub(crate) fn read_shape(&self) -> CollectionShape {
        let sections = self.source.number_of_sections();
        CollectionShape::new(
            (0..sections)
                .map(|section| self.source.number_of_items(section))
                .collect(),
        )
    }
}

impl Drop for DataSourceLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::geometry::Size;
    use crate::native::CellNode;

    struct Blank;

    impl CellNode for Blank {
        fn measure(&self, _constrained: Size) -> Size {
            Size::ZERO
        }
    }

    #[derive(Default)]
    struct CountingSource {
        locks: AtomicUsize,
        unlocks: AtomicUsize,
    }

    impl CollectionDataSource for CountingSource {
        fn number_of_sections(&self) -> usize {
            2
        }

        fn number_of_items(&self, section: usize) -> usize {
            section + 3
        }

        fn construct_cell(&self, _index_path: IndexPath) -> Cell {
            Arc::new(Blank)
        }

        fn lock_data_source(&self) {
            self.locks.fetch_add(1, Ordering::SeqCst);
        }

        fn unlock_data_source(&self) {
            self.unlocks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_nested_acquisitions_share_one_interval() {
        let source = Arc::new(CountingSource::default());
        let lock = DataSourceLock::default();

        let outer = lock.acquire(source.clone());
        let inner = lock.acquire(source.clone());
        assert!(lock.is_locked());
        drop(inner);
        assert_eq!(source.unlocks.load(Ordering::SeqCst), 0);
        drop(outer);

        assert!(!lock.is_locked());
        assert_eq!(source.locks.load(Ordering::SeqCst), 1);
        assert_eq!(source.unlocks.load(Ordering::SeqCst), 1);
    }

    /// Inspects the lock from inside its own callbacks.
    #[derive(Default)]
    struct ObservingSource {
        lock: std::sync::OnceLock<Arc<DataSourceLock>>,
        locked_during_lock: AtomicUsize,
        locked_during_unlock: AtomicUsize,
    }

    impl CollectionDataSource for ObservingSource {
        fn number_of_items(&self, _section: usize) -> usize {
            0
        }

        fn construct_cell(&self, _index_path: IndexPath) -> Cell {
            Arc::new(Blank)
        }

        fn lock_data_source(&self) {
            if self.lock.get().is_some_and(|lock| lock.is_locked()) {
                self.locked_during_lock.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn unlock_data_source(&self) {
            if self.lock.get().is_some_and(|lock| lock.is_locked()) {
                self.locked_during_unlock.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_callbacks_run_without_internal_lock() {
        let lock = Arc::new(DataSourceLock::default());
        let source = Arc::new(ObservingSource::default());
        let _ = source.lock.set(Arc::clone(&lock));

        drop(lock.acquire(source.clone()));

        // Both transitions report as locked while the callback runs.
        assert_eq!(source.locked_during_lock.load(Ordering::SeqCst), 1);
        assert_eq!(source.locked_during_unlock.load(Ordering::SeqCst), 1);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_guard_reads_shape() {
        let source = Arc::new(CountingSource::default());
        let lock = DataSourceLock::default();
        let shape = lock.acquire(source).read_shape();
        assert_eq!(shape, CollectionShape::new(vec![3, 4]));
    }

    #[test]
    fn test_release_on_early_return() {
        fn read_then_bail(lock: &DataSourceLock, source: Arc<CountingSource>) -> Option<()> {
            let guard = lock.acquire(source);
            if guard.read_shape().section_count() > 0 {
                return None;
            }
            Some(())
        }

        let source = Arc::new(CountingSource::default());
        let lock = DataSourceLock::default();
        assert!(read_then_bail(&lock, source.clone()).is_none());
        assert!(!lock.is_locked());
        assert_eq!(source.unlocks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_source_is_unavailable() {
        let source = Arc::new(CountingSource::default());
        let weak = SourceRef::new(&source);
        assert!(weak.upgrade().is_some());
        drop(source);
        assert!(weak.upgrade().is_none());
        assert!(SourceRef::default().upgrade().is_none());
    }

    struct DisplayOnly {
        shown: AtomicUsize,
    }

    impl CollectionDelegate for DisplayOnly {
        fn capabilities(&self) -> DelegateCapabilities {
            DelegateCapabilities::WILL_DISPLAY
        }

        fn will_display_cell(&self, _index_path: IndexPath) {
            self.shown.fetch_add(1, Ordering::SeqCst);
        }

        fn did_end_displaying_cell(&self, _index_path: IndexPath) {
            panic!("not reported in capabilities");
        }
    }

    #[test]
    fn test_delegate_capabilities_gate_calls() {
        let delegate = Arc::new(DisplayOnly {
            shown: AtomicUsize::new(0),
        });
        let delegate_ref = DelegateRef::new(&delegate);

        delegate_ref.will_display(IndexPath::new(0, 0));
        delegate_ref.did_end_displaying(IndexPath::new(0, 0));
        assert_eq!(delegate.shown.load(Ordering::SeqCst), 1);
        assert!(delegate_ref.should_batch_fetch());
        assert!(!delegate_ref.can_batch_fetch());
    }
}
