//! Batch fetching ("load more") handshake.
//!
//! [`BatchFetchContext`] is a single-slot state object owned by the
//! coordinator. When the scroll position comes within
//! `leading_screens_for_batching` screenfuls of the end of the content and no
//! fetch is outstanding, the delegate receives a [`BatchContext`] and must
//! eventually call [`BatchContext::complete_batch_fetching`].
//!
//! Scrolling away from the tail while a fetch is outstanding marks it
//! cancelled. Completing a cancelled fetch still frees the slot but has no
//! other effect. A context handed out for an earlier fetch can never touch
//! the slot once a newer fetch has begun.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::logging::targets;

/// Scroll metrics along the scrolling axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollMetrics {
    /// Offset of the viewport's leading edge.
    pub offset: f32,
    /// Extent of the viewport.
    pub viewport_extent: f32,
    /// Extent of the whole content.
    pub content_extent: f32,
}

impl ScrollMetrics {
    /// Distance from the viewport's trailing edge to the end of the content.
    pub fn remaining(&self) -> f32 {
        self.content_extent - (self.offset + self.viewport_extent)
    }

    /// Whether the tail of the content lies within `leading_screens`
    /// viewport extents.
    pub fn is_near_tail(&self, leading_screens: f32) -> bool {
        if self.viewport_extent <= 0.0 {
            return false;
        }
        self.remaining() <= leading_screens.max(0.0) * self.viewport_extent
    }
}

/// How the most recent non-cancelled fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The delegate reported new data.
    Completed,
    /// The delegate finished without new data.
    Abandoned,
}

#[derive(Debug, Default)]
struct BatchState {
    outstanding: bool,
    cancelled: bool,
    epoch: u64,
    last_outcome: Option<BatchOutcome>,
}

/// The coordinator's single-slot batch fetch state.
#[derive(Debug, Default)]
pub struct BatchFetchContext {
    state: Arc<Mutex<BatchState>>,
}

impl BatchFetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fetch has begun and not been completed.
    pub fn is_outstanding(&self) -> bool {
        self.state.lock().outstanding
    }

    /// Whether the outstanding fetch was cancelled by scrolling away.
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// How the last non-cancelled fetch ended.
    pub fn last_outcome(&self) -> Option<BatchOutcome> {
        self.state.lock().last_outcome
    }

    /// Whether a new fetch should begin at `metrics`.
    ///
    /// `gate` is only consulted once the geometric and single-slot
    /// conditions hold.
    pub fn should_trigger(
        &self,
        metrics: ScrollMetrics,
        leading_screens: f32,
        gate: impl FnOnce() -> bool,
    ) -> bool {
        if self.is_outstanding() || !metrics.is_near_tail(leading_screens) {
            return false;
        }
        gate()
    }

    /// Mark a fetch as outstanding and hand out its context.
    pub fn begin(&self) -> BatchContext {
        let mut state = self.state.lock();
        state.outstanding = true;
        state.cancelled = false;
        state.epoch += 1;
        tracing::debug!(target: targets::BATCH, epoch = state.epoch, "batch fetch begins");
        BatchContext {
            state: self.state.clone(),
            epoch: state.epoch,
        }
    }

    /// Cancel the outstanding fetch, if any.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if state.outstanding && !state.cancelled {
            state.cancelled = true;
            tracing::debug!(target: targets::BATCH, epoch = state.epoch, "batch fetch cancelled");
        }
    }

    /// Run one viewport update through the handshake.
    ///
    /// Cancels an outstanding fetch when the tail moved out of reach, or
    /// begins a new one when [`should_trigger`](Self::should_trigger) holds.
    pub fn evaluate(
        &self,
        metrics: ScrollMetrics,
        leading_screens: f32,
        gate: impl FnOnce() -> bool,
    ) -> Option<BatchContext> {
        if self.is_outstanding() {
            if !metrics.is_near_tail(leading_screens) {
                self.cancel();
            } else {
                tracing::trace!(target: targets::BATCH, "batch fetch already outstanding");
            }
            return None;
        }
        self.should_trigger(metrics, leading_screens, gate)
            .then(|| self.begin())
    }
}

/// The delegate's handle on one batch fetch.
#[derive(Debug, Clone)]
pub struct BatchContext {
    state: Arc<Mutex<BatchState>>,
    epoch: u64,
}

impl BatchContext {
    /// Report that the fetch finished.
    ///
    /// Frees the single slot so future fetches may begin. On a cancelled or
    /// superseded fetch the call is accepted and otherwise ignored.
    pub fn complete_batch_fetching(&self, did_complete: bool) {
        let mut state = self.state.lock();
        if state.epoch != self.epoch || !state.outstanding {
            tracing::trace!(
                target: targets::BATCH,
                epoch = self.epoch,
                "stale batch completion ignored"
            );
            return;
        }
        state.outstanding = false;
        if state.cancelled {
            tracing::trace!(
                target: targets::BATCH,
                epoch = self.epoch,
                "cancelled batch fetch completed"
            );
            return;
        }
        state.last_outcome = Some(if did_complete {
            BatchOutcome::Completed
        } else {
            BatchOutcome::Abandoned
        });
        tracing::debug!(
            target: targets::BATCH,
            epoch = self.epoch,
            did_complete,
            "batch fetch completed"
        );
    }

    /// Whether this fetch was cancelled by scrolling away from the tail.
    pub fn is_cancelled(&self) -> bool {
        let state = self.state.lock();
        state.epoch == self.epoch && state.cancelled
    }

    /// Whether this fetch is still outstanding.
    pub fn is_fetching(&self) -> bool {
        let state = self.state.lock();
        state.epoch == self.epoch && state.outstanding
    }
}
