//! Working range tuning.
//!
//! The working range is the visible rectangle expanded by
//! `leading_screens` viewport extents in the direction of travel and
//! `trailing_screens` behind it, clipped to the content. Every index path
//! whose frame intersects it should have a materialized cell. It is derived
//! data: recomputed on every qualifying scroll and never persisted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::geometry::{Axis, Rect, Size};
use crate::index_path::IndexPath;

/// How far beyond the viewport cells are prepared, in screenfuls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeTuningParameters {
    /// Screens prepared ahead of the scroll direction.
    pub leading_screens: f32,
    /// Screens kept behind the scroll direction.
    pub trailing_screens: f32,
}

impl Default for RangeTuningParameters {
    fn default() -> Self {
        Self {
            leading_screens: 2.0,
            trailing_screens: 1.0,
        }
    }
}

impl RangeTuningParameters {
    pub fn new(leading_screens: f32, trailing_screens: f32) -> Self {
        Self {
            leading_screens,
            trailing_screens,
        }
        .sanitized()
    }

    /// Clamp negative or non-finite multipliers to zero.
    pub fn sanitized(self) -> Self {
        Self {
            leading_screens: finite_or_zero(self.leading_screens).max(0.0),
            trailing_screens: finite_or_zero(self.trailing_screens).max(0.0),
        }
    }
}

/// Direction of the last significant scroll along the scrolling axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollDirection {
    /// Towards the end of the content.
    #[default]
    Forward,
    /// Towards the start of the content.
    Reverse,
}

/// Expand `visible` by the tuning parameters and clip it to the content.
pub fn working_rect(
    visible: Rect,
    content: Size,
    axis: Axis,
    direction: ScrollDirection,
    tuning: RangeTuningParameters,
) -> Rect {
    let tuning = tuning.sanitized();
    let (before, after) = match direction {
        ScrollDirection::Forward => (tuning.trailing_screens, tuning.leading_screens),
        ScrollDirection::Reverse => (tuning.leading_screens, tuning.trailing_screens),
    };
    // Non-finite geometry collapses to zero.
    let extent = finite_or_zero(visible.size.extent(axis)).max(0.0);
    let visible_start = finite_or_zero(visible.start(axis));
    let content_end = finite_or_zero(content.extent(axis)).max(0.0);
    let start = (visible_start - before * extent).clamp(0.0, content_end);
    let end = (visible_start + extent + after * extent).clamp(start, content_end);
    visible.with_span(axis, start, end)
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}

/// The index paths that should have materialized cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingRange {
    rect: Rect,
    index_paths: BTreeSet<IndexPath>,
}

impl WorkingRange {
    pub fn new(rect: Rect, index_paths: impl IntoIterator<Item = IndexPath>) -> Self {
        Self {
            rect,
            index_paths: index_paths.into_iter().collect(),
        }
    }

    /// The expanded rectangle this range was derived from.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn contains(&self, index_path: IndexPath) -> bool {
        self.index_paths.contains(&index_path)
    }

    pub fn len(&self) -> usize {
        self.index_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = IndexPath> + '_ {
        self.index_paths.iter().copied()
    }

    /// Index paths present in `self` but not in `previous`.
    pub fn entered_since<'a>(
        &'a self,
        previous: &'a WorkingRange,
    ) -> impl Iterator<Item = IndexPath> + 'a {
        self.index_paths.difference(&previous.index_paths).copied()
    }
}

/// Decides when the working range must be recomputed and in which
/// direction it leans.
#[derive(Debug, Clone)]
pub struct RangeController {
    tuning: RangeTuningParameters,
    threshold: f32,
    last_visible: Option<Rect>,
    direction: ScrollDirection,
}

impl RangeController {
    pub fn new(tuning: RangeTuningParameters, threshold: f32) -> Self {
        Self {
            tuning: tuning.sanitized(),
            threshold: threshold.max(0.0),
            last_visible: None,
            direction: ScrollDirection::Forward,
        }
    }

    pub fn tuning(&self) -> RangeTuningParameters {
        self.tuning
    }

    /// Change the tuning. The next update recomputes unconditionally.
    pub fn set_tuning(&mut self, tuning: RangeTuningParameters) {
        self.tuning = tuning.sanitized();
        self.invalidate();
    }

    pub fn direction(&self) -> ScrollDirection {
        self.direction
    }

    /// The visible rectangle of the last accepted update.
    pub fn last_visible(&self) -> Option<Rect> {
        self.last_visible
    }

    /// Force the next update to recompute.
    pub fn invalidate(&mut self) {
        self.last_visible = None;
    }

    /// Accept a new visible rectangle.
    ///
    /// Returns the new working rectangle, or `None` when the change is below
    /// the hysteresis threshold and the previous range still applies.
    pub fn update(&mut self, visible: Rect, content: Size, axis: Axis) -> Option<Rect> {
        if let Some(last) = self.last_visible {
            let delta = visible.start(axis) - last.start(axis);
            let cross = match axis {
                Axis::Vertical => visible.left() - last.left(),
                Axis::Horizontal => visible.top() - last.top(),
            };
            if delta.abs() < self.threshold
                && cross.abs() < self.threshold
                && visible.size == last.size
            {
                return None;
            }
            if delta > 0.0 {
                self.direction = ScrollDirection::Forward;
            } else if delta < 0.0 {
                self.direction = ScrollDirection::Reverse;
            }
        }
        self.last_visible = Some(visible);
        Some(working_rect(visible, content, axis, self.direction, self.tuning))
    }
}
