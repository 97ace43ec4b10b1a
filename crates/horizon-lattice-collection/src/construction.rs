//! Pending cell constructions.
//!
//! Every requested construction is a [`ConstructionTicket`]. At most one
//! ticket is keyed to an index path at a time, so repeated requests before
//! completion are absorbed. Tickets follow structural edits exactly like cell
//! handles do: a flush rewrites their coordinates through the same
//! [`Transition`], and a ticket whose coordinate is deleted or reloaded is
//! cancelled and detached.
//!
//! Completions are ordered against flushes by a generation stamp. A
//! construction records the flush generation when it begins; if a flush has
//! happened by the time it completes, the result was built from a coordinate
//! that no longer means the same thing and the ticket is retried at its new
//! coordinate instead of being applied.

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use crate::edit::Transition;
use crate::geometry::Size;
use crate::index_path::IndexPath;
use crate::logging::targets;
use crate::native::Cell;

new_key_type! {
    /// Identity of one pending construction.
    pub struct ConstructionTicket;
}

/// Lifecycle of a pending construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionState {
    /// Queued; the construction callback has not started.
    Requested,
    /// The construction callback is running.
    InFlight,
    /// The result was accepted.
    Completed,
    /// The result will be discarded on arrival.
    Cancelled,
}

/// Result of [`ConstructionTable::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// A new ticket; the caller must schedule its construction.
    Scheduled(ConstructionTicket),
    /// A pending construction already covers the index path.
    Absorbed,
    /// A cancelled construction was resumed; its job is still scheduled.
    Revived,
}

/// What to do with a finished construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Assign the cell at this coordinate.
    Apply(IndexPath),
    /// A flush intervened. The ticket is requested again at this coordinate
    /// and must be rescheduled.
    Retry(IndexPath),
    /// Drop the result.
    Discard,
}

/// A constructed and measured cell travelling back to the UI thread.
pub(crate) struct ConstructionEvent {
    pub(crate) ticket: ConstructionTicket,
    pub(crate) cell: Cell,
    pub(crate) size: Size,
}

#[derive(Debug)]
struct PendingConstruction {
    index_path: IndexPath,
    state: ConstructionState,
    /// Flush generation the callback started under.
    started: Option<u64>,
    /// Detached from its coordinate by an edit or a full reload.
    detached: bool,
}

/// Every pending construction of one coordinator.
#[derive(Debug, Default)]
pub struct ConstructionTable {
    tickets: SlotMap<ConstructionTicket, PendingConstruction>,
    by_path: HashMap<IndexPath, ConstructionTicket>,
    generation: u64,
}

impl ConstructionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a construction for `index_path`.
    pub fn request(&mut self, index_path: IndexPath) -> Request {
        if let Some(&ticket) = self.by_path.get(&index_path) {
            if let Some(pending) = self.tickets.get_mut(ticket) {
                if pending.state != ConstructionState::Cancelled {
                    tracing::trace!(
                        target: targets::CONSTRUCTION,
                        %index_path,
                        "construction already pending"
                    );
                    return Request::Absorbed;
                }
                pending.state = if pending.started.is_some() {
                    ConstructionState::InFlight
                } else {
                    ConstructionState::Requested
                };
                tracing::trace!(target: targets::CONSTRUCTION, %index_path, "construction revived");
                return Request::Revived;
            }
        }

        let ticket = self.tickets.insert(PendingConstruction {
            index_path,
            state: ConstructionState::Requested,
            started: None,
            detached: false,
        });
        self.by_path.insert(index_path, ticket);
        Request::Scheduled(ticket)
    }

    /// The construction callback is about to run.
    ///
    /// Returns the coordinate to construct, or `None` if the ticket was
    /// cancelled before it started; the ticket is then dropped and the
    /// callback must be skipped.
    pub fn begin(&mut self, ticket: ConstructionTicket) -> Option<IndexPath> {
        let pending = self.tickets.get_mut(ticket)?;
        if pending.state != ConstructionState::Requested {
            self.abandon(ticket);
            return None;
        }
        pending.state = ConstructionState::InFlight;
        pending.started = Some(self.generation);
        Some(pending.index_path)
    }

    /// Drop a ticket whose construction will never run.
    pub fn abandon(&mut self, ticket: ConstructionTicket) {
        if let Some(pending) = self.tickets.remove(ticket) {
            self.unkey(ticket, pending.index_path);
        }
    }

    /// The construction callback returned.
    pub fn finish(&mut self, ticket: ConstructionTicket) -> Completion {
        let Some(pending) = self.tickets.get_mut(ticket) else {
            return Completion::Discard;
        };
        let index_path = pending.index_path;

        if pending.state != ConstructionState::InFlight || pending.detached {
            tracing::trace!(
                target: targets::CONSTRUCTION,
                %index_path,
                "cancelled construction discarded"
            );
            self.abandon(ticket);
            return Completion::Discard;
        }

        if pending.started != Some(self.generation) {
            pending.state = ConstructionState::Requested;
            pending.started = None;
            tracing::trace!(
                target: targets::CONSTRUCTION,
                %index_path,
                "construction outlived a flush, retrying"
            );
            return Completion::Retry(index_path);
        }

        pending.state = ConstructionState::Completed;
        self.abandon(ticket);
        Completion::Apply(index_path)
    }

    /// Cancel every pending construction whose coordinate fails `keep`.
    ///
    /// Cancelled tickets stay keyed to their coordinate so a request before
    /// the callback returns resumes them. Returns the number cancelled.
    pub fn cancel_outside(&mut self, keep: impl Fn(IndexPath) -> bool) -> usize {
        let mut cancelled = 0;
        for &ticket in self.by_path.values() {
            let Some(pending) = self.tickets.get_mut(ticket) else {
                continue;
            };
            if pending.state != ConstructionState::Cancelled && !keep(pending.index_path) {
                pending.state = ConstructionState::Cancelled;
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::trace!(
                target: targets::CONSTRUCTION,
                cancelled,
                "constructions left the working range"
            );
        }
        cancelled
    }

    /// Follow a flush: move every ticket to its post-update coordinate and
    /// detach the ones whose coordinate was deleted or reloaded.
    pub fn apply_transition(&mut self, transition: &Transition) {
        self.generation += 1;
        let keyed = std::mem::take(&mut self.by_path);
        for (from, ticket) in keyed {
            let Some(pending) = self.tickets.get_mut(ticket) else {
                continue;
            };
            match transition.map(from) {
                Some(to) => {
                    pending.index_path = to;
                    self.by_path.insert(to, ticket);
                }
                None => {
                    tracing::trace!(
                        target: targets::CONSTRUCTION,
                        index_path = %from,
                        "edit cancelled pending construction"
                    );
                    pending.state = ConstructionState::Cancelled;
                    pending.detached = true;
                }
            }
        }
    }

    /// Cancel and detach everything, as for a full reload.
    pub fn cancel_all(&mut self) {
        self.generation += 1;
        self.by_path.clear();
        for pending in self.tickets.values_mut() {
            pending.state = ConstructionState::Cancelled;
            pending.detached = true;
        }
    }

    /// The state of the construction keyed to `index_path`.
    pub fn state(&self, index_path: IndexPath) -> Option<ConstructionState> {
        let ticket = self.by_path.get(&index_path)?;
        self.tickets.get(*ticket).map(|pending| pending.state)
    }

    /// Number of requested or in-flight constructions.
    pub fn len(&self) -> usize {
        self.by_path
            .values()
            .filter_map(|&ticket| self.tickets.get(ticket))
            .filter(|pending| {
                matches!(
                    pending.state,
                    ConstructionState::Requested | ConstructionState::InFlight
                )
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unkey(&mut self, ticket: ConstructionTicket, index_path: IndexPath) {
        if self.by_path.get(&index_path) == Some(&ticket) {
            self.by_path.remove(&index_path);
        }
    }
}
