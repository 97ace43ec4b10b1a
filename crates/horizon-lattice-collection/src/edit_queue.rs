//! Structural edit queue state machine.
//!
//! ```text
//!   submit            flush            native call returns
//! Idle ──────► Collecting ──────► Applying ──────► Idle
//!                  ▲                  │ (edits submitted meanwhile)
//!                  └──────────────────┘
//! ```
//!
//! Submissions are validated against the mirrored shape and buffered in one
//! [`Changeset`]. A flush takes the whole buffer at once; edits that arrive
//! while it is applying start the next buffer.

use crate::edit::{Changeset, StructuralEdit};
use crate::error::Result;
use crate::identity::CollectionShape;
use crate::logging::targets;

/// Where the edit queue is in its flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateState {
    /// Nothing queued.
    #[default]
    Idle,
    /// Edits were submitted since the last flush.
    Collecting,
    /// A flush is being applied to the native widget.
    Applying,
}

#[derive(Debug, Default)]
pub(crate) struct EditQueue {
    state: UpdateState,
    pending: Changeset,
}

impl EditQueue {
    pub(crate) fn state(&self) -> UpdateState {
        self.state
    }

    /// Number of edits waiting for the next flush.
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Validate and buffer an edit. Returns `true` if the queue left `Idle`.
    pub(crate) fn submit(
        &mut self,
        edit: StructuralEdit,
        mirror: &CollectionShape,
    ) -> Result<bool> {
        if let Err(error) = edit.validate_against(mirror) {
            tracing::warn!(target: targets::EDITS, %error, ?edit, "rejected structural edit");
            return Err(error);
        }
        if edit.is_empty() {
            return Ok(false);
        }
        tracing::trace!(target: targets::EDITS, ?edit, "structural edit queued");
        self.pending.push(edit);
        let woke = self.state == UpdateState::Idle;
        if self.state != UpdateState::Applying {
            self.state = UpdateState::Collecting;
        }
        Ok(woke)
    }

    /// Take the buffered edits for a flush, entering `Applying`.
    pub(crate) fn begin_flush(&mut self) -> Option<Changeset> {
        if self.state != UpdateState::Collecting {
            return None;
        }
        self.state = UpdateState::Applying;
        Some(std::mem::take(&mut self.pending))
    }

    /// Leave `Applying`.
    pub(crate) fn finish_flush(&mut self) {
        self.state = if self.pending.is_empty() {
            UpdateState::Idle
        } else {
            UpdateState::Collecting
        };
    }

    /// Drop everything queued. Returns the number of edits dropped.
    pub(crate) fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending = Changeset::default();
        if self.state == UpdateState::Collecting {
            self.state = UpdateState::Idle;
        }
        dropped
    }
}
