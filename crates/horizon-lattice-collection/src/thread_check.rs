//! UI-thread affinity checks.
//!
//! The coordinator owns the native widget and must only be driven from the
//! thread that created it. [`ThreadAffinity`] records that thread and
//! provides assertions for UI-only entry points. Structural edits submitted
//! through [`crate::EditHandle`] are exempt: they may come from any thread.
//!
//! Checks are active in debug builds by default and can be toggled at
//! runtime with [`set_thread_checks_enabled`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;

/// Flag to enable/disable runtime thread checks globally.
static THREAD_CHECKS_ENABLED: AtomicBool = AtomicBool::new(cfg!(debug_assertions));

/// Enable or disable affinity checks.
pub fn set_thread_checks_enabled(enabled: bool) {
    THREAD_CHECKS_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Whether affinity checks are enabled.
#[inline]
pub fn are_thread_checks_enabled() -> bool {
    THREAD_CHECKS_ENABLED.load(Ordering::Relaxed)
}

/// Binds an object to the thread that created it.
#[derive(Debug, Clone, Copy)]
pub struct ThreadAffinity {
    thread_id: ThreadId,
}

impl ThreadAffinity {
    /// Bind to the current thread.
    #[inline]
    pub fn current() -> Self {
        Self {
            thread_id: std::thread::current().id(),
        }
    }

    /// Whether the current thread is the bound thread.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Panic if called off the bound thread while checks are enabled.
    #[track_caller]
    pub fn assert_same_thread(&self, operation: &str) {
        if are_thread_checks_enabled() && !self.is_same_thread() {
            panic!(
                "{operation} must be called on the collection's UI thread ({:?}), \
                 but was called on {:?}",
                self.thread_id,
                std::thread::current().id()
            );
        }
    }

    /// Like [`assert_same_thread`](Self::assert_same_thread), compiled out in
    /// release builds.
    #[inline]
    #[track_caller]
    pub fn debug_assert_same_thread(&self, operation: &str) {
        #[cfg(debug_assertions)]
        self.assert_same_thread(operation);
        #[cfg(not(debug_assertions))]
        let _ = operation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_affinity_same_thread() {
        let affinity = ThreadAffinity::current();
        assert!(affinity.is_same_thread());
        affinity.assert_same_thread("test");
    }

    #[test]
    fn test_thread_affinity_different_thread() {
        let affinity = ThreadAffinity::current();
        let same = std::thread::spawn(move || affinity.is_same_thread())
            .join()
            .unwrap();
        assert!(!same);
    }

    #[test]
    fn test_thread_affinity_panic_on_wrong_thread() {
        let affinity = ThreadAffinity::current();
        set_thread_checks_enabled(true);
        let result = std::thread::spawn(move || {
            affinity.assert_same_thread("flush_updates");
        })
        .join();
        assert!(result.is_err(), "Expected thread to panic with affinity violation");
    }
}
