//! Worker pool for asynchronous cell construction.
//!
//! Built on rayon's work-stealing pool. Each coordinator running in
//! asynchronous mode owns one [`ConstructionPool`]; construction jobs are
//! fire-and-forget and report back through the coordinator's completion
//! channel. The pool tracks active jobs so hosts can wait for it to drain.
//!
//! # Example
//!
//! ```
//! use horizon_lattice_collection::threadpool::{ConstructionPool, PoolConfig};
//! use std::time::Duration;
//!
//! let pool = ConstructionPool::new(PoolConfig::with_threads(2)).unwrap();
//! pool.spawn(|| {
//!     // Build a cell...
//! });
//! assert!(pool.wait_idle(Duration::from_secs(1)));
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool as RayonThreadPool, ThreadPoolBuilder};

use crate::error::{CollectionError, Result};

/// Configuration for a construction pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads. `None` means use the number of CPU cores.
    pub num_threads: Option<usize>,
    /// Name prefix for worker threads.
    pub thread_name: String,
    /// Stack size for worker threads in bytes.
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            thread_name: "horizon-cell-worker".to_string(),
            stack_size: None,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with custom thread count.
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
            ..Default::default()
        }
    }
}

/// Tracks running jobs and wakes waiters when the count drops to zero.
#[derive(Debug, Default)]
struct ActivityTracker {
    active: AtomicUsize,
    lock: Mutex<()>,
    idle: Condvar,
}

impl ActivityTracker {
    fn start(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    fn finish(&self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Hold the lock while notifying to avoid a lost wakeup.
            let _guard = self.lock.lock();
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock();
        while self.active.load(Ordering::Acquire) > 0 {
            if self.idle.wait_until(&mut guard, deadline).timed_out() {
                return self.active.load(Ordering::Acquire) == 0;
            }
        }
        true
    }
}

/// Decrements the active count even if the job panics.
struct JobGuard(Arc<ActivityTracker>);

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// A thread pool dedicated to cell construction.
pub struct ConstructionPool {
    pool: RayonThreadPool,
    activity: Arc<ActivityTracker>,
}

impl ConstructionPool {
    /// Create a new pool with the given configuration.
    pub fn new(config: PoolConfig) -> Result<Self> {
        let thread_name = config.thread_name;
        let mut builder =
            ThreadPoolBuilder::new().thread_name(move |index| format!("{thread_name}-{index}"));

        if let Some(num_threads) = config.num_threads {
            builder = builder.num_threads(num_threads);
        }

        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let pool = builder
            .build()
            .map_err(|e| CollectionError::ThreadPool(e.to_string()))?;

        Ok(Self {
            pool,
            activity: Arc::new(ActivityTracker::default()),
        })
    }

    /// Get the number of threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Get the number of queued or running jobs.
    pub fn active_tasks(&self) -> usize {
        self.activity.active.load(Ordering::Acquire)
    }

    /// Queue a job on the pool.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.activity.start();
        let guard = JobGuard(self.activity.clone());
        self.pool.spawn(move || {
            let _guard = guard;
            job();
        });
    }

    /// Block until every queued job has finished or `timeout` elapses.
    ///
    /// Returns `true` if the pool drained in time.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.activity.wait_idle(timeout)
    }
}

impl std::fmt::Debug for ConstructionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructionPool")
            .field("num_threads", &self.num_threads())
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}
