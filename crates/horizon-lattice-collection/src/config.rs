//! Coordinator configuration.
//!
//! Every tunable has a documented default on [`CollectionConfig`]. The
//! configuration can be built in code with the `with_*` methods or loaded from
//! TOML:
//!
//! ```
//! use horizon_lattice_collection::{CollectionConfig, ConstructionMode};
//!
//! let config = CollectionConfig::from_toml_str(r#"
//! construction_mode = "synchronous"
//! leading_screens_for_batching = 1.5
//!
//! [range_tuning]
//! leading_screens = 3.0
//! "#).unwrap();
//!
//! assert_eq!(config.construction_mode, ConstructionMode::Synchronous);
//! assert_eq!(config.range_tuning.leading_screens, 3.0);
//! assert_eq!(config.range_tuning.trailing_screens, 1.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::range::RangeTuningParameters;
use crate::threadpool::PoolConfig;

/// Where cell construction runs. Fixed for the lifetime of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructionMode {
    /// Construct inline on the UI thread; `ensure` blocks until the cell is
    /// ready.
    Synchronous,
    /// Construct on a worker pool; completions are applied by
    /// [`CollectionView::process_pending`](crate::CollectionView::process_pending).
    #[default]
    Asynchronous,
}

/// Configuration for a [`CollectionView`](crate::CollectionView).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Inline or worker-pool construction.
    pub construction_mode: ConstructionMode,
    /// Working range multipliers. Defaults to 2.0 leading and 1.0 trailing.
    pub range_tuning: RangeTuningParameters,
    /// Screens from the tail at which a batch fetch begins. Defaults to 1.0.
    pub leading_screens_for_batching: f32,
    /// Minimum scroll delta, in points, that recomputes the working range.
    pub range_update_threshold: f32,
    /// Worker count for asynchronous construction. `None` uses every core.
    pub worker_threads: Option<usize>,
    /// Name prefix for worker threads.
    pub worker_thread_name: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            construction_mode: ConstructionMode::default(),
            range_tuning: RangeTuningParameters::default(),
            leading_screens_for_batching: 1.0,
            range_update_threshold: 1.0,
            worker_threads: None,
            worker_thread_name: PoolConfig::default().thread_name,
        }
    }
}

impl CollectionConfig {
    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        Ok(config.sanitized())
    }

    pub fn with_construction_mode(mut self, mode: ConstructionMode) -> Self {
        self.construction_mode = mode;
        self
    }

    pub fn with_range_tuning(mut self, tuning: RangeTuningParameters) -> Self {
        self.range_tuning = tuning.sanitized();
        self
    }

    pub fn with_leading_screens_for_batching(mut self, screens: f32) -> Self {
        self.leading_screens_for_batching = clamp_screens(screens);
        self
    }

    pub fn with_range_update_threshold(mut self, threshold: f32) -> Self {
        self.range_update_threshold = clamp_screens(threshold);
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads.max(1));
        self
    }

    /// Clamp negative or non-finite values to zero.
    pub fn sanitized(mut self) -> Self {
        self.range_tuning = self.range_tuning.sanitized();
        self.leading_screens_for_batching = clamp_screens(self.leading_screens_for_batching);
        self.range_update_threshold = clamp_screens(self.range_update_threshold);
        self
    }

    /// The worker pool configuration for asynchronous mode.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            num_threads: self.worker_threads,
            thread_name: self.worker_thread_name.clone(),
            ..PoolConfig::default()
        }
    }
}

pub(crate) fn clamp_screens(value: f32) -> f32 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}
