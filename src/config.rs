//! Pipeline configuration
//!
//! All parallelism and selection decisions are made by the caller and
//! arrive here already validated; the pipeline itself parses no CLI and
//! reads no environment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::kernel::StatKind;

/// Validated parameters for one pipeline invocation.
///
/// # Example
///
/// ```rust
/// use sweepstat::config::PipelineConfig;
/// use sweepstat::kernel::StatKind;
///
/// let config = PipelineConfig::builder("output/statistics")
///     .metrics_subpath("metrics")
///     .gatherers(4)
///     .reducers(2)
///     .memory_floor_percent(10.0)
///     .stat_kinds(vec![StatKind::Mean, StatKind::Conf95])
///     .verify(true)
///     .build();
/// assert_eq!(config.gatherer_count, 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root of the output statistics tree
    pub stat_root: PathBuf,
    /// Sub-path under each run directory holding its metrics files
    pub metrics_subpath: PathBuf,
    /// Gatherer pool size
    pub gatherer_count: usize,
    /// Reducer pool size
    pub reducer_count: usize,
    /// Minimum available-memory percentage before gathering more data
    pub memory_floor_percent: f64,
    /// Statistic families to compute
    pub stat_kinds: Vec<StatKind>,
    /// Run the cross-run integrity verifier before gathering
    pub verify_enabled: bool,
}

impl PipelineConfig {
    /// Start a builder rooted at `stat_root`.
    pub fn builder(stat_root: impl Into<PathBuf>) -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self {
                stat_root: stat_root.into(),
                metrics_subpath: PathBuf::from("metrics"),
                gatherer_count: 1,
                reducer_count: 1,
                memory_floor_percent: 0.0,
                stat_kinds: vec![StatKind::Mean],
                verify_enabled: false,
            },
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the metrics sub-path under each run directory.
    #[must_use]
    pub fn metrics_subpath(mut self, subpath: impl Into<PathBuf>) -> Self {
        self.config.metrics_subpath = subpath.into();
        self
    }

    /// Set the gatherer pool size.
    #[must_use]
    pub const fn gatherers(mut self, count: usize) -> Self {
        self.config.gatherer_count = count;
        self
    }

    /// Set the reducer pool size.
    #[must_use]
    pub const fn reducers(mut self, count: usize) -> Self {
        self.config.reducer_count = count;
        self
    }

    /// Set the memory floor for gather-side backpressure.
    #[must_use]
    pub const fn memory_floor_percent(mut self, percent: f64) -> Self {
        self.config.memory_floor_percent = percent;
        self
    }

    /// Set the statistic families to compute.
    #[must_use]
    pub fn stat_kinds(mut self, kinds: Vec<StatKind>) -> Self {
        self.config.stat_kinds = kinds;
        self
    }

    /// Enable or disable cross-run integrity verification.
    #[must_use]
    pub const fn verify(mut self, enabled: bool) -> Self {
        self.config.verify_enabled = enabled;
        self
    }

    /// Finish the builder.
    #[must_use]
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
