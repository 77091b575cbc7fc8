//! # Sweepstat: Parallel Experiment-Statistics Reduction
//!
//! Sweepstat turns the many small per-run output files of a batched
//! simulation or robot experiment sweep into per-experiment statistical
//! summaries: means, 95%-confidence-interval inputs, and box-and-whisker
//! distributions.
//!
//! Two fixed-size worker pools run concurrently and share nothing but
//! two unbounded queues: gatherers read per-run tables into
//! [`sweep::RunBundle`]s, reducers run the statistic kernels and write
//! the output tree. Backpressure is memory-aware on the gather side
//! ([`memory::MemoryGovernor`]); cross-run structural verification is
//! optional and fatal on violation ([`verify::IntegrityVerifier`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use sweepstat::config::PipelineConfig;
//! use sweepstat::kernel::StatKind;
//! use sweepstat::locate::PathSetSelector;
//! use sweepstat::pipeline::PipelineCoordinator;
//! use sweepstat::storage::CsvStorage;
//! use sweepstat::sweep::ExperimentDir;
//!
//! # fn main() -> sweepstat::Result<()> {
//! let config = PipelineConfig::builder("output/statistics")
//!     .gatherers(4)
//!     .reducers(2)
//!     .memory_floor_percent(10.0)
//!     .stat_kinds(vec![StatKind::Mean, StatKind::Conf95])
//!     .build();
//!
//! let experiments = vec![
//!     ExperimentDir::discover(Path::new("output/exp0"), &config.metrics_subpath)?,
//!     ExperimentDir::discover(Path::new("output/exp1"), &config.metrics_subpath)?,
//! ];
//!
//! let selector = PathSetSelector::new().with_item("perf/speed.csv");
//! let coordinator =
//!     PipelineCoordinator::new(config, Arc::new(CsvStorage::new()), Arc::new(selector));
//! coordinator.run(experiments)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod kernel;
pub mod locate;
pub mod memory;
pub mod pipeline;
pub mod storage;
pub mod sweep;
pub mod verify;

pub use error::{Error, Result};
