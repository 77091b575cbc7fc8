//! Two-pool gather/reduce pipeline
//!
//! The coordinator owns the only shared mutable state in the system: two
//! unbounded MPMC channels. Experiments are enqueued before either pool
//! spawns; gatherers turn experiments into [`RunBundle`]s, reducers turn
//! bundles into statistic tables on disk. Join is two-phase: once every
//! gatherer has exited, no further bundles can appear (the last
//! reduce-queue sender is gone), so the reducers drain to quiescence and
//! exit through the same state machine.
//!
//! Failure semantics are at-least-once, fail-loud: a worker error stops
//! that worker but never cancels its siblings; the first failure is
//! re-raised only after every worker has been joined, and any output
//! already written stays on disk.

mod gather;
mod reduce;
mod worker;

pub use reduce::output_path;
pub use worker::{drain_queue, DrainPolicy, DrainState};

use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;

use crate::config::PipelineConfig;
use crate::locate::GatherSelector;
use crate::memory::MemoryGovernor;
use crate::storage::StoragePlugin;
use crate::sweep::{ExperimentDir, ExperimentRef, RunBundle};
use crate::{Error, Result};
use gather::Gatherer;
use reduce::Reducer;

/// Owns the queues, sizes the pools, and drains a batch to completion.
pub struct PipelineCoordinator {
    config: PipelineConfig,
    storage: Arc<dyn StoragePlugin>,
    selector: Arc<dyn GatherSelector>,
    governor: Arc<MemoryGovernor>,
}

impl PipelineCoordinator {
    /// Build a coordinator with the default memory governor: sampled at
    /// the configured floor, or disabled when the floor is zero.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        storage: Arc<dyn StoragePlugin>,
        selector: Arc<dyn GatherSelector>,
    ) -> Self {
        let governor = if config.memory_floor_percent > 0.0 {
            MemoryGovernor::sampled(config.memory_floor_percent)
        } else {
            MemoryGovernor::disabled()
        };
        Self::with_governor(config, storage, selector, Arc::new(governor))
    }

    /// Build a coordinator with an explicit governor (tests inject a
    /// mocked pressure curve here).
    #[must_use]
    pub fn with_governor(
        config: PipelineConfig,
        storage: Arc<dyn StoragePlugin>,
        selector: Arc<dyn GatherSelector>,
        governor: Arc<MemoryGovernor>,
    ) -> Self {
        Self {
            config,
            storage,
            selector,
            governor,
        }
    }

    /// Run the batch to completion.
    ///
    /// Either the whole statistics tree exists on return (possibly with
    /// some cells covering fewer runs than configured, visible only via
    /// warnings), or the first structural/worker failure is returned once
    /// all workers have been joined.
    ///
    /// # Errors
    /// Returns the first worker failure, a [`Error::WorkerPanic`] if a
    /// worker thread panicked, or an IO error from thread spawning.
    pub fn run(&self, experiments: Vec<ExperimentDir>) -> Result<()> {
        let (gather_tx, gather_rx) = unbounded::<ExperimentRef>();
        let (bundle_tx, bundle_rx) = unbounded::<RunBundle>();

        // Populate the gather queue before any worker exists, so the
        // drain loop's fresh-queue backoff is a startup safety net, not
        // the common path.
        for experiment in experiments {
            gather_tx
                .send(Arc::new(experiment))
                .map_err(|_| Error::QueueClosed)?;
        }
        drop(gather_tx);

        tracing::info!(
            gatherers = self.config.gatherer_count,
            reducers = self.config.reducer_count,
            queued = gather_rx.len(),
            "starting pipeline"
        );

        let mut gatherers = Vec::with_capacity(self.config.gatherer_count.max(1));
        for i in 0..self.config.gatherer_count.max(1) {
            let rx = gather_rx.clone();
            let gatherer = Gatherer::new(
                self.storage.clone(),
                self.selector.clone(),
                self.governor.clone(),
                self.config.verify_enabled,
                bundle_tx.clone(),
            );
            let handle = thread::Builder::new()
                .name(format!("gather-{i}"))
                .spawn(move || {
                    drain_queue(&rx, DrainPolicy::default(), |exp| gatherer.gather(&exp))
                })?;
            gatherers.push(handle);
        }
        drop(gather_rx);
        drop(bundle_tx);

        // Bundles are produced live by the gatherers, which may stall in
        // the memory governor for longer than any idle timeout; reducers
        // therefore exit only when the bundle channel disconnects.
        let mut reducers = Vec::with_capacity(self.config.reducer_count.max(1));
        for i in 0..self.config.reducer_count.max(1) {
            let rx = bundle_rx.clone();
            let reducer = Reducer::new(
                self.storage.clone(),
                self.config.stat_root.clone(),
                self.config.stat_kinds.clone(),
            );
            let handle = thread::Builder::new()
                .name(format!("reduce-{i}"))
                .spawn(move || {
                    drain_queue(&rx, DrainPolicy::until_disconnect(), |bundle| {
                        reducer.reduce(&bundle)
                    })
                })?;
            reducers.push(handle);
        }
        drop(bundle_rx);

        // Two-phase join; every worker is joined before the first
        // failure is surfaced.
        let mut first_failure = None;
        for handle in gatherers {
            record_outcome(handle.join(), &mut first_failure);
        }
        for handle in reducers {
            record_outcome(handle.join(), &mut first_failure);
        }
        match first_failure {
            None => {
                tracing::info!("pipeline complete");
                Ok(())
            }
            Some(error) => Err(error),
        }
    }
}

/// Fold one worker outcome into the first-failure slot; later failures
/// are logged, not lost silently, but only the first aborts the run.
fn record_outcome(outcome: thread::Result<Result<()>>, first_failure: &mut Option<Error>) {
    let result = match outcome {
        Ok(result) => result,
        Err(panic) => Err(Error::WorkerPanic(panic_message(&panic))),
    };
    if let Err(error) = result {
        if first_failure.is_none() {
            *first_failure = Some(error);
        } else {
            tracing::error!(%error, "additional worker failure");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic.downcast_ref::<&str>().map_or_else(
        || {
            panic
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "unknown panic payload".to_string())
        },
        |s| (*s).to_string(),
    )
}
