//! Gatherer worker: experiments in, run bundles out
//!
//! Gatherers only read; all output filesystem traffic belongs to the
//! reducers. The one blocking point besides the queue is the memory
//! governor, consulted before each table materialization so a loaded
//! machine throttles producers instead of overcommitting.

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use crossbeam_channel::Sender;

use crate::locate::{GatherSelector, ItemLocator};
use crate::memory::MemoryGovernor;
use crate::storage::StoragePlugin;
use crate::sweep::{ExperimentDir, GatherSpec, RunBundle};
use crate::verify::IntegrityVerifier;
use crate::{Error, Result};

pub(crate) struct Gatherer {
    storage: Arc<dyn StoragePlugin>,
    selector: Arc<dyn GatherSelector>,
    governor: Arc<MemoryGovernor>,
    verifier: Option<IntegrityVerifier>,
    bundle_tx: Sender<RunBundle>,
}

impl Gatherer {
    pub(crate) fn new(
        storage: Arc<dyn StoragePlugin>,
        selector: Arc<dyn GatherSelector>,
        governor: Arc<MemoryGovernor>,
        verify_enabled: bool,
        bundle_tx: Sender<RunBundle>,
    ) -> Self {
        let verifier = verify_enabled.then(|| IntegrityVerifier::new(storage.clone()));
        Self {
            storage,
            selector,
            governor,
            verifier,
            bundle_tx,
        }
    }

    /// Gather every selected item of `experiment` and enqueue the bundles.
    ///
    /// Verifier failure is fatal for the whole batch. A spec missing from
    /// some runs is a warning: the bundle ships with the runs that have
    /// it, and downstream statistics simply cover fewer repetitions.
    pub(crate) fn gather(&self, experiment: &ExperimentDir) -> Result<()> {
        if let Some(verifier) = &self.verifier {
            verifier.verify(experiment)?;
        }

        let locator = ItemLocator::new(self.storage.clone(), self.selector.clone());
        let specs = locator.locate(experiment.template_run(), experiment.name())?;
        tracing::debug!(
            experiment = experiment.name(),
            specs = specs.len(),
            runs = experiment.runs().len(),
            "gathering experiment"
        );

        for spec in specs {
            let bundle = self.gather_spec(experiment, spec)?;
            if let Some(bundle) = bundle {
                self.bundle_tx.send(bundle).map_err(|_| Error::QueueClosed)?;
            }
        }
        Ok(())
    }

    /// Read one spec across all runs. `None` when no run had the item.
    fn gather_spec(
        &self,
        experiment: &ExperimentDir,
        spec: GatherSpec,
    ) -> Result<Option<RunBundle>> {
        let expected = experiment.runs().len();
        let mut runs = Vec::with_capacity(expected);

        for run in experiment.runs() {
            let path = run.metrics_root().join(&spec.item_rel);
            if !path.is_file() {
                continue;
            }
            self.governor.await_headroom();
            let table = self.storage.read(&path)?;
            let table = match &spec.column {
                Some(column) => project_column(&table, column, &spec)?,
                None => table,
            };
            runs.push((run.name().to_string(), table));
        }

        if runs.len() < expected {
            tracing::warn!(
                experiment = %spec.experiment,
                item = %spec.item_rel.display(),
                present = runs.len(),
                expected,
                "item missing from some runs; statistics will cover fewer repetitions"
            );
        }
        if runs.is_empty() {
            return Ok(None);
        }
        Ok(Some(RunBundle::new(spec, runs)))
    }
}

/// Narrow `table` to the single column a per-column spec targets.
fn project_column(table: &RecordBatch, column: &str, spec: &GatherSpec) -> Result<RecordBatch> {
    let index = table
        .schema_ref()
        .index_of(column)
        .map_err(|_| {
            Error::Storage(format!(
                "Column '{column}' named by the selection for '{}' does not exist",
                spec.item_rel.display()
            ))
        })?;
    Ok(table.project(&[index])?)
}
