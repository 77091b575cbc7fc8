//! Reducer worker: run bundles in, statistic tables out
//!
//! The output tree is partitioned by (experiment, item), so concurrent
//! reducers never target the same path and no file locking is needed.
//! The kernel invocations themselves stay log-free; diagnostics happen
//! here, at item granularity, outside the computation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::kernel::{self, StatComponent, StatKind};
use crate::storage::StoragePlugin;
use crate::sweep::{GatherSpec, RunBundle};
use crate::Result;

pub(crate) struct Reducer {
    storage: Arc<dyn StoragePlugin>,
    stat_root: PathBuf,
    kinds: Vec<StatKind>,
}

impl Reducer {
    pub(crate) fn new(
        storage: Arc<dyn StoragePlugin>,
        stat_root: PathBuf,
        kinds: Vec<StatKind>,
    ) -> Self {
        Self {
            storage,
            stat_root,
            kinds,
        }
    }

    /// Compute every requested kind for `bundle` and write the component
    /// tables, creating intermediate directories as needed.
    pub(crate) fn reduce(&self, bundle: &RunBundle) -> Result<()> {
        let tables = bundle.tables();
        for &kind in &self.kinds {
            let outputs = kernel::apply(kind, &tables)?;
            for output in outputs {
                let path = output_path(&self.stat_root, bundle.spec(), output.component);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                self.storage.write(&output.table, &path)?;
            }
        }
        tracing::debug!(
            experiment = %bundle.spec().experiment,
            item = %bundle.spec().item_rel.display(),
            runs = bundle.run_count(),
            "reduced bundle"
        );
        Ok(())
    }
}

/// The deterministic location of one statistic table:
/// `<stat_root>/<experiment>/<item stem path><component suffix>`.
#[must_use]
pub fn output_path(stat_root: &Path, spec: &GatherSpec, component: StatComponent) -> PathBuf {
    let mut name = spec.output_stem().into_os_string();
    name.push(component.suffix());
    stat_root.join(&spec.experiment).join(PathBuf::from(name))
}
