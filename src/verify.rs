//! Cross-run integrity verification (config-gated)
//!
//! Runs of one experiment are assumed structurally isomorphic; the
//! gatherer builds its specs from the first run alone on that assumption.
//! When verification is enabled, every unordered pair of runs is checked
//! before gathering starts, and any violation is fatal for the whole
//! batch: a silent mismatch would otherwise surface as subtly wrong
//! statistics rather than an error.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::error::IntegrityMismatch;
use crate::storage::{suffix_supported, StoragePlugin};
use crate::sweep::{ExperimentDir, RunDir};
use crate::{Error, Result};

/// Pairwise structural consistency checker over an experiment's runs.
pub struct IntegrityVerifier {
    storage: Arc<dyn StoragePlugin>,
}

impl IntegrityVerifier {
    /// Build a verifier reading tables through `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn StoragePlugin>) -> Self {
        Self { storage }
    }

    /// Check every unordered pair of runs for structural consistency.
    ///
    /// For each pair, every table item must exist in both runs, carry the
    /// same column-name set (order-independent) and the same row count.
    /// Subdirectories holding per-frame render data are skipped; such
    /// data is expected to be run-specific.
    ///
    /// # Errors
    /// Returns [`Error::Integrity`] naming both paths and the mismatch
    /// kind on the first violation found.
    pub fn verify(&self, experiment: &ExperimentDir) -> Result<()> {
        let runs = experiment.runs();
        let items: Vec<BTreeSet<PathBuf>> = runs
            .iter()
            .map(|run| self.table_items(run))
            .collect::<Result<_>>()?;

        for i in 0..runs.len() {
            for j in (i + 1)..runs.len() {
                self.verify_pair(&runs[i], &items[i], &runs[j], &items[j])?;
            }
        }
        Ok(())
    }

    /// Table items of one run, relative to its metrics root, with
    /// render-data directories pruned.
    fn table_items(&self, run: &RunDir) -> Result<BTreeSet<PathBuf>> {
        let root = run.metrics_root();
        let mut items = BTreeSet::new();
        let walker = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || !(e.file_type().is_dir() && is_render_dir(e.path()))
            });
        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if !suffix_supported(self.storage.as_ref(), entry.path()) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(root) {
                items.insert(rel.to_path_buf());
            }
        }
        Ok(items)
    }

    fn verify_pair(
        &self,
        left: &RunDir,
        left_items: &BTreeSet<PathBuf>,
        right: &RunDir,
        right_items: &BTreeSet<PathBuf>,
    ) -> Result<()> {
        if let Some(rel) = left_items.symmetric_difference(right_items).next() {
            return Err(Error::Integrity {
                left: left.metrics_root().join(rel),
                right: right.metrics_root().join(rel),
                mismatch: IntegrityMismatch::MissingItem,
            });
        }

        for rel in left_items {
            let left_path = left.metrics_root().join(rel);
            let right_path = right.metrics_root().join(rel);
            let left_table = self.storage.read(&left_path)?;
            let right_table = self.storage.read(&right_path)?;

            let left_columns: HashSet<&str> = left_table
                .schema_ref()
                .fields()
                .iter()
                .map(|f| f.name().as_str())
                .collect();
            let right_columns: HashSet<&str> = right_table
                .schema_ref()
                .fields()
                .iter()
                .map(|f| f.name().as_str())
                .collect();
            if left_columns != right_columns {
                return Err(Error::Integrity {
                    left: left_path,
                    right: right_path,
                    mismatch: IntegrityMismatch::ColumnSet,
                });
            }
            if left_table.num_rows() != right_table.num_rows() {
                return Err(Error::Integrity {
                    left: left_path,
                    right: right_path,
                    mismatch: IntegrityMismatch::Length,
                });
            }
        }
        Ok(())
    }
}

/// Heuristic for per-frame/per-image render directories: every contained
/// file repeats the directory's own name (e.g. `frames/frames_0001.csv`).
fn is_render_dir(dir: &Path) -> bool {
    let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    let mut saw_file = false;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            return false;
        };
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            saw_file = true;
            if !name.contains(dir_name) {
                return false;
            }
        }
    }
    saw_file
}
