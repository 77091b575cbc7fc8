//! Item location: enumerating gatherable units from a template run
//!
//! Location must be exhaustive. A missed item silently drops an output
//! artifact, which is a defect, not a tolerated degradation; that is why
//! everything here walks the whole metrics tree and why eligibility is a
//! conjunction of cheap, total predicates rather than heuristics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::storage::{suffix_supported, StoragePlugin};
use crate::sweep::{GatherSpec, RunDir};
use crate::Result;

/// Caller-supplied selection of which items (and which of their columns)
/// to gather. Absence of a selector means "gather nothing".
pub trait GatherSelector: Send + Sync {
    /// Whether the item at `rel` (relative to the metrics root) is wanted.
    fn selects(&self, rel: &Path) -> bool;

    /// Columns of `rel` to gather as individual specs. Empty means the
    /// whole table travels as one spec.
    fn columns(&self, rel: &Path) -> Vec<String>;
}

/// Stock selector over an explicit map of relative item paths to column
/// lists, the shape a performance-measure configuration file flattens to.
#[derive(Debug, Default, Clone)]
pub struct PathSetSelector {
    items: HashMap<PathBuf, Vec<String>>,
}

impl PathSetSelector {
    /// Empty selector (selects nothing).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the whole table at `rel`.
    #[must_use]
    pub fn with_item(mut self, rel: impl Into<PathBuf>) -> Self {
        self.items.insert(rel.into(), Vec::new());
        self
    }

    /// Select the named columns of the table at `rel`.
    #[must_use]
    pub fn with_columns(
        mut self,
        rel: impl Into<PathBuf>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.items
            .insert(rel.into(), columns.into_iter().map(Into::into).collect());
        self
    }
}

impl GatherSelector for PathSetSelector {
    fn selects(&self, rel: &Path) -> bool {
        self.items.contains_key(rel)
    }

    fn columns(&self, rel: &Path) -> Vec<String> {
        self.items.get(rel).cloned().unwrap_or_default()
    }
}

/// Enumerates [`GatherSpec`]s from one experiment's template run.
pub struct ItemLocator {
    storage: Arc<dyn StoragePlugin>,
    selector: Arc<dyn GatherSelector>,
}

impl ItemLocator {
    /// Build a locator over `storage` and `selector`.
    #[must_use]
    pub fn new(storage: Arc<dyn StoragePlugin>, selector: Arc<dyn GatherSelector>) -> Self {
        Self { storage, selector }
    }

    /// Walk `run`'s metrics tree and produce one spec per selected item,
    /// or one per selected column when the selector names columns.
    ///
    /// Eligibility: regular file, non-empty, extension recognized by the
    /// storage plugin, and selected. Output order is unspecified.
    ///
    /// # Errors
    /// Returns an IO error if the tree cannot be walked.
    pub fn locate(&self, run: &RunDir, experiment: &str) -> Result<Vec<GatherSpec>> {
        let root = run.metrics_root();
        let mut specs = Vec::new();

        for entry in WalkDir::new(root) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.metadata().map_err(std::io::Error::from)?.len() == 0 {
                continue;
            }
            if !suffix_supported(self.storage.as_ref(), entry.path()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            if !self.selector.selects(rel) {
                continue;
            }

            let columns = self.selector.columns(rel);
            if columns.is_empty() {
                specs.push(GatherSpec {
                    experiment: experiment.to_string(),
                    item_rel: rel.to_path_buf(),
                    column: None,
                });
            } else {
                specs.extend(columns.into_iter().map(|column| GatherSpec {
                    experiment: experiment.to_string(),
                    item_rel: rel.to_path_buf(),
                    column: Some(column),
                }));
            }
        }
        Ok(specs)
    }
}
