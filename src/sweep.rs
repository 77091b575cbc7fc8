//! Batch data model: experiments, runs, gather specs, run bundles
//!
//! One *experiment* is a single parameter-sweep point repeated across
//! independent *runs*. The execution stage (out of scope here) lays runs
//! out on disk as:
//!
//! ```text
//! <experiment>/
//!   <template>_run0_output/<metrics_subpath>/...
//!   <template>_run1_output/<metrics_subpath>/...
//! ```
//!
//! Everything under an experiment is read-only to this crate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::record_batch::RecordBatch;

use crate::{Error, Result};

/// One repetition of an experiment.
#[derive(Debug, Clone)]
pub struct RunDir {
    name: String,
    index: u32,
    metrics_root: PathBuf,
}

impl RunDir {
    /// Interpret `path` as a run directory.
    ///
    /// The directory name must match `<template>_run<N>_output`; anything
    /// else is a structural defect in the input tree and fatal.
    ///
    /// # Errors
    /// Returns [`Error::RunName`] on a malformed name.
    pub fn open(path: &Path, metrics_subpath: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::RunName(path.display().to_string()))?
            .to_string();
        let index =
            parse_run_index(&name).ok_or_else(|| Error::RunName(name.clone()))?;
        Ok(Self {
            name,
            index,
            metrics_root: path.join(metrics_subpath),
        })
    }

    /// Run directory name, e.g. `foraging_run3_output`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zero-based repetition index parsed from the name.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Root of this run's metrics tree (`<run dir>/<metrics_subpath>`).
    #[must_use]
    pub fn metrics_root(&self) -> &Path {
        &self.metrics_root
    }
}

/// Extract `<N>` from `<template>_run<N>_output`.
fn parse_run_index(name: &str) -> Option<u32> {
    let stem = name.strip_suffix("_output")?;
    let at = stem.rfind("_run")?;
    let digits = &stem[at + "_run".len()..];
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// One parameter-sweep point with its ordered repetitions.
#[derive(Debug, Clone)]
pub struct ExperimentDir {
    name: String,
    path: PathBuf,
    runs: Vec<RunDir>,
}

impl ExperimentDir {
    /// Enumerate the run directories of the experiment rooted at `path`.
    ///
    /// Runs are ordered by their parsed repetition index. Non-directory
    /// children are ignored; a directory child with a malformed name is
    /// fatal rather than skipped, because a skip would silently shrink
    /// every statistic computed downstream.
    ///
    /// # Errors
    /// Returns [`Error::RunName`] for a malformed run directory name,
    /// [`Error::EmptyExperiment`] when no runs exist, an error when
    /// `path` has no usable directory name (an empty name would root
    /// every statistic directly under the stat root), or an IO error.
    pub fn discover(path: &Path, metrics_subpath: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::Other(format!(
                    "experiment path '{}' has no directory name",
                    path.display()
                ))
            })?
            .to_string();

        let mut runs = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                runs.push(RunDir::open(&entry.path(), metrics_subpath)?);
            }
        }
        if runs.is_empty() {
            return Err(Error::EmptyExperiment(name));
        }
        runs.sort_by_key(RunDir::index);

        Ok(Self {
            name,
            path: path.to_path_buf(),
            runs,
        })
    }

    /// Experiment name (the sweep-point directory name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Experiment root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ordered runs of this experiment.
    #[must_use]
    pub fn runs(&self) -> &[RunDir] {
        &self.runs
    }

    /// The template run used for item location (first by index).
    #[must_use]
    pub fn template_run(&self) -> &RunDir {
        &self.runs[0]
    }
}

/// One gatherable unit: an item path within a run's metrics tree, and
/// optionally a single column of that item.
///
/// Built once per experiment from its template run; runs of one experiment
/// are assumed structurally isomorphic (the integrity verifier makes that
/// assumption checkable).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GatherSpec {
    /// Experiment this spec belongs to
    pub experiment: String,
    /// Item path relative to the metrics root
    pub item_rel: PathBuf,
    /// Column restriction; `None` gathers the whole table
    pub column: Option<String>,
}

impl GatherSpec {
    /// Output stem relative to the experiment's statistics directory:
    /// the item path with its storage extension stripped and the column
    /// name (when present) folded in, so per-column specs from the same
    /// file cannot collide.
    #[must_use]
    pub fn output_stem(&self) -> PathBuf {
        let stem = self
            .item_rel
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let name = match &self.column {
            Some(col) => format!("{stem}-{col}"),
            None => stem.to_string(),
        };
        match self.item_rel.parent() {
            Some(parent) if parent != Path::new("") => parent.join(name),
            _ => PathBuf::from(name),
        }
    }
}

/// The gathered form of one [`GatherSpec`]: per-run tables, positionally
/// paired with their run names.
///
/// A bundle never mixes runs from two experiments, and `tables()[i]`
/// always corresponds to `run_names()[i]` (the pairing is structural,
/// one vector of pairs).
#[derive(Debug, Clone)]
pub struct RunBundle {
    spec: GatherSpec,
    runs: Vec<(String, RecordBatch)>,
}

impl RunBundle {
    /// Build a bundle from gathered per-run tables.
    #[must_use]
    pub fn new(spec: GatherSpec, runs: Vec<(String, RecordBatch)>) -> Self {
        Self { spec, runs }
    }

    /// The spec this bundle was gathered for.
    #[must_use]
    pub const fn spec(&self) -> &GatherSpec {
        &self.spec
    }

    /// Positionally paired (run name, table) entries.
    #[must_use]
    pub fn runs(&self) -> &[(String, RecordBatch)] {
        &self.runs
    }

    /// Number of runs that contributed a table.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// The per-run tables alone, in run order.
    #[must_use]
    pub fn tables(&self) -> Vec<&RecordBatch> {
        self.runs.iter().map(|(_, t)| t).collect()
    }
}

/// Shared handle type for experiments travelling through the gather queue.
pub type ExperimentRef = Arc<ExperimentDir>;
