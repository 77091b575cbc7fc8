//! Error types for sweepstat
//!
//! Structural violations abort the batch; partial-data conditions are
//! warnings, never errors (see the pipeline module docs).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of cross-run structural mismatch found by the integrity verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityMismatch {
    /// Item exists in one run but not the other
    MissingItem,
    /// Column-name sets differ (order-independent comparison)
    ColumnSet,
    /// Shared columns have different lengths
    Length,
}

impl std::fmt::Display for IntegrityMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingItem => write!(f, "item missing from one run"),
            Self::ColumnSet => write!(f, "column-name sets differ"),
            Self::Length => write!(f, "column lengths differ"),
        }
    }
}

/// Sweepstat error types
#[derive(Error, Debug)]
pub enum Error {
    /// Run directory name violates the `<template>_run<N>_output` pattern (fatal)
    #[error("Run directory '{0}' does not match the <template>_run<N>_output naming pattern")]
    RunName(String),

    /// Cross-run structural mismatch detected by the integrity verifier (fatal)
    #[error("Integrity violation between '{left}' and '{right}': {mismatch}")]
    Integrity {
        /// Path in the first run of the offending pair
        left: PathBuf,
        /// Path in the second run of the offending pair
        right: PathBuf,
        /// What differed
        mismatch: IntegrityMismatch,
    },

    /// Non-numeric column reached a numeric-only statistic kernel
    #[error("Column '{column}' is not numeric; the {kernel} kernel requires numeric input")]
    KernelType {
        /// Offending column name
        column: String,
        /// Kernel that rejected it
        kernel: &'static str,
    },

    /// Experiment tree has no runs to gather from
    #[error("Experiment '{0}' contains no run directories")]
    EmptyExperiment(String),

    /// Storage plugin failure (CSV/Parquet)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Work queue closed with items still pending
    #[error("Work queue closed (all receivers dropped)")]
    QueueClosed,

    /// A worker thread panicked; the payload is preserved as text
    #[error("Worker panicked: {0}")]
    WorkerPanic(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow/Parquet error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
