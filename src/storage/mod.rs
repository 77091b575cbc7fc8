//! Storage plugins (Arrow-backed CSV and Parquet)
//!
//! The pipeline never names a storage medium by string; a plugin is
//! resolved once at startup and passed by reference everywhere
//! (`Arc<dyn StoragePlugin>`). Tables are Arrow [`RecordBatch`] values
//! throughout.

mod csv;
mod parquet;

pub use csv::CsvStorage;
pub use parquet::ParquetStorage;

use std::path::Path;

use arrow::record_batch::RecordBatch;

use crate::Result;

/// Capability set a storage medium must provide.
///
/// `read` returns the whole item as a single batch; multi-batch sources
/// are concatenated by the implementation. `write` is write-once: output
/// tables are never mutated in place, so overwrite semantics are
/// whatever the underlying filesystem gives us on a re-run.
pub trait StoragePlugin: Send + Sync {
    /// Read the table stored at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or parsed.
    fn read(&self, path: &Path) -> Result<RecordBatch>;

    /// Write `table` to `path`, replacing any previous content.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or encoded.
    fn write(&self, table: &RecordBatch, path: &Path) -> Result<()>;

    /// File extensions (without dot) this plugin recognizes as gatherable.
    fn supported_suffixes(&self) -> &'static [&'static str];
}

/// Whether `path` carries an extension this plugin recognizes.
pub(crate) fn suffix_supported(plugin: &dyn StoragePlugin, path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| plugin.supported_suffixes().contains(&ext))
}
