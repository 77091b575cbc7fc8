//! Parquet storage plugin

use std::fs::File;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::StoragePlugin;
use crate::{Error, Result};

/// Parquet reader/writer behind the [`StoragePlugin`] capability set.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParquetStorage;

impl ParquetStorage {
    /// Create a Parquet storage plugin.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl StoragePlugin for ParquetStorage {
    fn read(&self, path: &Path) -> Result<RecordBatch> {
        let file = File::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open '{}': {e}", path.display())))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::Storage(format!("Failed to parse '{}': {e}", path.display())))?;
        let schema = builder.schema().clone();
        let reader = builder
            .build()
            .map_err(|e| Error::Storage(format!("Failed to read '{}': {e}", path.display())))?;

        let mut batches = Vec::new();
        for batch in reader {
            batches.push(batch?);
        }
        if batches.len() == 1 {
            return Ok(batches.remove(0));
        }
        arrow::compute::concat_batches(&schema, &batches)
            .map_err(|e| Error::Storage(format!("Failed to combine batches of '{}': {e}", path.display())))
    }

    fn write(&self, table: &RecordBatch, path: &Path) -> Result<()> {
        let file = File::create(path)
            .map_err(|e| Error::Storage(format!("Failed to create '{}': {e}", path.display())))?;
        let mut writer = ArrowWriter::try_new(file, table.schema(), None)
            .map_err(|e| Error::Storage(format!("Failed to open writer for '{}': {e}", path.display())))?;
        writer
            .write(table)
            .map_err(|e| Error::Storage(format!("Failed to write '{}': {e}", path.display())))?;
        writer
            .close()
            .map_err(|e| Error::Storage(format!("Failed to finalize '{}': {e}", path.display())))?;
        Ok(())
    }

    fn supported_suffixes(&self) -> &'static [&'static str] {
        &["parquet"]
    }
}
