//! CSV storage plugin
//!
//! Header row required; the schema is inferred per file. Numeric columns
//! come back as Int64/Float64, which is what the statistic kernels expect
//! to cast from.

use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

use arrow::csv;
use arrow::record_batch::RecordBatch;

use super::StoragePlugin;
use crate::{Error, Result};

/// Arrow CSV reader/writer behind the [`StoragePlugin`] capability set.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvStorage;

impl CsvStorage {
    /// Create a CSV storage plugin.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl StoragePlugin for CsvStorage {
    fn read(&self, path: &Path) -> Result<RecordBatch> {
        let mut file = File::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open '{}': {e}", path.display())))?;

        let format = csv::reader::Format::default().with_header(true);
        let (schema, _) = format
            .infer_schema(&mut file, None)
            .map_err(|e| Error::Storage(format!("Failed to infer schema of '{}': {e}", path.display())))?;
        file.rewind()?;

        let schema = Arc::new(schema);
        let reader = csv::ReaderBuilder::new(schema.clone())
            .with_header(true)
            .build(file)
            .map_err(|e| Error::Storage(format!("Failed to read '{}': {e}", path.display())))?;

        let mut batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        if batches.len() == 1 {
            return Ok(batches.remove(0));
        }
        arrow::compute::concat_batches(&schema, &batches)
            .map_err(|e| Error::Storage(format!("Failed to combine batches of '{}': {e}", path.display())))
    }

    fn write(&self, table: &RecordBatch, path: &Path) -> Result<()> {
        let file = File::create(path)
            .map_err(|e| Error::Storage(format!("Failed to create '{}': {e}", path.display())))?;
        let mut writer = csv::WriterBuilder::new().with_header(true).build(file);
        writer.write(table)?;
        Ok(())
    }

    fn supported_suffixes(&self) -> &'static [&'static str] {
        &["csv"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    #[test]
    fn round_trip_preserves_values() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("speed", DataType::Float64, false),
            Field::new("tag", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![1.5, 2.25, -0.125])),
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
            ],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speed.csv");
        let storage = CsvStorage::new();
        storage.write(&batch, &path).unwrap();
        let back = storage.read(&path).unwrap();

        assert_eq!(back.num_rows(), 3);
        let speeds = back
            .column_by_name("speed")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(speeds.values(), &[1.5, 2.25, -0.125]);
    }

    #[test]
    fn read_missing_file_is_storage_error() {
        let storage = CsvStorage::new();
        let err = storage.read(Path::new("/nonexistent/x.csv")).unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }
}
