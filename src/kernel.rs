//! Statistic kernels
//!
//! Pure functions reducing per-run tables into summary tables. A *row
//! group* is the set of values one column takes at one shared row index
//! (typically a timestep) across every contributing run; every kernel
//! reduces each row group independently, which is what makes the computed
//! values invariant to pool sizes.
//!
//! All numeric results are rounded to 8 decimal places and NaN/∞-filled
//! to 0, so re-running on unchanged inputs is idempotent up to that fixed
//! precision. Standard deviation uses the *sample* convention (ddof = 1).
//!
//! Kernels never log: diagnostics belong to the worker that invoked them.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Median confidence-interval factor from McGill, Tukey & Larsen (1978).
const MEDIAN_CI_FACTOR: f64 = 1.57;

/// Whisker reach in IQR multiples (Tukey's fences).
const WHISKER_REACH: f64 = 1.5;

/// A family of summary statistics requested from the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    /// Arithmetic mean per row group
    Mean,
    /// Mean and sample standard deviation (inputs to a 95% interval)
    Conf95,
    /// Median, quartiles, whiskers and median confidence interval
    BoxWhisker,
}

impl StatKind {
    /// The output components this kind produces, one table per component.
    #[must_use]
    pub const fn components(self) -> &'static [StatComponent] {
        match self {
            Self::Mean => &[StatComponent::Mean],
            Self::Conf95 => &[StatComponent::Mean, StatComponent::Stddev],
            Self::BoxWhisker => &[
                StatComponent::Median,
                StatComponent::Q1,
                StatComponent::Q3,
                StatComponent::WhiskerLow,
                StatComponent::WhiskerHigh,
                StatComponent::CiLow,
                StatComponent::CiHigh,
            ],
        }
    }
}

/// One output table of a statistic kind, identified by its path suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatComponent {
    /// Arithmetic mean
    Mean,
    /// Sample standard deviation (ddof = 1)
    Stddev,
    /// Median
    Median,
    /// First quartile
    Q1,
    /// Third quartile
    Q3,
    /// Lower whisker `Q1 - 1.5·IQR`
    WhiskerLow,
    /// Upper whisker `Q3 + 1.5·IQR`
    WhiskerHigh,
    /// Lower bound of the median confidence interval
    CiLow,
    /// Upper bound of the median confidence interval
    CiHigh,
}

impl StatComponent {
    /// File-name suffix identifying this component on disk.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Mean => ".mean",
            Self::Stddev => ".stddev",
            Self::Median => ".median",
            Self::Q1 => ".q1",
            Self::Q3 => ".q3",
            Self::WhiskerLow => ".whislo",
            Self::WhiskerHigh => ".whishi",
            Self::CiLow => ".cilo",
            Self::CiHigh => ".cihi",
        }
    }
}

/// One component table produced by a kernel.
#[derive(Debug, Clone)]
pub struct KernelOutput {
    /// Which component this table carries
    pub component: StatComponent,
    /// The reduced table, one row per row group
    pub table: RecordBatch,
}

/// Dispatch `kind` over the per-run tables of one bundle.
///
/// # Errors
/// Returns [`Error::KernelType`] when a numeric-only kind meets a
/// non-numeric column, or [`Error::Other`] on an empty table set.
pub fn apply(kind: StatKind, tables: &[&RecordBatch]) -> Result<Vec<KernelOutput>> {
    match kind {
        StatKind::Mean => mean_kernel(tables),
        StatKind::Conf95 => conf95_kernel(tables),
        StatKind::BoxWhisker => box_whisker_kernel(tables),
    }
}

/// Arithmetic mean per row group; NaN results become 0. Non-numeric
/// columns fall back to the per-group mode (first-seen tie break).
///
/// # Errors
/// Returns [`Error::Other`] on an empty table set.
pub fn mean_kernel(tables: &[&RecordBatch]) -> Result<Vec<KernelOutput>> {
    let grouped = Grouped::build(tables)?;
    let mut fields = Vec::with_capacity(grouped.columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(grouped.columns.len());

    for column in &grouped.columns {
        match &column.values {
            ColumnValues::Numeric(groups) => {
                let means: Vec<f64> =
                    groups.iter().map(|g| round8(mean_of(g))).collect();
                fields.push(Field::new(&column.name, DataType::Float64, false));
                arrays.push(Arc::new(Float64Array::from(means)));
            }
            ColumnValues::Text(groups) => {
                let modes: Vec<String> = groups.iter().map(|g| mode_of(g)).collect();
                fields.push(Field::new(&column.name, DataType::Utf8, false));
                arrays.push(Arc::new(StringArray::from(modes)));
            }
        }
    }

    Ok(vec![KernelOutput {
        component: StatComponent::Mean,
        table: batch_of(fields, arrays)?,
    }])
}

/// Mean and sample standard deviation per row group.
///
/// The 95% interval itself (`mean ± 2·stddev`) is presentation-layer
/// arithmetic and is not computed here. A single-sample group has no
/// sample variance; its stddev cell is NaN-filled to 0.
///
/// # Errors
/// Returns [`Error::KernelType`] on a non-numeric column.
pub fn conf95_kernel(tables: &[&RecordBatch]) -> Result<Vec<KernelOutput>> {
    let grouped = Grouped::build(tables)?;
    let columns = grouped.numeric_only("conf95")?;

    let mut means = ComponentBuilder::new(&columns);
    let mut stddevs = ComponentBuilder::new(&columns);
    for (idx, column) in columns.iter().enumerate() {
        for group in column.1 {
            let m = mean_of(group);
            means.push(idx, m);
            stddevs.push(idx, sample_stddev(group, m));
        }
    }

    Ok(vec![
        means.finish(StatComponent::Mean)?,
        stddevs.finish(StatComponent::Stddev)?,
    ])
}

/// Box-and-whisker distribution per row group: median, Q1, Q3, Tukey
/// whiskers at `1.5·IQR`, and a median confidence interval
/// `median ± 1.57·IQR/√n` (McGill, Tukey & Larsen 1978).
///
/// # Errors
/// Returns [`Error::KernelType`] on a non-numeric column.
pub fn box_whisker_kernel(tables: &[&RecordBatch]) -> Result<Vec<KernelOutput>> {
    let grouped = Grouped::build(tables)?;
    let columns = grouped.numeric_only("box-whisker")?;

    let components = StatKind::BoxWhisker.components();
    let mut builders: Vec<ComponentBuilder> =
        components.iter().map(|_| ComponentBuilder::new(&columns)).collect();

    for (idx, column) in columns.iter().enumerate() {
        for group in column.1 {
            let mut sorted = group.clone();
            sorted.sort_by(f64::total_cmp);

            let median = quantile(&sorted, 0.5);
            let q1 = quantile(&sorted, 0.25);
            let q3 = quantile(&sorted, 0.75);
            let iqr = (q3 - q1).abs();
            #[allow(clippy::cast_precision_loss)]
            let ci_half = MEDIAN_CI_FACTOR * iqr / (sorted.len() as f64).sqrt();

            let row = [
                median,
                q1,
                q3,
                q1 - WHISKER_REACH * iqr,
                q3 + WHISKER_REACH * iqr,
                median - ci_half,
                median + ci_half,
            ];
            for (builder, value) in builders.iter_mut().zip(row) {
                builder.push(idx, value);
            }
        }
    }

    builders
        .into_iter()
        .zip(components)
        .map(|(b, &c)| b.finish(c))
        .collect()
}

/// Per-run tables regrouped column-major by shared row index.
struct Grouped {
    columns: Vec<GroupedColumn>,
}

struct GroupedColumn {
    name: String,
    values: ColumnValues,
}

enum ColumnValues {
    /// One sample vector per row group
    Numeric(Vec<Vec<f64>>),
    /// One string vector per row group
    Text(Vec<Vec<String>>),
}

impl Grouped {
    /// Regroup `tables` using the first table's schema as reference.
    /// Row-group count is the longest table; shorter tables simply
    /// contribute fewer samples to the tail groups.
    fn build(tables: &[&RecordBatch]) -> Result<Self> {
        let first = tables
            .first()
            .ok_or_else(|| Error::Other("No tables to reduce".to_string()))?;
        let group_count = tables.iter().map(|t| t.num_rows()).max().unwrap_or(0);
        let schema: SchemaRef = first.schema();

        let mut columns = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let values = if field.data_type().is_numeric() {
                ColumnValues::Numeric(numeric_groups(tables, field.name(), group_count)?)
            } else {
                ColumnValues::Text(text_groups(tables, field.name(), group_count)?)
            };
            columns.push(GroupedColumn {
                name: field.name().clone(),
                values,
            });
        }
        Ok(Self { columns })
    }

    /// Borrow every column as numeric groups, or reject the first
    /// non-numeric one on behalf of `kernel`.
    fn numeric_only(&self, kernel: &'static str) -> Result<Vec<(&str, &Vec<Vec<f64>>)>> {
        self.columns
            .iter()
            .map(|c| match &c.values {
                ColumnValues::Numeric(groups) => Ok((c.name.as_str(), groups)),
                ColumnValues::Text(_) => Err(Error::KernelType {
                    column: c.name.clone(),
                    kernel,
                }),
            })
            .collect()
    }
}

/// Collect the numeric samples of `name` per row group across all tables.
fn numeric_groups(
    tables: &[&RecordBatch],
    name: &str,
    group_count: usize,
) -> Result<Vec<Vec<f64>>> {
    let mut groups = vec![Vec::with_capacity(tables.len()); group_count];
    for table in tables {
        let Some(column) = table.column_by_name(name) else {
            continue;
        };
        let column = cast(column, &DataType::Float64)?;
        let column = column
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| Error::Other(format!("Cast of '{name}' did not yield Float64")))?;
        for (row, group) in groups.iter_mut().enumerate().take(column.len()) {
            if column.is_valid(row) {
                group.push(column.value(row));
            }
        }
    }
    Ok(groups)
}

/// Collect the string values of `name` per row group across all tables.
fn text_groups(
    tables: &[&RecordBatch],
    name: &str,
    group_count: usize,
) -> Result<Vec<Vec<String>>> {
    let mut groups = vec![Vec::with_capacity(tables.len()); group_count];
    for table in tables {
        let Some(column) = table.column_by_name(name) else {
            continue;
        };
        let column = cast(column, &DataType::Utf8)?;
        let column = column
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| Error::Other(format!("Cast of '{name}' did not yield Utf8")))?;
        for (row, group) in groups.iter_mut().enumerate().take(column.len()) {
            if column.is_valid(row) {
                group.push(column.value(row).to_string());
            }
        }
    }
    Ok(groups)
}

/// Accumulates one Float64 output column per input column for a single
/// statistic component.
struct ComponentBuilder {
    names: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl ComponentBuilder {
    fn new(columns: &[(&str, &Vec<Vec<f64>>)]) -> Self {
        Self {
            names: columns.iter().map(|(n, _)| (*n).to_string()).collect(),
            values: columns.iter().map(|_| Vec::new()).collect(),
        }
    }

    fn push(&mut self, column: usize, value: f64) {
        self.values[column].push(round8(value));
    }

    fn finish(self, component: StatComponent) -> Result<KernelOutput> {
        let fields: Vec<Field> = self
            .names
            .iter()
            .map(|n| Field::new(n, DataType::Float64, false))
            .collect();
        let arrays: Vec<ArrayRef> = self
            .values
            .into_iter()
            .map(|v| Arc::new(Float64Array::from(v)) as ArrayRef)
            .collect();
        Ok(KernelOutput {
            component,
            table: batch_of(fields, arrays)?,
        })
    }
}

fn batch_of(fields: Vec<Field>, arrays: Vec<ArrayRef>) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(fields));
    Ok(RecordBatch::try_new(schema, arrays)?)
}

#[allow(clippy::cast_precision_loss)]
fn mean_of(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return f64::NAN;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Sample standard deviation, ddof = 1. NaN for fewer than two samples.
#[allow(clippy::cast_precision_loss)]
fn sample_stddev(samples: &[f64], mean: f64) -> f64 {
    if samples.len() < 2 {
        return f64::NAN;
    }
    let ss: f64 = samples.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (samples.len() - 1) as f64).sqrt()
}

/// Quantile by linear interpolation at position `(n - 1) * p` over sorted data.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - pos.floor();
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Round to 8 decimal places, then fill non-finite values with 0.
fn round8(value: f64) -> f64 {
    let rounded = (value * 1e8).round() / 1e8;
    if rounded.is_finite() {
        rounded
    } else {
        0.0
    }
}

/// Most frequent value; first-seen wins ties; empty group yields "".
fn mode_of(samples: &[String]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut best: Option<(&str, usize)> = None;
    for sample in samples {
        let count = counts.entry(sample.as_str()).or_insert(0);
        *count += 1;
        if best.map_or(true, |(_, n)| *count > n) {
            best = Some((sample.as_str(), *count));
        }
    }
    best.map(|(s, _)| s.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[(&str, Vec<f64>)]) -> RecordBatch {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(n, _)| Field::new(*n, DataType::Float64, false))
            .collect();
        let arrays: Vec<ArrayRef> = columns
            .iter()
            .map(|(_, v)| Arc::new(Float64Array::from(v.clone())) as ArrayRef)
            .collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
    }

    fn column_values(batch: &RecordBatch, name: &str) -> Vec<f64> {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
            .values()
            .to_vec()
    }

    #[test]
    fn mean_of_identical_values_is_that_value() {
        let tables: Vec<RecordBatch> =
            (0..4).map(|_| table(&[("v", vec![7.5, 7.5])])).collect();
        let refs: Vec<&RecordBatch> = tables.iter().collect();
        let out = mean_kernel(&refs).unwrap();
        assert_eq!(column_values(&out[0].table, "v"), vec![7.5, 7.5]);
    }

    #[test]
    fn conf95_matches_scenario_values() {
        // Three runs of a 2-row column: [10,20], [12,18], [11,19]
        let t0 = table(&[("v", vec![10.0, 20.0])]);
        let t1 = table(&[("v", vec![12.0, 18.0])]);
        let t2 = table(&[("v", vec![11.0, 19.0])]);
        let refs = vec![&t0, &t1, &t2];
        let out = conf95_kernel(&refs).unwrap();

        assert_eq!(out[0].component, StatComponent::Mean);
        assert_eq!(column_values(&out[0].table, "v"), vec![11.0, 19.0]);
        assert_eq!(out[1].component, StatComponent::Stddev);
        assert_eq!(column_values(&out[1].table, "v"), vec![1.0, 1.0]);
    }

    #[test]
    fn stddev_of_single_sample_fills_to_zero() {
        let t0 = table(&[("v", vec![5.0])]);
        let refs = vec![&t0];
        let out = conf95_kernel(&refs).unwrap();
        assert_eq!(column_values(&out[1].table, "v"), vec![0.0]);
    }

    #[test]
    fn box_whisker_quartiles_are_ordered() {
        let t0 = table(&[("v", vec![1.0])]);
        let t1 = table(&[("v", vec![4.0])]);
        let t2 = table(&[("v", vec![9.0])]);
        let t3 = table(&[("v", vec![16.0])]);
        let refs = vec![&t0, &t1, &t2, &t3];
        let out = box_whisker_kernel(&refs).unwrap();

        let by = |c: StatComponent| {
            out.iter()
                .find(|o| o.component == c)
                .map(|o| column_values(&o.table, "v")[0])
                .unwrap()
        };
        let (median, q1, q3) = (
            by(StatComponent::Median),
            by(StatComponent::Q1),
            by(StatComponent::Q3),
        );
        assert!(q1 <= median && median <= q3);
        assert!(by(StatComponent::WhiskerLow) <= q1);
        assert!(by(StatComponent::WhiskerHigh) >= q3);
        assert!(by(StatComponent::CiLow) <= median);
        assert!(by(StatComponent::CiHigh) >= median);
    }

    #[test]
    fn box_whisker_rejects_text_column() {
        let schema = Arc::new(Schema::new(vec![Field::new("tag", DataType::Utf8, false)]));
        let t = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec!["a", "b"])) as ArrayRef],
        )
        .unwrap();
        let refs = vec![&t];
        let err = box_whisker_kernel(&refs).unwrap_err();
        assert!(matches!(err, Error::KernelType { .. }));
        assert!(err.to_string().contains("tag"));
    }

    #[test]
    fn mean_falls_back_to_mode_for_text() {
        let schema = Arc::new(Schema::new(vec![Field::new("tag", DataType::Utf8, false)]));
        let t = |vals: Vec<&str>| {
            RecordBatch::try_new(
                schema.clone(),
                vec![Arc::new(StringArray::from(vals)) as ArrayRef],
            )
            .unwrap()
        };
        let (t0, t1, t2) = (t(vec!["a"]), t(vec!["b"]), t(vec!["a"]));
        let refs = vec![&t0, &t1, &t2];
        let out = mean_kernel(&refs).unwrap();
        let tags = out[0]
            .table
            .column_by_name("tag")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
            .value(0)
            .to_string();
        assert_eq!(tags, "a");
    }

    #[test]
    fn shorter_runs_contribute_fewer_samples() {
        // Second run is one row short: tail group averages over one sample.
        let t0 = table(&[("v", vec![2.0, 10.0])]);
        let t1 = table(&[("v", vec![4.0])]);
        let refs = vec![&t0, &t1];
        let out = mean_kernel(&refs).unwrap();
        assert_eq!(column_values(&out[0].table, "v"), vec![3.0, 10.0]);
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&sorted, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile(&sorted, 0.25) - 1.75).abs() < 1e-12);
        assert!((quantile(&sorted, 0.75) - 3.25).abs() < 1e-12);
    }

    #[test]
    fn round8_truncates_and_fills() {
        assert_eq!(round8(1.234_567_894), 1.234_567_89);
        assert_eq!(round8(f64::NAN), 0.0);
        assert_eq!(round8(f64::INFINITY), 0.0);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Quartile ordering holds for any sample set.
            #[test]
            fn prop_quartiles_ordered(
                samples in prop::collection::vec(-1e6f64..1e6, 1..64)
            ) {
                let tables: Vec<RecordBatch> = samples
                    .iter()
                    .map(|&v| table(&[("v", vec![v])]))
                    .collect();
                let refs: Vec<&RecordBatch> = tables.iter().collect();
                let out = box_whisker_kernel(&refs).unwrap();
                let by = |c: StatComponent| {
                    out.iter()
                        .find(|o| o.component == c)
                        .map(|o| column_values(&o.table, "v")[0])
                        .unwrap()
                };
                let (q1, median, q3) =
                    (by(StatComponent::Q1), by(StatComponent::Median), by(StatComponent::Q3));
                prop_assert!(q1 <= median);
                prop_assert!(median <= q3);
                prop_assert!(by(StatComponent::WhiskerLow) <= q1);
                prop_assert!(by(StatComponent::WhiskerHigh) >= q3);
            }

            /// Mean lies within the sample range.
            #[test]
            fn prop_mean_within_range(
                samples in prop::collection::vec(-1e6f64..1e6, 1..64)
            ) {
                let tables: Vec<RecordBatch> = samples
                    .iter()
                    .map(|&v| table(&[("v", vec![v])]))
                    .collect();
                let refs: Vec<&RecordBatch> = tables.iter().collect();
                let out = mean_kernel(&refs).unwrap();
                let mean = column_values(&out[0].table, "v")[0];
                let lo = samples.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                // 8-decimal rounding can nudge past the extremes by half an ulp of 1e-8
                prop_assert!(mean >= lo - 1e-8);
                prop_assert!(mean <= hi + 1e-8);
            }
        }
    }
}
