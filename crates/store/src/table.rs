//! The append-or-update results table.
//!
//! One CSV per (experiment, variable) destination. Rows are keyed by
//! (model, variable, metric, adjustment, region); evaluation windows are
//! columns, so re-running a benchmark updates the existing row's period
//! cell instead of appending a duplicate.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema};

use crate::error::StoreError;

/// Identity columns, in table order. Everything else is a period column.
pub const KEY_COLUMNS: [&str; 5] = ["model", "variable", "metric", "adjustment", "region"];

/// One row of the results table.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    /// Model name.
    pub model: String,
    /// Variable short name.
    pub variable: String,
    /// Metric name (`rmse`, `mae`, `crps`).
    pub metric: String,
    /// Adjustment name (`none`, `bias_adjusted`, `anomaly`).
    pub adjustment: String,
    /// Region label (`global` or a latitude band).
    pub region: String,
    /// Period label (e.g. "2005-2014") to metric value.
    pub values: BTreeMap<String, f64>,
}

impl ResultRow {
    fn key(&self) -> (&str, &str, &str, &str, &str) {
        (
            &self.model,
            &self.variable,
            &self.metric,
            &self.adjustment,
            &self.region,
        )
    }
}

/// In-memory form of the results CSV.
#[derive(Debug, Default)]
pub struct ResultsTable {
    rows: Vec<ResultRow>,
}

impl ResultsTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rows, in insertion order.
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Insert a row, or merge its period values into the row with the same
    /// identity key. A repeated period label takes the newer value.
    pub fn upsert(&mut self, row: ResultRow) {
        if let Some(existing) = self.rows.iter_mut().find(|r| r.key() == row.key()) {
            existing.values.extend(row.values);
        } else {
            self.rows.push(row);
        }
    }

    /// Parse a table from CSV bytes. Empty input yields an empty table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Table`] when the CSV is malformed or missing an
    /// identity column.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.is_empty() {
            return Ok(Self::new());
        }
        let format = Format::default().with_header(true);
        let (schema, _) = format
            .infer_schema(Cursor::new(bytes), None)
            .map_err(StoreError::from)?;
        let schema = Arc::new(schema);
        let reader = ReaderBuilder::new(schema.clone())
            .with_header(true)
            .build(Cursor::new(bytes))?;

        let mut table = Self::new();
        for batch in reader {
            let batch = batch?;
            table.extend_from_batch(&batch, &schema)?;
        }
        Ok(table)
    }

    fn extend_from_batch(
        &mut self,
        batch: &RecordBatch,
        schema: &Schema,
    ) -> Result<(), StoreError> {
        let key_col = |name: &str| -> Result<&StringArray, StoreError> {
            batch
                .column_by_name(name)
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| StoreError::Table {
                    reason: format!("missing or non-string column '{name}'"),
                })
        };
        let model = key_col("model")?;
        let variable = key_col("variable")?;
        let metric = key_col("metric")?;
        let adjustment = key_col("adjustment")?;
        let region = key_col("region")?;

        // Everything that is not an identity column is a period column;
        // integer-inferred columns are cast up to f64.
        let mut period_cols: Vec<(String, Float64Array)> = Vec::new();
        for (idx, field) in schema.fields().iter().enumerate() {
            if KEY_COLUMNS.contains(&field.name().as_str()) {
                continue;
            }
            let cast = arrow::compute::cast(batch.column(idx), &DataType::Float64)?;
            let values = cast
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| StoreError::Table {
                    reason: format!("column '{}' is not numeric", field.name()),
                })?
                .clone();
            period_cols.push((field.name().clone(), values));
        }

        for i in 0..batch.num_rows() {
            let mut values = BTreeMap::new();
            for (label, col) in &period_cols {
                if col.is_valid(i) {
                    values.insert(label.clone(), col.value(i));
                }
            }
            self.upsert(ResultRow {
                model: model.value(i).to_string(),
                variable: variable.value(i).to_string(),
                metric: metric.value(i).to_string(),
                adjustment: adjustment.value(i).to_string(),
                region: region.value(i).to_string(),
                values,
            });
        }
        Ok(())
    }

    /// Serialize the table to CSV bytes with a header row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Table`] on serialization failure.
    pub fn to_csv(&self) -> Result<Vec<u8>, StoreError> {
        let labels: BTreeSet<String> = self
            .rows
            .iter()
            .flat_map(|r| r.values.keys().cloned())
            .collect();

        let mut fields: Vec<Field> = KEY_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false))
            .collect();
        for label in &labels {
            fields.push(Field::new(label, DataType::Float64, true));
        }
        let schema = Arc::new(Schema::new(fields));

        let string_col = |pick: fn(&ResultRow) -> &str| -> ArrayRef {
            Arc::new(StringArray::from(
                self.rows.iter().map(pick).collect::<Vec<&str>>(),
            ))
        };
        let mut columns: Vec<ArrayRef> = vec![
            string_col(|r| &r.model),
            string_col(|r| &r.variable),
            string_col(|r| &r.metric),
            string_col(|r| &r.adjustment),
            string_col(|r| &r.region),
        ];
        for label in &labels {
            let values: Vec<Option<f64>> = self
                .rows
                .iter()
                .map(|r| r.values.get(label).copied())
                .collect();
            columns.push(Arc::new(Float64Array::from(values)));
        }

        let batch = RecordBatch::try_new(schema, columns)?;
        let mut buf = Vec::new();
        {
            let mut writer = WriterBuilder::new().with_header(true).build(&mut buf);
            writer.write(&batch)?;
        }
        Ok(buf)
    }
}
