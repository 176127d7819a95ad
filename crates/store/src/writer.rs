//! The results writer: one destination per (experiment, variable).

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use cbench_grid::{GriddedDataset, MonthKey};
use cbench_metrics::{MetricResult, MetricValue};
use tracing::info;

use crate::error::StoreError;
use crate::object_store::ObjectStore;
use crate::table::{ResultRow, ResultsTable};

/// Writes benchmark results under `<experiment>/<variable>/` in an object
/// store. All writes go through [`ObjectStore`]; the writer never branches
/// on where the destination lives.
pub struct ResultsWriter {
    store: Arc<dyn ObjectStore>,
    experiment: String,
    variable: String,
}

impl ResultsWriter {
    /// Bind a writer to its destination.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        experiment: impl Into<String>,
        variable: impl Into<String>,
    ) -> Self {
        Self {
            store,
            experiment: experiment.into(),
            variable: variable.into(),
        }
    }

    /// Key of the scalar results table.
    pub fn table_key(&self) -> String {
        format!("{}/{}/metrics.csv", self.experiment, self.variable)
    }

    fn prefix(&self) -> String {
        format!("{}/{}/", self.experiment, self.variable)
    }

    /// Merge a scalar result into the results table (read-merge-write).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRow`] for non-scalar values; table and
    /// store failures pass through.
    pub fn save_table(&self, result: &MetricResult) -> Result<(), StoreError> {
        let value = match &result.value {
            MetricValue::Scalar(v) => *v,
            MetricValue::Series(_) => {
                return Err(StoreError::InvalidRow {
                    reason: "time series result, use save_series".to_string(),
                });
            }
            MetricValue::Map { .. } => {
                return Err(StoreError::InvalidRow {
                    reason: "gridded result, use save_grid".to_string(),
                });
            }
        };

        let key = self.table_key();
        let mut table = if self.store.exists(&key)? {
            ResultsTable::from_csv(&self.store.get(&key)?)?
        } else {
            ResultsTable::new()
        };
        table.upsert(ResultRow {
            model: result.model.clone(),
            variable: result.variable.clone(),
            metric: result.metric.as_str().to_string(),
            adjustment: result.adjustment.as_str().to_string(),
            region: result.region_label(),
            values: [(result.period.label(), value)].into(),
        });
        self.store.put(&key, &table.to_csv()?)?;
        info!(key, model = %result.model, metric = %result.metric, "saved table row");
        Ok(())
    }

    /// Write a per-timestep series as a two-column CSV.
    pub fn save_series(
        &self,
        series: &[(MonthKey, f64)],
        name: &str,
    ) -> Result<(), StoreError> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("month", DataType::Utf8, false),
            Field::new("value", DataType::Float64, true),
        ]));
        let months: Vec<String> = series.iter().map(|(m, _)| m.to_string()).collect();
        let values: Vec<Option<f64>> = series
            .iter()
            .map(|(_, v)| if v.is_finite() { Some(*v) } else { None })
            .collect();
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(months)),
            Arc::new(Float64Array::from(values)),
        ];
        let batch = RecordBatch::try_new(schema, columns)?;
        let mut buf = Vec::new();
        {
            let mut writer = WriterBuilder::new().with_header(true).build(&mut buf);
            writer.write(&batch)?;
        }
        let key = format!("{}{name}.csv", self.prefix());
        self.store.put(&key, &buf)?;
        info!(key, n = series.len(), "saved series");
        Ok(())
    }

    /// Write a gridded result as a NetCDF object.
    ///
    /// The dataset is staged to a temporary file with fresh encoding, then
    /// uploaded as `<experiment>/<variable>/<name>.nc`.
    pub fn save_grid(&self, dataset: &GriddedDataset, name: &str) -> Result<(), StoreError> {
        let staging = tempfile::Builder::new()
            .suffix(".nc")
            .tempfile()
            .map_err(|e| StoreError::Staging {
                reason: e.to_string(),
            })?;
        cbench_io::write_dataset(staging.path(), dataset).map_err(|e| StoreError::Staging {
            reason: e.to_string(),
        })?;
        let bytes = std::fs::read(staging.path()).map_err(|e| StoreError::Staging {
            reason: e.to_string(),
        })?;
        let key = format!("{}{name}.nc", self.prefix());
        self.store.put(&key, &bytes)?;
        info!(key, variable = dataset.variable(), "saved grid");
        Ok(())
    }

    /// Delete every object under this writer's prefix. Explicit only; no
    /// save operation ever calls this.
    pub fn overwrite(&self) -> Result<usize, StoreError> {
        let keys = self.store.list(&self.prefix())?;
        for key in &keys {
            self.store.delete(key)?;
        }
        info!(prefix = self.prefix(), n = keys.len(), "cleared destination");
        Ok(keys.len())
    }
}
