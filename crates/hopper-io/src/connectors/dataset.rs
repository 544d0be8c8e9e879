//! Hive-partitioned Parquet directory target.
//!
//! Rows are grouped by the values of the partition columns; each group is
//! written without those columns to `<base>/<col>=<value>/.../part-0.parquet`.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use hopper_backend::{Ir, SharedBackend};
use hopper_core::error::{Error, Result};
use parquet::basic::Compression;
use serde::Deserialize;

use super::parquet::{encode_parquet, parse_compression};
use super::{Endpoint, IoContext, Target};
use crate::error::StorageError;
use crate::location::Location;

pub const NULL_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

const PART_FILE: &str = "part-0.parquet";

/// What to do when the target directory already holds data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingDataBehavior {
    /// Refuse to write into a non-empty directory.
    #[default]
    Error,
    /// Write new files, replacing same-named ones and leaving the rest.
    OverwriteOrIgnore,
    /// Clear each partition directory that is about to be written.
    DeleteMatching,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetOptions {
    pub partition_by: Vec<String>,
    pub existing_data_behavior: ExistingDataBehavior,
    pub compression: String,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            partition_by: Vec::new(),
            existing_data_behavior: ExistingDataBehavior::Error,
            compression: "snappy".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ParquetDataset {
    endpoint: Endpoint,
    backend: SharedBackend,
    partition_by: Vec<String>,
    behavior: ExistingDataBehavior,
    compression: Compression,
}

impl ParquetDataset {
    pub fn new(uri: &str, ctx: &IoContext, options: DatasetOptions) -> Result<Self> {
        let compression = parse_compression(&options.compression)?;
        let mut seen = std::collections::HashSet::new();
        for col in &options.partition_by {
            if !seen.insert(col.as_str()) {
                return Err(Error::config(format!("partition column '{col}' listed twice")));
            }
        }
        Ok(Self {
            endpoint: Endpoint::resolve("ParquetDataset", uri, &ctx.storage)?,
            backend: Arc::clone(&ctx.backend),
            partition_by: options.partition_by,
            behavior: options.existing_data_behavior,
            compression,
        })
    }

    fn write_under(&self, base: &Location, ir: &Ir) -> Result<()> {
        let batch = self.backend.to_columnar(ir)?;
        let name = self.endpoint.name();
        let storage = self.endpoint.storage();

        if self.behavior == ExistingDataBehavior::Error {
            let existing = storage.list(base).map_err(|e| Error::medium(name, e))?;
            if !existing.is_empty() {
                return Err(Error::medium(name, StorageError::AlreadyExists(base.to_string())));
            }
        }

        let parts = self.partition(&batch)?;
        tracing::debug!(connector = %name, partitions = parts.len(), rows = batch.num_rows(), "writing dataset");
        for (dir, part) in parts {
            let dir_loc = if dir.is_empty() { base.clone() } else { base.join(&dir) };
            if self.behavior == ExistingDataBehavior::DeleteMatching {
                for stale in storage.list(&dir_loc).map_err(|e| Error::medium(name, e))? {
                    storage.delete(&stale).map_err(|e| Error::medium(name, e))?;
                }
            }
            let bytes = encode_parquet(&part, self.compression, name)?;
            self.endpoint.write_at(&dir_loc.join(PART_FILE), bytes)?;
        }
        Ok(())
    }

    /// Split `batch` into `(relative dir, rows without partition columns)`,
    /// in first-encounter order of the partition values.
    fn partition(&self, batch: &RecordBatch) -> Result<Vec<(String, RecordBatch)>> {
        let schema = batch.schema();
        let mut key_cols = Vec::with_capacity(self.partition_by.len());
        for col in &self.partition_by {
            let idx = schema.index_of(col).map_err(|_| {
                let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
                Error::conversion(
                    format!("table [{}]", names.join(", ")),
                    self.endpoint.name(),
                    format!("partition column '{col}' is not in the table"),
                )
            })?;
            key_cols.push(idx);
        }
        if key_cols.is_empty() {
            return Ok(vec![(String::new(), batch.clone())]);
        }
        let keep: Vec<usize> = (0..schema.fields().len())
            .filter(|i| !key_cols.contains(i))
            .collect();

        let options = FormatOptions::default();
        let formatters = key_cols
            .iter()
            .map(|&i| ArrayFormatter::try_new(batch.column(i).as_ref(), &options))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::conversion("columnar table", "partition path", e.to_string()))?;

        let mut order: Vec<(String, Vec<u32>)> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        for row in 0..batch.num_rows() {
            let dir = key_cols
                .iter()
                .zip(&formatters)
                .map(|(&col, fmt)| {
                    let value = if batch.column(col).is_null(row) {
                        NULL_PARTITION.to_string()
                    } else {
                        escape(&fmt.value(row).to_string())
                    };
                    format!("{}={value}", schema.field(col).name())
                })
                .collect::<Vec<_>>()
                .join("/");
            let slot = *slots.entry(dir.clone()).or_insert_with(|| {
                order.push((dir, Vec::new()));
                order.len() - 1
            });
            order[slot].1.push(row as u32);
        }

        order
            .into_iter()
            .map(|(dir, rows)| {
                let taken = take_record_batch(batch, &UInt32Array::from(rows))
                    .and_then(|b| b.project(&keep))
                    .map_err(|e| Error::conversion("columnar table", "partition", e.to_string()))?;
                Ok((dir, taken))
            })
            .collect()
    }
}

/// Percent-escape the characters that would break a `col=value` segment.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '/' | '\\' | '=' | '%' | ':' | '\n' => out.push_str(&format!("%{:02X}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

impl Target for ParquetDataset {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    fn write(&self, ir: &Ir) -> Result<()> {
        self.write_under(self.endpoint.location(), ir)
    }

    /// Keyed tables become sibling sub-datasets `<base>/<key>/`.
    fn write_keyed(&self, key: &str, ir: &Ir) -> Result<()> {
        let base = self.endpoint.location().join(&escape(key));
        self.write_under(&base, ir)
    }
}
