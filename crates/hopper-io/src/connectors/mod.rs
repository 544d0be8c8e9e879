//! Sources and targets.
//!
//! Every connector is bound to one backend at construction, resolves and
//! validates its location there, and only touches storage inside `load` /
//! `write`. Freshly decoded tables go straight to `backend.from_columnar`.

mod csv;
mod dataset;
mod fixed_width;
mod json;
mod parquet;
#[cfg(feature = "postgres")]
mod postgres;
mod raw;

pub use self::csv::{CsvFile, CsvOptions};
pub use self::dataset::{DatasetOptions, ExistingDataBehavior, ParquetDataset};
pub use self::fixed_width::{FixedWidthFile, FixedWidthOptions, MultiFixedWidthFile, MultiFixedWidthOptions};
pub use self::json::{JsonFile, JsonLinesFile, JsonOptions};
pub use self::parquet::{ParquetFile, ParquetOptions};
#[cfg(feature = "postgres")]
pub use self::postgres::{PostgresOptions, PostgresTable};
pub use self::raw::BytesFile;

use std::fmt;
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use hopper_backend::{Ir, SharedBackend};
use hopper_core::config::{RunConfig, StorageConfig};
use hopper_core::error::{Error, Result};
use hopper_core::report::RejectedLine;
use hopper_fwf::DecodeOptions;

use crate::location::Location;
use crate::storage::{build_storage, SharedStorage};

/// Tables produced by a source, in emission order. Single-table sources
/// produce one unkeyed entry; multi-table sources key each entry.
pub type Tables = Vec<(Option<String>, Ir)>;

pub trait Source: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn backend(&self) -> &SharedBackend;

    fn load(&self) -> Result<Tables>;

    /// Lines the most recent `load` set aside instead of loading. Only
    /// lenient decoders produce any.
    fn rejects(&self) -> Vec<RejectedLine> {
        Vec::new()
    }
}

pub trait Target: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn backend(&self) -> &SharedBackend;

    fn write(&self, ir: &Ir) -> Result<()>;

    /// Write one table of a keyed (multi-table) result.
    fn write_keyed(&self, key: &str, ir: &Ir) -> Result<()>;
}

pub type SharedSource = Arc<dyn Source>;
pub type SharedTarget = Arc<dyn Target>;

/// What every connector is built with: the backend it hands tables to, the
/// storage options in force for the run and the run's fixed-width defaults.
#[derive(Debug, Clone)]
pub struct IoContext {
    pub backend: SharedBackend,
    pub storage: StorageConfig,
    pub decode: DecodeOptions,
}

impl IoContext {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            storage: StorageConfig::default(),
            decode: DecodeOptions::default(),
        }
    }

    pub fn from_run_config(backend: SharedBackend, cfg: &RunConfig) -> Self {
        Self {
            backend,
            storage: cfg.storage.clone(),
            decode: DecodeOptions::from_run_config(cfg),
        }
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }
}

/// A resolved location plus the adapter that serves it.
#[derive(Debug, Clone)]
pub struct Endpoint {
    name: String,
    location: Location,
    storage: SharedStorage,
}

impl Endpoint {
    /// Resolve `uri` and pick its storage adapter. `kind` names the
    /// connector in errors, e.g. `CsvFile(s3://b/k.csv)`.
    pub fn resolve(kind: &str, uri: &str, storage: &StorageConfig) -> Result<Self> {
        let location = Location::parse(uri)?;
        let adapter = build_storage(&location, storage)?;
        Ok(Self {
            name: format!("{kind}({location})"),
            location,
            storage: adapter,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn read_all(&self) -> Result<Bytes> {
        self.storage
            .read_all(&self.location)
            .map_err(|e| Error::medium(&self.name, e))
    }

    pub fn write(&self, bytes: Bytes) -> Result<()> {
        self.write_at(&self.location, bytes)
    }

    pub fn write_at(&self, loc: &Location, bytes: Bytes) -> Result<()> {
        let len = bytes.len();
        self.storage
            .write(loc, bytes)
            .map_err(|e| Error::medium(&self.name, e))?;
        tracing::debug!(connector = %self.name, location = %loc, bytes = len, "wrote object");
        Ok(())
    }

    /// The same endpoint pointed at `<stem>_<key>.<ext>`.
    pub fn keyed(&self, key: &str) -> Self {
        let location = self.location.with_suffix(key);
        Self {
            name: self.name.clone(),
            location,
            storage: Arc::clone(&self.storage),
        }
    }
}

pub(crate) fn concat(schema: SchemaRef, batches: &[RecordBatch], connector: &str) -> Result<RecordBatch> {
    concat_batches(&schema, batches).map_err(|e| Error::medium(connector, e))
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use hopper_backend::{build_backend, BackendKind};

    use super::IoContext;

    pub fn ctx() -> IoContext {
        IoContext::new(build_backend(BackendKind::Columnar).unwrap())
    }

    pub fn orders() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("region", DataType::Utf8, true),
            Field::new("total", DataType::Float64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec!["eu", "us", "eu"])),
                Arc::new(Float64Array::from(vec![120.5, 80.0, 300.25])),
            ],
        )
        .unwrap()
    }
}
