#![forbid(unsafe_code)]
//! hopper-io: where tables come from and where they go.
//!
//! - `location`: URI → `Location` (local, S3, HDFS, in-memory).
//! - `storage`: byte-level adapters per location family.
//! - `connectors`: format codecs (CSV, JSON, Parquet, fixed-width, raw
//!   bytes) on top of storage, bound to a backend, plus a Postgres table
//!   source (feature `postgres`).

pub mod connectors;
pub mod error;
pub mod location;
pub mod storage;

pub use connectors::{
    BytesFile, CsvFile, CsvOptions, DatasetOptions, Endpoint, ExistingDataBehavior, FixedWidthFile,
    FixedWidthOptions, IoContext, JsonFile, JsonLinesFile, JsonOptions, MultiFixedWidthFile,
    MultiFixedWidthOptions, ParquetDataset, ParquetFile, ParquetOptions, SharedSource,
    SharedTarget, Source, Tables, Target,
};
#[cfg(feature = "postgres")]
pub use connectors::{PostgresOptions, PostgresTable};
pub use error::{StorageError, StorageResult};
pub use location::Location;
pub use storage::{
    build_storage, FsStorage, HdfsSettings, MemoryStorage, SharedStorage, Storage,
};
