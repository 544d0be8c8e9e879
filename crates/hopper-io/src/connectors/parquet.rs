use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use hopper_backend::{Ir, SharedBackend};
use hopper_core::error::{Error, Result};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::Deserialize;

use super::{concat, Endpoint, IoContext, Source, Tables, Target};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParquetOptions {
    /// `snappy`, `zstd`, `gzip`, `lz4` or `none`.
    pub compression: String,
    pub batch_size: usize,
}

impl Default for ParquetOptions {
    fn default() -> Self {
        Self {
            compression: "snappy".to_string(),
            batch_size: 8192,
        }
    }
}

pub(crate) fn parse_compression(name: &str) -> Result<Compression> {
    match name.trim().to_ascii_lowercase().as_str() {
        "snappy" => Ok(Compression::SNAPPY),
        "zstd" => Ok(Compression::ZSTD(ZstdLevel::default())),
        "gzip" => Ok(Compression::GZIP(GzipLevel::default())),
        "lz4" => Ok(Compression::LZ4_RAW),
        "none" | "uncompressed" => Ok(Compression::UNCOMPRESSED),
        other => Err(Error::config(format!("unknown parquet compression '{other}'"))),
    }
}

pub(crate) fn encode_parquet(batch: &RecordBatch, compression: Compression, connector: &str) -> Result<Bytes> {
    let props = WriterProperties::builder()
        .set_compression(compression)
        .build();
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))
        .map_err(|e| Error::medium(connector, e))?;
    writer.write(batch).map_err(|e| Error::medium(connector, e))?;
    writer.close().map_err(|e| Error::medium(connector, e))?;
    Ok(Bytes::from(buf))
}

pub(crate) fn decode_parquet(bytes: Bytes, batch_size: usize, connector: &str) -> Result<RecordBatch> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)
        .map_err(|e| Error::medium(connector, e))?;
    let schema = Arc::clone(builder.schema());
    let reader = builder
        .with_batch_size(batch_size)
        .build()
        .map_err(|e| Error::medium(connector, e))?;
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::medium(connector, e))?;
    concat(schema, &batches, connector)
}

/// A single Parquet file.
#[derive(Debug)]
pub struct ParquetFile {
    endpoint: Endpoint,
    backend: SharedBackend,
    compression: Compression,
    batch_size: usize,
}

impl ParquetFile {
    pub fn new(uri: &str, ctx: &IoContext, options: ParquetOptions) -> Result<Self> {
        let compression = parse_compression(&options.compression)?;
        if options.batch_size == 0 {
            return Err(Error::config("parquet batch_size must be positive"));
        }
        Ok(Self {
            endpoint: Endpoint::resolve("ParquetFile", uri, &ctx.storage)?,
            backend: Arc::clone(&ctx.backend),
            compression,
            batch_size: options.batch_size,
        })
    }

    fn encode(&self, ir: &Ir) -> Result<Bytes> {
        let batch = self.backend.to_columnar(ir)?;
        encode_parquet(&batch, self.compression, self.endpoint.name())
    }
}

impl Source for ParquetFile {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    fn load(&self) -> Result<Tables> {
        let bytes = self.endpoint.read_all()?;
        let batch = decode_parquet(bytes, self.batch_size, self.endpoint.name())?;
        tracing::debug!(connector = %self.endpoint.name(), rows = batch.num_rows(), "parquet decoded");
        Ok(vec![(None, self.backend.from_columnar(batch)?)])
    }
}

impl Target for ParquetFile {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    fn write(&self, ir: &Ir) -> Result<()> {
        let bytes = self.encode(ir)?;
        self.endpoint.write(bytes)
    }

    fn write_keyed(&self, key: &str, ir: &Ir) -> Result<()> {
        let bytes = self.encode(ir)?;
        self.endpoint.keyed(key).write(bytes)
    }
}
