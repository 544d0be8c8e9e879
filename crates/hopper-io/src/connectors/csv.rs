use std::io::Cursor;
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use bytes::Bytes;
use hopper_backend::{Ir, SharedBackend};
use hopper_core::error::{Error, Result};
use serde::Deserialize;

use super::{concat, Endpoint, IoContext, Source, Tables, Target};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CsvOptions {
    pub header: bool,
    pub delimiter: char,
    /// Rows sampled for type inference; `None` reads the whole file.
    pub infer_rows: Option<usize>,
    pub batch_size: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            header: true,
            delimiter: ',',
            infer_rows: Some(1000),
            batch_size: 8192,
        }
    }
}

impl CsvOptions {
    fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(Error::config(format!(
                "csv delimiter must be a single ASCII character, got '{}'",
                self.delimiter
            )))
        }
    }
}

/// Delimited text file.
#[derive(Debug)]
pub struct CsvFile {
    endpoint: Endpoint,
    backend: SharedBackend,
    options: CsvOptions,
    delimiter: u8,
}

impl CsvFile {
    pub fn new(uri: &str, ctx: &IoContext, options: CsvOptions) -> Result<Self> {
        let delimiter = options.delimiter_byte()?;
        if options.batch_size == 0 {
            return Err(Error::config("csv batch_size must be positive"));
        }
        Ok(Self {
            endpoint: Endpoint::resolve("CsvFile", uri, &ctx.storage)?,
            backend: Arc::clone(&ctx.backend),
            options,
            delimiter,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn encode(&self, ir: &Ir) -> Result<Bytes> {
        let batch = self.backend.to_columnar(ir)?;
        let mut buf = Vec::new();
        {
            let mut writer = WriterBuilder::new()
                .with_header(self.options.header)
                .with_delimiter(self.delimiter)
                .build(&mut buf);
            writer
                .write(&batch)
                .map_err(|e| Error::medium(self.endpoint.name(), e))?;
        }
        Ok(Bytes::from(buf))
    }
}

impl Source for CsvFile {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    fn load(&self) -> Result<Tables> {
        let bytes = self.endpoint.read_all()?;
        let name = self.endpoint.name();

        let format = Format::default()
            .with_header(self.options.header)
            .with_delimiter(self.delimiter);
        let (schema, _) = format
            .infer_schema(Cursor::new(&bytes[..]), self.options.infer_rows)
            .map_err(|e| Error::medium(name, e))?;
        let schema = Arc::new(schema);

        let reader = ReaderBuilder::new(Arc::clone(&schema))
            .with_format(format)
            .with_batch_size(self.options.batch_size)
            .build(Cursor::new(&bytes[..]))
            .map_err(|e| Error::medium(name, e))?;
        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::medium(name, e))?;
        let batch = concat(schema, &batches, name)?;

        tracing::debug!(connector = %name, rows = batch.num_rows(), "csv decoded");
        Ok(vec![(None, self.backend.from_columnar(batch)?)])
    }
}

impl Target for CsvFile {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::testutil::{ctx, orders};
    use crate::storage::MemoryStorage;
    use arrow::array::{Int64Array, StringArray};

    #[test]
    fn writes_then_reads_back_with_inferred_types() {
        let dir = tempfile::tempdir().unwrap();
        let uri = dir.path().join("orders.csv");
        let ctx = ctx();
        let csv = CsvFile::new(uri.to_str().unwrap(), &ctx, CsvOptions::default()).unwrap();

        csv.write(&ctx.backend.from_columnar(orders()).unwrap()).unwrap();
        let text = std::fs::read_to_string(&uri).unwrap();
        assert!(text.starts_with("id,region,total\n"));

        let tables = csv.load().unwrap();
        assert_eq!(tables.len(), 1);
        assert!(tables[0].0.is_none());
        let batch = ctx.backend.to_columnar(&tables[0].1).unwrap();
        assert_eq!(batch.num_rows(), 3);
        let ids = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.values(), &[1, 2, 3]);
    }

    #[test]
    fn custom_delimiter_without_header() {
        let store = MemoryStorage::named("csv-delim-test");
        store.insert("in.psv", "a|1\nb|2\n");
        let ctx = ctx();
        let options = CsvOptions {
            header: false,
            delimiter: '|',
            ..Default::default()
        };
        let csv = CsvFile::new("memory://csv-delim-test/in.psv", &ctx, options).unwrap();
        let batch = ctx.backend.to_columnar(&csv.load().unwrap()[0].1).unwrap();
        assert_eq!(batch.num_columns(), 2);
        let first = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(first.value(1), "b");
    }

    #[test]
    fn keyed_writes_land_next_to_the_target() {
        let store = MemoryStorage::named("csv-keyed-test");
        let ctx = ctx();
        let csv = CsvFile::new("memory://csv-keyed-test/out/data.csv", &ctx, CsvOptions::default())
            .unwrap();
        csv.write_keyed("01", &ctx.backend.from_columnar(orders()).unwrap())
            .unwrap();
        assert!(store.get("out/data_01.csv").is_some());
        assert!(store.get("out/data.csv").is_none());
    }

    #[test]
    fn missing_file_is_a_medium_error_naming_the_connector() {
        let ctx = ctx();
        let csv = CsvFile::new("memory://csv-missing-test/none.csv", &ctx, CsvOptions::default())
            .unwrap();
        let err = csv.load().unwrap_err();
        assert!(matches!(err, Error::Medium { .. }));
        assert!(err.to_string().starts_with("CsvFile(memory://csv-missing-test/none.csv)"));
    }

    #[test]
    fn bad_options_fail_at_construction() {
        let ctx = ctx();
        let options = CsvOptions {
            delimiter: '§',
            ..Default::default()
        };
        assert!(CsvFile::new("memory://x/y.csv", &ctx, options).unwrap_err().is_config());
        assert!(CsvFile::new("ftp://host/y.csv", &ctx, CsvOptions::default())
            .unwrap_err()
            .is_config());
    }
}
