use std::io::{Cursor, Write};
use std::sync::Arc;

use arrow::json::reader::infer_json_schema;
use arrow::json::{ArrayWriter, LineDelimitedWriter, ReaderBuilder};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use hopper_backend::{Ir, SharedBackend};
use hopper_core::error::{Error, Result};
use serde::Deserialize;

use super::{concat, Endpoint, IoContext, Source, Tables, Target};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JsonOptions {
    /// Records sampled for type inference; `None` reads them all.
    pub infer_rows: Option<usize>,
    pub batch_size: usize,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            infer_rows: None,
            batch_size: 8192,
        }
    }
}

fn validate(options: &JsonOptions) -> Result<()> {
    if options.batch_size == 0 {
        return Err(Error::config("json batch_size must be positive"));
    }
    Ok(())
}

/// Decode newline-delimited JSON objects into one batch.
fn decode_ndjson(data: &[u8], options: &JsonOptions, connector: &str) -> Result<RecordBatch> {
    let (schema, _) = infer_json_schema(Cursor::new(data), options.infer_rows)
        .map_err(|e| Error::medium(connector, e))?;
    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_batch_size(options.batch_size)
        .build(Cursor::new(data))
        .map_err(|e| Error::medium(connector, e))?;
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::medium(connector, e))?;
    concat(schema, &batches, connector)
}

/// Newline-delimited JSON, one object per line.
#[derive(Debug)]
pub struct JsonLinesFile {
    endpoint: Endpoint,
    backend: SharedBackend,
    options: JsonOptions,
}

impl JsonLinesFile {
    pub fn new(uri: &str, ctx: &IoContext, options: JsonOptions) -> Result<Self> {
        validate(&options)?;
        Ok(Self {
            endpoint: Endpoint::resolve("JsonLinesFile", uri, &ctx.storage)?,
            backend: Arc::clone(&ctx.backend),
            options,
        })
    }

    fn encode(&self, ir: &Ir) -> Result<Bytes> {
        let batch = self.backend.to_columnar(ir)?;
        let mut buf = Vec::new();
        let mut writer = LineDelimitedWriter::new(&mut buf);
        writer
            .write(&batch)
            .and_then(|_| writer.finish())
            .map_err(|e| Error::medium(self.endpoint.name(), e))?;
        drop(writer);
        Ok(Bytes::from(buf))
    }
}

impl Source for JsonLinesFile {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    fn load(&self) -> Result<Tables> {
        let bytes = self.endpoint.read_all()?;
        let batch = decode_ndjson(&bytes, &self.options, self.endpoint.name())?;
        tracing::debug!(connector = %self.endpoint.name(), rows = batch.num_rows(), "ndjson decoded");
        Ok(vec![(None, self.backend.from_columnar(batch)?)])
    }
}

impl Target for JsonLinesFile {
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

/// A single JSON array of objects.
#[derive(Debug)]
pub struct JsonFile {
    endpoint: Endpoint,
    backend: SharedBackend,
    options: JsonOptions,
}

impl JsonFile {
    pub fn new(uri: &str, ctx: &IoContext, options: JsonOptions) -> Result<Self> {
        validate(&options)?;
        Ok(Self {
            endpoint: Endpoint::resolve("JsonFile", uri, &ctx.storage)?,
            backend: Arc::clone(&ctx.backend),
            options,
        })
    }

    fn encode(&self, ir: &Ir) -> Result<Bytes> {
        let batch = self.backend.to_columnar(ir)?;
        if batch.num_rows() == 0 {
            return Ok(Bytes::from_static(b"[]"));
        }
        let mut buf = Vec::new();
        let mut writer = ArrayWriter::new(&mut buf);
        writer
            .write(&batch)
            .and_then(|_| writer.finish())
            .map_err(|e| Error::medium(self.endpoint.name(), e))?;
        drop(writer);
        Ok(Bytes::from(buf))
    }

    /// Re-frame the array as NDJSON so both JSON connectors share one reader.
    fn to_ndjson(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let values: Vec<serde_json::Value> = serde_json::from_slice(bytes)
            .map_err(|e| Error::Decode(format!("{}: {e}", self.endpoint.name())))?;
        let mut out = Vec::with_capacity(bytes.len());
        for (i, value) in values.iter().enumerate() {
            if !value.is_object() {
                return Err(Error::Decode(format!(
                    "{}: element {i} is not an object",
                    self.endpoint.name()
                )));
            }
            serde_json::to_writer(&mut out, value)
                .map_err(|e| Error::Decode(format!("{}: {e}", self.endpoint.name())))?;
            out.write_all(b"\n")
                .map_err(|e| Error::medium(self.endpoint.name(), e))?;
        }
        Ok(out)
    }
}

impl Source for JsonFile {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    fn load(&self) -> Result<Tables> {
        let bytes = self.endpoint.read_all()?;
        let lines = self.to_ndjson(&bytes)?;
        let batch = decode_ndjson(&lines, &self.options, self.endpoint.name())?;
        tracing::debug!(connector = %self.endpoint.name(), rows = batch.num_rows(), "json decoded");
        Ok(vec![(None, self.backend.from_columnar(batch)?)])
    }
}

impl Target for JsonFile {
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
    use arrow::array::{Array, StringArray};

    #[test]
    fn ndjson_round_trip() {
        let store = MemoryStorage::named("jsonl-roundtrip-test");
        let ctx = ctx();
        let jsonl = JsonLinesFile::new(
            "memory://jsonl-roundtrip-test/orders.jsonl",
            &ctx,
            JsonOptions::default(),
        )
        .unwrap();
        jsonl.write(&ctx.backend.from_columnar(orders()).unwrap()).unwrap();

        let text = String::from_utf8(store.get("orders.jsonl").unwrap().to_vec()).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with(r#"{"id":1,"region":"eu","total":120.5}"#));

        let batch = ctx.backend.to_columnar(&jsonl.load().unwrap()[0].1).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.schema().field(1).name(), "region");
    }

    #[test]
    fn json_array_reads_objects_and_missing_keys_become_null() {
        let store = MemoryStorage::named("json-array-test");
        store.insert("a.json", r#"[{"k":"x","v":1},{"k":"y"}]"#);
        let ctx = ctx();
        let json = JsonFile::new("memory://json-array-test/a.json", &ctx, JsonOptions::default())
            .unwrap();
        let batch = ctx.backend.to_columnar(&json.load().unwrap()[0].1).unwrap();
        assert_eq!(batch.num_rows(), 2);
        let v = batch.column_by_name("v").unwrap();
        assert!(v.is_null(1));
        let k = batch
            .column_by_name("k")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(k.value(1), "y");
    }

    #[test]
    fn json_array_write_is_an_array() {
        let store = MemoryStorage::named("json-write-test");
        let ctx = ctx();
        let json = JsonFile::new("memory://json-write-test/o.json", &ctx, JsonOptions::default())
            .unwrap();
        json.write(&ctx.backend.from_columnar(orders()).unwrap()).unwrap();
        let written: Vec<serde_json::Value> =
            serde_json::from_slice(&store.get("o.json").unwrap()).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(written[2]["region"], "eu");

        json.write(&ctx.backend.from_columnar(orders().slice(0, 0)).unwrap())
            .unwrap();
        assert_eq!(&store.get("o.json").unwrap()[..], b"[]");
    }

    #[test]
    fn non_object_elements_are_decode_errors() {
        let store = MemoryStorage::named("json-scalar-test");
        store.insert("s.json", "[1, 2]");
        let ctx = ctx();
        let json = JsonFile::new("memory://json-scalar-test/s.json", &ctx, JsonOptions::default())
            .unwrap();
        assert!(matches!(json.load().unwrap_err(), Error::Decode(_)));
    }
}
