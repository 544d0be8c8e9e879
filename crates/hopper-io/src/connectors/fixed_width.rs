//! Fixed-width text sources, single- and multi-schema.
//!
//! Lenient decodes keep the rejected lines of the most recent `load` on the
//! connector; `last_rejects` hands them out.

use std::sync::{Arc, Mutex};

use hopper_backend::SharedBackend;
use hopper_core::config::ErrorPolicy;
use hopper_core::error::{Error, Result};
use hopper_core::report::RejectedLine;
use hopper_core::schema::DataType;
use hopper_fwf::{
    ColumnLayout, DecodeOptions, Discriminator, FixedWidthDecoder, MultiSchemaDecoder, Reject,
    SchemaMap,
};
use serde::Deserialize;

use super::{Endpoint, IoContext, Source, Tables};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixedWidthOptions {
    /// `(offset, width)` per column, in characters.
    pub colspecs: Vec<(usize, usize)>,
    pub colnames: Vec<String>,
    pub dtypes: Option<Vec<String>>,
    pub strip_chars: Option<String>,
    pub lenient: Option<bool>,
    pub empty_as_null: Option<bool>,
}

impl FixedWidthOptions {
    fn layout(&self) -> Result<ColumnLayout> {
        if self.colspecs.is_empty() {
            return Err(Error::config("fixed-width source needs at least one colspec"));
        }
        let dtypes = parse_dtypes(self.dtypes.as_deref())?;
        ColumnLayout::from_parts(&self.colspecs, &self.colnames, dtypes.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultiFixedWidthOptions {
    pub schema_map: Option<SchemaMap>,
    pub discriminator_offset: usize,
    /// Defaults to the length of the schema map keys.
    pub discriminator_length: Option<usize>,
    pub skip_leading: usize,
    pub strip_chars: Option<String>,
    pub lenient: Option<bool>,
    pub empty_as_null: Option<bool>,
}

fn parse_dtypes(names: Option<&[String]>) -> Result<Option<Vec<DataType>>> {
    names
        .map(|names| names.iter().map(|n| DataType::parse(n)).collect::<Result<Vec<_>>>())
        .transpose()
}

fn overlay(
    base: &DecodeOptions,
    strip_chars: &Option<String>,
    lenient: Option<bool>,
    empty_as_null: Option<bool>,
) -> DecodeOptions {
    let mut out = base.clone();
    if let Some(strip) = strip_chars {
        out.strip_chars = strip.clone();
    }
    if let Some(lenient) = lenient {
        out.policy = if lenient {
            ErrorPolicy::Lenient
        } else {
            ErrorPolicy::Strict
        };
    }
    if let Some(empty) = empty_as_null {
        out.empty_as_null = empty;
    }
    out
}

#[derive(Debug, Default)]
struct RejectLog(Mutex<Vec<Reject>>);

impl RejectLog {
    fn replace(&self, connector: &str, rejects: Vec<Reject>) {
        if !rejects.is_empty() {
            tracing::warn!(
                connector = %connector,
                rejected = rejects.len(),
                first_line = rejects[0].line,
                "lines set aside by lenient decode"
            );
        }
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = rejects;
    }

    fn snapshot(&self) -> Vec<Reject> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn records(&self, connector: &str) -> Vec<RejectedLine> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|r| r.to_record(connector))
            .collect()
    }
}

/// Fixed-width file with a single record layout.
#[derive(Debug)]
pub struct FixedWidthFile {
    endpoint: Endpoint,
    backend: SharedBackend,
    decoder: FixedWidthDecoder,
    rejects: RejectLog,
}

impl FixedWidthFile {
    pub fn new(uri: &str, ctx: &IoContext, options: FixedWidthOptions) -> Result<Self> {
        let layout = options.layout()?;
        let decode = overlay(&ctx.decode, &options.strip_chars, options.lenient, options.empty_as_null);
        Self::with_layout(uri, ctx, layout, decode)
    }

    pub fn with_layout(
        uri: &str,
        ctx: &IoContext,
        layout: ColumnLayout,
        decode: DecodeOptions,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::resolve("FixedWidthFile", uri, &ctx.storage)?,
            backend: Arc::clone(&ctx.backend),
            decoder: FixedWidthDecoder::new(layout, decode),
            rejects: RejectLog::default(),
        })
    }

    pub fn decoder(&self) -> &FixedWidthDecoder {
        &self.decoder
    }

    /// Lines rejected by the most recent `load`.
    pub fn last_rejects(&self) -> Vec<Reject> {
        self.rejects.snapshot()
    }
}

impl Source for FixedWidthFile {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    fn load(&self) -> Result<Tables> {
        let bytes = self.endpoint.read_all()?;
        let decoded = self.decoder.decode_bytes(&bytes)?;
        self.rejects.replace(self.endpoint.name(), decoded.rejects);
        tracing::debug!(connector = %self.endpoint.name(), rows = decoded.batch.num_rows(), "fixed-width decoded");
        Ok(vec![(None, self.backend.from_columnar(decoded.batch)?)])
    }

    fn rejects(&self) -> Vec<RejectedLine> {
        self.rejects.records(self.endpoint.name())
    }
}

/// Fixed-width file whose lines pick their layout by a discriminator.
/// Loads one keyed table per discriminator value seen.
#[derive(Debug)]
pub struct MultiFixedWidthFile {
    endpoint: Endpoint,
    backend: SharedBackend,
    decoder: MultiSchemaDecoder,
    rejects: RejectLog,
}

impl MultiFixedWidthFile {
    pub fn new(uri: &str, ctx: &IoContext, options: MultiFixedWidthOptions) -> Result<Self> {
        let map = options
            .schema_map
            .ok_or_else(|| Error::config("multi fixed-width source needs a schema_map"))?;
        let length = options.discriminator_length.unwrap_or_else(|| map.key_len());
        let window = Discriminator::new(options.discriminator_offset, length)?;
        let mut decode = overlay(&ctx.decode, &options.strip_chars, options.lenient, options.empty_as_null);
        decode.skip_leading = options.skip_leading;
        Self::with_schema_map(uri, ctx, window, map, decode)
    }

    pub fn with_schema_map(
        uri: &str,
        ctx: &IoContext,
        window: Discriminator,
        map: SchemaMap,
        decode: DecodeOptions,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::resolve("MultiFixedWidthFile", uri, &ctx.storage)?,
            backend: Arc::clone(&ctx.backend),
            decoder: MultiSchemaDecoder::new(window, map, decode)?,
            rejects: RejectLog::default(),
        })
    }

    pub fn decoder(&self) -> &MultiSchemaDecoder {
        &self.decoder
    }

    pub fn last_rejects(&self) -> Vec<Reject> {
        self.rejects.snapshot()
    }
}

impl Source for MultiFixedWidthFile {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    fn load(&self) -> Result<Tables> {
        let bytes = self.endpoint.read_all()?;
        let decoded = self.decoder.decode_bytes(&bytes)?;
        self.rejects.replace(self.endpoint.name(), decoded.rejects);
        let mut tables = Vec::with_capacity(decoded.tables.len());
        for (key, batch) in decoded.tables {
            tracing::debug!(connector = %self.endpoint.name(), key = %key, rows = batch.num_rows(), "schema decoded");
            tables.push((Some(key), self.backend.from_columnar(batch)?));
        }
        Ok(tables)
    }

    fn rejects(&self) -> Vec<RejectedLine> {
        self.rejects.records(self.endpoint.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::testutil::ctx;
    use crate::storage::MemoryStorage;
    use arrow::array::{Array, Int64Array, StringArray};
    use hopper_fwf::RejectKind;

    fn strings(batch: &arrow::record_batch::RecordBatch, col: &str) -> Vec<String> {
        let arr = batch
            .column_by_name(col)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        (0..arr.len()).map(|i| arr.value(i).to_string()).collect()
    }

    #[test]
    fn single_schema_from_options() {
        let store = MemoryStorage::named("fwf-single-test");
        store.insert("in.txt", "ab cd   \r\n\nxy 12   \n");
        let ctx = ctx();
        let options: FixedWidthOptions = serde_json::from_str(
            r#"{"colspecs": [[0, 2], [3, 5]], "colnames": ["x", "y"]}"#,
        )
        .unwrap();
        let src = FixedWidthFile::new("memory://fwf-single-test/in.txt", &ctx, options).unwrap();
        let batch = ctx.backend.to_columnar(&src.load().unwrap()[0].1).unwrap();
        assert_eq!(strings(&batch, "x"), vec!["ab", "xy"]);
        assert_eq!(strings(&batch, "y"), vec!["cd", "12"]);
        assert!(src.last_rejects().is_empty());
    }

    #[test]
    fn typed_columns_and_unknown_dtype() {
        let store = MemoryStorage::named("fwf-typed-test");
        store.insert("in.txt", "  42\n   7\n");
        let ctx = ctx();
        let options = FixedWidthOptions {
            colspecs: vec![(0, 4)],
            colnames: vec!["n".into()],
            dtypes: Some(vec!["int64".into()]),
            ..Default::default()
        };
        let src = FixedWidthFile::new("memory://fwf-typed-test/in.txt", &ctx, options.clone()).unwrap();
        let batch = ctx.backend.to_columnar(&src.load().unwrap()[0].1).unwrap();
        let n = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(n.values(), &[42, 7]);

        let bad = FixedWidthOptions {
            dtypes: Some(vec!["decimal".into()]),
            ..options
        };
        assert!(FixedWidthFile::new("memory://fwf-typed-test/in.txt", &ctx, bad)
            .unwrap_err()
            .is_config());
    }

    #[test]
    fn multi_schema_emits_keyed_tables_and_collects_rejects() {
        let store = MemoryStorage::named("fwf-multi-test");
        store.insert("in.txt", "01alice  \n02 7\n99zzz\n01bob    \n");
        let ctx = ctx();
        let options: MultiFixedWidthOptions = serde_json::from_str(
            r#"{
                "schema_map": {
                    "01": {"colspecs": [[0, 7]], "colnames": ["name"]},
                    "02": {"colspecs": [[0, 2]], "colnames": ["qty"]}
                },
                "lenient": true
            }"#,
        )
        .unwrap();
        let src = MultiFixedWidthFile::new("memory://fwf-multi-test/in.txt", &ctx, options).unwrap();
        let tables = src.load().unwrap();

        let keys: Vec<_> = tables.iter().map(|(k, _)| k.clone().unwrap()).collect();
        assert_eq!(keys, vec!["01", "02"]);
        let people = ctx.backend.to_columnar(&tables[0].1).unwrap();
        assert_eq!(strings(&people, "name"), vec!["alice", "bob"]);

        let records = Source::rejects(&src);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].raw, "99zzz");
        assert_eq!(records[0].source, "MultiFixedWidthFile(memory://fwf-multi-test/in.txt)");

        let rejects = src.last_rejects();
        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects[0].line, 3);
        assert_eq!(
            rejects[0].kind,
            RejectKind::Unmatched {
                discriminator: "99".into()
            }
        );
    }

    #[test]
    fn multi_schema_strict_by_default() {
        let store = MemoryStorage::named("fwf-strict-test");
        store.insert("in.txt", "01abc\n99xyz\n");
        let ctx = ctx();
        let options: MultiFixedWidthOptions = serde_json::from_str(
            r#"{"schema_map": {"01": {"colspecs": [[0, 3]], "colnames": ["v"]}}}"#,
        )
        .unwrap();
        let src = MultiFixedWidthFile::new("memory://fwf-strict-test/in.txt", &ctx, options).unwrap();
        assert!(matches!(
            src.load().unwrap_err(),
            Error::UnmatchedDiscriminator { line: 2, .. }
        ));
    }

    #[test]
    fn missing_schema_map_and_bad_window_fail_at_construction() {
        let ctx = ctx();
        let err = MultiFixedWidthFile::new(
            "memory://fwf-config-test/in.txt",
            &ctx,
            MultiFixedWidthOptions::default(),
        )
        .unwrap_err();
        assert!(err.is_config());

        let options: MultiFixedWidthOptions = serde_json::from_str(
            r#"{"schema_map": {"01": {"colspecs": [[0, 3]], "colnames": ["v"]}}, "discriminator_length": 3}"#,
        )
        .unwrap();
        assert!(MultiFixedWidthFile::new("memory://fwf-config-test/in.txt", &ctx, options)
            .unwrap_err()
            .is_config());
    }
}
