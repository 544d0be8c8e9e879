//! Type-name → constructor tables for the declarative pipeline form.
//!
//! A step in a document is `{type: <name>, ...params}`. The registry looks the
//! name up in the table for its role and hands the remaining parameters to
//! the constructor, which validates them eagerly. Callers can register their
//! own constructors next to the built-in ones.

use std::collections::BTreeMap;
use std::sync::Arc;

use hopper_core::config::StorageConfig;
use hopper_core::error::{Error, Result};
use hopper_io::connectors::{
    BytesFile, CsvFile, CsvOptions, DatasetOptions, FixedWidthFile, FixedWidthOptions, IoContext,
    JsonFile, JsonLinesFile, JsonOptions, MultiFixedWidthFile, MultiFixedWidthOptions,
    ParquetDataset, ParquetFile, ParquetOptions, SharedSource, SharedTarget,
};
#[cfg(feature = "postgres")]
use hopper_io::connectors::{PostgresOptions, PostgresTable};
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

use crate::transforms::{
    CompareOp, DropColumns, DropNulls, FilterRows, RenameColumns, SelectColumns, SharedTransform,
    SqlQuery,
};

/// Parameters of one step, minus its `type`.
#[derive(Debug, Clone)]
pub struct Params {
    kind: String,
    map: Mapping,
}

impl Params {
    pub fn new(kind: impl Into<String>, map: Mapping) -> Self {
        Self {
            kind: kind.into(),
            map,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Remove a key and deserialize it.
    pub fn take<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.map.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_yaml::from_value(v)
                .map(Some)
                .map_err(|e| Error::config(format!("{}: '{key}': {e}", self.kind))),
        }
    }

    pub fn take_str(&mut self, key: &str) -> Result<Option<String>> {
        self.take(key)
    }

    pub fn require_str(&mut self, key: &str) -> Result<String> {
        self.take_str(key)?
            .ok_or_else(|| Error::config(format!("{}: missing '{key}'", self.kind)))
    }

    /// Deserialize whatever is left into an options struct.
    pub fn into_options<T: DeserializeOwned>(self) -> Result<T> {
        serde_yaml::from_value(Value::Mapping(self.map))
            .map_err(|e| Error::config(format!("{}: {e}", self.kind)))
    }

    /// Refuse leftover keys for steps that take no options struct.
    pub fn finish(self) -> Result<()> {
        match self.map.keys().next() {
            None => Ok(()),
            Some(k) => Err(Error::config(format!(
                "{}: unknown parameter {}",
                self.kind,
                serde_yaml::to_string(k).unwrap_or_default().trim()
            ))),
        }
    }

    /// Split off the per-step `storage_options`, overlaid on the run's.
    fn context(&mut self, ctx: &IoContext) -> Result<IoContext> {
        match self.take::<StorageConfig>("storage_options")? {
            Some(step) => Ok(ctx.clone().with_storage(ctx.storage.merged(&step))),
            None => Ok(ctx.clone()),
        }
    }
}

pub type SourceCtor = Arc<dyn Fn(Params, &IoContext) -> Result<SharedSource> + Send + Sync>;
pub type TargetCtor = Arc<dyn Fn(Params, &IoContext) -> Result<SharedTarget> + Send + Sync>;
pub type TransformCtor = Arc<dyn Fn(Params) -> Result<SharedTransform> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Registry {
    sources: BTreeMap<String, SourceCtor>,
    targets: BTreeMap<String, TargetCtor>,
    transforms: BTreeMap<String, TransformCtor>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("targets", &self.targets.keys().collect::<Vec<_>>())
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn unknown<'a>(role: &str, kind: &str, known: impl Iterator<Item = &'a String>) -> Error {
    let known: Vec<&str> = known.map(String::as_str).collect();
    Error::config(format!(
        "unknown {role} type '{kind}' (known: {})",
        known.join(", ")
    ))
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn source<F>(&mut self, kind: &str, ctor: F) -> &mut Self
    where
        F: Fn(Params, &IoContext) -> Result<SharedSource> + Send + Sync + 'static,
    {
        self.sources.insert(kind.to_string(), Arc::new(ctor));
        self
    }

    pub fn target<F>(&mut self, kind: &str, ctor: F) -> &mut Self
    where
        F: Fn(Params, &IoContext) -> Result<SharedTarget> + Send + Sync + 'static,
    {
        self.targets.insert(kind.to_string(), Arc::new(ctor));
        self
    }

    pub fn transform<F>(&mut self, kind: &str, ctor: F) -> &mut Self
    where
        F: Fn(Params) -> Result<SharedTransform> + Send + Sync + 'static,
    {
        self.transforms.insert(kind.to_string(), Arc::new(ctor));
        self
    }

    pub fn build_source(&self, kind: &str, map: Mapping, ctx: &IoContext) -> Result<SharedSource> {
        let ctor = self
            .sources
            .get(kind)
            .ok_or_else(|| unknown("source", kind, self.sources.keys()))?;
        ctor(Params::new(kind, map), ctx)
    }

    pub fn build_target(&self, kind: &str, map: Mapping, ctx: &IoContext) -> Result<SharedTarget> {
        let ctor = self
            .targets
            .get(kind)
            .ok_or_else(|| unknown("target", kind, self.targets.keys()))?;
        ctor(Params::new(kind, map), ctx)
    }

    pub fn build_transform(&self, kind: &str, map: Mapping) -> Result<SharedTransform> {
        let ctor = self
            .transforms
            .get(kind)
            .ok_or_else(|| unknown("transform", kind, self.transforms.keys()))?;
        ctor(Params::new(kind, map))
    }

    /// Every connector and transform this workspace ships.
    pub fn builtin() -> Self {
        let mut r = Self::empty();

        r.source("csv", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            let path = p.require_str("path")?;
            Ok(Arc::new(CsvFile::new(&path, &ctx, p.into_options::<CsvOptions>()?)?))
        })
        .source("json", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            let path = p.require_str("path")?;
            Ok(Arc::new(JsonFile::new(&path, &ctx, p.into_options::<JsonOptions>()?)?))
        })
        .source("jsonl", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            let path = p.require_str("path")?;
            Ok(Arc::new(JsonLinesFile::new(&path, &ctx, p.into_options::<JsonOptions>()?)?))
        })
        .source("parquet", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            let path = p.require_str("path")?;
            Ok(Arc::new(ParquetFile::new(&path, &ctx, p.into_options::<ParquetOptions>()?)?))
        })
        .source("bytes", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            let path = p.require_str("path")?;
            p.finish()?;
            Ok(Arc::new(BytesFile::new(&path, &ctx)?))
        })
        .source("fixed_width", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            let path = p.require_str("path")?;
            let opts = p.into_options::<FixedWidthOptions>()?;
            Ok(Arc::new(FixedWidthFile::new(&path, &ctx, opts)?))
        })
        .source("multi_fixed_width", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            let path = p.require_str("path")?;
            let opts = p.into_options::<MultiFixedWidthOptions>()?;
            Ok(Arc::new(MultiFixedWidthFile::new(&path, &ctx, opts)?))
        });

        #[cfg(feature = "postgres")]
        r.source("postgres", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            Ok(Arc::new(PostgresTable::new(&ctx, p.into_options::<PostgresOptions>()?)?))
        });

        r.target("csv", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            let path = p.require_str("path")?;
            Ok(Arc::new(CsvFile::new(&path, &ctx, p.into_options::<CsvOptions>()?)?))
        })
        .target("json", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            let path = p.require_str("path")?;
            Ok(Arc::new(JsonFile::new(&path, &ctx, p.into_options::<JsonOptions>()?)?))
        })
        .target("jsonl", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            let path = p.require_str("path")?;
            Ok(Arc::new(JsonLinesFile::new(&path, &ctx, p.into_options::<JsonOptions>()?)?))
        })
        .target("parquet", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            let path = p.require_str("path")?;
            Ok(Arc::new(ParquetFile::new(&path, &ctx, p.into_options::<ParquetOptions>()?)?))
        })
        .target("bytes", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            let path = p.require_str("path")?;
            p.finish()?;
            Ok(Arc::new(BytesFile::new(&path, &ctx)?))
        })
        .target("parquet_dataset", |mut p, ctx| {
            let ctx = p.context(ctx)?;
            let path = p.require_str("path")?;
            Ok(Arc::new(ParquetDataset::new(&path, &ctx, p.into_options::<DatasetOptions>()?)?))
        });

        r.transform("drop_columns", |mut p| {
            let columns = p.take::<Vec<String>>("columns")?.unwrap_or_default();
            p.finish()?;
            Ok(Arc::new(DropColumns::new(columns)?))
        })
        .transform("select_columns", |mut p| {
            let columns = p.take::<Vec<String>>("columns")?.unwrap_or_default();
            p.finish()?;
            Ok(Arc::new(SelectColumns::new(columns)?))
        })
        .transform("rename_columns", |mut p| {
            // Mapping keeps document order.
            let mapping = p.take::<Mapping>("mapping")?.unwrap_or_default();
            p.finish()?;
            let renames = mapping
                .into_iter()
                .map(|(from, to)| {
                    Ok((serde_yaml::from_value(from)?, serde_yaml::from_value(to)?))
                })
                .collect::<Result<Vec<(String, String)>>>()?;
            Ok(Arc::new(RenameColumns::new(renames)?))
        })
        .transform("filter", |mut p| {
            let transform = match p.take_str("expr")? {
                Some(expr) => FilterRows::parse(&expr)?,
                None => {
                    let column = p.require_str("column")?;
                    let op: CompareOp = p.require_str("op")?.parse()?;
                    let value = p
                        .take::<Value>("value")?
                        .ok_or_else(|| Error::config("filter: missing 'value'"))?;
                    FilterRows::new(column, op, literal_text(&value)?)?
                }
            };
            p.finish()?;
            Ok(Arc::new(transform))
        })
        .transform("drop_nulls", |mut p| {
            let columns = p.take::<Vec<String>>("columns")?;
            p.finish()?;
            Ok(Arc::new(DropNulls::new(columns)))
        })
        .transform("sql", |mut p| {
            let query = p.require_str("query")?;
            p.finish()?;
            Ok(Arc::new(SqlQuery::new(query)?))
        });

        r
    }
}

/// YAML scalars as the text `FilterRows` casts from.
fn literal_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::config(format!("filter: value must be a scalar, got {other:?}"))),
    }
}
