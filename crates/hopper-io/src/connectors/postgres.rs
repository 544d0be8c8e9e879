use std::sync::Arc;
use std::time::Duration;

use arrow::array::{
    ArrayRef, BinaryBuilder, BooleanBuilder, Float32Builder, Float64Builder, Int32Builder,
    Int64Builder, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use hopper_backend::SharedBackend;
use hopper_core::error::{Error, Result};
use postgres::types::{FromSql, Type};
use postgres::{Client, NoTls, Row};
use serde::Deserialize;

use super::{IoContext, Source, Tables};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresOptions {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    pub db: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    /// Columns to read, in order; all of them when unset.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_port() -> u16 {
    5432
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn validate(options: &PostgresOptions) -> Result<()> {
    for (key, value) in [
        ("host", &options.host),
        ("user", &options.user),
        ("db", &options.db),
        ("schema", &options.schema),
        ("table", &options.table),
    ] {
        if value.is_empty() {
            return Err(Error::config(format!("postgres: '{key}' must not be empty")));
        }
    }
    if options.port == 0 {
        return Err(Error::config("postgres: port must be positive"));
    }
    if let Some(columns) = &options.columns {
        if columns.is_empty() {
            return Err(Error::config("postgres: 'columns' lists no column"));
        }
        if let Some(blank) = columns.iter().find(|c| c.is_empty()) {
            return Err(Error::config(format!("postgres: empty column name in {blank:?}")));
        }
    }
    Ok(())
}

/// `"name"` with embedded quotes doubled.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// What a column is read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bool,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Text,
    Binary,
}

impl Kind {
    fn of(ty: &Type) -> Option<Kind> {
        let kind = if *ty == Type::BOOL {
            Kind::Bool
        } else if *ty == Type::INT2 {
            Kind::Int16
        } else if *ty == Type::INT4 {
            Kind::Int32
        } else if *ty == Type::INT8 {
            Kind::Int64
        } else if *ty == Type::FLOAT4 {
            Kind::Float32
        } else if *ty == Type::FLOAT8 {
            Kind::Float64
        } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME].contains(ty) {
            Kind::Text
        } else if *ty == Type::BYTEA {
            Kind::Binary
        } else {
            return None;
        };
        Some(kind)
    }

    fn data_type(self) -> DataType {
        match self {
            Kind::Bool => DataType::Boolean,
            Kind::Int16 | Kind::Int32 => DataType::Int32,
            Kind::Int64 => DataType::Int64,
            Kind::Float32 => DataType::Float32,
            Kind::Float64 => DataType::Float64,
            Kind::Text => DataType::Utf8,
            Kind::Binary => DataType::Binary,
        }
    }
}

/// One table (or a column subset of it) read in full with a single
/// `SELECT`. Types without a direct Arrow counterpart (numeric, dates,
/// json, ...) arrive as text.
#[derive(Debug)]
pub struct PostgresTable {
    name: String,
    backend: SharedBackend,
    options: PostgresOptions,
}

impl PostgresTable {
    /// Validates options; the server is first contacted in `load`.
    pub fn new(ctx: &IoContext, options: PostgresOptions) -> Result<Self> {
        validate(&options)?;
        let name = format!(
            "PostgresTable(postgres://{}@{}:{}/{}/{}.{})",
            options.user, options.host, options.port, options.db, options.schema, options.table
        );
        Ok(Self {
            name,
            backend: Arc::clone(&ctx.backend),
            options,
        })
    }

    fn relation(&self) -> String {
        format!(
            "{}.{}",
            quote_ident(&self.options.schema),
            quote_ident(&self.options.table)
        )
    }

    /// The `SELECT` before column types are known.
    pub fn query(&self) -> String {
        let columns = match &self.options.columns {
            Some(cols) => cols.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            None => "*".to_string(),
        };
        format!("SELECT {columns} FROM {}", self.relation())
    }

    /// The `SELECT` that casts every column of an unsupported type to text.
    fn typed_query(&self, columns: &[(String, Option<Kind>)]) -> String {
        let list = columns
            .iter()
            .map(|(name, kind)| match kind {
                Some(_) => quote_ident(name),
                None => format!("{0}::text AS {0}", quote_ident(name)),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("SELECT {list} FROM {}", self.relation())
    }

    fn connect(&self) -> Result<Client> {
        let o = &self.options;
        let mut config = postgres::Config::new();
        config
            .host(&o.host)
            .port(o.port)
            .user(&o.user)
            .dbname(&o.db)
            .connect_timeout(Duration::from_secs(o.connect_timeout_secs));
        if let Some(password) = &o.password {
            config.password(password);
        }
        config.connect(NoTls).map_err(|e| Error::medium(&self.name, e))
    }

    fn fetch(&self, client: &mut Client) -> Result<RecordBatch> {
        let medium = |e: postgres::Error| Error::medium(&self.name, e);

        let stmt = client.prepare(&self.query()).map_err(medium)?;
        let columns: Vec<(String, Option<Kind>)> = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), Kind::of(c.type_())))
            .collect();
        for (name, kind) in &columns {
            if kind.is_none() {
                tracing::debug!(connector = %self.name, column = %name, "reading column as text");
            }
        }

        let rows = client
            .query(self.typed_query(&columns).as_str(), &[])
            .map_err(medium)?;

        let mut fields = Vec::with_capacity(columns.len());
        let mut arrays = Vec::with_capacity(columns.len());
        for (idx, (name, kind)) in columns.iter().enumerate() {
            let kind = kind.unwrap_or(Kind::Text);
            fields.push(Field::new(name, kind.data_type(), true));
            arrays.push(self.column(&rows, idx, kind)?);
        }
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .map_err(|e| Error::medium(&self.name, e))
    }

    fn column(&self, rows: &[Row], idx: usize, kind: Kind) -> Result<ArrayRef> {
        let array: ArrayRef = match kind {
            Kind::Bool => {
                let mut b = BooleanBuilder::with_capacity(rows.len());
                for v in self.values::<bool>(rows, idx)? {
                    b.append_option(v);
                }
                Arc::new(b.finish())
            }
            Kind::Int16 => {
                let mut b = Int32Builder::with_capacity(rows.len());
                for v in self.values::<i16>(rows, idx)? {
                    b.append_option(v.map(i32::from));
                }
                Arc::new(b.finish())
            }
            Kind::Int32 => {
                let mut b = Int32Builder::with_capacity(rows.len());
                for v in self.values::<i32>(rows, idx)? {
                    b.append_option(v);
                }
                Arc::new(b.finish())
            }
            Kind::Int64 => {
                let mut b = Int64Builder::with_capacity(rows.len());
                for v in self.values::<i64>(rows, idx)? {
                    b.append_option(v);
                }
                Arc::new(b.finish())
            }
            Kind::Float32 => {
                let mut b = Float32Builder::with_capacity(rows.len());
                for v in self.values::<f32>(rows, idx)? {
                    b.append_option(v);
                }
                Arc::new(b.finish())
            }
            Kind::Float64 => {
                let mut b = Float64Builder::with_capacity(rows.len());
                for v in self.values::<f64>(rows, idx)? {
                    b.append_option(v);
                }
                Arc::new(b.finish())
            }
            Kind::Text => {
                let mut b = StringBuilder::new();
                for v in self.values::<String>(rows, idx)? {
                    b.append_option(v);
                }
                Arc::new(b.finish())
            }
            Kind::Binary => {
                let mut b = BinaryBuilder::new();
                for v in self.values::<Vec<u8>>(rows, idx)? {
                    b.append_option(v);
                }
                Arc::new(b.finish())
            }
        };
        Ok(array)
    }

    fn values<T>(&self, rows: &[Row], idx: usize) -> Result<Vec<Option<T>>>
    where
        T: for<'a> FromSql<'a>,
    {
        rows.iter()
            .map(|row| {
                row.try_get::<_, Option<T>>(idx)
                    .map_err(|e| Error::medium(&self.name, e))
            })
            .collect()
    }
}

impl Source for PostgresTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    fn load(&self) -> Result<Tables> {
        let mut client = self.connect()?;
        let batch = self.fetch(&mut client)?;
        tracing::debug!(connector = %self.name, rows = batch.num_rows(), "table fetched");
        Ok(vec![(None, self.backend.from_columnar(batch)?)])
    }
}
