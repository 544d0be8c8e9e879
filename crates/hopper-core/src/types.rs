//! Native types of the dataframe engine: labeled, mutable, row-addressable
//! columns of `Scalar`s.
//!
//! `hopper-backend` converts these to and from Arrow record batches. Keeping
//! them here (Arrow-free) lets transforms and tests build frames by hand.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
    Date32(i32),
    TimestampMicros(i64),
}

impl Scalar {
    /// Logical type of a non-null scalar; `None` for `Null`.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(DataType::Boolean),
            Scalar::I32(_) => Some(DataType::Int32),
            Scalar::I64(_) => Some(DataType::Int64),
            Scalar::F32(_) => Some(DataType::Float32),
            Scalar::F64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::Utf8),
            Scalar::Bin(_) => Some(DataType::Binary),
            Scalar::Date32(_) => Some(DataType::Date32),
            Scalar::TimestampMicros(_) => Some(DataType::TimestampMicros),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Order within one column: nulls first, floats by `total_cmp`. Values
    /// of different types compare equal; a validated column never holds them.
    fn cmp_in_column(&self, other: &Scalar) -> Ordering {
        use Scalar::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Bool(a), Bool(b)) => a.cmp(b),
            (I32(a), I32(b)) | (Date32(a), Date32(b)) => a.cmp(b),
            (I64(a), I64(b)) | (TimestampMicros(a), TimestampMicros(b)) => a.cmp(b),
            (F32(a), F32(b)) => a.total_cmp(b),
            (F64(a), F64(b)) => a.total_cmp(b),
            (Str(a), Str(b)) => a.cmp(b),
            (Bin(a), Bin(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Scalar>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Scalar>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }
}

/// Labeled, mutable table. `schema.fields[i]` describes `columns[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    schema: Schema,
    columns: Vec<Column>,
}

impl DataFrame {
    /// Build a frame, checking that schema and columns agree.
    pub fn try_new(schema: Schema, columns: Vec<Column>) -> Result<Self> {
        let df = Self { schema, columns };
        df.validate()?;
        Ok(df)
    }

    pub fn empty(schema: Schema) -> Self {
        let columns = schema
            .fields
            .iter()
            .map(|f| Column::new(f.name.clone(), Vec::new()))
            .collect();
        Self { schema, columns }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_parts(self) -> (Schema, Vec<Column>) {
        (self.schema, self.columns)
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Append a column at the end. Names must stay unique.
    pub fn push_column(&mut self, field: Field, column: Column) -> Result<()> {
        if self.schema.index_of(&field.name).is_some() {
            return Err(Error::Decode(format!("column '{}' already exists", field.name)));
        }
        if field.name != column.name {
            return Err(Error::Decode(format!(
                "field '{}' does not describe column '{}'",
                field.name, column.name
            )));
        }
        if !self.columns.is_empty() && column.len() != self.num_rows() {
            return Err(Error::Decode(format!(
                "column '{}' has {} rows, frame has {}",
                column.name,
                column.len(),
                self.num_rows()
            )));
        }
        check_column(&field, &column)?;
        self.schema.fields.push(field);
        self.columns.push(column);
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.schema.index_of(name)?;
        self.schema.fields.remove(idx);
        Some(self.columns.remove(idx))
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        if from != to && self.schema.index_of(to).is_some() {
            return Err(Error::Decode(format!("column '{to}' already exists")));
        }
        let idx = self
            .schema
            .index_of(from)
            .ok_or_else(|| Error::Decode(format!("column '{from}' not found")))?;
        self.schema.fields[idx].name = to.to_string();
        self.columns[idx].name = to.to_string();
        Ok(())
    }

    /// Stable ascending sort of every column by `keys`, leftmost key first.
    pub fn sort_by_columns(&mut self, keys: &[&str]) -> Result<()> {
        let key_idx = keys
            .iter()
            .map(|k| {
                self.schema
                    .index_of(k)
                    .ok_or_else(|| Error::Decode(format!("sort key '{k}' not found")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut order: Vec<usize> = (0..self.num_rows()).collect();
        order.sort_by(|&a, &b| {
            key_idx
                .iter()
                .map(|&c| self.columns[c].values[a].cmp_in_column(&self.columns[c].values[b]))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });

        for col in &mut self.columns {
            let mut old = std::mem::take(&mut col.values);
            col.values = order.iter().map(|&i| std::mem::replace(&mut old[i], Scalar::Null)).collect();
        }
        Ok(())
    }

    /// Schema and columns agree in order, names, lengths, types, nullability.
    pub fn validate(&self) -> Result<()> {
        if self.schema.fields.len() != self.columns.len() {
            return Err(Error::Decode(format!(
                "schema has {} fields but frame has {} columns",
                self.schema.fields.len(),
                self.columns.len()
            )));
        }
        let rows = self.num_rows();
        for (field, col) in self.schema.fields.iter().zip(&self.columns) {
            if field.name != col.name {
                return Err(Error::Decode(format!(
                    "field '{}' does not describe column '{}'",
                    field.name, col.name
                )));
            }
            if col.len() != rows {
                return Err(Error::Decode(format!(
                    "column '{}' has {} rows, expected {}",
                    col.name,
                    col.len(),
                    rows
                )));
            }
            check_column(field, col)?;
        }
        Ok(())
    }
}

/// A rowset: row-major values under a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rows {
    pub schema: Schema,
    pub rows: Vec<Vec<Scalar>>,
}

impl Rows {
    /// Pivot into a column-major frame, validating each row's width and types.
    pub fn into_frame(self) -> Result<DataFrame> {
        let width = self.schema.fields.len();
        let mut columns: Vec<Column> = self
            .schema
            .fields
            .iter()
            .map(|f| Column::new(f.name.clone(), Vec::with_capacity(self.rows.len())))
            .collect();
        for (r, row) in self.rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(Error::Decode(format!(
                    "row {r} has {} values, schema has {width} fields",
                    row.len()
                )));
            }
            for (col, value) in columns.iter_mut().zip(row) {
                col.values.push(value);
            }
        }
        DataFrame::try_new(self.schema, columns)
    }
}

fn check_column(field: &Field, col: &Column) -> Result<()> {
    for value in &col.values {
        match value.data_type() {
            None if !field.nullable => {
                return Err(Error::Decode(format!(
                    "null in non-nullable column '{}'",
                    field.name
                )));
            }
            Some(dt) if dt != field.data_type => {
                return Err(Error::Decode(format!(
                    "column '{}' is {} but holds a {} value",
                    field.name, field.data_type, dt
                )));
            }
            _ => {}
        }
    }
    Ok(())
}
