//! Table-to-table steps.
//!
//! A transform sees data only through `Backend::to_columnar` and
//! `Backend::from_columnar`, so it works under every backend. `SqlQuery` is
//! the exception: it needs the SQL backend and fails with a conversion error
//! elsewhere.

mod columns;
mod filter;
mod sql;

pub use columns::{DropColumns, RenameColumns, SelectColumns};
pub use filter::{CompareOp, DropNulls, FilterRows};
pub use sql::SqlQuery;

use std::fmt;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use hopper_backend::{Backend, Ir};
use hopper_core::error::{Error, Result};

pub trait Transform: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, backend: &dyn Backend, ir: Ir) -> Result<Ir>;
}

pub type SharedTransform = Arc<dyn Transform>;

/// Materialise, rewrite, hand back to the same backend.
pub(crate) fn via_columnar<F>(backend: &dyn Backend, ir: Ir, f: F) -> Result<Ir>
where
    F: FnOnce(RecordBatch) -> Result<RecordBatch>,
{
    let batch = backend.to_columnar(&ir)?;
    drop(ir);
    backend.from_columnar(f(batch)?)
}

/// `table [a, b, c]`, for errors about a table the step cannot use.
pub(crate) fn shape(schema: &SchemaRef) -> String {
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    format!("table [{}]", names.join(", "))
}

/// A column the step needs is missing from the data it was handed. This is
/// a run-time mismatch, not a construction error.
pub(crate) fn column_index(schema: &SchemaRef, transform: &str, column: &str) -> Result<usize> {
    schema
        .index_of(column)
        .map_err(|_| Error::conversion(shape(schema), transform, format!("no column '{column}'")))
}

pub(crate) fn arrow_error(transform: &str, e: arrow::error::ArrowError) -> Error {
    Error::conversion("columnar table", transform, e.to_string())
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    /// id, name (one null), score.
    pub fn people() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("score", DataType::Float64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4])),
                Arc::new(StringArray::from(vec![Some("ann"), None, Some("cy"), Some("dee")])),
                Arc::new(Float64Array::from(vec![Some(9.5), Some(7.0), None, Some(3.25)])),
            ],
        )
        .unwrap()
    }
}
