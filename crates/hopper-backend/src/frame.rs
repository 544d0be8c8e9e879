//! Mapping between Arrow record batches and `hopper-core` dataframes.
//!
//! Only the types in `hopper_core::schema::DataType` are representable.
//! Anything else (nested, decimal, dictionary, other timestamp units) is a
//! conversion error, never silently dropped. Schema metadata is not carried.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Date32Array, Float32Array, Float64Array,
    Int32Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{
    DataType as ArrowType, Date32Type, Field as ArrowField, Float32Type, Float64Type, Int32Type,
    Int64Type, Schema as ArrowSchema, TimeUnit, TimestampMicrosecondType,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use hopper_core::error::{Error, Result};
use hopper_core::schema::{DataType, Field, Schema};
use hopper_core::types::{Column, DataFrame, Scalar};

pub fn to_arrow_type(dt: DataType) -> ArrowType {
    match dt {
        DataType::Boolean => ArrowType::Boolean,
        DataType::Int32 => ArrowType::Int32,
        DataType::Int64 => ArrowType::Int64,
        DataType::Float32 => ArrowType::Float32,
        DataType::Float64 => ArrowType::Float64,
        DataType::Utf8 => ArrowType::Utf8,
        DataType::Binary => ArrowType::Binary,
        DataType::Date32 => ArrowType::Date32,
        DataType::TimestampMicros => ArrowType::Timestamp(TimeUnit::Microsecond, None),
    }
}

pub fn from_arrow_type(dt: &ArrowType) -> Option<DataType> {
    let mapped = match dt {
        ArrowType::Boolean => DataType::Boolean,
        ArrowType::Int32 => DataType::Int32,
        ArrowType::Int64 => DataType::Int64,
        ArrowType::Float32 => DataType::Float32,
        ArrowType::Float64 => DataType::Float64,
        ArrowType::Utf8 => DataType::Utf8,
        ArrowType::Binary => DataType::Binary,
        ArrowType::Date32 => DataType::Date32,
        ArrowType::Timestamp(TimeUnit::Microsecond, None) => DataType::TimestampMicros,
        _ => return None,
    };
    Some(mapped)
}

pub fn to_arrow_schema(schema: &Schema) -> ArrowSchema {
    ArrowSchema::new(
        schema
            .fields
            .iter()
            .map(|f| ArrowField::new(&f.name, to_arrow_type(f.data_type), f.nullable))
            .collect::<Vec<_>>(),
    )
}

pub fn batch_to_frame(batch: &RecordBatch) -> Result<DataFrame> {
    if batch.num_columns() == 0 && batch.num_rows() > 0 {
        return Err(Error::conversion(
            "columnar table",
            "dataframe",
            format!("{} rows without columns", batch.num_rows()),
        ));
    }

    let arrow_schema = batch.schema();
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns = Vec::with_capacity(batch.num_columns());
    for (af, array) in arrow_schema.fields().iter().zip(batch.columns()) {
        let dt = from_arrow_type(af.data_type()).ok_or_else(|| {
            Error::conversion(
                "columnar table",
                "dataframe",
                format!("column '{}' has unsupported type {}", af.name(), af.data_type()),
            )
        })?;
        fields.push(Field::new(af.name().clone(), dt, af.is_nullable()));
        columns.push(Column::new(af.name().clone(), array_to_scalars(dt, array.as_ref())));
    }
    DataFrame::try_new(Schema::new(fields), columns)
        .map_err(|e| Error::conversion("columnar table", "dataframe", e.to_string()))
}

pub fn frame_to_batch(df: &DataFrame) -> Result<RecordBatch> {
    let schema = Arc::new(to_arrow_schema(df.schema()));
    let arrays = df
        .schema()
        .fields
        .iter()
        .zip(df.columns())
        .map(|(f, c)| scalars_to_array(f, &c.values))
        .collect::<Result<Vec<_>>>()?;
    let options = RecordBatchOptions::new().with_row_count(Some(df.num_rows()));
    RecordBatch::try_new_with_options(schema, arrays, &options)
        .map_err(|e| Error::conversion("dataframe", "columnar table", e.to_string()))
}

fn array_to_scalars(dt: DataType, array: &dyn Array) -> Vec<Scalar> {
    macro_rules! collect {
        ($arr:expr, $wrap:expr) => {{
            let arr = $arr;
            (0..arr.len())
                .map(|i| {
                    if arr.is_null(i) {
                        Scalar::Null
                    } else {
                        $wrap(arr.value(i))
                    }
                })
                .collect()
        }};
    }

    match dt {
        DataType::Boolean => collect!(array.as_boolean(), Scalar::Bool),
        DataType::Int32 => collect!(array.as_primitive::<Int32Type>(), Scalar::I32),
        DataType::Int64 => collect!(array.as_primitive::<Int64Type>(), Scalar::I64),
        DataType::Float32 => collect!(array.as_primitive::<Float32Type>(), Scalar::F32),
        DataType::Float64 => collect!(array.as_primitive::<Float64Type>(), Scalar::F64),
        DataType::Utf8 => collect!(array.as_string::<i32>(), |s: &str| Scalar::Str(
            s.to_string()
        )),
        DataType::Binary => collect!(array.as_binary::<i32>(), |b: &[u8]| Scalar::Bin(
            b.to_vec()
        )),
        DataType::Date32 => collect!(array.as_primitive::<Date32Type>(), Scalar::Date32),
        DataType::TimestampMicros => collect!(
            array.as_primitive::<TimestampMicrosecondType>(),
            Scalar::TimestampMicros
        ),
    }
}

fn scalars_to_array(field: &Field, values: &[Scalar]) -> Result<ArrayRef> {
    macro_rules! build {
        ($array:ty, $variant:ident) => {{
            let mut out = Vec::with_capacity(values.len());
            for v in values {
                match v {
                    Scalar::Null => out.push(None),
                    Scalar::$variant(x) => out.push(Some(x.clone())),
                    other => return Err(mismatch(field, other)),
                }
            }
            Arc::new(<$array>::from(out)) as ArrayRef
        }};
    }

    let array = match field.data_type {
        DataType::Boolean => build!(BooleanArray, Bool),
        DataType::Int32 => build!(Int32Array, I32),
        DataType::Int64 => build!(Int64Array, I64),
        DataType::Float32 => build!(Float32Array, F32),
        DataType::Float64 => build!(Float64Array, F64),
        DataType::Utf8 => build!(StringArray, Str),
        DataType::Binary => {
            let mut out: Vec<Option<&[u8]>> = Vec::with_capacity(values.len());
            for v in values {
                match v {
                    Scalar::Null => out.push(None),
                    Scalar::Bin(b) => out.push(Some(b.as_slice())),
                    other => return Err(mismatch(field, other)),
                }
            }
            Arc::new(BinaryArray::from(out)) as ArrayRef
        }
        DataType::Date32 => build!(Date32Array, Date32),
        DataType::TimestampMicros => build!(TimestampMicrosecondArray, TimestampMicros),
    };
    Ok(array)
}

fn mismatch(field: &Field, value: &Scalar) -> Error {
    Error::conversion(
        "dataframe",
        "columnar table",
        format!("column '{}' is {} but holds {:?}", field.name, field.data_type, value),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::sample_batch;
    use arrow::array::{ListArray, StructArray};

    #[test]
    fn round_trip_preserves_names_types_and_nulls() {
        let batch = sample_batch();
        let df = batch_to_frame(&batch).unwrap();
        assert_eq!(df.schema().names(), vec!["id", "name"]);
        assert_eq!(df.column("name").unwrap().null_count(), 1);
        assert_eq!(frame_to_batch(&df).unwrap(), batch);
    }

    #[test]
    fn every_supported_type_survives() {
        let schema = Arc::new(ArrowSchema::new(vec![
            ArrowField::new("b", ArrowType::Boolean, true),
            ArrowField::new("i", ArrowType::Int32, true),
            ArrowField::new("f", ArrowType::Float32, true),
            ArrowField::new("bin", ArrowType::Binary, true),
            ArrowField::new("d", ArrowType::Date32, true),
            ArrowField::new(
                "ts",
                ArrowType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(BooleanArray::from(vec![Some(true), None])),
                Arc::new(Int32Array::from(vec![Some(1), None])),
                Arc::new(Float32Array::from(vec![Some(0.5), None])),
                Arc::new(BinaryArray::from(vec![Some(&b"xy"[..]), None])),
                Arc::new(Date32Array::from(vec![Some(19000), None])),
                Arc::new(TimestampMicrosecondArray::from(vec![Some(1_000_000), None])),
            ],
        )
        .unwrap();
        let back = frame_to_batch(&batch_to_frame(&batch).unwrap()).unwrap();
        assert_eq!(back, batch);
    }

    #[test]
    fn nested_types_are_refused() {
        let list = ListArray::from_iter_primitive::<Int32Type, _, _>(vec![Some(vec![Some(1)])]);
        let batch = RecordBatch::try_from_iter(vec![("l", Arc::new(list) as ArrayRef)]).unwrap();
        let err = batch_to_frame(&batch).unwrap_err();
        assert!(err.to_string().contains("unsupported type"), "{err}");

        let inner = Arc::new(Int32Array::from(vec![1])) as ArrayRef;
        let strukt = StructArray::from(vec![(
            Arc::new(ArrowField::new("x", ArrowType::Int32, false)),
            inner,
        )]);
        let batch = RecordBatch::try_from_iter(vec![("s", Arc::new(strukt) as ArrayRef)]).unwrap();
        assert!(batch_to_frame(&batch).is_err());
    }

    #[test]
    fn rows_without_columns_are_refused() {
        let options = RecordBatchOptions::new().with_row_count(Some(4));
        let batch =
            RecordBatch::try_new_with_options(Arc::new(ArrowSchema::empty()), vec![], &options)
                .unwrap();
        assert!(batch_to_frame(&batch).is_err());
    }

    #[test]
    fn empty_frame_keeps_its_schema() {
        let schema = Schema::new(vec![Field::new("a", DataType::Utf8, true)]);
        let batch = frame_to_batch(&DataFrame::empty(schema)).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.schema().field(0).name(), "a");
    }
}
