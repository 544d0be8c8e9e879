//! The in-flight value passed between pipeline stages.

use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use hopper_core::types::DataFrame;

use crate::backend::BackendTag;
use crate::backends::SqlRelation;

/// Engine-native payload. Which variant appears is decided solely by the
/// backend that built the value.
#[derive(Debug, Clone)]
pub enum IrValue {
    Columnar(RecordBatch),
    Dataframe(DataFrame),
    SqlHandle(SqlRelation),
    Bytes(Bytes),
}

/// A payload plus the tag of the backend that produced it.
///
/// Only backends construct `Ir`s; everything else treats them as opaque and
/// hands them back to the same backend.
#[derive(Debug, Clone)]
pub struct Ir {
    origin: BackendTag,
    value: IrValue,
}

impl Ir {
    pub(crate) fn new(origin: BackendTag, value: IrValue) -> Self {
        Self { origin, value }
    }

    pub fn origin(&self) -> BackendTag {
        self.origin
    }

    pub fn value(&self) -> &IrValue {
        &self.value
    }

    pub fn into_value(self) -> IrValue {
        self.value
    }

    /// Short name of the payload shape, used in conversion errors.
    pub fn kind_name(&self) -> &'static str {
        match self.value {
            IrValue::Columnar(_) => "columnar table",
            IrValue::Dataframe(_) => "dataframe",
            IrValue::SqlHandle(_) => "sql relation",
            IrValue::Bytes(_) => "bytes",
        }
    }

    /// Row count when it is known without scanning.
    pub fn num_rows(&self) -> Option<usize> {
        match &self.value {
            IrValue::Columnar(batch) => Some(batch.num_rows()),
            IrValue::Dataframe(df) => Some(df.num_rows()),
            IrValue::SqlHandle(rel) => rel.known_rows(),
            IrValue::Bytes(_) => None,
        }
    }

    pub(crate) fn describe(&self) -> String {
        format!("{} from {}", self.kind_name(), self.origin)
    }
}
