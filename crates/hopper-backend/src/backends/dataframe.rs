use arrow::record_batch::RecordBatch;
use hopper_core::config::BackendKind;
use hopper_core::error::{Error, Result};
use hopper_core::types::{DataFrame, Rows};

use crate::backend::Backend;
use crate::frame;
use crate::ir::{Ir, IrValue};

/// Labeled, mutable frames from `hopper-core`.
#[derive(Debug, Default, Clone)]
pub struct DataframeBackend;

impl DataframeBackend {
    pub fn new() -> Self {
        Self
    }

    /// Wrap a frame built by hand.
    pub fn from_frame(&self, df: DataFrame) -> Result<Ir> {
        df.validate()?;
        Ok(Ir::new(self.tag(), IrValue::Dataframe(df)))
    }

    fn frame<'a>(&self, ir: &'a Ir) -> Result<&'a DataFrame> {
        self.check_origin(ir)?;
        match ir.value() {
            IrValue::Dataframe(df) => Ok(df),
            _ => Err(Error::conversion(ir.kind_name(), "dataframe", "unexpected payload")),
        }
    }
}

impl Backend for DataframeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dataframe
    }

    fn from_columnar(&self, batch: RecordBatch) -> Result<Ir> {
        let df = frame::batch_to_frame(&batch)?;
        Ok(Ir::new(self.tag(), IrValue::Dataframe(df)))
    }

    fn to_columnar(&self, ir: &Ir) -> Result<RecordBatch> {
        frame::frame_to_batch(self.frame(ir)?)
    }

    fn from_rows(&self, rows: Rows) -> Result<Ir> {
        self.from_frame(rows.into_frame()?)
    }

    fn to_dataframe(&self, ir: &Ir) -> Result<DataFrame> {
        Ok(self.frame(ir)?.clone())
    }
}
