use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use hopper_core::config::BackendKind;
use hopper_core::error::{Error, Result};

use crate::backend::Backend;
use crate::ipc;
use crate::ir::{Ir, IrValue};

/// Opaque payloads. Tables are carried as Arrow IPC streams.
#[derive(Debug, Default, Clone)]
pub struct BytesBackend;

impl BytesBackend {
    pub fn new() -> Self {
        Self
    }

    fn payload<'a>(&self, ir: &'a Ir) -> Result<&'a Bytes> {
        self.check_origin(ir)?;
        match ir.value() {
            IrValue::Bytes(b) => Ok(b),
            _ => Err(Error::conversion(ir.kind_name(), "bytes", "unexpected payload")),
        }
    }
}

impl Backend for BytesBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Bytes
    }

    fn from_columnar(&self, batch: RecordBatch) -> Result<Ir> {
        Ok(Ir::new(self.tag(), IrValue::Bytes(ipc::write_stream(&batch)?)))
    }

    fn to_columnar(&self, ir: &Ir) -> Result<RecordBatch> {
        ipc::read_stream(self.payload(ir)?)
    }

    fn from_bytes(&self, bytes: Bytes) -> Result<Ir> {
        Ok(Ir::new(self.tag(), IrValue::Bytes(bytes)))
    }

    fn to_bytes(&self, ir: &Ir) -> Result<Bytes> {
        Ok(self.payload(ir)?.clone())
    }
}
