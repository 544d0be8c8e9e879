use arrow::record_batch::RecordBatch;
use hopper_core::config::BackendKind;
use hopper_core::error::{Error, Result};

use crate::backend::Backend;
use crate::ir::{Ir, IrValue};

/// Identity backend: the IR is the record batch itself.
#[derive(Debug, Default, Clone)]
pub struct ColumnarBackend;

impl ColumnarBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for ColumnarBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Columnar
    }

    fn from_columnar(&self, batch: RecordBatch) -> Result<Ir> {
        Ok(Ir::new(self.tag(), IrValue::Columnar(batch)))
    }

    fn to_columnar(&self, ir: &Ir) -> Result<RecordBatch> {
        self.check_origin(ir)?;
        match ir.value() {
            IrValue::Columnar(batch) => Ok(batch.clone()),
            _ => Err(Error::conversion(ir.kind_name(), "columnar table", "unexpected payload")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::sample_batch;

    #[test]
    fn identity_round_trip() {
        let backend = ColumnarBackend::new();
        let ir = backend.from_columnar(sample_batch()).unwrap();
        assert_eq!(ir.kind_name(), "columnar table");
        assert_eq!(ir.num_rows(), Some(3));
        assert!(!backend.is_lazy());
        assert_eq!(backend.to_columnar(&ir).unwrap(), sample_batch());
    }
}
