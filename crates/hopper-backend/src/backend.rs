//! The `Backend` trait: conversions between the Arrow interchange type and an
//! engine-native `Ir`.

use std::fmt;
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use hopper_core::config::BackendKind;
use hopper_core::error::{Error, Result};
use hopper_core::id::InstanceId;
use hopper_core::types::{DataFrame, Rows};

use crate::backends::{BytesBackend, ColumnarBackend, DataframeBackend, SqlBackend};
use crate::frame;
use crate::ipc;
use crate::ir::Ir;

/// Identity of the backend that produced an `Ir`.
///
/// Stateless backends share `InstanceId::shared()`, so any two instances of the
/// same kind accept each other's values. Stateful backends (SQL) use a fresh
/// id per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendTag {
    pub kind: BackendKind,
    pub instance: InstanceId,
}

impl BackendTag {
    pub const fn shared(kind: BackendKind) -> Self {
        Self {
            kind,
            instance: InstanceId::shared(),
        }
    }
}

impl fmt::Display for BackendTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance.is_shared() {
            write!(f, "{} backend", self.kind)
        } else {
            write!(f, "{} backend {}", self.kind, self.instance.simple())
        }
    }
}

/// A compute engine that holds data between pipeline stages.
///
/// `from_columnar` and `to_columnar` are the whole contract; the other
/// methods are refinements with defaults expressed in terms of those two.
pub trait Backend: fmt::Debug + Send + Sync {
    fn kind(&self) -> BackendKind;

    fn tag(&self) -> BackendTag {
        BackendTag::shared(self.kind())
    }

    fn from_columnar(&self, batch: RecordBatch) -> Result<Ir>;

    fn to_columnar(&self, ir: &Ir) -> Result<RecordBatch>;

    fn from_rows(&self, rows: Rows) -> Result<Ir> {
        let df = rows.into_frame()?;
        self.from_columnar(frame::frame_to_batch(&df)?)
    }

    fn to_dataframe(&self, ir: &Ir) -> Result<DataFrame> {
        frame::batch_to_frame(&self.to_columnar(ir)?)
    }

    /// Accepts an Arrow IPC stream; any other payload is a conversion error.
    fn from_bytes(&self, bytes: Bytes) -> Result<Ir> {
        let batch = ipc::read_stream(&bytes).map_err(|e| match e {
            Error::Conversion { reason, .. } => {
                Error::conversion("bytes", self.kind().name(), reason)
            }
            other => other,
        })?;
        self.from_columnar(batch)
    }

    fn to_bytes(&self, ir: &Ir) -> Result<Bytes> {
        ipc::write_stream(&self.to_columnar(ir)?)
    }

    /// Whether values stay unmaterialised until `to_columnar`.
    fn is_lazy(&self) -> bool {
        false
    }

    /// The SQL engine behind this backend, if it has one.
    fn as_sql(&self) -> Option<&SqlBackend> {
        None
    }

    /// Refuse an `Ir` produced by a different backend.
    fn check_origin(&self, ir: &Ir) -> Result<()> {
        let mine = self.tag();
        if ir.origin() == mine {
            Ok(())
        } else {
            Err(Error::conversion(
                ir.describe(),
                mine.to_string(),
                "value was produced by a different backend",
            ))
        }
    }
}

pub type SharedBackend = Arc<dyn Backend>;

/// Construct a fresh backend of the given kind.
pub fn build_backend(kind: BackendKind) -> Result<SharedBackend> {
    let backend: SharedBackend = match kind {
        BackendKind::Columnar => Arc::new(ColumnarBackend::new()),
        BackendKind::Dataframe => Arc::new(DataframeBackend::new()),
        BackendKind::Sql => Arc::new(SqlBackend::new()?),
        BackendKind::Bytes => Arc::new(BytesBackend::new()),
    };
    tracing::debug!(backend = %backend.tag(), "backend constructed");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::sample_batch;

    #[test]
    fn build_backend_covers_every_kind() {
        for kind in [
            BackendKind::Columnar,
            BackendKind::Dataframe,
            BackendKind::Sql,
            BackendKind::Bytes,
        ] {
            let backend = build_backend(kind).unwrap();
            assert_eq!(backend.kind(), kind);
            let ir = backend.from_columnar(sample_batch()).unwrap();
            assert_eq!(backend.to_columnar(&ir).unwrap(), sample_batch());
        }
    }

    #[test]
    fn foreign_values_are_refused() {
        let columnar = build_backend(BackendKind::Columnar).unwrap();
        let frame = build_backend(BackendKind::Dataframe).unwrap();
        let ir = columnar.from_columnar(sample_batch()).unwrap();
        let err = frame.to_columnar(&ir).unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }), "{err}");
        assert!(err.to_string().contains("columnar"));
    }

    #[test]
    fn stateless_instances_interoperate() {
        let a = ColumnarBackend::new();
        let b = ColumnarBackend::new();
        let ir = a.from_columnar(sample_batch()).unwrap();
        assert_eq!(b.to_columnar(&ir).unwrap().num_rows(), 3);
    }

    #[test]
    fn default_byte_refinements_use_ipc() {
        let backend = ColumnarBackend::new();
        let ir = backend.from_columnar(sample_batch()).unwrap();
        let bytes = backend.to_bytes(&ir).unwrap();
        let back = backend.from_bytes(bytes).unwrap();
        assert_eq!(backend.to_columnar(&back).unwrap(), sample_batch());

        let err = backend.from_bytes(Bytes::from_static(b"not arrow")).unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
    }

    #[test]
    fn from_rows_goes_through_a_frame() {
        use hopper_core::schema::{DataType, Field as CoreField, Schema as CoreSchema};
        use hopper_core::types::Scalar;

        let rows = Rows {
            schema: CoreSchema::new(vec![CoreField::new("n", DataType::Int64, false)]),
            rows: vec![vec![Scalar::I64(7)], vec![Scalar::I64(8)]],
        };
        let backend = ColumnarBackend::new();
        let ir = backend.from_rows(rows).unwrap();
        assert_eq!(ir.num_rows(), Some(2));
    }
}
