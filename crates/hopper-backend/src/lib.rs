#![forbid(unsafe_code)]
//! hopper-backend: the interchange contract between the pipeline and the
//! compute engine that holds data during a hop.
//!
//! Design:
//! - The interchange type is an Arrow `RecordBatch`.
//! - `Backend` converts between that and an engine-native value; the result
//!   is an `Ir` tagged with the backend that produced it, and every backend
//!   refuses values it did not produce.
//! - Four engines: `ColumnarBackend` (identity), `DataframeBackend`
//!   (labeled mutable frames from `hopper-core`), `SqlBackend` (relations
//!   registered in a private DataFusion session) and `BytesBackend` (opaque
//!   payloads, Arrow IPC stream for tables).
//!
//! Backends are handed around explicitly as `SharedBackend`; there is no
//! process-wide current backend.

pub mod backend;
pub mod backends;
pub mod frame;
pub mod ipc;
pub mod ir;

#[cfg(test)]
pub(crate) mod testutil;

pub use backend::{build_backend, Backend, BackendTag, SharedBackend};
pub use backends::{BytesBackend, ColumnarBackend, DataframeBackend, SqlBackend, SqlRelation};
pub use ir::{Ir, IrValue};

pub use hopper_core::config::BackendKind;
