//! Convenient re-exports for downstream crates.

pub use crate::config::{BackendKind, ErrorPolicy, RunConfig, StorageConfig};
pub use crate::error::{Error, Result};
pub use crate::id::{InstanceId, RunId};
pub use crate::report::{RunReport, RunState, StepKind, StepReport};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::types::{Column, DataFrame, Rows, Scalar};
