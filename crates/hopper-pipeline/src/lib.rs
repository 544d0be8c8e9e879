#![forbid(unsafe_code)]
//! hopper-pipeline: load → transform → write, over one backend.
//!
//! - `transforms`: table-to-table steps expressed through the backend's
//!   columnar conversions (plus `SqlQuery` for the SQL backend).
//! - `pipeline`: the builder and its `Built → Running → Completed | Failed`
//!   state machine.
//! - `registry` / `dsl`: type names → constructors, and the YAML/JSON
//!   document that wires a pipeline from them.

pub mod dsl;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod transforms;

pub use dsl::yaml::{ConfigDoc, PipelineDoc, StepDoc};
pub use pipeline::Pipeline;
pub use registry::{Params, Registry};
pub use transforms::{
    CompareOp, DropColumns, DropNulls, FilterRows, RenameColumns, SelectColumns, SharedTransform, SqlQuery,
    Transform,
};
