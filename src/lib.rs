#![forbid(unsafe_code)]
//! hopper: move tables between files and object stores while the caller picks
//! the in-memory engine that holds them.
//!
//! This crate only re-exports the workspace:
//! - `core`: errors, logical schema, config, ids, run report
//! - `backend`: the `Backend` trait, `Ir`, and the four engines
//! - `fwf`: fixed-width layouts and the single/multi-schema decoders
//! - `io`: locations, storage adapters, sources and targets
//! - `pipeline`: transforms, the pipeline runner, the YAML/JSON form

pub use hopper_backend as backend;
pub use hopper_core as core;
pub use hopper_fwf as fwf;
pub use hopper_io as io;
pub use hopper_pipeline as pipeline;

pub use hopper_backend::{build_backend, Backend, BackendKind, Ir, IrValue, SharedBackend};
pub use hopper_core::error::{Error, Result};
pub use hopper_pipeline::{Pipeline, PipelineDoc, Registry};
