#![forbid(unsafe_code)]
//! hopper-core: shared vocabulary for the hopper workspace.
//!
//! - `error`: the error taxonomy every crate reports through.
//! - `schema` / `types`: logical schema plus the dataframe engine's native
//!   row/column types. No Arrow here; `hopper-backend` owns that mapping.
//! - `config`: run and storage configuration layered from env, documents
//!   and CLI flags.
//! - `id`, `hash`, `report`: run provenance.

pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod prelude;
pub mod report;
pub mod schema;
pub mod types;

/// Crate version, recorded in run reports.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
