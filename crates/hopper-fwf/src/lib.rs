#![forbid(unsafe_code)]
//! hopper-fwf: fixed-width record decoding.
//!
//! - `ColumnLayout` describes one record shape as `(name, offset, width)`
//!   character ranges.
//! - `SchemaMap` keys several layouts by a discriminator read from a fixed
//!   window of every line.
//! - `FixedWidthDecoder` and `MultiSchemaDecoder` turn text into Arrow
//!   record batches, with a strict/lenient policy for lines that do not fit.

pub mod arena;
pub mod decoder;
pub mod layout;
pub mod options;
pub mod reject;
pub mod schema_map;

pub use decoder::{Decoded, FixedWidthDecoder, MultiDecoded, MultiSchemaDecoder};
pub use layout::{ColumnLayout, ColumnSpec};
pub use options::{DecodeOptions, Discriminator};
pub use reject::{Reject, RejectKind};
pub use schema_map::SchemaMap;
