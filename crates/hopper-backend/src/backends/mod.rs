//! The four compute engines.

mod columnar;
mod dataframe;
mod raw;
mod sql;

pub use columnar::ColumnarBackend;
pub use dataframe::DataframeBackend;
pub use raw::BytesBackend;
pub use sql::{SqlBackend, SqlRelation, THIS};
