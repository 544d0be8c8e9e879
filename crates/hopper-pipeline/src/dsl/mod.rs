//! Declarative pipeline documents.

pub mod yaml;
