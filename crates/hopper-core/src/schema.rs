//! Logical schema types. Pure data; no Arrow dependency here.
//!
//! `hopper-backend` maps these to and from Arrow types; the fixed-width
//! decoder uses `DataType` for optional per-column casts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    Binary,
    /// Days since the Unix epoch.
    Date32,
    /// Microseconds since the Unix epoch, no timezone.
    TimestampMicros,
}

impl DataType {
    /// Parse a user-facing type name. Unknown names are rejected.
    pub fn parse(s: &str) -> Result<Self> {
        let dt = match s.trim() {
            "Boolean" | "boolean" | "bool" => DataType::Boolean,
            "Int32" | "int32" | "i32" => DataType::Int32,
            "Int64" | "int64" | "i64" | "int" | "integer" => DataType::Int64,
            "Float32" | "float32" | "f32" => DataType::Float32,
            "Float64" | "float64" | "f64" | "float" | "double" => DataType::Float64,
            "Utf8" | "utf8" | "str" | "string" => DataType::Utf8,
            "Binary" | "binary" | "bytes" => DataType::Binary,
            "Date32" | "date32" | "date" => DataType::Date32,
            "Timestamp" | "timestamp" | "datetime" => DataType::TimestampMicros,
            other => return Err(Error::config(format!("unknown data type '{other}'"))),
        };
        Ok(dt)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Boolean => "Boolean",
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
            DataType::Utf8 => "Utf8",
            DataType::Binary => "Binary",
            DataType::Date32 => "Date32",
            DataType::TimestampMicros => "TimestampMicros",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!(DataType::parse("int").unwrap(), DataType::Int64);
        assert_eq!(DataType::parse("Float64").unwrap(), DataType::Float64);
        assert_eq!(DataType::parse(" string ").unwrap(), DataType::Utf8);
        assert_eq!(DataType::parse("date").unwrap(), DataType::Date32);
    }

    #[test]
    fn parse_rejects_unknown_names() {
        let err = DataType::parse("decimal(10,2)").unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn index_of_finds_fields() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("b", DataType::Utf8, true),
        ]);
        assert_eq!(schema.index_of("b"), Some(1));
        assert_eq!(schema.index_of("c"), None);
        assert_eq!(schema.names(), vec!["a", "b"]);
    }
}
