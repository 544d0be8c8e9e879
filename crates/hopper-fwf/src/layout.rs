//! Column layouts: named character ranges within a record.

use std::collections::HashSet;

use hopper_core::error::{Error, Result};
use hopper_core::schema::DataType;
use serde::{Deserialize, Serialize};

/// One field of a fixed-width record: `width` characters starting at
/// `offset`, optionally cast to `dtype` after stripping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub offset: usize,
    pub width: usize,
    pub dtype: Option<DataType>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, offset: usize, width: usize) -> Self {
        Self {
            name: name.into(),
            offset,
            width,
            dtype: None,
        }
    }

    pub fn with_dtype(mut self, dtype: DataType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    /// One past the last character. Saturates; `ColumnLayout::new` rejects
    /// columns whose end does not fit.
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.width)
    }
}

/// Validated, ordered list of columns. Output column order is layout order.
///
/// Ranges may overlap and need not cover the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: Vec<ColumnSpec>,
    required: usize,
}

impl ColumnLayout {
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self> {
        let mut seen = HashSet::new();
        for col in &columns {
            if col.name.is_empty() {
                return Err(Error::config("fixed-width column with empty name"));
            }
            if !seen.insert(col.name.as_str()) {
                return Err(Error::config(format!(
                    "duplicate fixed-width column '{}'",
                    col.name
                )));
            }
            if col.offset.checked_add(col.width).is_none() {
                return Err(Error::config(format!(
                    "fixed-width column '{}' ends past the addressable range",
                    col.name
                )));
            }
        }
        let required = columns.iter().map(ColumnSpec::end).max().unwrap_or(0);
        Ok(Self { columns, required })
    }

    /// Build from parallel `(offset, width)` pairs and names.
    pub fn from_parts(
        colspecs: &[(usize, usize)],
        colnames: &[String],
        dtypes: Option<&[DataType]>,
    ) -> Result<Self> {
        if colspecs.len() != colnames.len() {
            return Err(Error::config(format!(
                "{} colspecs but {} colnames",
                colspecs.len(),
                colnames.len()
            )));
        }
        if let Some(dtypes) = dtypes {
            if dtypes.len() != colnames.len() {
                return Err(Error::config(format!(
                    "{} dtypes but {} colnames",
                    dtypes.len(),
                    colnames.len()
                )));
            }
        }
        let columns = colspecs
            .iter()
            .zip(colnames)
            .enumerate()
            .map(|(i, (&(offset, width), name))| ColumnSpec {
                name: name.clone(),
                offset,
                width,
                dtype: dtypes.map(|d| d[i]),
            })
            .collect();
        Self::new(columns)
    }

    /// Parse `{"columns":[{"name","offset","length","dtype"?}]}`.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let raw: LayoutDoc = serde_json::from_str(s)?;
        raw.try_into()
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Minimum record length, in characters, that covers every column.
    pub fn required_width(&self) -> usize {
        self.required
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutDoc {
    pub columns: Vec<ColumnDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDoc {
    pub name: String,
    pub offset: usize,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
}

impl TryFrom<LayoutDoc> for ColumnLayout {
    type Error = Error;

    fn try_from(doc: LayoutDoc) -> Result<Self> {
        let columns = doc
            .columns
            .into_iter()
            .map(|c| {
                if c.length == 0 {
                    return Err(Error::config(format!(
                        "fixed-width column '{}' has zero length",
                        c.name
                    )));
                }
                let dtype = c.dtype.as_deref().map(DataType::parse).transpose()?;
                Ok(ColumnSpec {
                    name: c.name,
                    offset: c.offset,
                    width: c.length,
                    dtype,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        ColumnLayout::new(columns)
    }
}

impl From<&ColumnLayout> for LayoutDoc {
    fn from(layout: &ColumnLayout) -> Self {
        LayoutDoc {
            columns: layout
                .columns
                .iter()
                .map(|c| ColumnDoc {
                    name: c.name.clone(),
                    offset: c.offset,
                    length: c.width,
                    dtype: c.dtype.map(|d| d.name().to_string()),
                })
                .collect(),
        }
    }
}
