use std::collections::HashSet;
use std::sync::Arc;

use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use hopper_backend::{Backend, Ir};
use hopper_core::error::{Error, Result};

use super::{arrow_error, column_index, shape, via_columnar, Transform};

/// Remove the named columns. Every name must exist.
#[derive(Debug, Clone)]
pub struct DropColumns {
    name: String,
    columns: Vec<String>,
}

impl DropColumns {
    pub fn new(columns: Vec<String>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::config("drop_columns needs at least one column"));
        }
        Ok(Self {
            name: format!("DropColumns({})", columns.join(", ")),
            columns,
        })
    }
}

impl Transform for DropColumns {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, backend: &dyn Backend, ir: Ir) -> Result<Ir> {
        via_columnar(backend, ir, |batch| {
            let schema = batch.schema();
            let mut dropped = HashSet::new();
            for col in &self.columns {
                dropped.insert(column_index(&schema, &self.name, col)?);
            }
            let keep: Vec<usize> = (0..schema.fields().len())
                .filter(|i| !dropped.contains(i))
                .collect();
            batch.project(&keep).map_err(|e| arrow_error(&self.name, e))
        })
    }
}

/// Keep only the named columns, in the order given.
#[derive(Debug, Clone)]
pub struct SelectColumns {
    name: String,
    columns: Vec<String>,
}

impl SelectColumns {
    pub fn new(columns: Vec<String>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::config("select_columns needs at least one column"));
        }
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.as_str()) {
                return Err(Error::config(format!("select_columns lists '{col}' twice")));
            }
        }
        Ok(Self {
            name: format!("SelectColumns({})", columns.join(", ")),
            columns,
        })
    }
}

impl Transform for SelectColumns {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, backend: &dyn Backend, ir: Ir) -> Result<Ir> {
        via_columnar(backend, ir, |batch| {
            let schema = batch.schema();
            let indices = self
                .columns
                .iter()
                .map(|c| column_index(&schema, &self.name, c))
                .collect::<Result<Vec<_>>>()?;
            batch.project(&indices).map_err(|e| arrow_error(&self.name, e))
        })
    }
}

/// Rename columns by `(from, to)` pairs. Data and order are untouched.
#[derive(Debug, Clone)]
pub struct RenameColumns {
    name: String,
    renames: Vec<(String, String)>,
}

impl RenameColumns {
    pub fn new(renames: Vec<(String, String)>) -> Result<Self> {
        if renames.is_empty() {
            return Err(Error::config("rename_columns needs at least one mapping"));
        }
        let name = format!(
            "RenameColumns({})",
            renames
                .iter()
                .map(|(from, to)| format!("{from} -> {to}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self { name, renames })
    }
}

impl Transform for RenameColumns {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, backend: &dyn Backend, ir: Ir) -> Result<Ir> {
        via_columnar(backend, ir, |batch| {
            let schema = batch.schema();
            let mut names: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
            for (from, to) in &self.renames {
                let idx = column_index(&schema, &self.name, from)?;
                names[idx] = to.clone();
            }
            let mut seen = HashSet::new();
            for n in &names {
                if !seen.insert(n.as_str()) {
                    return Err(Error::conversion(
                        shape(&schema),
                        &self.name,
                        format!("column '{n}' would appear twice"),
                    ));
                }
            }
            let fields: Vec<Field> = schema
                .fields()
                .iter()
                .zip(names)
                .map(|(f, n)| f.as_ref().clone().with_name(n))
                .collect();
            let renamed = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
            RecordBatch::try_new(renamed, batch.columns().to_vec()).map_err(|e| arrow_error(&self.name, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::testutil::people;
    use hopper_backend::{build_backend, BackendKind};

    fn names(batch: &RecordBatch) -> Vec<String> {
        batch.schema().fields().iter().map(|f| f.name().clone()).collect()
    }

    #[test]
    fn drop_and_select() {
        let backend = build_backend(BackendKind::Columnar).unwrap();
        let ir = backend.from_columnar(people()).unwrap();

        let dropped = DropColumns::new(vec!["score".into()])
            .unwrap()
            .apply(backend.as_ref(), ir)
            .unwrap();
        assert_eq!(names(&backend.to_columnar(&dropped).unwrap()), vec!["id", "name"]);

        let selected = SelectColumns::new(vec!["name".into(), "id".into()])
            .unwrap()
            .apply(backend.as_ref(), dropped)
            .unwrap();
        assert_eq!(names(&backend.to_columnar(&selected).unwrap()), vec!["name", "id"]);
    }

    #[test]
    fn unknown_column_is_reported() {
        let backend = build_backend(BackendKind::Columnar).unwrap();
        let ir = backend.from_columnar(people()).unwrap();
        let err = DropColumns::new(vec!["nope".into()])
            .unwrap()
            .apply(backend.as_ref(), ir)
            .unwrap_err();
        assert!(err.to_string().contains("no column 'nope'"));
        assert!(!err.is_config());
        assert!(err.to_string().contains("table [id, name, score]"), "{err}");
    }

    #[test]
    fn rename_keeps_data_and_works_under_the_dataframe_backend() {
        let backend = build_backend(BackendKind::Dataframe).unwrap();
        let ir = backend.from_columnar(people()).unwrap();
        let renamed = RenameColumns::new(vec![("name".into(), "who".into())])
            .unwrap()
            .apply(backend.as_ref(), ir)
            .unwrap();
        let df = backend.to_dataframe(&renamed).unwrap();
        assert!(df.column("who").is_some());
        assert!(df.column("name").is_none());
        assert_eq!(df.num_rows(), 4);
    }

    #[test]
    fn rename_onto_existing_name_fails() {
        let backend = build_backend(BackendKind::Columnar).unwrap();
        let ir = backend.from_columnar(people()).unwrap();
        assert!(RenameColumns::new(vec![("name".into(), "id".into())])
            .unwrap()
            .apply(backend.as_ref(), ir)
            .is_err());
    }

    #[test]
    fn empty_lists_are_config_errors() {
        assert!(DropColumns::new(vec![]).unwrap_err().is_config());
        assert!(SelectColumns::new(vec!["a".into(), "a".into()]).unwrap_err().is_config());
    }
}
