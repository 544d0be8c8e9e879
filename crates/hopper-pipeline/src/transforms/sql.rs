use hopper_backend::{Backend, Ir};
use hopper_core::error::{Error, Result};

use super::Transform;

/// Run a SQL statement over the incoming table, which the query addresses
/// as `this`. Stays lazy: the result is a new relation handle.
#[derive(Debug, Clone)]
pub struct SqlQuery {
    sql: String,
}

impl SqlQuery {
    pub fn new(sql: impl Into<String>) -> Result<Self> {
        let sql = sql.into();
        if sql.trim().is_empty() {
            return Err(Error::config("sql transform needs a query"));
        }
        Ok(Self { sql })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl Transform for SqlQuery {
    fn name(&self) -> &str {
        "SqlQuery"
    }

    fn apply(&self, backend: &dyn Backend, ir: Ir) -> Result<Ir> {
        let sql = backend.as_sql().ok_or_else(|| {
            Error::conversion(
                ir.kind_name(),
                "sql relation",
                format!("SqlQuery needs the sql backend, pipeline runs on {}", backend.kind()),
            )
        })?;
        sql.query(&ir, &self.sql)
    }
}
