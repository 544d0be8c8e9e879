//! Row filters: `column OP literal` and null dropping.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Scalar, StringArray};
use arrow::compute::kernels::cmp;
use arrow::compute::{and, cast, filter_record_batch, is_not_null};
use hopper_backend::{Backend, Ir};
use hopper_core::error::{Error, Result};

use super::{arrow_error, column_index, via_columnar, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// Two-character operators first so `<=` is not read as `<`.
    const ALL: [(&'static str, CompareOp); 6] = [
        ("==", CompareOp::Eq),
        ("!=", CompareOp::NotEq),
        ("<=", CompareOp::LtEq),
        (">=", CompareOp::GtEq),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

impl FromStr for CompareOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .iter()
            .find(|(sym, _)| *sym == s)
            .map(|(_, op)| *op)
            .ok_or_else(|| Error::config(format!("unknown comparison operator '{s}'")))
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Keep rows where `column OP literal` holds. Nulls never match.
///
/// The literal is cast to the column's type once per apply; a literal that
/// does not parse as that type fails the run with a conversion error.
#[derive(Debug, Clone)]
pub struct FilterRows {
    name: String,
    column: String,
    op: CompareOp,
    literal: String,
}

impl FilterRows {
    pub fn new(column: impl Into<String>, op: CompareOp, literal: impl Into<String>) -> Result<Self> {
        let column = column.into();
        if column.is_empty() {
            return Err(Error::config("filter needs a column"));
        }
        let literal = literal.into();
        Ok(Self {
            name: format!("FilterRows({column} {op} {literal})"),
            column,
            op,
            literal,
        })
    }

    /// Parse `"age > 18"` or `"name == 'Alice'"`. Splits at the leftmost
    /// operator, so operator characters inside the literal are kept.
    pub fn parse(expr: &str) -> Result<Self> {
        let found = CompareOp::ALL
            .iter()
            .filter_map(|&(sym, op)| expr.find(sym).map(|pos| (pos, sym, op)))
            .min_by(|a, b| a.0.cmp(&b.0).then(b.1.len().cmp(&a.1.len())));
        match found {
            Some((pos, sym, op)) => {
                let col = expr[..pos].trim();
                let lit = unquote(expr[pos + sym.len()..].trim());
                Self::new(col, op, lit)
            }
            None => Err(Error::config(format!("unparseable predicate: {expr}"))),
        }
    }

    fn literal_for(&self, column: &ArrayRef) -> Result<Scalar<ArrayRef>> {
        let text: ArrayRef = Arc::new(StringArray::from(vec![self.literal.as_str()]));
        let typed = cast(&text, column.data_type()).map_err(|e| arrow_error(&self.name, e))?;
        if typed.is_null(0) {
            return Err(Error::conversion(
                format!("literal '{}'", self.literal),
                &self.name,
                format!("not a valid {}", column.data_type()),
            ));
        }
        Ok(Scalar::new(typed))
    }
}

fn unquote(s: &str) -> &str {
    for q in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

impl Transform for FilterRows {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, backend: &dyn Backend, ir: Ir) -> Result<Ir> {
        via_columnar(backend, ir, |batch| {
            let idx = column_index(&batch.schema(), &self.name, &self.column)?;
            let column = batch.column(idx);
            let literal = self.literal_for(column)?;
            let mask = match self.op {
                CompareOp::Eq => cmp::eq(column, &literal),
                CompareOp::NotEq => cmp::neq(column, &literal),
                CompareOp::Lt => cmp::lt(column, &literal),
                CompareOp::LtEq => cmp::lt_eq(column, &literal),
                CompareOp::Gt => cmp::gt(column, &literal),
                CompareOp::GtEq => cmp::gt_eq(column, &literal),
            }
            .map_err(|e| arrow_error(&self.name, e))?;
            filter_record_batch(&batch, &mask).map_err(|e| arrow_error(&self.name, e))
        })
    }
}

/// Drop rows holding a null in any of the given columns (all columns when
/// none are named).
#[derive(Debug, Clone)]
pub struct DropNulls {
    name: String,
    columns: Option<Vec<String>>,
}

impl DropNulls {
    pub fn new(columns: Option<Vec<String>>) -> Self {
        let name = match &columns {
            Some(cols) => format!("DropNulls({})", cols.join(", ")),
            None => "DropNulls(*)".to_string(),
        };
        Self { name, columns }
    }
}

impl Transform for DropNulls {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, backend: &dyn Backend, ir: Ir) -> Result<Ir> {
        via_columnar(backend, ir, |batch| {
            let schema = batch.schema();
            let indices = match &self.columns {
                Some(cols) => cols
                    .iter()
                    .map(|c| column_index(&schema, &self.name, c))
                    .collect::<Result<Vec<_>>>()?,
                None => (0..batch.num_columns()).collect(),
            };

            let mut mask: Option<BooleanArray> = None;
            for i in indices {
                let col = batch.column(i);
                if col.null_count() == 0 {
                    continue;
                }
                let present = is_not_null(col.as_ref()).map_err(|e| arrow_error(&self.name, e))?;
                mask = Some(match mask {
                    Some(m) => and(&m, &present).map_err(|e| arrow_error(&self.name, e))?,
                    None => present,
                });
            }
            match mask {
                Some(m) => filter_record_batch(&batch, &m).map_err(|e| arrow_error(&self.name, e)),
                None => Ok(batch),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::testutil::people;
    use arrow::array::Int64Array;
    use hopper_backend::{build_backend, BackendKind};

    fn ids(backend: &dyn Backend, ir: &Ir) -> Vec<i64> {
        let batch = backend.to_columnar(ir).unwrap();
        batch
            .column_by_name("id")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .values()
            .to_vec()
    }

    #[test]
    fn parses_simple_predicates() {
        let f = FilterRows::parse("score >= 7").unwrap();
        assert_eq!(f.column, "score");
        assert_eq!(f.op, CompareOp::GtEq);
        assert_eq!(f.literal, "7");

        let f = FilterRows::parse("name == 'ann'").unwrap();
        assert_eq!(f.op, CompareOp::Eq);
        assert_eq!(f.literal, "ann");

        assert!(FilterRows::parse("score ~ 3").unwrap_err().is_config());
    }

    #[test]
    fn operators_inside_the_literal_are_kept() {
        let f = FilterRows::parse("tag != 'a==b'").unwrap();
        assert_eq!(f.column, "tag");
        assert_eq!(f.op, CompareOp::NotEq);
        assert_eq!(f.literal, "a==b");

        let f = FilterRows::parse("note == '<x>'").unwrap();
        assert_eq!(f.op, CompareOp::Eq);
        assert_eq!(f.literal, "<x>");

        let f = FilterRows::parse("n <= 3").unwrap();
        assert_eq!(f.op, CompareOp::LtEq);
        assert_eq!(f.literal, "3");
    }

    #[test]
    fn numeric_and_string_comparisons() {
        let backend = build_backend(BackendKind::Columnar).unwrap();
        let b = backend.as_ref();

        let out = FilterRows::parse("score > 5")
            .unwrap()
            .apply(b, b.from_columnar(people()).unwrap())
            .unwrap();
        assert_eq!(ids(b, &out), vec![1, 2]);

        let out = FilterRows::parse("name != ann")
            .unwrap()
            .apply(b, b.from_columnar(people()).unwrap())
            .unwrap();
        assert_eq!(ids(b, &out), vec![3, 4]);

        let out = FilterRows::new("id", CompareOp::LtEq, "2")
            .unwrap()
            .apply(b, b.from_columnar(people()).unwrap())
            .unwrap();
        assert_eq!(ids(b, &out), vec![1, 2]);
    }

    #[test]
    fn literal_of_the_wrong_type_is_rejected() {
        let backend = build_backend(BackendKind::Columnar).unwrap();
        let b = backend.as_ref();
        let err = FilterRows::parse("id == abc")
            .unwrap()
            .apply(b, b.from_columnar(people()).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }), "{err}");
        assert!(err.to_string().contains("literal 'abc'"), "{err}");
    }

    #[test]
    fn drop_nulls_everywhere_or_in_named_columns() {
        let backend = build_backend(BackendKind::Columnar).unwrap();
        let b = backend.as_ref();

        let out = DropNulls::new(None)
            .apply(b, b.from_columnar(people()).unwrap())
            .unwrap();
        assert_eq!(ids(b, &out), vec![1, 4]);

        let out = DropNulls::new(Some(vec!["name".into()]))
            .apply(b, b.from_columnar(people()).unwrap())
            .unwrap();
        assert_eq!(ids(b, &out), vec![1, 3, 4]);
    }

    #[test]
    fn filters_run_under_the_sql_backend() {
        let backend = build_backend(BackendKind::Sql).unwrap();
        let b = backend.as_ref();
        let out = FilterRows::parse("id > 2")
            .unwrap()
            .apply(b, b.from_columnar(people()).unwrap())
            .unwrap();
        assert_eq!(ids(b, &out), vec![3, 4]);
    }
}
