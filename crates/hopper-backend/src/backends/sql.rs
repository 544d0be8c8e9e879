//! Embedded SQL engine backed by a private DataFusion session.
//!
//! Record batches are registered as in-memory relations, not copied; the IR
//! is a handle naming the relation. Work is deferred until `to_columnar`.
//! The async engine lives behind a dedicated tokio runtime and is driven
//! with `block_on`, so callers stay synchronous.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use datafusion::catalog::TableProvider;
use datafusion::datasource::MemTable;
use datafusion::error::DataFusionError;
use datafusion::prelude::SessionContext;
use hopper_core::config::BackendKind;
use hopper_core::error::{Error, Result};
use hopper_core::id::InstanceId;
use tokio::runtime::Runtime;

use crate::backend::{Backend, BackendTag};
use crate::ir::{Ir, IrValue};

/// Name under which `SqlBackend::query` exposes its input relation.
pub const THIS: &str = "this";

struct SqlEngine {
    id: InstanceId,
    runtime: Runtime,
    ctx: SessionContext,
    relations: Mutex<BTreeSet<String>>,
    /// Serialises `query`, which temporarily binds `THIS`.
    query_lock: Mutex<()>,
}

impl fmt::Debug for SqlEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlEngine")
            .field("id", &self.id)
            .field("relations", &self.relations.lock().map(|r| r.len()).ok())
            .finish()
    }
}

impl SqlEngine {
    fn relations(&self) -> MutexGuard<'_, BTreeSet<String>> {
        // A poisoned set is still a valid set.
        self.relations.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(
        self: &Arc<Self>,
        provider: Arc<dyn TableProvider>,
        rows: Option<usize>,
    ) -> Result<SqlRelation> {
        let name = format!("rel_{}", InstanceId::random().simple());
        let schema = provider.schema();
        self.ctx
            .register_table(name.as_str(), provider)
            .map_err(|e| sql_error("register", e))?;
        self.relations().insert(name.clone());
        tracing::debug!(relation = %name, engine = %self.id.simple(), "relation registered");
        Ok(SqlRelation {
            guard: Arc::new(RelationGuard {
                engine: Arc::clone(self),
                name,
            }),
            schema,
            rows,
        })
    }
}

/// Deregisters its relation when the last handle goes away.
struct RelationGuard {
    engine: Arc<SqlEngine>,
    name: String,
}

impl Drop for RelationGuard {
    fn drop(&mut self) {
        if let Err(e) = self.engine.ctx.deregister_table(self.name.as_str()) {
            tracing::warn!(relation = %self.name, error = %e, "failed to deregister relation");
        }
        self.engine.relations().remove(&self.name);
    }
}

/// Handle to a relation registered in one `SqlBackend`'s session.
///
/// Holds the engine alive, so a relation never outlives its connection.
#[derive(Clone)]
pub struct SqlRelation {
    guard: Arc<RelationGuard>,
    schema: SchemaRef,
    rows: Option<usize>,
}

impl SqlRelation {
    pub fn name(&self) -> &str {
        &self.guard.name
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Row count for registered batches; `None` for unevaluated queries.
    pub fn known_rows(&self) -> Option<usize> {
        self.rows
    }
}

impl fmt::Debug for SqlRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlRelation")
            .field("name", &self.guard.name)
            .field("columns", &self.schema.fields().len())
            .field("rows", &self.rows)
            .finish()
    }
}

/// Embedded SQL backend. Each instance owns its own session; two instances
/// never see each other's relations.
#[derive(Debug, Clone)]
pub struct SqlBackend {
    engine: Arc<SqlEngine>,
}

impl SqlBackend {
    pub fn new() -> Result<Self> {
        let runtime = Runtime::new()
            .map_err(|e| Error::config(format!("cannot start sql runtime: {e}")))?;
        Ok(Self {
            engine: Arc::new(SqlEngine {
                id: InstanceId::random(),
                runtime,
                ctx: SessionContext::new(),
                relations: Mutex::new(BTreeSet::new()),
                query_lock: Mutex::new(()),
            }),
        })
    }

    /// Names of the relations currently registered in this session.
    pub fn relation_names(&self) -> Vec<String> {
        self.engine.relations().iter().cloned().collect()
    }

    fn relation<'a>(&self, ir: &'a Ir) -> Result<&'a SqlRelation> {
        self.check_origin(ir)?;
        match ir.value() {
            IrValue::SqlHandle(rel) => Ok(rel),
            _ => Err(Error::conversion(ir.kind_name(), "sql relation", "unexpected payload")),
        }
    }

    /// Run `sql` over the relation held by `ir`, addressable as `this`.
    ///
    /// The result is registered as a view; nothing executes until it is
    /// materialised with `to_columnar`.
    pub fn query(&self, ir: &Ir, sql: &str) -> Result<Ir> {
        let input = self.relation(ir)?;
        let engine = &self.engine;
        let _held = engine.query_lock.lock().unwrap_or_else(|e| e.into_inner());

        let provider = engine
            .runtime
            .block_on(engine.ctx.table_provider(input.name()))
            .map_err(|e| sql_error("resolve", e))?;
        engine
            .ctx
            .register_table(THIS, provider)
            .map_err(|e| sql_error("register", e))?;

        let planned = engine.runtime.block_on(engine.ctx.sql(sql));

        if let Err(e) = engine.ctx.deregister_table(THIS) {
            tracing::warn!(error = %e, "failed to release query input");
        }

        let view = planned.map_err(|e| sql_error("plan", e))?.into_view();
        let rel = engine.register(view, None)?;
        tracing::debug!(input = %input.name(), output = %rel.name(), "sql query planned");
        Ok(Ir::new(self.tag(), IrValue::SqlHandle(rel)))
    }
}

impl Backend for SqlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sql
    }

    fn tag(&self) -> BackendTag {
        BackendTag {
            kind: BackendKind::Sql,
            instance: self.engine.id,
        }
    }

    fn as_sql(&self) -> Option<&SqlBackend> {
        Some(self)
    }

    fn from_columnar(&self, batch: RecordBatch) -> Result<Ir> {
        let rows = batch.num_rows();
        let table = MemTable::try_new(batch.schema(), vec![vec![batch]])
            .map_err(|e| sql_error("register", e))?;
        let rel = self.engine.register(Arc::new(table), Some(rows))?;
        Ok(Ir::new(self.tag(), IrValue::SqlHandle(rel)))
    }

    fn to_columnar(&self, ir: &Ir) -> Result<RecordBatch> {
        let rel = self.relation(ir)?;
        let engine = &self.engine;
        let sql = format!("SELECT * FROM \"{}\"", rel.name());
        let df = engine
            .runtime
            .block_on(engine.ctx.sql(&sql))
            .map_err(|e| sql_error("materialise", e))?;
        let batches = engine
            .runtime
            .block_on(df.collect())
            .map_err(|e| sql_error("materialise", e))?;
        concat_batches(&rel.schema, &batches)
            .map_err(|e| Error::conversion("sql relation", "columnar table", e.to_string()))
    }

    fn is_lazy(&self) -> bool {
        true
    }
}

fn sql_error(stage: &str, e: DataFusionError) -> Error {
    Error::conversion("sql relation", "sql relation", format!("{stage}: {e}"))
}
