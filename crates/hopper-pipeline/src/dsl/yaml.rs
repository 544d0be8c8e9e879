//! YAML / JSON → `Pipeline` for single-hop pipelines.
//!
//! Example:
//! ```yaml
//! backend: sql
//! config:
//!   error_policy: lenient
//!   storage: { aws_region: eu-west-1 }
//! source:
//!   type: multi_fixed_width
//!   path: data/feed.txt
//!   schema_map:
//!     HDR: { colspecs: [[0, 8]], colnames: [date] }
//!     DTL: { colspecs: [[0, 6], [6, 10]], colnames: [account, amount], dtypes: [utf8, f64] }
//! transforms:
//!   - { type: drop_nulls }
//! target:
//!   type: parquet
//!   path: out/feed.parquet
//! ```
//!
//! Every step is `{type, ...params}`; the params go to the constructor the
//! `Registry` holds for that type, so unknown types and bad parameters fail
//! here, before anything runs.

use hopper_backend::build_backend;
use hopper_core::config::{BackendKind, ErrorPolicy, RunConfig, StorageConfig};
use hopper_core::error::{Error, Result};
use hopper_io::connectors::IoContext;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use crate::pipeline::Pipeline;
use crate::registry::Registry;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDoc {
    #[serde(default)]
    pub config: Option<ConfigDoc>,
    /// Backend name; the run's default when absent.
    #[serde(default)]
    pub backend: Option<String>,
    pub source: StepDoc,
    #[serde(default)]
    pub transforms: Vec<StepDoc>,
    pub target: StepDoc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDoc {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: Mapping,
}

/// Run-wide settings a document may override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigDoc {
    pub error_policy: Option<ErrorPolicy>,
    pub strip_chars: Option<String>,
    pub storage: Option<StorageConfig>,
}

impl PipelineDoc {
    pub fn from_yaml_str(src: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(src)?)
    }

    pub fn from_json_str(src: &str) -> Result<Self> {
        Ok(serde_json::from_str(src)?)
    }

    /// `base` with this document's `config` laid over it.
    pub fn run_config(&self, base: &RunConfig) -> RunConfig {
        let mut cfg = base.clone();
        if let Some(doc) = &self.config {
            if let Some(policy) = doc.error_policy {
                cfg.error_policy = policy;
            }
            if let Some(strip) = &doc.strip_chars {
                cfg.strip_chars = strip.clone();
            }
            if let Some(storage) = &doc.storage {
                cfg.storage = cfg.storage.merged(storage);
            }
        }
        cfg
    }

    pub fn backend_kind(&self, base: &RunConfig) -> Result<BackendKind> {
        match &self.backend {
            Some(name) => name.parse(),
            None => Ok(base.default_backend),
        }
    }

    /// Construct every step against a fresh backend. Nothing is read yet.
    pub fn build(&self, base: &RunConfig, registry: &Registry) -> Result<Pipeline> {
        let cfg = self.run_config(base);
        let backend = build_backend(self.backend_kind(&cfg)?)?;
        let ctx = IoContext::from_run_config(backend.clone(), &cfg);

        let source = registry
            .build_source(&self.source.kind, self.source.params.clone(), &ctx)
            .map_err(|e| in_step("source", e))?;
        let mut pipeline = Pipeline::new(backend).with_shared_source(source);

        for (i, step) in self.transforms.iter().enumerate() {
            let transform = registry
                .build_transform(&step.kind, step.params.clone())
                .map_err(|e| in_step(&format!("transforms[{i}]"), e))?;
            pipeline = pipeline.with_shared_transform(transform);
        }

        let target = registry
            .build_target(&self.target.kind, self.target.params.clone(), &ctx)
            .map_err(|e| in_step("target", e))?;
        tracing::debug!(
            source = %self.source.kind,
            transforms = self.transforms.len(),
            target = %self.target.kind,
            "pipeline document built"
        );
        Ok(pipeline.with_shared_target(target))
    }
}

/// Prefix configuration errors with the document path of the step.
fn in_step(at: &str, e: Error) -> Error {
    match e {
        Error::Config(msg) => Error::Config(format!("{at}: {msg}")),
        other => other,
    }
}

impl Pipeline {
    /// Build from a YAML document with the environment's run config and the
    /// built-in registry.
    pub fn from_yaml_str(src: &str) -> Result<Pipeline> {
        PipelineDoc::from_yaml_str(src)?.build(&RunConfig::from_env()?, &Registry::builtin())
    }

    pub fn from_json_str(src: &str) -> Result<Pipeline> {
        PipelineDoc::from_json_str(src)?.build(&RunConfig::from_env()?, &Registry::builtin())
    }
}
