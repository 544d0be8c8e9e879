//! hopper CLI: run, validate and explain pipeline documents.

use clap::{Parser, Subcommand};
use hopper_core::config::{BackendKind, ErrorPolicy, RunConfig, StorageConfig};
use hopper_pipeline::{Pipeline, PipelineDoc, Registry};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hopper")]
#[command(about = "hopper: move tables between files and object stores over a pluggable engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline document (YAML, or JSON for *.json)
    Run {
        /// Path to the pipeline document
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Backend holding the data (overrides the document)
        #[arg(long)]
        backend: Option<BackendKind>,

        /// Set malformed fixed-width lines aside instead of failing
        #[arg(long)]
        lenient: bool,

        /// S3-compatible endpoint URL
        #[arg(long)]
        s3_endpoint: Option<String>,

        /// AWS region for S3 locations
        #[arg(long)]
        s3_region: Option<String>,

        /// AWS access key id for S3 locations
        #[arg(long)]
        s3_access_key: Option<String>,

        /// AWS secret access key for S3 locations
        #[arg(long)]
        s3_secret_key: Option<String>,
    },

    /// Parse a pipeline document and construct every step
    Validate {
        #[arg(short, long)]
        pipeline: PathBuf,
    },

    /// Show what a pipeline document would run
    Explain {
        #[arg(short, long)]
        pipeline: PathBuf,
    },
}

/// Flags that take precedence over the document and the environment.
#[derive(Debug, Default)]
struct Overrides {
    backend: Option<BackendKind>,
    lenient: bool,
    storage: StorageConfig,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            pipeline,
            backend,
            lenient,
            s3_endpoint,
            s3_region,
            s3_access_key,
            s3_secret_key,
        } => {
            let overrides = Overrides {
                backend,
                lenient,
                storage: StorageConfig {
                    endpoint_override: s3_endpoint,
                    aws_region: s3_region,
                    aws_access_key_id: s3_access_key,
                    aws_secret_access_key: s3_secret_key,
                    ..Default::default()
                },
            };
            if let Err(e) = run_pipeline(&pipeline, &overrides) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate { pipeline } => {
            if let Err(e) = build_pipeline(&pipeline, &Overrides::default()) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Pipeline is valid");
        }
        Commands::Explain { pipeline } => match build_pipeline(&pipeline, &Overrides::default()) {
            Ok(p) => {
                println!("Pipeline");
                println!("========");
                print!("{}", p.explain());
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn read_doc(path: &Path) -> Result<PipelineDoc, Box<dyn std::error::Error>> {
    let src = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    let doc = if is_json {
        PipelineDoc::from_json_str(&src)?
    } else {
        PipelineDoc::from_yaml_str(&src)?
    };
    Ok(doc)
}

fn build_pipeline(path: &Path, overrides: &Overrides) -> Result<Pipeline, Box<dyn std::error::Error>> {
    let mut doc = read_doc(path)?;
    let cfg = effective_config(&mut doc, RunConfig::from_env()?, overrides);
    Ok(doc.build(&cfg, &Registry::builtin())?)
}

/// Environment, then the document's `config`, then the command line.
///
/// The document's config is folded into the returned `RunConfig` and cleared,
/// so building with it does not lay the document over the flags again.
fn effective_config(doc: &mut PipelineDoc, env: RunConfig, overrides: &Overrides) -> RunConfig {
    let mut cfg = doc.run_config(&env);
    doc.config = None;
    apply_overrides(&mut cfg, doc, overrides);
    cfg
}

fn apply_overrides(cfg: &mut RunConfig, doc: &mut PipelineDoc, overrides: &Overrides) {
    if let Some(kind) = overrides.backend {
        doc.backend = Some(kind.name().to_string());
    }
    if overrides.lenient {
        cfg.error_policy = ErrorPolicy::Lenient;
    }
    cfg.storage = cfg.storage.merged(&overrides.storage);
}

fn run_pipeline(path: &Path, overrides: &Overrides) -> Result<(), Box<dyn std::error::Error>> {
    let mut pipeline = build_pipeline(path, overrides)?;
    tracing::info!(pipeline = %path.display(), backend = %pipeline.backend().tag(), "starting run");
    let report = pipeline.run()?;

    println!("✓ Pipeline executed successfully");
    println!("  Run: {}", report.id);
    println!("  Backend: {}", report.backend);
    for step in &report.steps {
        match step.rows {
            Some(rows) => println!("  {:?} {} ({} rows, {}ms)", step.kind, step.step, rows, step.millis),
            None => println!("  {:?} {} ({}ms)", step.kind, step.step, step.millis),
        }
    }
    if !report.rejects.is_empty() {
        println!("  Rejected lines: {}", report.rejects.len());
        for reject in &report.rejects {
            println!("    line {}: {} | {}", reject.line, reject.reason, reject.raw);
        }
    }
    println!("  Duration: {}ms", report.duration_ms());
    println!("  Pipeline hash: {}", report.pipeline_hash);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
backend: columnar
config:
  error_policy: strict
  storage: { aws_region: us-east-1, endpoint_override: "http://minio:9000" }
source: { type: csv, path: /in.csv }
target: { type: csv, path: /out.csv }
"#;

    #[test]
    fn document_config_overrides_env_defaults() {
        let mut doc = PipelineDoc::from_yaml_str(DOC).unwrap();
        let env = RunConfig {
            error_policy: ErrorPolicy::Lenient,
            ..RunConfig::default()
        };
        let cfg = effective_config(&mut doc, env, &Overrides::default());
        assert_eq!(cfg.error_policy, ErrorPolicy::Strict);
        assert_eq!(cfg.storage.aws_region.as_deref(), Some("us-east-1"));
        assert!(doc.config.is_none());
    }

    #[test]
    fn flags_win_over_the_document() {
        let mut doc = PipelineDoc::from_yaml_str(DOC).unwrap();
        let overrides = Overrides {
            backend: Some(BackendKind::Sql),
            lenient: true,
            storage: StorageConfig {
                aws_region: Some("eu-north-1".into()),
                ..Default::default()
            },
        };
        let cfg = effective_config(&mut doc, RunConfig::default(), &overrides);
        assert_eq!(cfg.error_policy, ErrorPolicy::Lenient);
        assert_eq!(cfg.storage.aws_region.as_deref(), Some("eu-north-1"));
        assert_eq!(cfg.storage.endpoint_override.as_deref(), Some("http://minio:9000"));
        assert_eq!(doc.backend.as_deref(), Some("sql"));

        let p = doc.build(&cfg, &Registry::builtin()).unwrap();
        assert_eq!(p.backend().kind(), BackendKind::Sql);
    }

    #[test]
    fn json_documents_are_picked_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        fs::write(
            &path,
            r#"{"source": {"type": "csv", "path": "/in.csv"}, "target": {"type": "jsonl", "path": "/out.jsonl"}}"#,
        )
        .unwrap();
        let doc = read_doc(&path).unwrap();
        assert_eq!(doc.target.kind, "jsonl");
    }
}
