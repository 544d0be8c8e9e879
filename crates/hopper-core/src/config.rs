//! Run and storage configuration that downstream crates can serialize/deserialize.
//!
//! Layering, lowest priority first: `Default` → `RunConfig::from_env` →
//! the `config:` block of a pipeline document → per-connector options → CLI.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Compute engine that holds data between pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Columnar,
    Dataframe,
    Sql,
    Bytes,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Columnar => "columnar",
            BackendKind::Dataframe => "dataframe",
            BackendKind::Sql => "sql",
            BackendKind::Bytes => "bytes",
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "columnar" | "arrow" => Ok(BackendKind::Columnar),
            "dataframe" | "frame" => Ok(BackendKind::Dataframe),
            "sql" | "embedded-sql" | "datafusion" => Ok(BackendKind::Sql),
            "bytes" | "raw" => Ok(BackendKind::Bytes),
            other => Err(Error::config(format!("unknown backend '{other}'"))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a decoder does with a line it cannot place.
///
/// `Strict` (the default) aborts the decode with a typed error on the first
/// offending line. `Lenient` sets the line aside in a reject list and keeps
/// going; the caller inspects the rejects afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    #[default]
    Strict,
    Lenient,
}

impl FromStr for ErrorPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ErrorPolicy::Strict),
            "lenient" => Ok(ErrorPolicy::Lenient),
            other => Err(Error::config(format!("unknown error policy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Backend used when a document or caller names none.
    pub default_backend: BackendKind,

    /// Decoder leniency for fixed-width sources that do not set their own.
    pub error_policy: ErrorPolicy,

    /// Characters trimmed from both ends of every fixed-width field.
    pub strip_chars: String,

    /// Credentials and endpoints shared by every connector of a run.
    pub storage: StorageConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            default_backend: BackendKind::Columnar,
            error_policy: ErrorPolicy::Strict,
            strip_chars: " ".to_string(),
            storage: StorageConfig::default(),
        }
    }
}

impl RunConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `HOPPER_BACKEND`: default backend name
    /// - `HOPPER_ERROR_POLICY`: `strict` or `lenient`
    /// - `HOPPER_STRIP_CHARS`: padding characters for fixed-width fields
    /// - `HOPPER_S3_*`, `HOPPER_HDFS_*`, `HOPPER_RETRY_*`: see `StorageConfig::from_env`
    ///
    /// Unparseable values are reported rather than ignored.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("HOPPER_BACKEND") {
            cfg.default_backend = s.parse()?;
        }

        if let Ok(s) = std::env::var("HOPPER_ERROR_POLICY") {
            cfg.error_policy = s.parse()?;
        }

        if let Ok(s) = std::env::var("HOPPER_STRIP_CHARS") {
            cfg.strip_chars = s;
        }

        cfg.storage = StorageConfig::from_env()?;
        Ok(cfg)
    }
}

/// Storage credentials and knobs. Every field is optional so configs can be
/// overlaid with `merged`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub aws_region: Option<String>,
    /// Custom S3-compatible endpoint, e.g. `http://localhost:9000`.
    pub endpoint_override: Option<String>,
    /// `http` or `https`; `http` permits plaintext connections.
    pub scheme: Option<String>,
    pub allow_bucket_creation: Option<bool>,
    pub allow_bucket_deletion: Option<bool>,

    pub hdfs_host: Option<String>,
    pub hdfs_port: Option<u16>,
    pub hdfs_user: Option<String>,
    pub hdfs_replication: Option<u16>,
    pub hdfs_block_size: Option<u64>,

    /// Retry policy owned by the object-store adapter.
    pub retry_max_retries: Option<usize>,
    pub retry_initial_backoff_ms: Option<u64>,
    pub retry_max_backoff_ms: Option<u64>,
}

macro_rules! overlay {
    ($out:ident, $other:ident; $($field:ident),* $(,)?) => {
        $(
            if $other.$field.is_some() {
                $out.$field = $other.$field.clone();
            }
        )*
    };
}

impl StorageConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.aws_access_key_id = env_string("HOPPER_S3_ACCESS_KEY");
        cfg.aws_secret_access_key = env_string("HOPPER_S3_SECRET_KEY");
        cfg.aws_session_token = env_string("HOPPER_S3_SESSION_TOKEN");
        cfg.aws_region = env_string("HOPPER_S3_REGION");
        cfg.endpoint_override = env_string("HOPPER_S3_ENDPOINT");
        cfg.scheme = env_string("HOPPER_S3_SCHEME");
        cfg.allow_bucket_creation = env_parsed("HOPPER_S3_ALLOW_BUCKET_CREATION")?;
        cfg.allow_bucket_deletion = env_parsed("HOPPER_S3_ALLOW_BUCKET_DELETION")?;
        cfg.hdfs_host = env_string("HOPPER_HDFS_HOST");
        cfg.hdfs_port = env_parsed("HOPPER_HDFS_PORT")?;
        cfg.hdfs_user = env_string("HOPPER_HDFS_USER");
        cfg.hdfs_replication = env_parsed("HOPPER_HDFS_REPLICATION")?;
        cfg.hdfs_block_size = env_parsed("HOPPER_HDFS_BLOCK_SIZE")?;
        cfg.retry_max_retries = env_parsed("HOPPER_RETRY_MAX")?;
        cfg.retry_initial_backoff_ms = env_parsed("HOPPER_RETRY_INITIAL_MS")?;
        cfg.retry_max_backoff_ms = env_parsed("HOPPER_RETRY_MAX_MS")?;
        Ok(cfg)
    }

    /// Overlay every field that `other` sets on top of `self`.
    pub fn merged(&self, other: &StorageConfig) -> StorageConfig {
        let mut out = self.clone();
        overlay!(out, other;
            aws_access_key_id,
            aws_secret_access_key,
            aws_session_token,
            aws_region,
            endpoint_override,
            scheme,
            allow_bucket_creation,
            allow_bucket_deletion,
            hdfs_host,
            hdfs_port,
            hdfs_user,
            hdfs_replication,
            hdfs_block_size,
            retry_max_retries,
            retry_initial_backoff_ms,
            retry_max_backoff_ms,
        );
        out
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parsed<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        None => Ok(None),
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::config(format!("{key}: cannot parse '{s}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse() {
        assert_eq!("arrow".parse::<BackendKind>().unwrap(), BackendKind::Columnar);
        assert_eq!("DataFusion".parse::<BackendKind>().unwrap(), BackendKind::Sql);
        assert!("pandas".parse::<BackendKind>().is_err());
    }

    #[test]
    fn merged_overlays_only_set_fields() {
        let base = StorageConfig {
            aws_region: Some("eu-west-1".into()),
            aws_access_key_id: Some("base-key".into()),
            ..Default::default()
        };
        let doc = StorageConfig {
            aws_access_key_id: Some("doc-key".into()),
            endpoint_override: Some("http://localhost:9000".into()),
            ..Default::default()
        };
        let merged = base.merged(&doc);
        assert_eq!(merged.aws_region.as_deref(), Some("eu-west-1"));
        assert_eq!(merged.aws_access_key_id.as_deref(), Some("doc-key"));
        assert_eq!(
            merged.endpoint_override.as_deref(),
            Some("http://localhost:9000")
        );
    }

    #[test]
    fn run_config_deserializes_partial_documents() {
        let cfg: RunConfig =
            serde_json::from_str(r#"{"default_backend":"sql","error_policy":"lenient"}"#).unwrap();
        assert_eq!(cfg.default_backend, BackendKind::Sql);
        assert_eq!(cfg.error_policy, ErrorPolicy::Lenient);
        assert_eq!(cfg.strip_chars, " ");
    }
}
