//! Storage adapters behind connectors.
//!
//! - `fs`: local filesystem.
//! - `memory`: process-local named stores for `memory://` (tests, demos).
//! - `cloud`: S3 via `object_store` (feature `s3`).
//! - `webhdfs`: HDFS through the namenode's REST gateway (feature `hdfs`).
//!
//! `build_storage` picks the adapter for a resolved `Location` at connector
//! construction, so unsupported schemes and bad options fail before any run.

mod fs;
mod memory;
pub use fs::FsStorage;
pub use memory::MemoryStorage;

#[cfg(feature = "s3")]
mod cloud;
#[cfg(feature = "s3")]
pub use cloud::{CloudStorageBuilderError, S3Storage};

#[cfg(feature = "hdfs")]
mod webhdfs;
#[cfg(feature = "hdfs")]
pub use webhdfs::WebHdfsStorage;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hopper_core::config::StorageConfig;
use hopper_core::error::{Error, Result};

use crate::error::StorageResult;
use crate::location::Location;

/// Byte-level access to one family of locations.
pub trait Storage: fmt::Debug + Send + Sync {
    fn read_all(&self, loc: &Location) -> StorageResult<Bytes>;

    fn read_range(&self, loc: &Location, offset: u64, len: usize) -> StorageResult<Bytes>;

    /// Create or replace.
    fn write(&self, loc: &Location, bytes: Bytes) -> StorageResult<()>;

    /// Missing objects are not an error.
    fn delete(&self, loc: &Location) -> StorageResult<()>;

    /// Every object below `prefix`, sorted.
    fn list(&self, prefix: &Location) -> StorageResult<Vec<Location>>;

    fn size(&self, loc: &Location) -> StorageResult<u64>;

    fn exists(&self, loc: &Location) -> StorageResult<bool> {
        match self.size(loc) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

pub type SharedStorage = Arc<dyn Storage>;

/// Retry/backoff configuration owned by the object-store adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    pub fn from_storage_config(cfg: &StorageConfig) -> Self {
        let default = Self::default();
        Self {
            max_retries: cfg.retry_max_retries.unwrap_or(default.max_retries),
            initial_backoff: cfg
                .retry_initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(default.initial_backoff),
            max_backoff: cfg
                .retry_max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(default.max_backoff),
        }
    }
}

/// Default HTTP port of the namenode's WebHDFS gateway.
pub const WEBHDFS_DEFAULT_PORT: u16 = 9870;

/// Where and how to reach an HDFS cluster, resolved from a location and the
/// `hdfs_*` storage options. Values in the URI win over the options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdfsSettings {
    pub namenode: String,
    /// `http://namenode:port`
    pub endpoint: String,
    pub user: Option<String>,
    pub replication: Option<u16>,
    pub block_size: Option<u64>,
}

impl HdfsSettings {
    pub fn resolve(host: &str, port: Option<u16>, cfg: &StorageConfig) -> Result<Self> {
        let namenode = match (host, cfg.hdfs_host.as_deref()) {
            (h, _) if !h.is_empty() => h.to_string(),
            (_, Some(h)) if !h.is_empty() => h.to_string(),
            _ => {
                return Err(Error::config(
                    "hdfs location names no namenode; put it in the URI or set hdfs_host",
                ))
            }
        };
        let port = port.or(cfg.hdfs_port).unwrap_or(WEBHDFS_DEFAULT_PORT);
        if cfg.hdfs_replication == Some(0) {
            return Err(Error::config("hdfs_replication must be at least 1"));
        }
        if let Some(block_size) = cfg.hdfs_block_size {
            if block_size == 0 || block_size % 512 != 0 {
                return Err(Error::config(format!(
                    "hdfs_block_size must be a positive multiple of 512, got {block_size}"
                )));
            }
        }
        let endpoint = format!("http://{namenode}:{port}");
        url::Url::parse(&endpoint)
            .map_err(|e| Error::config(format!("bad namenode address '{endpoint}': {e}")))?;
        Ok(Self {
            namenode,
            endpoint,
            user: cfg.hdfs_user.clone().filter(|u| !u.is_empty()),
            replication: cfg.hdfs_replication,
            block_size: cfg.hdfs_block_size,
        })
    }
}

/// Build the storage adapter that serves `loc`.
pub fn build_storage(loc: &Location, cfg: &StorageConfig) -> Result<SharedStorage> {
    match loc {
        Location::Local(_) => Ok(Arc::new(FsStorage::new())),
        Location::Memory { store, .. } => Ok(Arc::new(MemoryStorage::named(store))),
        Location::S3 { bucket, .. } => {
            if cfg.allow_bucket_creation == Some(true) || cfg.allow_bucket_deletion == Some(true) {
                return Err(Error::config(
                    "bucket creation/deletion is not supported; unset allow_bucket_creation and allow_bucket_deletion",
                ));
            }
            if let Some(scheme) = cfg.scheme.as_deref() {
                if scheme != "http" && scheme != "https" {
                    return Err(Error::config(format!(
                        "unsupported S3 scheme '{scheme}'; expected http or https"
                    )));
                }
            }

            #[cfg(feature = "s3")]
            {
                let storage = S3Storage::new(bucket, cfg)?;
                Ok(Arc::new(storage))
            }

            #[cfg(not(feature = "s3"))]
            {
                let _ = bucket;
                Err(Error::config(
                    "hopper was built without the `s3` feature; rebuild with `--features hopper-io/s3`",
                ))
            }
        }
        Location::Hdfs { host, port, .. } => {
            let settings = HdfsSettings::resolve(host, *port, cfg)?;

            #[cfg(feature = "hdfs")]
            {
                let retry = RetryConfig::from_storage_config(cfg);
                Ok(Arc::new(WebHdfsStorage::new(settings, retry)))
            }

            #[cfg(not(feature = "hdfs"))]
            {
                Err(Error::config(format!(
                    "hopper was built without the `hdfs` feature; cannot reach namenode '{}'",
                    settings.namenode
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_fills_unset_fields() {
        let cfg = StorageConfig {
            retry_max_retries: Some(7),
            ..Default::default()
        };
        let retry = RetryConfig::from_storage_config(&cfg);
        assert_eq!(retry.max_retries, 7);
        assert_eq!(retry.initial_backoff, Duration::from_millis(200));
    }

    #[test]
    fn hdfs_settings_take_the_uri_then_the_options() {
        let cfg = StorageConfig {
            hdfs_host: Some("nn-default".into()),
            hdfs_port: Some(50070),
            hdfs_user: Some("etl".into()),
            hdfs_replication: Some(2),
            hdfs_block_size: Some(128 << 20),
            ..Default::default()
        };
        let s = HdfsSettings::resolve("nn1", Some(8020), &cfg).unwrap();
        assert_eq!(s.endpoint, "http://nn1:8020");
        assert_eq!(s.user.as_deref(), Some("etl"));
        assert_eq!(s.replication, Some(2));

        let s = HdfsSettings::resolve("", None, &cfg).unwrap();
        assert_eq!(s.namenode, "nn-default");
        assert_eq!(s.endpoint, "http://nn-default:50070");

        let s = HdfsSettings::resolve("nn1", None, &StorageConfig::default()).unwrap();
        assert_eq!(s.endpoint, format!("http://nn1:{WEBHDFS_DEFAULT_PORT}"));
    }

    #[test]
    fn hdfs_options_are_checked_at_construction() {
        let hostless = Location::parse("hdfs:///data/x.csv").unwrap();
        let err = build_storage(&hostless, &StorageConfig::default()).unwrap_err();
        assert!(err.to_string().contains("hdfs_host"));

        let loc = Location::parse("hdfs://nn:8020/data/x.csv").unwrap();
        for cfg in [
            StorageConfig {
                hdfs_replication: Some(0),
                ..Default::default()
            },
            StorageConfig {
                hdfs_block_size: Some(1000),
                ..Default::default()
            },
        ] {
            assert!(build_storage(&loc, &cfg).unwrap_err().is_config());
        }
    }

    #[cfg(feature = "hdfs")]
    #[test]
    fn hdfs_builds_without_contacting_the_cluster() {
        let loc = Location::parse("hdfs://nn:8020/data/x.csv").unwrap();
        let storage = build_storage(&loc, &StorageConfig::default()).unwrap();
        assert!(format!("{storage:?}").contains("http://nn:8020"));
    }

    #[cfg(not(feature = "hdfs"))]
    #[test]
    fn hdfs_without_feature_is_a_config_error() {
        let loc = Location::parse("hdfs://nn:8020/data/x.csv").unwrap();
        let err = build_storage(&loc, &StorageConfig::default()).unwrap_err();
        assert!(err.to_string().contains("`hdfs` feature"));
    }

    #[test]
    fn bucket_administration_is_rejected() {
        let loc = Location::parse("s3://b/k.csv").unwrap();
        let cfg = StorageConfig {
            allow_bucket_creation: Some(true),
            ..Default::default()
        };
        let err = build_storage(&loc, &cfg).unwrap_err();
        assert!(err.to_string().contains("bucket creation"));
    }

    #[cfg(not(feature = "s3"))]
    #[test]
    fn s3_without_feature_is_a_config_error() {
        let loc = Location::parse("s3://b/k.csv").unwrap();
        let err = build_storage(&loc, &StorageConfig::default()).unwrap_err();
        assert!(err.to_string().contains("`s3` feature"));
    }
}
