//! S3 storage built on `object_store`, driven synchronously from a private
//! tokio runtime.

use std::future::Future;
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use futures::StreamExt;
use hopper_core::config::StorageConfig;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{BackoffConfig, Error as ObjectStoreError, ObjectStore};
use tokio::runtime::Runtime;

use super::{RetryConfig, Storage};
use crate::error::{StorageError, StorageResult};
use crate::location::Location;

#[derive(Debug, thiserror::Error)]
pub enum CloudStorageBuilderError {
    #[error("failed to initialize async runtime: {0}")]
    Runtime(String),

    #[error("object_store builder error: {0}")]
    Builder(String),
}

impl From<CloudStorageBuilderError> for hopper_core::error::Error {
    fn from(err: CloudStorageBuilderError) -> Self {
        hopper_core::error::Error::Config(err.to_string())
    }
}

pub struct S3Storage {
    runtime: Runtime,
    store: Arc<dyn ObjectStore>,
    bucket: String,
    retry: RetryConfig,
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.bucket)
            .field("retry", &self.retry)
            .finish()
    }
}

impl S3Storage {
    pub fn new(bucket: &str, cfg: &StorageConfig) -> Result<Self, CloudStorageBuilderError> {
        let retry = RetryConfig::from_storage_config(cfg);
        let mut builder = AmazonS3Builder::new().with_bucket_name(bucket);
        if let Some(region) = &cfg.aws_region {
            builder = builder.with_region(region.clone());
        }
        if let Some(access_key) = &cfg.aws_access_key_id {
            builder = builder.with_access_key_id(access_key.clone());
        }
        if let Some(secret_key) = &cfg.aws_secret_access_key {
            builder = builder.with_secret_access_key(secret_key.clone());
        }
        if let Some(token) = &cfg.aws_session_token {
            builder = builder.with_token(token.clone());
        }
        if let Some(endpoint) = &cfg.endpoint_override {
            builder = builder.with_endpoint(endpoint.clone());
        }
        if cfg.scheme.as_deref() == Some("http") {
            builder = builder.with_allow_http(true);
        }
        builder = builder.with_retry(object_store_retry(&retry));
        let store: AmazonS3 = builder
            .build()
            .map_err(|e| CloudStorageBuilderError::Builder(e.to_string()))?;
        let runtime =
            Runtime::new().map_err(|e| CloudStorageBuilderError::Runtime(e.to_string()))?;
        Ok(Self {
            runtime,
            store: Arc::new(store),
            bucket: bucket.to_string(),
            retry,
        })
    }

    fn object_path(&self, loc: &Location) -> StorageResult<ObjectPath> {
        match loc {
            Location::S3 { bucket, key } if *bucket == self.bucket => Ok(ObjectPath::from(key.as_str())),
            other => Err(StorageError::WrongLocation {
                adapter: "S3Storage",
                location: other.to_string(),
            }),
        }
    }

    fn run_with_retry<F, Fut, T>(&self, path: &ObjectPath, mut op: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = object_store::Result<T>>,
    {
        let mut attempt = 0usize;
        let mut backoff = self.retry.initial_backoff;

        loop {
            match self.runtime.block_on(op()) {
                Ok(value) => return Ok(value),
                Err(ObjectStoreError::NotFound { .. }) => {
                    return Err(StorageError::NotFound(format!("s3://{}/{path}", self.bucket)));
                }
                Err(err) => {
                    if attempt >= self.retry.max_retries || !is_retryable(&err) {
                        return Err(StorageError::Remote(err.to_string()));
                    }
                    attempt += 1;
                    tracing::debug!(attempt, error = %err, "retrying object store call");
                    thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, self.retry.max_backoff);
                }
            }
        }
    }
}

fn is_retryable(err: &ObjectStoreError) -> bool {
    !matches!(
        err,
        ObjectStoreError::NotFound { .. }
            | ObjectStoreError::AlreadyExists { .. }
            | ObjectStoreError::InvalidPath { .. }
            | ObjectStoreError::NotSupported { .. }
            | ObjectStoreError::UnknownConfigurationKey { .. }
    )
}

fn object_store_retry(retry: &RetryConfig) -> object_store::RetryConfig {
    object_store::RetryConfig {
        max_retries: retry.max_retries,
        retry_timeout: retry.max_backoff,
        backoff: BackoffConfig {
            init_backoff: retry.initial_backoff,
            max_backoff: retry.max_backoff,
            base: 2.0,
        },
    }
}

impl Storage for S3Storage {
    fn read_all(&self, loc: &Location) -> StorageResult<Bytes> {
        let obj_path = self.object_path(loc)?;
        self.run_with_retry(&obj_path, || {
            let store = Arc::clone(&self.store);
            let path = obj_path.clone();
            async move {
                match store.get(&path).await {
                    Ok(result) => result.bytes().await,
                    Err(e) => Err(e),
                }
            }
        })
    }

    fn read_range(&self, loc: &Location, offset: u64, len: usize) -> StorageResult<Bytes> {
        let obj_path = self.object_path(loc)?;
        let range = (offset as usize)..(offset as usize + len);
        self.run_with_retry(&obj_path, || {
            let store = Arc::clone(&self.store);
            let path = obj_path.clone();
            let range = range.clone();
            async move { store.get_range(&path, range).await }
        })
    }

    fn write(&self, loc: &Location, bytes: Bytes) -> StorageResult<()> {
        let obj_path = self.object_path(loc)?;
        self.run_with_retry(&obj_path, || {
            let store = Arc::clone(&self.store);
            let path = obj_path.clone();
            let payload = bytes.clone();
            async move { store.put(&path, payload.into()).await.map(|_| ()) }
        })
    }

    fn delete(&self, loc: &Location) -> StorageResult<()> {
        let obj_path = self.object_path(loc)?;
        match self.run_with_retry(&obj_path, || {
            let store = Arc::clone(&self.store);
            let path = obj_path.clone();
            async move { store.delete(&path).await }
        }) {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    fn list(&self, prefix: &Location) -> StorageResult<Vec<Location>> {
        let prefix_path = self.object_path(prefix)?;
        let store = Arc::clone(&self.store);
        let bucket = self.bucket.clone();
        let mut out = self.runtime.block_on(async move {
            let mut stream = store.list(Some(&prefix_path));
            let mut out = Vec::new();
            while let Some(item) = stream.next().await {
                let meta = item.map_err(|e| StorageError::Remote(e.to_string()))?;
                out.push(Location::S3 {
                    bucket: bucket.clone(),
                    key: meta.location.to_string(),
                });
            }
            Ok::<_, StorageError>(out)
        })?;
        out.sort_by_key(|l| l.key());
        Ok(out)
    }

    fn size(&self, loc: &Location) -> StorageResult<u64> {
        let obj_path = self.object_path(loc)?;
        self.run_with_retry(&obj_path, || {
            let store = Arc::clone(&self.store);
            let path = obj_path.clone();
            async move { store.head(&path).await }
        })
        .map(|meta| meta.size as u64)
    }
}
