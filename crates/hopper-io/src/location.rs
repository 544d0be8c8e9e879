//! Resolution of user-supplied URIs into concrete storage locations.
//!
//! - bare path (no `://`): local file, made absolute against the cwd
//! - `file://`: local file
//! - `s3://bucket/key`, `s3fs://bucket/key`: S3 object
//! - `hdfs://host:port/path`: HDFS file; `hdfs:///path` leaves the namenode
//!   to the storage options
//! - `memory://store/key`: process-local in-memory store

use std::fmt;
use std::path::{Path, PathBuf};

use hopper_core::error::{Error, Result};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Local(PathBuf),
    S3 { bucket: String, key: String },
    Hdfs { host: String, port: Option<u16>, path: String },
    Memory { store: String, key: String },
}

fn unresolved(uri: &str, reason: impl Into<String>) -> Error {
    Error::UnresolvedLocation {
        location: uri.to_string(),
        reason: reason.into(),
    }
}

impl Location {
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(unresolved(uri, "empty location"));
        }

        let Some((scheme, _)) = uri.split_once("://") else {
            let path = Path::new(uri);
            if path.is_absolute() {
                return Ok(Location::Local(path.to_path_buf()));
            }
            let cwd = std::env::current_dir()
                .map_err(|e| unresolved(uri, format!("no working directory: {e}")))?;
            return Ok(Location::Local(cwd.join(path)));
        };

        match scheme.to_ascii_lowercase().as_str() {
            "file" => {
                let url = Url::parse(uri).map_err(|e| unresolved(uri, e.to_string()))?;
                let path = url
                    .to_file_path()
                    .map_err(|_| unresolved(uri, "not an absolute file path"))?;
                Ok(Location::Local(path))
            }
            "s3" | "s3fs" => {
                let (bucket, key) = split_authority(uri)?;
                Ok(Location::S3 { bucket, key })
            }
            "memory" => {
                let (store, key) = split_authority(uri)?;
                Ok(Location::Memory { store, key })
            }
            "hdfs" => {
                let url = Url::parse(uri).map_err(|e| unresolved(uri, e.to_string()))?;
                let host = url.host_str().unwrap_or_default().to_string();
                let path = url.path().to_string();
                if path.trim_matches('/').is_empty() {
                    return Err(unresolved(uri, "missing path"));
                }
                Ok(Location::Hdfs {
                    host,
                    port: url.port(),
                    path,
                })
            }
            other => Err(Error::UnknownScheme {
                location: uri.to_string(),
                scheme: other.to_string(),
            }),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Location::Local(_) => "file",
            Location::S3 { .. } => "s3",
            Location::Hdfs { .. } => "hdfs",
            Location::Memory { .. } => "memory",
        }
    }

    /// The object key or path component, without the authority.
    pub fn key(&self) -> String {
        match self {
            Location::Local(p) => p.to_string_lossy().into_owned(),
            Location::S3 { key, .. } | Location::Memory { key, .. } => key.clone(),
            Location::Hdfs { path, .. } => path.clone(),
        }
    }

    fn with_key(&self, key: String) -> Location {
        match self {
            Location::Local(_) => Location::Local(PathBuf::from(key)),
            Location::S3 { bucket, .. } => Location::S3 {
                bucket: bucket.clone(),
                key,
            },
            Location::Memory { store, .. } => Location::Memory {
                store: store.clone(),
                key,
            },
            Location::Hdfs { host, port, .. } => Location::Hdfs {
                host: host.clone(),
                port: *port,
                path: key,
            },
        }
    }

    /// Sibling `<stem>_<suffix>.<ext>` of a file location.
    pub fn with_suffix(&self, suffix: &str) -> Location {
        let suffix: String = suffix
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        if let Location::Local(path) = self {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let name = match path.extension() {
                Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
                None => format!("{stem}_{suffix}"),
            };
            return Location::Local(path.with_file_name(name));
        }

        let key = self.key();
        let (dir, file) = match key.rsplit_once('/') {
            Some((dir, file)) => (format!("{dir}/"), file.to_string()),
            None => (String::new(), key.clone()),
        };
        let name = match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{suffix}.{ext}"),
            _ => format!("{file}_{suffix}"),
        };
        self.with_key(format!("{dir}{name}"))
    }

    /// Child location below a directory-like location.
    pub fn join(&self, rel: &str) -> Location {
        let rel = rel.trim_start_matches('/');
        if let Location::Local(path) = self {
            return Location::Local(path.join(rel));
        }
        let key = self.key();
        if key.is_empty() {
            self.with_key(rel.to_string())
        } else {
            self.with_key(format!("{}/{rel}", key.trim_end_matches('/')))
        }
    }

    /// Path of `self` relative to `base`, if `self` lies below it.
    pub fn strip_prefix(&self, base: &Location) -> Option<String> {
        match (self, base) {
            (Location::Local(p), Location::Local(b)) => p
                .strip_prefix(b)
                .ok()
                .map(|r| r.to_string_lossy().replace('\\', "/")),
            _ if self.scheme() == base.scheme() => {
                let key = self.key();
                let base_key = base.key();
                let prefix = base_key.trim_end_matches('/');
                if prefix.is_empty() {
                    return Some(key);
                }
                key.strip_prefix(prefix)
                    .and_then(|r| r.strip_prefix('/'))
                    .map(str::to_string)
            }
            _ => None,
        }
    }
}

fn split_authority(uri: &str) -> Result<(String, String)> {
    let Some((_, rest)) = uri.split_once("://") else {
        return Err(unresolved(uri, "missing scheme separator"));
    };
    let (authority, key) = rest.split_once('/').unwrap_or((rest, ""));
    if authority.is_empty() {
        return Err(unresolved(uri, "missing bucket"));
    }
    let key = key.trim_matches('/');
    if key.is_empty() {
        return Err(unresolved(uri, "missing key"));
    }
    Ok((authority.to_string(), key.to_string()))
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(p) => write!(f, "{}", p.display()),
            Location::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            Location::Hdfs { host, port, path } => match port {
                Some(port) => write!(f, "hdfs://{host}:{port}{path}"),
                None => write!(f, "hdfs://{host}{path}"),
            },
            Location::Memory { store, key } => write!(f, "memory://{store}/{key}"),
        }
    }
}
