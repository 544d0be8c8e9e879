//! HDFS through the namenode's WebHDFS REST interface, over a blocking
//! `ureq` agent.
//!
//! Data operations are two-legged: the namenode answers `OPEN` and `CREATE`
//! with a 307 to a datanode, and the second request goes there. Redirects
//! are followed by hand so the write body is only ever sent to the datanode.

use std::io::Read;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use url::Url;

use super::{HdfsSettings, RetryConfig, Storage};
use crate::error::{StorageError, StorageResult};
use crate::location::Location;

const MAX_REDIRECTS: usize = 3;

pub struct WebHdfsStorage {
    agent: ureq::Agent,
    settings: HdfsSettings,
    retry: RetryConfig,
}

impl std::fmt::Debug for WebHdfsStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebHdfsStorage")
            .field("endpoint", &self.settings.endpoint)
            .field("user", &self.settings.user)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    #[serde(rename = "FileStatus")]
    status: FileStatus,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    #[serde(rename = "FileStatuses")]
    statuses: FileStatuses,
}

#[derive(Debug, Deserialize)]
struct FileStatuses {
    #[serde(rename = "FileStatus", default)]
    entries: Vec<FileStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileStatus {
    #[serde(default)]
    path_suffix: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    length: u64,
}

impl FileStatus {
    fn is_dir(&self) -> bool {
        self.kind == "DIRECTORY"
    }
}

impl WebHdfsStorage {
    pub fn new(settings: HdfsSettings, retry: RetryConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .redirects(0)
            .timeout_connect(Duration::from_secs(10))
            .build();
        Self {
            agent,
            settings,
            retry,
        }
    }

    pub fn settings(&self) -> &HdfsSettings {
        &self.settings
    }

    fn path_of<'a>(&self, loc: &'a Location) -> StorageResult<&'a str> {
        match loc {
            Location::Hdfs { host, path, .. }
                if host.is_empty() || *host == self.settings.namenode =>
            {
                Ok(path)
            }
            other => Err(StorageError::WrongLocation {
                adapter: "WebHdfsStorage",
                location: other.to_string(),
            }),
        }
    }

    fn op_url(&self, path: &str, op: &str, extra: &[(&str, String)]) -> StorageResult<Url> {
        let mut url = Url::parse(&self.settings.endpoint)
            .map_err(|e| StorageError::Remote(format!("bad WebHDFS endpoint: {e}")))?;
        url.set_path(&format!("/webhdfs/v1{path}"));
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("op", op);
            if let Some(user) = &self.settings.user {
                query.append_pair("user.name", user);
            }
            for (k, v) in extra {
                query.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// One request, retried on transport failures, with 307s followed.
    /// `body` is sent only once the redirect chain ends.
    fn send(&self, method: &str, url: Url, body: Option<&[u8]>) -> StorageResult<ureq::Response> {
        let mut attempt = 0usize;
        let mut backoff = self.retry.initial_backoff;
        loop {
            match self.follow(method, url.clone(), body) {
                Err(Transient(err)) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %err, "retrying WebHDFS call");
                    thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, self.retry.max_backoff);
                }
                Err(Transient(err)) => return Err(StorageError::Remote(err)),
                Ok(result) => return result,
            }
        }
    }

    fn follow(
        &self,
        method: &str,
        mut url: Url,
        body: Option<&[u8]>,
    ) -> Result<StorageResult<ureq::Response>, Transient> {
        for _ in 0..=MAX_REDIRECTS {
            let request = self.agent.request(method, url.as_str());
            // The namenode leg of a write carries no data.
            let is_namenode_leg = url.path().starts_with("/webhdfs/v1");
            let response = match body {
                Some(bytes) if !(is_namenode_leg && method == "PUT") => request
                    .set("Content-Type", "application/octet-stream")
                    .send_bytes(bytes),
                _ => request.call(),
            };
            let response = match response {
                Ok(resp) => resp,
                Err(ureq::Error::Status(code, resp)) => {
                    return Ok(Err(status_error(code, resp, &url)));
                }
                Err(ureq::Error::Transport(err)) => return Err(Transient(err.to_string())),
            };
            if !(300..400).contains(&response.status()) {
                return Ok(Ok(response));
            }
            let Some(next) = response.header("Location") else {
                return Ok(Err(StorageError::Remote(format!(
                    "{} {url}: redirect without a Location",
                    response.status()
                ))));
            };
            url = match url.join(next) {
                Ok(next) => next,
                Err(e) => return Ok(Err(StorageError::Remote(format!("bad redirect '{next}': {e}")))),
            };
        }
        Ok(Err(StorageError::Remote(format!("too many redirects for {url}"))))
    }

    fn file_status(&self, path: &str) -> StorageResult<FileStatus> {
        let url = self.op_url(path, "GETFILESTATUS", &[])?;
        let envelope: StatusEnvelope = read_json(self.send("GET", url, None)?)?;
        Ok(envelope.status)
    }

    fn list_dir(&self, dir: &str, out: &mut Vec<String>) -> StorageResult<()> {
        let url = self.op_url(dir, "LISTSTATUS", &[])?;
        let envelope: ListEnvelope = read_json(self.send("GET", url, None)?)?;
        for entry in envelope.statuses.entries {
            // Listing a file yields the file itself with an empty suffix.
            if entry.path_suffix.is_empty() {
                out.push(dir.to_string());
                continue;
            }
            let child = format!("{}/{}", dir.trim_end_matches('/'), entry.path_suffix);
            if entry.is_dir() {
                self.list_dir(&child, out)?;
            } else {
                out.push(child);
            }
        }
        Ok(())
    }

    fn hdfs_location(&self, template: &Location, path: String) -> Location {
        match template {
            Location::Hdfs { host, port, .. } => Location::Hdfs {
                host: host.clone(),
                port: *port,
                path,
            },
            other => other.clone(),
        }
    }
}

/// A failure worth another attempt.
struct Transient(String);

fn status_error(code: u16, response: ureq::Response, url: &Url) -> StorageError {
    let body = response.into_string().unwrap_or_default();
    if code == 404 {
        return StorageError::NotFound(url.path().trim_start_matches("/webhdfs/v1").to_string());
    }
    StorageError::Remote(format!("WebHDFS {code}: {}", body.trim()))
}

fn read_body(response: ureq::Response) -> StorageResult<Bytes> {
    let mut buf = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut buf)
        .map_err(|e| StorageError::io("read", "webhdfs response", e))?;
    Ok(Bytes::from(buf))
}

fn read_json<T: serde::de::DeserializeOwned>(response: ureq::Response) -> StorageResult<T> {
    let body = read_body(response)?;
    serde_json::from_slice(&body).map_err(|e| StorageError::Remote(format!("invalid WebHDFS reply: {e}")))
}

impl Storage for WebHdfsStorage {
    fn read_all(&self, loc: &Location) -> StorageResult<Bytes> {
        let url = self.op_url(self.path_of(loc)?, "OPEN", &[])?;
        read_body(self.send("GET", url, None)?)
    }

    fn read_range(&self, loc: &Location, offset: u64, len: usize) -> StorageResult<Bytes> {
        let extra = [("offset", offset.to_string()), ("length", len.to_string())];
        let url = self.op_url(self.path_of(loc)?, "OPEN", &extra)?;
        read_body(self.send("GET", url, None)?)
    }

    fn write(&self, loc: &Location, bytes: Bytes) -> StorageResult<()> {
        let mut extra = vec![("overwrite", "true".to_string())];
        if let Some(replication) = self.settings.replication {
            extra.push(("replication", replication.to_string()));
        }
        if let Some(block_size) = self.settings.block_size {
            extra.push(("blocksize", block_size.to_string()));
        }
        let url = self.op_url(self.path_of(loc)?, "CREATE", &extra)?;
        self.send("PUT", url, Some(&bytes))?;
        Ok(())
    }

    fn delete(&self, loc: &Location) -> StorageResult<()> {
        let extra = [("recursive", "false".to_string())];
        let url = self.op_url(self.path_of(loc)?, "DELETE", &extra)?;
        match self.send("DELETE", url, None) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn list(&self, prefix: &Location) -> StorageResult<Vec<Location>> {
        let mut paths = Vec::new();
        match self.list_dir(self.path_of(prefix)?, &mut paths) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }
        paths.sort();
        Ok(paths
            .into_iter()
            .map(|p| self.hdfs_location(prefix, p))
            .collect())
    }

    fn size(&self, loc: &Location) -> StorageResult<u64> {
        let status = self.file_status(self.path_of(loc)?)?;
        if status.is_dir() {
            return Err(StorageError::WrongLocation {
                adapter: "WebHdfsStorage",
                location: format!("{loc} (directory)"),
            });
        }
        Ok(status.length)
    }
}
