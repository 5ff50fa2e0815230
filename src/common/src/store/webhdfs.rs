//! HDFS access over the WebHDFS REST API.
//!
//! Namenodes are given as `host:port[,host:port]`; an HA pair is tried in
//! order and a standby or unreachable namenode falls through to the next one.
//! Data-bearing calls (`OPEN`, `CREATE`) are redirected to a datanode; the
//! redirect is followed by hand so the body is only sent to the datanode.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use reqwest::{Body, Client, Method, Response, StatusCode, redirect::Policy};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{ByteStream, ChildEntry, FileStatus, HierarchicalStore, StoreError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFileStatus {
    #[serde(default)]
    path_suffix: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    length: u64,
    #[serde(default)]
    modification_time: i64,
}

impl WireFileStatus {
    fn is_dir(&self) -> bool {
        self.kind == "DIRECTORY"
    }
}

#[derive(Debug, Deserialize)]
struct ListStatusResponse {
    #[serde(rename = "FileStatuses")]
    file_statuses: FileStatuses,
}

#[derive(Debug, Deserialize)]
struct FileStatuses {
    #[serde(rename = "FileStatus")]
    file_status: Vec<WireFileStatus>,
}

#[derive(Debug, Deserialize)]
struct FileStatusResponse {
    #[serde(rename = "FileStatus")]
    file_status: WireFileStatus,
}

#[derive(Debug, Deserialize)]
struct BooleanResponse {
    boolean: bool,
}

#[derive(Debug, Deserialize)]
struct RemoteExceptionResponse {
    #[serde(rename = "RemoteException")]
    remote_exception: RemoteException,
}

#[derive(Debug, Deserialize)]
struct RemoteException {
    exception: String,
    #[serde(default)]
    message: String,
}

/// HDFS client speaking WebHDFS.
#[derive(Debug, Clone)]
pub struct WebHdfs {
    namenodes: Vec<Url>,
    user: String,
    client: Client,
}

impl WebHdfs {
    pub fn new(namenodes: &str, user: &str) -> Result<Self, StoreError> {
        let namenodes = namenodes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                let address = if s.starts_with("http://") || s.starts_with("https://") {
                    s.to_string()
                } else {
                    format!("http://{s}")
                };
                match Url::parse(&address) {
                    Ok(url) if !url.cannot_be_a_base() => Ok(url),
                    Ok(_) => Err(StoreError::Remote(format!("invalid namenode address {s}"))),
                    Err(e) => Err(StoreError::Remote(format!("invalid namenode address {s}: {e}"))),
                }
            })
            .collect::<Result<Vec<Url>, StoreError>>()?;
        if namenodes.is_empty() {
            return Err(StoreError::Remote("no WebHDFS namenode configured".into()));
        }
        let client = Client::builder().redirect(Policy::none()).build()?;
        Ok(Self {
            namenodes,
            user: user.to_string(),
            client,
        })
    }

    /// REST url of `op` on `path`, with every path segment and query value
    /// percent-encoded.
    fn op_url(&self, namenode: &Url, path: &str, op: &str, extra: &[(&str, &str)]) -> Url {
        let mut url = namenode.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["webhdfs", "v1"]);
            let mut components = path.split('/').filter(|s| !s.is_empty()).peekable();
            if components.peek().is_none() {
                segments.push("");
            }
            segments.extend(components);
        }
        url.query_pairs_mut()
            .append_pair("op", op)
            .append_pair("user.name", &self.user)
            .extend_pairs(extra);
        url
    }

    /// Send one namenode call, falling through standby or unreachable nodes.
    async fn call(
        &self,
        method: Method,
        path: &str,
        op: &str,
        extra: &[(&str, &str)],
    ) -> Result<Response, StoreError> {
        let mut last_error = None;
        for namenode in &self.namenodes {
            let url = self.op_url(namenode, path, op, extra);
            debug!(%url, "WebHDFS request");
            let response = match self.client.request(method.clone(), url).send().await {
                Ok(response) => response,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(StoreError::Http(e));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if response.status().is_success() || response.status().is_redirection() {
                return Ok(response);
            }
            match remote_error(path, response).await {
                StoreError::Remote(message) if message.contains("StandbyException") => {
                    last_error = Some(StoreError::Remote(message));
                }
                other => return Err(other),
            }
        }
        Err(last_error.unwrap_or_else(|| StoreError::Remote("no namenode reachable".into())))
    }

    fn redirect_target(path: &str, response: &Response) -> Result<String, StoreError> {
        if response.status() != StatusCode::TEMPORARY_REDIRECT {
            return Err(StoreError::Remote(format!(
                "expected datanode redirect for {path}, got {}",
                response.status()
            )));
        }
        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Remote(format!("redirect for {path} without location")))
    }

    /// `OPEN` a file, following the datanode redirect.
    async fn open(&self, path: &str) -> Result<Response, StoreError> {
        let response = self.call(Method::GET, path, "OPEN", &[]).await?;
        if !response.status().is_redirection() {
            return Ok(response);
        }
        let location = Self::redirect_target(path, &response)?;
        let response = self.client.get(&location).send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(remote_error(path, response).await)
        }
    }

    /// `CREATE` a file, sending `body` only to the datanode.
    async fn create(&self, path: &str, body: Body) -> Result<(), StoreError> {
        let response = self
            .call(Method::PUT, path, "CREATE", &[("overwrite", "true")])
            .await?;
        let location = Self::redirect_target(path, &response)?;
        let response = self.client.put(&location).body(body).send().await?;
        if response.status() == StatusCode::CREATED || response.status().is_success() {
            Ok(())
        } else {
            Err(remote_error(path, response).await)
        }
    }
}

async fn remote_error(path: &str, response: Response) -> StoreError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return StoreError::Http(e),
    };
    map_remote_exception(path, status, &body)
}

fn map_remote_exception(path: &str, status: StatusCode, body: &str) -> StoreError {
    match serde_json::from_str::<RemoteExceptionResponse>(body) {
        Ok(parsed) => match parsed.remote_exception.exception.as_str() {
            "FileNotFoundException" => StoreError::NotFound(path.to_string()),
            "PathIsNotEmptyDirectoryException" => StoreError::NotEmpty(path.to_string()),
            exception => StoreError::Remote(format!(
                "{exception}: {}",
                parsed.remote_exception.message
            )),
        },
        Err(_) if status == StatusCode::NOT_FOUND => StoreError::NotFound(path.to_string()),
        Err(_) => StoreError::Remote(format!("{status} on {path}: {body}")),
    }
}

fn to_file_status(wire: &WireFileStatus) -> FileStatus {
    FileStatus {
        size: if wire.is_dir() { 0 } else { wire.length },
        modified: DateTime::<Utc>::from_timestamp_millis(wire.modification_time)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        is_dir: wire.is_dir(),
    }
}

fn to_children(listing: ListStatusResponse) -> Vec<ChildEntry> {
    let mut children: Vec<ChildEntry> = listing
        .file_statuses
        .file_status
        .iter()
        .map(|status| ChildEntry {
            name: status.path_suffix.clone(),
            is_dir: status.is_dir(),
        })
        .collect();
    children.sort_by(|a, b| a.name.cmp(&b.name));
    children
}

#[async_trait]
impl HierarchicalStore for WebHdfs {
    async fn list_children(&self, path: &str) -> Result<Vec<ChildEntry>, StoreError> {
        let response = self.call(Method::GET, path, "LISTSTATUS", &[]).await?;
        let listing: ListStatusResponse = response.json().await?;
        Ok(to_children(listing))
    }

    async fn stat(&self, path: &str) -> Result<FileStatus, StoreError> {
        let response = self.call(Method::GET, path, "GETFILESTATUS", &[]).await?;
        let status: FileStatusResponse = response.json().await?;
        Ok(to_file_status(&status.file_status))
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let response = self
            .call(Method::DELETE, path, "DELETE", &[("recursive", "false")])
            .await?;
        let result: BooleanResponse = response.json().await?;
        if result.boolean {
            Ok(())
        } else {
            Err(StoreError::NotFound(path.to_string()))
        }
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        let data = self.read_stream(src).await?;
        self.write_stream(dst, data).await
    }

    async fn mkdir_all(&self, path: &str) -> Result<(), StoreError> {
        let response = self.call(Method::PUT, path, "MKDIRS", &[]).await?;
        let result: BooleanResponse = response.json().await?;
        if result.boolean {
            Ok(())
        } else {
            Err(StoreError::Remote(format!("MKDIRS refused for {path}")))
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes, StoreError> {
        Ok(self.open(path).await?.bytes().await?)
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
        self.create(path, Body::from(data)).await
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream, StoreError> {
        let response = self.open(path).await?;
        Ok(response.bytes_stream().map_err(StoreError::from).boxed())
    }

    async fn write_stream(&self, path: &str, data: ByteStream) -> Result<(), StoreError> {
        self.create(path, Body::wrap_stream(data)).await
    }
}
