//! Capability traits over the three external stores.
//!
//! - [`HierarchicalStore`]: the dataset filesystem (local mount or WebHDFS)
//! - [`MetadataStore`]: persisted dataset records, one cell per `(key, column)`
//! - [`ObjectStoreClient`]: the archive blob store
//!
//! Paths handed to a [`HierarchicalStore`] are absolute, `/`-separated strings.

pub mod local;
pub mod metadata;
pub mod object;
pub mod webhdfs;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use thiserror::Error;

use crate::config::{FilesystemBackend, FilesystemConfig};

pub use local::LocalFileSystem;
pub use metadata::SqlMetadataStore;
pub use object::ArchiveStore;
pub use webhdfs::WebHdfs;

/// Column qualifier to value for one persisted row.
pub type Fields = BTreeMap<String, String>;

/// File contents as a sequence of chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("connection pool unavailable: {0}")]
    Pool(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("object store error: {0}")]
    ObjectStore(object_store::Error),

    #[error("invalid table name '{0}'")]
    InvalidTableName(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub(crate) fn from_io(path: &str, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
            std::io::ErrorKind::DirectoryNotEmpty => StoreError::NotEmpty(path.to_string()),
            _ => StoreError::Io {
                path: path.to_string(),
                source,
            },
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Pool(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

impl From<object_store::Error> for StoreError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StoreError::NotFound(path),
            object_store::Error::AlreadyExists { path, .. } => StoreError::AlreadyExists(path),
            other => StoreError::ObjectStore(other),
        }
    }
}

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildEntry {
    pub name: String,
    pub is_dir: bool,
}

impl ChildEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStatus {
    /// Length in bytes; zero for directories.
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
}

/// A hierarchical filesystem holding the datasets.
#[async_trait]
pub trait HierarchicalStore: Send + Sync {
    /// Immediate children of a directory, sorted by name.
    async fn list_children(&self, path: &str) -> Result<Vec<ChildEntry>, StoreError>;

    async fn stat(&self, path: &str) -> Result<FileStatus, StoreError>;

    /// Remove a file or an empty directory. Never recursive.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError>;

    async fn mkdir_all(&self, path: &str) -> Result<(), StoreError>;

    async fn read(&self, path: &str) -> Result<Bytes, StoreError>;

    /// Create or overwrite a file, creating missing parents.
    async fn write(&self, path: &str, data: Bytes) -> Result<(), StoreError>;

    /// File contents in chunks. Backends that can stream override this.
    async fn read_stream(&self, path: &str) -> Result<ByteStream, StoreError> {
        let data = self.read(path).await?;
        Ok(stream::once(async move { Ok(data) }).boxed())
    }

    /// Like [`HierarchicalStore::write`], fed from a chunk stream.
    async fn write_stream(&self, path: &str, mut data: ByteStream) -> Result<(), StoreError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = data.try_next().await? {
            buffer.extend_from_slice(&chunk);
        }
        self.write(path, buffer.freeze()).await
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Key/value access to persisted dataset records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Create the table when missing.
    async fn ensure_table(&self, table: &str) -> Result<(), StoreError>;

    /// Every row of the table, ordered by key.
    async fn scan_all(&self, table: &str) -> Result<Vec<(String, Fields)>, StoreError>;

    /// Replace the row stored under `key`.
    async fn put(&self, table: &str, key: &str, fields: &Fields) -> Result<(), StoreError>;

    /// Remove the row stored under `key`. Missing rows are not an error.
    async fn delete(&self, table: &str, key: &str) -> Result<(), StoreError>;
}

/// Keyed blob store the archive lives in.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Keys under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Upload the filesystem file at `path` under `key`.
    ///
    /// Never replaces an existing object: a taken key fails with
    /// [`StoreError::AlreadyExists`].
    async fn copy_in(&self, path: &str, key: &str) -> Result<(), StoreError>;

    /// Download `key` to the filesystem file at `path`.
    async fn copy_out(&self, key: &str, path: &str) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Build the hierarchical store selected by configuration.
pub fn create_hierarchical_store(
    config: &FilesystemConfig,
) -> Result<Arc<dyn HierarchicalStore>, StoreError> {
    match config.backend {
        FilesystemBackend::Local => Ok(Arc::new(LocalFileSystem::new(&config.root)?)),
        FilesystemBackend::WebHdfs => {
            let url = config.url.as_deref().ok_or_else(|| {
                StoreError::Remote("WebHDFS backend configured without a namenode url".into())
            })?;
            Ok(Arc::new(WebHdfs::new(url, &config.user)?))
        }
    }
}

/// Join a child name onto a directory path.
pub fn join(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if parent.is_empty() {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Last component of a path.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Parent directory of a path, `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) if trimmed.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(idx) => Some(&trimmed[..idx]),
    }
}
