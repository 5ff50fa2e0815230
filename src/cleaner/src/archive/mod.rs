//! Archival of dataset files into the object store and their restoration.
//!
//! Archiving copies a file to a key derived from its partition layout (see
//! [`manifest`]) and removes the original only once the copy succeeded.
//! Restoring reverses this and removes the archived object only once the
//! file is back in place.

pub mod manifest;

use std::sync::Arc;

use async_trait::async_trait;
use common::ServiceContext;
use common::store::{HierarchicalStore, ObjectStoreClient, StoreError, parent};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::retention::action::{ActionError, ActionKind, FileAction};
use crate::retention::metrics::ArchiveMetrics;

pub use manifest::{
    ArchiveManifestEntry, ManifestError, archive_key, is_restorable, restore_path,
};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to copy {path} to archive key {key}: {source}")]
    CopyIn {
        path: String,
        key: String,
        source: StoreError,
    },

    #[error("Archived {path} but failed to remove the original: {source}")]
    DeleteOriginal { path: String, source: StoreError },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Failed to create restore directory {path}: {source}")]
    CreateParent { path: String, source: StoreError },

    #[error("Failed to copy archive key {key} to {path}: {source}")]
    CopyOut {
        key: String,
        path: String,
        source: StoreError,
    },

    #[error("Restored {key} but failed to remove the archived copy: {source}")]
    DeleteArchived { key: String, source: StoreError },

    #[error("Failed to list archive prefix {prefix}: {source}")]
    List { prefix: String, source: StoreError },
}

/// Archived keys under a prefix, split into restorable entries and keys
/// whose names cannot be decoded.
#[derive(Debug, Default)]
pub struct ArchiveManifest {
    pub entries: Vec<ArchiveManifestEntry>,
    pub failures: Vec<(String, ManifestError)>,
}

#[derive(Debug)]
pub struct RestoreFailure {
    pub key: String,
    pub error: ArchiveError,
}

/// Outcome of a restore batch.
#[derive(Debug, Default)]
pub struct RestoreResult {
    pub restored: Vec<ArchiveManifestEntry>,
    pub failed: Vec<RestoreFailure>,
}

impl RestoreResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ArchiveExecutor {
    objects: Arc<dyn ObjectStoreClient>,
    filesystem: Arc<dyn HierarchicalStore>,
    /// Key prefix every archived object lives under.
    container: String,
    /// Dataset repository root restored files are placed under.
    restore_root: String,
    metrics: ArchiveMetrics,
}

impl ArchiveExecutor {
    pub fn new(
        objects: Arc<dyn ObjectStoreClient>,
        filesystem: Arc<dyn HierarchicalStore>,
        container: impl Into<String>,
        restore_root: impl Into<String>,
        metrics: ArchiveMetrics,
    ) -> Self {
        Self {
            objects,
            filesystem,
            container: container.into(),
            restore_root: restore_root.into(),
            metrics,
        }
    }

    pub fn from_context(context: &ServiceContext, metrics: ArchiveMetrics) -> Self {
        Self::new(
            context.archive.clone(),
            context.filesystem.clone(),
            context.config.archive.container.clone(),
            context.config.filesystem.data_repo.clone(),
            metrics,
        )
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Move one file into the archive, returning the key it was stored under.
    pub async fn archive(&self, path: &str) -> Result<String, ArchiveError> {
        let key = archive_key(&self.container, path);
        debug!(path, key = %key, "Archiving file");
        if !is_restorable(&key) {
            warn!(
                path,
                key = %key,
                "Path lacks a source/year/month/day/hour layout; the archived copy cannot be restored automatically"
            );
        }

        let result = self.transfer_in(path, &key).await;
        match &result {
            Ok(()) => {
                self.metrics.record_archived();
                info!(path, key = %key, "Archived file");
            }
            Err(e) => {
                self.metrics.record_archive_failure();
                warn!(path, key = %key, error = %e, "Failed to archive file");
            }
        }
        result.map(|()| key)
    }

    async fn transfer_in(&self, path: &str, key: &str) -> Result<(), ArchiveError> {
        self.objects
            .copy_in(path, key)
            .await
            .map_err(|source| ArchiveError::CopyIn {
                path: path.to_string(),
                key: key.to_string(),
                source,
            })?;

        self.filesystem
            .delete(path)
            .await
            .map_err(|source| ArchiveError::DeleteOriginal {
                path: path.to_string(),
                source,
            })
    }

    /// Restore each key to its canonical dataset path.
    ///
    /// Every key is attempted; failures are collected in the result.
    pub async fn restore(&self, keys: &[String]) -> RestoreResult {
        let mut result = RestoreResult::default();

        for key in keys {
            let restored = match ArchiveManifestEntry::for_key(&self.restore_root, key.as_str()) {
                Ok(entry) => self.restore_entry(&entry).await.map(|()| entry),
                Err(e) => Err(ArchiveError::from(e)),
            };

            match restored {
                Ok(entry) => {
                    self.metrics.record_restored();
                    info!(key = %entry.key, path = %entry.path, "Restored file");
                    result.restored.push(entry);
                }
                Err(error) => {
                    self.metrics.record_restore_failure();
                    warn!(key = %key, error = %error, "Failed to restore archived file");
                    result.failed.push(RestoreFailure {
                        key: key.clone(),
                        error,
                    });
                }
            }
        }

        result
    }

    async fn restore_entry(&self, entry: &ArchiveManifestEntry) -> Result<(), ArchiveError> {
        if let Some(dir) = parent(&entry.path) {
            self.filesystem
                .mkdir_all(dir)
                .await
                .map_err(|source| ArchiveError::CreateParent {
                    path: dir.to_string(),
                    source,
                })?;
        }

        self.objects
            .copy_out(&entry.key, &entry.path)
            .await
            .map_err(|source| ArchiveError::CopyOut {
                key: entry.key.clone(),
                path: entry.path.clone(),
                source,
            })?;

        self.objects
            .delete(&entry.key)
            .await
            .map_err(|source| ArchiveError::DeleteArchived {
                key: entry.key.clone(),
                source,
            })
    }

    /// List archived keys under `prefix`, relative to the container.
    pub async fn manifest(&self, prefix: &str) -> Result<ArchiveManifest, ArchiveError> {
        let full_prefix = self.prefixed(prefix);
        let keys = self
            .objects
            .list(&full_prefix)
            .await
            .map_err(|source| ArchiveError::List {
                prefix: full_prefix.clone(),
                source,
            })?;

        let mut manifest = ArchiveManifest::default();
        for key in keys {
            match ArchiveManifestEntry::for_key(&self.restore_root, key.as_str()) {
                Ok(entry) => manifest.entries.push(entry),
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping undecodable archive key");
                    manifest.failures.push((key, e));
                }
            }
        }
        Ok(manifest)
    }

    /// Restore everything archived under `prefix`.
    ///
    /// Undecodable keys are reported as failures of the batch.
    pub async fn restore_prefix(&self, prefix: &str) -> Result<RestoreResult, ArchiveError> {
        let manifest = self.manifest(prefix).await?;
        let keys: Vec<String> = manifest.entries.into_iter().map(|e| e.key).collect();

        let mut result = self.restore(&keys).await;
        for (key, error) in manifest.failures {
            self.metrics.record_restore_failure();
            result.failed.push(RestoreFailure {
                key,
                error: error.into(),
            });
        }
        Ok(result)
    }

    fn prefixed(&self, prefix: &str) -> String {
        let container = self.container.trim_matches('/');
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            container.to_string()
        } else {
            format!("{container}/{prefix}")
        }
    }
}

#[async_trait]
impl FileAction for ArchiveExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::Archive
    }

    async fn apply(&self, path: &str) -> Result<(), ActionError> {
        self.archive(path).await?;
        Ok(())
    }
}
