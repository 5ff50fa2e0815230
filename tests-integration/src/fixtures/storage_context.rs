//! Local filesystem and in-memory archive for integration tests

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::store::{ArchiveStore, HierarchicalStore, LocalFileSystem};
use object_store::ObjectStore;
use object_store::memory::InMemory;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A dataset filesystem rooted in a temporary directory, plus an archive
/// object store held in memory
pub struct StorageTestContext {
    pub temp_dir: TempDir,
    pub filesystem: Arc<LocalFileSystem>,
    pub objects: Arc<dyn ObjectStore>,
    pub archive: Arc<ArchiveStore>,
}

impl StorageTestContext {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new().context("Failed to create temp dir")?;
        let filesystem = Arc::new(LocalFileSystem::new(temp_dir.path())?);
        let objects: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let archive = Arc::new(ArchiveStore::new(objects.clone(), filesystem.clone()));

        Ok(Self {
            temp_dir,
            filesystem,
            objects,
            archive,
        })
    }

    /// Where a store path lives on disk
    pub fn local_path(&self, path: &str) -> PathBuf {
        self.temp_dir.path().join(path.trim_start_matches('/'))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.local_path(path).exists()
    }

    /// Write a file and backdate its modification time
    pub async fn write_file(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        modified: DateTime<Utc>,
    ) -> Result<()> {
        self.filesystem.write(path, data.into()).await?;
        File::options()
            .write(true)
            .open(self.local_path(path))
            .and_then(|file| file.set_modified(modified.into()))
            .with_context(|| format!("Failed to set modification time of {path}"))?;
        Ok(())
    }

    /// All files below `path`, as sorted store paths
    pub fn files_under(&self, path: &str) -> Vec<String> {
        fn walk(dir: &std::path::Path, prefix: &str, out: &mut Vec<String>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                let store_path = format!("{prefix}/{name}");
                if entry.path().is_dir() {
                    walk(&entry.path(), &store_path, out);
                } else {
                    out.push(store_path);
                }
            }
        }

        let mut files = Vec::new();
        walk(
            &self.local_path(path),
            path.trim_end_matches('/'),
            &mut files,
        );
        files.sort();
        files
    }
}
