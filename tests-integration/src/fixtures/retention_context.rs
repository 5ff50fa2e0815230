//! Retention test context combining catalog, storage, and configuration
//!
//! Provides a complete test environment for retention sweeps.

use super::{CatalogTestContext, StorageTestContext};
use anyhow::Result;
use catalog::CatalogService;
use cleaner::archive::ArchiveExecutor;
use cleaner::retention::{RetentionConfig, RetentionEnforcer, RetentionMetrics};
use std::sync::Arc;

pub const DATA_REPO: &str = "/repo";
pub const ARCHIVE_CONTAINER: &str = "archive";

/// Complete test context for retention sweeps
pub struct RetentionTestContext {
    pub catalog: CatalogTestContext,
    pub storage: StorageTestContext,
    pub metrics: RetentionMetrics,
    pub service: Arc<CatalogService>,
    pub archive: Arc<ArchiveExecutor>,
}

impl RetentionTestContext {
    pub async fn new_in_memory() -> Result<Self> {
        let catalog = CatalogTestContext::new_in_memory().await?;
        let storage = StorageTestContext::new()?;
        let metrics = RetentionMetrics::new();

        let service = Arc::new(catalog.service(storage.filesystem.clone(), DATA_REPO));
        let archive = Arc::new(ArchiveExecutor::new(
            storage.archive.clone(),
            storage.filesystem.clone(),
            ARCHIVE_CONTAINER,
            DATA_REPO,
            metrics.archive().clone(),
        ));

        Ok(Self {
            catalog,
            storage,
            metrics,
            service,
            archive,
        })
    }

    /// Sweep settings that act on files instead of only logging
    pub fn live_config() -> RetentionConfig {
        RetentionConfig {
            enabled: true,
            dry_run: false,
            ..Default::default()
        }
    }

    pub fn enforcer(&self, config: RetentionConfig) -> RetentionEnforcer {
        RetentionEnforcer::new(
            self.storage.filesystem.clone(),
            self.archive.clone(),
            config,
            self.metrics.clone(),
        )
    }
}
