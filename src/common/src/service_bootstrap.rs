use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Configuration;
use crate::discovery::create_discovery;
use crate::storage::create_archive_store;
use crate::store::{
    ArchiveStore, HierarchicalStore, MetadataStore, ObjectStoreClient, SqlMetadataStore,
    create_hierarchical_store,
};

/// Store clients shared by a process, built once in its composition root.
#[derive(Clone)]
pub struct ServiceContext {
    pub config: Configuration,
    pub filesystem: Arc<dyn HierarchicalStore>,
    /// `None` when the metadata store could not be reached at startup.
    pub metadata: Option<Arc<dyn MetadataStore>>,
    pub archive: Arc<dyn ObjectStoreClient>,
}

impl ServiceContext {
    /// Resolve cluster endpoints and connect every store.
    ///
    /// A metadata store that cannot be reached is logged and left unset so the
    /// process keeps serving reads; every other failure is fatal.
    pub async fn initialize(mut config: Configuration) -> Result<Self> {
        let discovery =
            create_discovery(&config.discovery).context("Failed to set up cluster discovery")?;
        let endpoints = discovery
            .discover()
            .await
            .context("Failed to discover cluster endpoints")?;
        log::info!(
            "Discovered namenode(s) {} and metadata host {}",
            endpoints.hdfs_url,
            endpoints.metadata_url
        );
        config.apply_endpoints(&endpoints);

        let filesystem = create_hierarchical_store(&config.filesystem)
            .context("Failed to create filesystem client")?;

        let objects =
            create_archive_store(&config.archive).context("Failed to create archive store")?;
        let archive: Arc<dyn ObjectStoreClient> =
            Arc::new(ArchiveStore::new(objects, filesystem.clone()));

        let metadata = Self::connect_metadata(&config).await;

        Ok(Self {
            config,
            filesystem,
            metadata,
            archive,
        })
    }

    async fn connect_metadata(config: &Configuration) -> Option<Arc<dyn MetadataStore>> {
        if let Err(e) = ensure_data_directory(&config.metadata.dsn) {
            log::error!("Failed to prepare metadata directory: {e}");
            return None;
        }

        let store = match SqlMetadataStore::connect(&config.metadata).await {
            Ok(store) => store,
            Err(e) => {
                log::error!(
                    "Metadata store unavailable, operator mutations are disabled: {e}"
                );
                return None;
            }
        };

        if let Err(e) = store.ensure_table(&config.metadata.table).await {
            log::error!(
                "Failed to create metadata table {}: {e}",
                config.metadata.table
            );
            return None;
        }

        Some(Arc::new(store))
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM)
pub async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        log::info!("Received Ctrl+C");
    }

    Ok(())
}

/// Ensure the parent directory of a file-backed SQLite DSN exists.
pub fn ensure_data_directory(dsn: &str) -> Result<()> {
    let Some(file_path) = dsn
        .strip_prefix("sqlite://")
        .or_else(|| dsn.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };

    let file_path = file_path.split('?').next().unwrap_or(file_path);
    if file_path.is_empty() || file_path == ":memory:" {
        return Ok(());
    }

    if let Some(parent) = Path::new(file_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
        log::info!("Created data directory: {}", parent.display());
    }
    Ok(())
}
