//! Catalog service: holds the latest snapshot and routes operator mutations.
//!
//! Reads are answered from the last completed snapshot. Mutations are
//! validated and written to the metadata store; they show up in reads once
//! the next [`CatalogService::refresh`] has run.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use common::ServiceContext;
use common::dataset::{DatasetEntry, DatasetUpdate};
use common::store::{HierarchicalStore, MetadataStore, parent};
use common::walker::DirectoryWalker;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::collector::{discover_datasets, load_persisted};
use crate::error::CatalogError;
use crate::reconciler::{CatalogSnapshot, ReconcileReport, reconcile_with_report};
use crate::validation::{apply_update, validate_id};

/// One operator mutation in a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogMutation {
    Write { id: String, update: DatasetUpdate },
    Delete { id: String },
}

impl CatalogMutation {
    pub fn id(&self) -> &str {
        match self {
            CatalogMutation::Write { id, .. } | CatalogMutation::Delete { id } => id,
        }
    }
}

/// Per-item outcome of [`CatalogService::apply`].
#[derive(Debug, Default)]
pub struct BatchResult {
    pub applied: Vec<String>,
    pub failed: Vec<(String, CatalogError)>,
}

pub struct CatalogService {
    filesystem: Arc<dyn HierarchicalStore>,
    metadata: Option<Arc<dyn MetadataStore>>,
    data_repo: String,
    table: String,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    generation: AtomicU64,
    /// Held for a whole reconciliation cycle so cycles never overlap.
    refresh_lock: Mutex<()>,
}

impl CatalogService {
    pub fn new(
        filesystem: Arc<dyn HierarchicalStore>,
        metadata: Option<Arc<dyn MetadataStore>>,
        data_repo: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            filesystem,
            metadata,
            data_repo: data_repo.into(),
            table: table.into(),
            snapshot: RwLock::new(Arc::new(CatalogSnapshot::empty())),
            generation: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn from_context(context: &ServiceContext) -> Self {
        Self::new(
            context.filesystem.clone(),
            context.metadata.clone(),
            context.config.filesystem.data_repo.clone(),
            context.config.metadata.table.clone(),
        )
    }

    pub fn metadata_available(&self) -> bool {
        self.metadata.is_some()
    }

    /// Run one reconciliation cycle and publish its snapshot.
    ///
    /// Concurrent callers queue up; generations are published in order.
    pub async fn refresh(&self) -> ReconcileReport {
        let _cycle = self.refresh_lock.lock().await;
        self.reconcile_and_publish().await
    }

    /// Reconcile only if no snapshot has been published yet.
    ///
    /// Returns `None` when another caller already published one, including
    /// a cycle that was in flight when this was called.
    pub async fn ensure_loaded(&self) -> Option<ReconcileReport> {
        let _cycle = self.refresh_lock.lock().await;
        if self.generation.load(Ordering::SeqCst) > 0 {
            return None;
        }
        Some(self.reconcile_and_publish().await)
    }

    async fn reconcile_and_publish(&self) -> ReconcileReport {
        let discovered = discover_datasets(self.filesystem.as_ref(), &self.data_repo).await;
        let persisted = load_persisted(self.metadata.as_deref(), &self.table).await;

        let (snapshot, report) = reconcile_with_report(&discovered, &persisted);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(snapshot.with_generation(generation));

        *self.snapshot.write().await = snapshot;

        info!(
            generation,
            matched = report.matched,
            discovered = report.discovered,
            orphaned = report.orphaned,
            duplicates = report.duplicates,
            "Catalog reconciled"
        );
        report
    }

    /// The last completed snapshot.
    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.read().await.clone()
    }

    pub async fn list(&self) -> Vec<DatasetEntry> {
        self.snapshot()
            .await
            .records()
            .map(|record| record.to_entry())
            .collect()
    }

    pub async fn get(&self, id: &str) -> Result<DatasetEntry, CatalogError> {
        self.snapshot()
            .await
            .get(id)
            .map(|record| record.to_entry())
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    /// Directories under the dataset path that directly hold files.
    pub async fn partitions(&self, id: &str) -> Result<Vec<String>, CatalogError> {
        let snapshot = self.snapshot().await;
        let record = snapshot
            .get(id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;

        let mut walker = match DirectoryWalker::open(self.filesystem.clone(), &record.path).await
        {
            Ok(walker) => walker,
            Err(e) => {
                warn!(id, path = %record.path, error = %e, "Cannot walk dataset for partitions");
                return Ok(Vec::new());
            }
        };

        let mut partitions = BTreeSet::new();
        while let Some(item) = walker.next().await {
            match item {
                Ok(entry) if !entry.is_dir => {
                    if let Some(dir) = parent(&entry.path) {
                        partitions.insert(dir.to_string());
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(id, error = %e, "Skipping unreadable partition entry"),
            }
        }
        Ok(partitions.into_iter().collect())
    }

    fn metadata(&self) -> Result<&Arc<dyn MetadataStore>, CatalogError> {
        self.metadata
            .as_ref()
            .ok_or(CatalogError::MetadataUnavailable)
    }

    /// Create or update a dataset record.
    pub async fn write(
        &self,
        id: &str,
        update: &DatasetUpdate,
    ) -> Result<DatasetEntry, CatalogError> {
        let snapshot = self.snapshot().await;
        let record = apply_update(id, snapshot.get(id), update)?;
        let metadata = self.metadata()?;

        metadata
            .put(&self.table, &record.id, &record.to_fields())
            .await?;
        info!(
            id,
            policy = %record.policy,
            mode = %record.mode,
            retention = ?record.retention,
            "Dataset record written"
        );
        Ok(record.to_entry())
    }

    /// Remove the persisted record of a dataset.
    pub async fn delete(&self, id: &str) -> Result<(), CatalogError> {
        validate_id(id)?;
        if self.snapshot().await.get(id).is_none() {
            return Err(CatalogError::NotFound(id.to_string()));
        }
        let metadata = self.metadata()?;
        metadata.delete(&self.table, id).await?;
        info!(id, "Dataset record deleted");
        Ok(())
    }

    /// Apply mutations in order. A failing item is recorded and the rest still run.
    pub async fn apply(&self, mutations: Vec<CatalogMutation>) -> BatchResult {
        let mut result = BatchResult::default();
        for mutation in mutations {
            let id = mutation.id().to_string();
            let outcome = match &mutation {
                CatalogMutation::Write { id, update } => self.write(id, update).await.map(|_| ()),
                CatalogMutation::Delete { id } => self.delete(id).await,
            };
            match outcome {
                Ok(()) => result.applied.push(id),
                Err(e) => {
                    warn!(id = %id, error = %e, "Catalog mutation failed");
                    result.failed.push((id, e));
                }
            }
        }
        debug!(
            applied = result.applied.len(),
            failed = result.failed.len(),
            "Catalog batch applied"
        );
        result
    }
}

/// Refresh the catalog every `interval` until the task is aborted.
///
/// The first cycle runs immediately; a cycle always completes before the
/// next tick is awaited.
pub fn spawn_sync_loop(service: Arc<CatalogService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            debug!("Running catalog reconciliation cycle");
            service.refresh().await;
        }
    })
}
