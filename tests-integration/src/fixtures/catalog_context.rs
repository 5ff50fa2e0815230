//! Metadata store fixture for catalog integration tests

use anyhow::Result;
use catalog::CatalogService;
use common::config::MetadataConfig;
use common::dataset::DatasetRecord;
use common::store::{HierarchicalStore, MetadataStore, SqlMetadataStore};
use std::sync::Arc;

/// An in-memory SQLite metadata store with the dataset table created
pub struct CatalogTestContext {
    pub metadata: Arc<SqlMetadataStore>,
    pub table: String,
}

impl CatalogTestContext {
    pub async fn new_in_memory() -> Result<Self> {
        let config = MetadataConfig::in_memory();
        let metadata = Arc::new(SqlMetadataStore::connect(&config).await?);
        metadata.ensure_table(&config.table).await?;

        Ok(Self {
            metadata,
            table: config.table,
        })
    }

    /// Store a record the way an operator write would
    pub async fn persist(&self, record: &DatasetRecord) -> Result<()> {
        self.metadata
            .put(&self.table, &record.id, &record.to_fields())
            .await?;
        Ok(())
    }

    pub async fn persisted_ids(&self) -> Result<Vec<String>> {
        let rows = self.metadata.scan_all(&self.table).await?;
        Ok(rows.into_iter().map(|(key, _)| key).collect())
    }

    /// A catalog service over `filesystem` backed by this metadata store
    pub fn service(
        &self,
        filesystem: Arc<dyn HierarchicalStore>,
        data_repo: &str,
    ) -> CatalogService {
        CatalogService::new(
            filesystem,
            Some(self.metadata.clone() as Arc<dyn MetadataStore>),
            data_repo,
            self.table.clone(),
        )
    }
}
