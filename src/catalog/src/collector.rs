//! Producers feeding reconciliation.
//!
//! Both sources degrade to an empty list on failure so a reconciliation
//! cycle always runs.

use common::dataset::{DatasetRecord, SOURCE_PREFIX};
use common::store::{HierarchicalStore, MetadataStore, join};
use tracing::{debug, warn};

/// Datasets present on the filesystem: `source=<id>` directories directly
/// under the repository root.
pub async fn discover_datasets(
    filesystem: &dyn HierarchicalStore,
    data_repo: &str,
) -> Vec<DatasetRecord> {
    let children = match filesystem.list_children(data_repo).await {
        Ok(children) => children,
        Err(e) => {
            warn!(data_repo, error = %e, "Failed to list dataset repository");
            return Vec::new();
        }
    };

    let datasets: Vec<DatasetRecord> = children
        .into_iter()
        .filter(|child| child.is_dir)
        .filter_map(|child| {
            let id = child.name.strip_prefix(SOURCE_PREFIX)?;
            if id.is_empty() {
                return None;
            }
            Some(DatasetRecord::discovered(id, join(data_repo, &child.name)))
        })
        .collect();

    debug!(data_repo, count = datasets.len(), "Discovered datasets");
    datasets
}

/// Decodable records from the metadata table. Malformed rows are skipped.
pub async fn load_persisted(
    metadata: Option<&dyn MetadataStore>,
    table: &str,
) -> Vec<DatasetRecord> {
    let Some(metadata) = metadata else {
        debug!("No metadata store, persisted side is empty");
        return Vec::new();
    };

    let rows = match metadata.scan_all(table).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(table, error = %e, "Failed to scan metadata table");
            return Vec::new();
        }
    };

    rows.into_iter()
        .filter_map(|(key, fields)| match DatasetRecord::from_fields(&key, &fields) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(table, error = %e, "Skipping malformed metadata entry");
                None
            }
        })
        .collect()
}
