//! Partitioned dataset trees laid out as `source=/year=/month=/day=/hour=`

use crate::fixtures::StorageTestContext;
use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

/// Configuration for generating a dataset tree
#[derive(Debug, Clone)]
pub struct DatasetGeneratorConfig {
    /// Number of hourly partitions, newest first
    pub partition_count: usize,
    /// Files per partition
    pub files_per_partition: usize,
    /// Bytes per file
    pub file_size: usize,
    /// Timestamp of the newest partition; older partitions step back one hour
    pub newest: DateTime<Utc>,
}

impl Default for DatasetGeneratorConfig {
    fn default() -> Self {
        Self {
            partition_count: 4,
            files_per_partition: 2,
            file_size: 16,
            newest: Utc::now(),
        }
    }
}

/// A dataset tree written by [`generate_dataset`]
#[derive(Debug, Clone)]
pub struct GeneratedDataset {
    pub id: String,
    pub path: String,
    /// File paths with their modification times, newest partition first
    pub files: Vec<(String, DateTime<Utc>)>,
}

impl GeneratedDataset {
    /// Files last modified at or before `cutoff`
    pub fn files_older_than(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut files: Vec<String> = self
            .files
            .iter()
            .filter(|(_, modified)| *modified <= cutoff)
            .map(|(path, _)| path.clone())
            .collect();
        files.sort();
        files
    }
}

/// Canonical directory of one hourly partition
pub fn partition_dir(repo: &str, id: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/source={id}/year={:04}/month={:02}/day={:02}/hour={:02}",
        repo.trim_end_matches('/'),
        at.year(),
        at.month(),
        at.day(),
        at.hour()
    )
}

/// Write a dataset tree under `repo` whose file mtimes match their partition
pub async fn generate_dataset(
    storage: &StorageTestContext,
    repo: &str,
    id: &str,
    config: &DatasetGeneratorConfig,
) -> Result<GeneratedDataset> {
    let mut files = Vec::new();

    for partition in 0..config.partition_count {
        let at = config.newest - Duration::hours(partition as i64);
        let dir = partition_dir(repo, id, at);
        for n in 0..config.files_per_partition {
            let path = format!("{dir}/part-{n:04}.avro");
            storage
                .write_file(&path, vec![b'x'; config.file_size], at)
                .await?;
            files.push((path, at));
        }
    }

    log::debug!("Generated dataset {id} with {} files", files.len());

    Ok(GeneratedDataset {
        id: id.to_string(),
        path: format!("{}/source={id}", repo.trim_end_matches('/')),
        files,
    })
}
