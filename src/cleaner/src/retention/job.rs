//! Sweep job planning.
//!
//! Jobs are rebuilt for every sweep from the static targets in configuration
//! and the current catalog snapshot, run once, then dropped.

use common::dataset::{DatasetRecord, Mode, Policy};
use tracing::debug;

use super::action::ActionKind;
use super::config::RetentionConfig;
use super::policy::RetentionPolicy;

/// Name of the job covering `general_dirs`.
pub const GENERAL_DIRS_JOB: &str = "general_dirs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    /// From the `[cleaner]` configuration section.
    Static,
    /// From a catalog dataset record.
    Dataset { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionJob {
    pub name: String,
    pub source: JobSource,
    pub targets: Vec<String>,
    pub policy: RetentionPolicy,
    pub action: ActionKind,
}

impl RetentionJob {
    /// The job a dataset record asks for, if any.
    ///
    /// `keep` datasets, datasets flagged `integrity_error` and datasets
    /// without a threshold are left alone.
    pub fn for_dataset(record: &DatasetRecord) -> Option<Self> {
        if record.policy == Policy::IntegrityError {
            return None;
        }
        let action = ActionKind::from_mode(record.mode)?;
        let policy = RetentionPolicy::from_record(record)?;
        Some(Self {
            name: record.id.clone(),
            source: JobSource::Dataset {
                id: record.id.clone(),
            },
            targets: vec![record.path.clone()],
            policy,
            action,
        })
    }
}

/// Build the job list for one sweep.
///
/// Static targets come first, followed by catalog datasets in id order.
pub fn plan_jobs<'a>(
    config: &RetentionConfig,
    records: impl IntoIterator<Item = &'a DatasetRecord>,
) -> Vec<RetentionJob> {
    let mut jobs = Vec::new();

    if !config.general_dirs.is_empty() {
        jobs.push(RetentionJob {
            name: GENERAL_DIRS_JOB.to_string(),
            source: JobSource::Static,
            targets: config.general_dirs.clone(),
            policy: RetentionPolicy::Size {
                max_bytes: config.general_dirs_max_bytes,
            },
            action: ActionKind::Delete,
        });
    }

    for aged in &config.aged_dirs {
        jobs.push(RetentionJob {
            name: aged.path.clone(),
            source: JobSource::Static,
            targets: vec![aged.path.clone()],
            policy: RetentionPolicy::Age {
                max_age: aged.max_age,
            },
            action: ActionKind::Delete,
        });
    }

    for record in records {
        match RetentionJob::for_dataset(record) {
            Some(job) => jobs.push(job),
            None if record.mode == Mode::Keep => {}
            None => debug!(
                id = %record.id,
                policy = %record.policy,
                "Dataset has no usable retention policy, skipping"
            ),
        }
    }

    jobs
}
