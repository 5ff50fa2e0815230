//! Retention Enforcement Engine
//!
//! Plans the jobs for one sweep from configuration and the catalog snapshot,
//! then evaluates them one at a time. Store calls within a sweep are never
//! issued concurrently.
//!
//! ## Safety Guarantees
//!
//! - Dry-run mode logs every action without touching either store
//! - A failing target or file is logged and the sweep moves on
//! - Archived files are removed only after their copy succeeded

use std::sync::Arc;
use std::time::Duration;

use catalog::{CatalogService, CatalogSnapshot};
use chrono::{DateTime, Utc};
use common::store::HierarchicalStore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::action::{ActionKind, DeleteFile, FileAction};
use super::config::RetentionConfig;
use super::evaluator::{EvaluationOutcome, RetentionEvaluator};
use super::job::{RetentionJob, plan_jobs};
use super::metrics::RetentionMetrics;
use crate::archive::ArchiveExecutor;

/// Result of one job across all of its targets
#[derive(Debug, Clone)]
pub struct JobResult {
    pub name: String,
    pub action: ActionKind,
    pub outcomes: Vec<EvaluationOutcome>,
}

impl JobResult {
    pub fn files_actioned(&self) -> usize {
        self.outcomes.iter().map(|o| o.files_actioned).sum()
    }

    pub fn action_failures(&self) -> usize {
        self.outcomes.iter().map(|o| o.action_failures).sum()
    }
}

/// Result of a complete sweep
#[derive(Debug, Clone)]
pub struct SweepRunResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub dry_run: bool,
    /// Catalog generation the dataset jobs were planned from.
    pub catalog_generation: u64,
    pub total_files_actioned: usize,
    pub total_action_failures: usize,
    pub total_bytes_actioned: u64,
    pub total_dirs_pruned: usize,
    pub job_results: Vec<JobResult>,
}

pub struct RetentionEnforcer {
    evaluator: RetentionEvaluator,
    delete: DeleteFile,
    archive: Arc<ArchiveExecutor>,
    metrics: RetentionMetrics,
    config: RetentionConfig,
}

impl RetentionEnforcer {
    pub fn new(
        filesystem: Arc<dyn HierarchicalStore>,
        archive: Arc<ArchiveExecutor>,
        config: RetentionConfig,
        metrics: RetentionMetrics,
    ) -> Self {
        Self {
            evaluator: RetentionEvaluator::new(filesystem.clone(), metrics.clone(), config.dry_run),
            delete: DeleteFile::new(filesystem),
            archive,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    pub fn metrics(&self) -> &RetentionMetrics {
        &self.metrics
    }

    fn action(&self, kind: ActionKind) -> &dyn FileAction {
        match kind {
            ActionKind::Delete => &self.delete,
            ActionKind::Archive => self.archive.as_ref(),
        }
    }

    /// Run one sweep over the static targets and every dataset in `snapshot`.
    pub async fn run_sweep(&self, snapshot: &CatalogSnapshot) -> SweepRunResult {
        let jobs = plan_jobs(&self.config, snapshot.records());
        self.run_jobs(&jobs, snapshot.generation(), Utc::now()).await
    }

    /// Evaluate `jobs` serially, relative to `now`.
    pub async fn run_jobs(
        &self,
        jobs: &[RetentionJob],
        catalog_generation: u64,
        now: DateTime<Utc>,
    ) -> SweepRunResult {
        let started_at = Utc::now();
        let run_id = format!("sweep_{}", started_at.timestamp_millis());

        info!(
            run_id = %run_id,
            jobs = jobs.len(),
            catalog_generation,
            dry_run = self.config.dry_run,
            "Starting retention sweep"
        );

        let mut job_results = Vec::with_capacity(jobs.len());
        for job in jobs {
            debug!(job = %job.name, policy = %job.policy, action = %job.action, "Running job");
            let action = self.action(job.action);

            let mut outcomes = Vec::with_capacity(job.targets.len());
            for target in &job.targets {
                let outcome = self.evaluator.evaluate(target, &job.policy, action, now).await;
                if outcome.action_failures > 0 || outcome.walk_errors > 0 {
                    warn!(
                        job = %job.name,
                        target = %target,
                        action_failures = outcome.action_failures,
                        walk_errors = outcome.walk_errors,
                        "Target evaluated with errors"
                    );
                }
                outcomes.push(outcome);
            }

            let result = JobResult {
                name: job.name.clone(),
                action: job.action,
                outcomes,
            };
            info!(
                job = %result.name,
                files_actioned = result.files_actioned(),
                action_failures = result.action_failures(),
                "Job completed"
            );
            job_results.push(result);
        }

        let completed_at = Utc::now();
        let all = || job_results.iter().flat_map(|r| r.outcomes.iter());
        let total_files_actioned: usize = all().map(|o| o.files_actioned).sum();
        let total_action_failures: usize = all().map(|o| o.action_failures).sum();
        let total_bytes_actioned: u64 = all().map(|o| o.bytes_actioned).sum();
        let total_dirs_pruned: usize = all().map(|o| o.dirs_pruned).sum();

        let duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;
        self.metrics.record_sweep_completed(duration_ms);

        info!(
            run_id = %run_id,
            jobs = job_results.len(),
            total_files_actioned,
            total_action_failures,
            total_bytes_actioned,
            total_dirs_pruned,
            duration_ms,
            "Retention sweep completed"
        );

        SweepRunResult {
            run_id,
            started_at,
            completed_at,
            dry_run: self.config.dry_run,
            catalog_generation,
            total_files_actioned,
            total_action_failures,
            total_bytes_actioned,
            total_dirs_pruned,
            job_results,
        }
    }
}

/// Sweep every `interval` until the task is aborted.
///
/// With `refresh_catalog` set the catalog is reconciled right before each
/// sweep; otherwise the sweep uses whatever snapshot another loop last
/// published, reconciling only if none has been published yet.
pub fn spawn_sweep_loop(
    enforcer: Arc<RetentionEnforcer>,
    catalog: Arc<CatalogService>,
    interval: Duration,
    refresh_catalog: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            debug!("Running retention sweep cycle");
            if refresh_catalog {
                catalog.refresh().await;
            } else {
                catalog.ensure_loaded().await;
            }
            let snapshot = catalog.snapshot().await;
            enforcer.run_sweep(&snapshot).await;
            enforcer.metrics().summary().log();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::policy::BYTES_PER_GIGABYTE;
    use catalog::reconcile;
    use chrono::Duration as TimeDelta;
    use common::config::AgedDirConfig;
    use common::dataset::{DatasetRecord, Mode, Policy};
    use common::store::ArchiveStore;
    use common::testing::MemoryFileSystem;
    use object_store::memory::InMemory;

    struct Fixture {
        fs: Arc<MemoryFileSystem>,
        metrics: RetentionMetrics,
        archive: Arc<ArchiveExecutor>,
    }

    fn fixture() -> Fixture {
        let fs = Arc::new(MemoryFileSystem::new());
        let metrics = RetentionMetrics::new_mock();
        let objects = Arc::new(ArchiveStore::new(Arc::new(InMemory::new()), fs.clone()));
        let archive = Arc::new(ArchiveExecutor::new(
            objects,
            fs.clone(),
            "archive",
            "/repo",
            metrics.archive().clone(),
        ));
        Fixture {
            fs,
            metrics,
            archive,
        }
    }

    fn enforcer(f: &Fixture, config: RetentionConfig) -> RetentionEnforcer {
        RetentionEnforcer::new(f.fs.clone(), f.archive.clone(), config, f.metrics.clone())
    }

    fn live() -> RetentionConfig {
        RetentionConfig {
            dry_run: false,
            ..Default::default()
        }
    }

    fn dataset(id: &str, policy: Policy, mode: Mode, retention: u64) -> DatasetRecord {
        DatasetRecord {
            id: id.to_string(),
            path: format!("/repo/source={id}"),
            policy,
            mode,
            retention: Some(retention),
        }
    }

    /// Reconcile as if every persisted dataset was also found on disk.
    fn catalog_of(persisted: &[DatasetRecord]) -> CatalogSnapshot {
        let discovered: Vec<_> = persisted
            .iter()
            .map(|r| DatasetRecord::discovered(r.id.clone(), r.path.clone()))
            .collect();
        reconcile(&discovered, persisted)
    }

    #[tokio::test]
    async fn test_sweep_applies_mode_per_dataset() {
        let f = fixture();
        let old = Utc::now() - TimeDelta::days(10);
        let archived = "/repo/source=netflow/year=2024/month=01/day=02/hour=03/part-1";
        f.fs.add_file_with_data(archived, "n", old);
        f.fs.add_file("/repo/source=dns/big", 2 * BYTES_PER_GIGABYTE, old);
        f.fs.add_file("/repo/source=kept/old", 1, old);

        let persisted = [
            dataset("netflow", Policy::Age, Mode::Archive, 1),
            dataset("dns", Policy::Size, Mode::Delete, 1),
            dataset("kept", Policy::Age, Mode::Keep, 1),
        ];
        let snapshot = catalog_of(&persisted);

        let result = enforcer(&f, live()).run_sweep(&snapshot).await;

        assert_eq!(result.job_results.len(), 2);
        assert_eq!(result.total_files_actioned, 2);
        assert!(!f.fs.contains(archived));
        assert!(!f.fs.contains("/repo/source=dns/big"));
        assert!(f.fs.contains("/repo/source=kept/old"));
        assert_eq!(f.metrics.archive().files_archived(), 1);
        assert_eq!(f.metrics.files_deleted(), 1);
    }

    #[tokio::test]
    async fn test_orphaned_datasets_are_not_swept() {
        let f = fixture();
        let old = Utc::now() - TimeDelta::days(10);
        f.fs.add_file("/repo/source=gone/file", 1, old);

        // Persisted but not discovered: reconciled as an integrity error.
        let snapshot = reconcile(&[], &[dataset("missing", Policy::Age, Mode::Delete, 1)]);
        let result = enforcer(&f, live()).run_sweep(&snapshot).await;

        assert!(result.job_results.is_empty());
        assert!(f.fs.contains("/repo/source=gone/file"));
    }

    #[tokio::test]
    async fn test_static_targets_and_missing_dirs() {
        let f = fixture();
        let now = Utc::now();
        f.fs.add_file("/tmp/spark/a", 100, now);
        f.fs.add_file("/var/old/a", 1, now - TimeDelta::hours(2));
        f.fs.add_file("/var/old/b", 1, now);

        let config = RetentionConfig {
            dry_run: false,
            general_dirs: vec!["/tmp/spark".to_string(), "/tmp/absent".to_string()],
            aged_dirs: vec![AgedDirConfig {
                path: "/var/old".to_string(),
                max_age: std::time::Duration::from_secs(3600),
            }],
            ..Default::default()
        };

        let result = enforcer(&f, config)
            .run_sweep(&CatalogSnapshot::empty())
            .await;

        assert_eq!(result.job_results.len(), 2);
        assert!(result.job_results[0].outcomes[1].missing_root);
        assert_eq!(f.fs.files(), vec!["/var/old/b"]);
        assert!(f.fs.contains("/tmp/spark"));
    }

    #[tokio::test]
    async fn test_dry_run_sweep_changes_nothing() {
        let f = fixture();
        let old = Utc::now() - TimeDelta::days(10);
        f.fs.add_file("/repo/source=dns/a", 1, old);
        let snapshot = catalog_of(&[dataset("dns", Policy::Age, Mode::Delete, 1)]);

        let result = enforcer(&f, RetentionConfig::default())
            .run_sweep(&snapshot)
            .await;

        assert!(result.dry_run);
        assert_eq!(result.total_files_actioned, 1);
        assert!(f.fs.contains("/repo/source=dns/a"));
        assert_eq!(f.metrics.dry_run_actions(), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_sweep() {
        let f = fixture();
        let old = Utc::now() - TimeDelta::days(10);
        f.fs.add_file("/repo/source=a/x", 1, old);
        f.fs.add_file("/repo/source=b/y", 1, old);
        f.fs.fail_delete("/repo/source=a/x");

        let snapshot = catalog_of(&[
            dataset("a", Policy::Age, Mode::Delete, 1),
            dataset("b", Policy::Age, Mode::Delete, 1),
        ]);
        let result = enforcer(&f, live()).run_sweep(&snapshot).await;

        assert_eq!(result.total_action_failures, 1);
        assert_eq!(result.total_files_actioned, 1);
        assert!(!f.fs.contains("/repo/source=b/y"));
        assert_eq!(f.metrics.sweeps_completed(), 1);
    }
}
