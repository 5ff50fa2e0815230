//! Retention Policy Evaluator
//!
//! Walks one sweep target in post-order and applies a [`FileAction`] to the
//! files its [`RetentionPolicy`] selects.
//!
//! ## Age policy
//!
//! Every file modified at or before the cutoff is actioned. No early exit.
//!
//! ## Size policy
//!
//! The subtree size is computed first. When it exceeds the threshold, files
//! are actioned in walk order, each one subtracting its size from a running
//! total, until the total fits.
//!
//! Under both policies a directory left empty after its contents were
//! processed is removed. The target root itself is never removed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::store::{HierarchicalStore, StoreError};
use common::walker::{DirectoryWalker, WalkEntry, subtree_size};
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::action::FileAction;
use super::metrics::RetentionMetrics;
use super::policy::{RetentionCutoff, RetentionPolicy};

/// Result of evaluating one target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationOutcome {
    pub target: String,
    /// The target did not exist; nothing was done.
    pub missing_root: bool,
    pub files_evaluated: usize,
    /// Files the action succeeded on, or would have in dry-run mode.
    pub files_actioned: usize,
    pub bytes_actioned: u64,
    pub action_failures: usize,
    pub dirs_pruned: usize,
    /// Entries that could not be listed, stat'ed or pruned.
    pub walk_errors: usize,
    pub actioned_paths: Vec<String>,
}

impl EvaluationOutcome {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..Default::default()
        }
    }
}

pub struct RetentionEvaluator {
    filesystem: Arc<dyn HierarchicalStore>,
    metrics: RetentionMetrics,
    dry_run: bool,
}

impl RetentionEvaluator {
    pub fn new(
        filesystem: Arc<dyn HierarchicalStore>,
        metrics: RetentionMetrics,
        dry_run: bool,
    ) -> Self {
        Self {
            filesystem,
            metrics,
            dry_run,
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Evaluate `policy` over the subtree at `root`, relative to `now`.
    pub async fn evaluate(
        &self,
        root: &str,
        policy: &RetentionPolicy,
        action: &dyn FileAction,
        now: DateTime<Utc>,
    ) -> EvaluationOutcome {
        let mut outcome = EvaluationOutcome::new(root);
        self.metrics.record_target_evaluated();

        match policy {
            RetentionPolicy::Age { max_age } => match RetentionCutoff::compute(*max_age, now) {
                Ok(cutoff) => {
                    debug!(root, cutoff = %cutoff.display(), "Evaluating age policy");
                    self.evaluate_age(root, &cutoff, action, &mut outcome).await;
                }
                Err(e) => {
                    warn!(root, error = %e, "Skipping target with unusable age threshold");
                    outcome.walk_errors += 1;
                }
            },
            RetentionPolicy::Size { max_bytes } => {
                self.evaluate_size(root, *max_bytes, action, &mut outcome)
                    .await;
            }
        }

        self.metrics.record_files_evaluated(outcome.files_evaluated);
        outcome
    }

    async fn evaluate_age(
        &self,
        root: &str,
        cutoff: &RetentionCutoff,
        action: &dyn FileAction,
        outcome: &mut EvaluationOutcome,
    ) {
        let Some(walker) = self.open(root, outcome).await else {
            return;
        };
        let mut entries = Box::pin(walker.into_stream());

        while let Some(item) = entries.next().await {
            match item {
                Ok(entry) if entry.is_dir => {
                    if entry.path != root {
                        self.prune(&entry.path, outcome).await;
                    }
                }
                Ok(entry) => {
                    outcome.files_evaluated += 1;
                    if cutoff.is_expired(entry.modified) {
                        self.act(&entry, action, outcome).await;
                    }
                }
                Err(e) => self.walk_error(root, e, outcome),
            }
        }
    }

    async fn evaluate_size(
        &self,
        root: &str,
        max_bytes: u64,
        action: &dyn FileAction,
        outcome: &mut EvaluationOutcome,
    ) {
        let total = match subtree_size(self.filesystem.clone(), root).await {
            Ok(total) => total,
            Err(e) => {
                self.open_error(root, e, outcome);
                return;
            }
        };

        if total <= max_bytes {
            debug!(root, total, max_bytes, "Target within size threshold");
            return;
        }

        info!(root, total, max_bytes, "Target exceeds size threshold");

        let Some(walker) = self.open(root, outcome).await else {
            return;
        };
        let mut entries = Box::pin(walker.into_stream());
        let mut remaining = total;

        while let Some(item) = entries.next().await {
            match item {
                Ok(entry) if entry.is_dir => {
                    if entry.path != root {
                        self.prune(&entry.path, outcome).await;
                    }
                }
                Ok(entry) => {
                    outcome.files_evaluated += 1;
                    if remaining > max_bytes {
                        // A failed action still counts; retrying it would not free space.
                        self.act(&entry, action, outcome).await;
                        remaining = remaining.saturating_sub(entry.size);
                    }
                }
                Err(e) => self.walk_error(root, e, outcome),
            }
        }
    }

    async fn open(&self, root: &str, outcome: &mut EvaluationOutcome) -> Option<DirectoryWalker> {
        match DirectoryWalker::open(self.filesystem.clone(), root).await {
            Ok(walker) => Some(walker),
            Err(e) => {
                self.open_error(root, e, outcome);
                None
            }
        }
    }

    fn open_error(&self, root: &str, error: StoreError, outcome: &mut EvaluationOutcome) {
        if error.is_not_found() {
            warn!(root, "Sweep target does not exist, skipping");
            outcome.missing_root = true;
        } else {
            warn!(root, error = %error, "Failed to walk sweep target");
            outcome.walk_errors += 1;
        }
    }

    fn walk_error(&self, root: &str, error: StoreError, outcome: &mut EvaluationOutcome) {
        warn!(root, error = %error, "Skipping unreadable entry");
        outcome.walk_errors += 1;
    }

    async fn act(&self, entry: &WalkEntry, action: &dyn FileAction, outcome: &mut EvaluationOutcome) {
        if self.dry_run {
            info!(
                path = %entry.path,
                size = entry.size,
                action = %action.kind(),
                "[DRY RUN] Would {} file",
                action.kind()
            );
            self.metrics.record_dry_run_action();
            outcome.files_actioned += 1;
            outcome.bytes_actioned += entry.size;
            outcome.actioned_paths.push(entry.path.clone());
            return;
        }

        match action.apply(&entry.path).await {
            Ok(()) => {
                self.metrics.record_file_actioned(action.kind(), entry.size);
                outcome.files_actioned += 1;
                outcome.bytes_actioned += entry.size;
                outcome.actioned_paths.push(entry.path.clone());
            }
            Err(e) => {
                warn!(path = %entry.path, action = %action.kind(), error = %e, "File action failed");
                self.metrics.record_action_failure();
                outcome.action_failures += 1;
            }
        }
    }

    /// Remove `dir` if it has no children left.
    async fn prune(&self, dir: &str, outcome: &mut EvaluationOutcome) {
        if self.dry_run {
            return;
        }

        match self.filesystem.list_children(dir).await {
            Ok(children) if children.is_empty() => match self.filesystem.delete(dir).await {
                Ok(()) => {
                    debug!(dir, "Pruned empty directory");
                    self.metrics.record_dir_pruned();
                    outcome.dirs_pruned += 1;
                }
                Err(e) => {
                    warn!(dir, error = %e, "Failed to prune empty directory");
                    outcome.walk_errors += 1;
                }
            },
            Ok(_) => {}
            Err(e) => {
                warn!(dir, error = %e, "Failed to list directory for pruning");
                outcome.walk_errors += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::action::DeleteFile;
    use crate::retention::policy::BYTES_PER_GIGABYTE;
    use chrono::Duration;
    use common::testing::MemoryFileSystem;

    const GB: u64 = BYTES_PER_GIGABYTE;

    fn evaluator(fs: &Arc<MemoryFileSystem>, dry_run: bool) -> RetentionEvaluator {
        RetentionEvaluator::new(fs.clone(), RetentionMetrics::new_mock(), dry_run)
    }

    #[tokio::test]
    async fn test_size_policy_stops_once_under_threshold() {
        let fs = Arc::new(MemoryFileSystem::new());
        let now = Utc::now();
        fs.add_file("/data/f1", 3 * GB, now);
        fs.add_file("/data/f2", 5 * GB, now);
        fs.add_file("/data/f3", 2 * GB, now);

        let outcome = evaluator(&fs, false)
            .evaluate(
                "/data",
                &RetentionPolicy::size_gigabytes(4),
                &DeleteFile::new(fs.clone()),
                now,
            )
            .await;

        assert_eq!(outcome.actioned_paths, vec!["/data/f1", "/data/f2"]);
        assert_eq!(outcome.files_evaluated, 3);
        assert_eq!(fs.files(), vec!["/data/f3"]);
    }

    #[tokio::test]
    async fn test_size_policy_within_threshold_is_noop() {
        let fs = Arc::new(MemoryFileSystem::new());
        let now = Utc::now();
        fs.add_file("/data/a", 3 * GB, now);

        let outcome = evaluator(&fs, false)
            .evaluate(
                "/data",
                &RetentionPolicy::size_gigabytes(3),
                &DeleteFile::new(fs.clone()),
                now,
            )
            .await;

        assert_eq!(outcome.files_actioned, 0);
        assert_eq!(outcome.files_evaluated, 0);
        assert!(fs.contains("/data/a"));
    }

    #[tokio::test]
    async fn test_age_policy_actions_expired_and_prunes() {
        let fs = Arc::new(MemoryFileSystem::new());
        let now = Utc::now();
        fs.add_file("/data/old/a", 10, now - Duration::days(10));
        fs.add_file("/data/old/b", 10, now - Duration::days(3));
        fs.add_file("/data/mixed/c", 10, now - Duration::days(5));
        fs.add_file("/data/mixed/d", 10, now);
        fs.add_file("/data/edge", 10, now - Duration::days(2));

        let outcome = evaluator(&fs, false)
            .evaluate(
                "/data",
                &RetentionPolicy::age_days(2),
                &DeleteFile::new(fs.clone()),
                now,
            )
            .await;

        assert_eq!(outcome.files_evaluated, 5);
        assert_eq!(outcome.files_actioned, 4);
        assert_eq!(outcome.dirs_pruned, 1);
        assert_eq!(fs.files(), vec!["/data/mixed/d"]);
        assert!(!fs.contains("/data/old"));
        assert!(fs.contains("/data"));
    }

    #[tokio::test]
    async fn test_root_is_never_pruned() {
        let fs = Arc::new(MemoryFileSystem::new());
        let now = Utc::now();
        fs.add_file("/data/a", 1, now - Duration::days(30));
        fs.add_dir("/data/empty/nested");

        let outcome = evaluator(&fs, false)
            .evaluate(
                "/data",
                &RetentionPolicy::age_days(1),
                &DeleteFile::new(fs.clone()),
                now,
            )
            .await;

        assert_eq!(outcome.dirs_pruned, 2);
        assert!(fs.contains("/data"));
        assert!(fs.dirs().iter().all(|d| d == "/data"));
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let fs = Arc::new(MemoryFileSystem::new());
        let now = Utc::now();
        fs.add_file("/data/old/a", 10, now - Duration::days(10));
        fs.add_dir("/data/empty");

        let metrics = RetentionMetrics::new_mock();
        let outcome = RetentionEvaluator::new(fs.clone(), metrics.clone(), true)
            .evaluate(
                "/data",
                &RetentionPolicy::age_days(1),
                &DeleteFile::new(fs.clone()),
                now,
            )
            .await;

        assert_eq!(outcome.files_actioned, 1);
        assert_eq!(outcome.dirs_pruned, 0);
        assert!(fs.contains("/data/old/a"));
        assert!(fs.contains("/data/empty"));
        assert_eq!(metrics.dry_run_actions(), 1);
        assert_eq!(metrics.files_deleted(), 0);
    }

    #[tokio::test]
    async fn test_missing_root_is_noop() {
        let fs = Arc::new(MemoryFileSystem::new());
        let action = DeleteFile::new(fs.clone());
        let eval = evaluator(&fs, false);

        for policy in [RetentionPolicy::age_days(1), RetentionPolicy::size_gigabytes(1)] {
            let outcome = eval.evaluate("/nowhere", &policy, &action, Utc::now()).await;
            assert!(outcome.missing_root);
            assert_eq!(outcome.walk_errors, 0);
            assert_eq!(outcome.files_evaluated, 0);
        }
    }

    #[tokio::test]
    async fn test_action_failures_do_not_abort_walk() {
        let fs = Arc::new(MemoryFileSystem::new());
        let now = Utc::now();
        let old = now - Duration::days(10);
        fs.add_file("/data/a", 1, old);
        fs.add_file("/data/b", 1, old);
        fs.add_file("/data/c", 1, old);
        fs.fail_delete("/data/b");

        let metrics = RetentionMetrics::new_mock();
        let outcome = RetentionEvaluator::new(fs.clone(), metrics.clone(), false)
            .evaluate(
                "/data",
                &RetentionPolicy::age_days(1),
                &DeleteFile::new(fs.clone()),
                now,
            )
            .await;

        assert_eq!(outcome.files_actioned, 2);
        assert_eq!(outcome.action_failures, 1);
        assert_eq!(fs.files(), vec!["/data/b"]);
        assert_eq!(metrics.action_failures(), 1);
    }

    #[tokio::test]
    async fn test_size_failures_still_count_toward_total() {
        let fs = Arc::new(MemoryFileSystem::new());
        let now = Utc::now();
        fs.add_file("/data/f1", 3 * GB, now);
        fs.add_file("/data/f2", 5 * GB, now);
        fs.add_file("/data/f3", 2 * GB, now);
        fs.fail_delete("/data/f2");

        let outcome = evaluator(&fs, false)
            .evaluate(
                "/data",
                &RetentionPolicy::size_gigabytes(4),
                &DeleteFile::new(fs.clone()),
                now,
            )
            .await;

        assert_eq!(outcome.actioned_paths, vec!["/data/f1"]);
        assert_eq!(outcome.action_failures, 1);
        assert!(fs.contains("/data/f3"));
    }

    #[tokio::test]
    async fn test_size_pruning_runs_on_every_directory() {
        let fs = Arc::new(MemoryFileSystem::new());
        let now = Utc::now();
        fs.add_file("/data/a/big", 10, now);
        fs.add_dir("/data/z/empty");

        let outcome = evaluator(&fs, false)
            .evaluate(
                "/data",
                &RetentionPolicy::Size { max_bytes: 2 },
                &DeleteFile::new(fs.clone()),
                now,
            )
            .await;

        assert_eq!(outcome.files_actioned, 1);
        assert_eq!(outcome.dirs_pruned, 3);
        assert_eq!(fs.dirs(), vec!["/data"]);
    }
}
