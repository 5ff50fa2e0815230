//! Retention Sweep Metrics
//!
//! Thread-safe counters for retention sweeps and archive transfers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::action::ActionKind;

/// Thread-safe metrics for tracking retention sweeps
#[derive(Debug, Clone)]
pub struct RetentionMetrics {
    inner: Arc<MetricsInner>,
    archive: ArchiveMetrics,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Number of sweeps completed
    sweeps_completed: AtomicUsize,
    /// Number of sweep targets evaluated
    targets_evaluated: AtomicUsize,
    /// Total number of files evaluated against a policy
    files_evaluated: AtomicUsize,
    /// Files deleted by the delete action
    files_deleted: AtomicUsize,
    /// Actions that reported an error
    action_failures: AtomicUsize,
    /// Empty directories removed after their contents were processed
    dirs_pruned: AtomicUsize,
    /// Actions that were only logged because of dry-run mode
    dry_run_actions: AtomicUsize,
    /// Bytes removed from the hierarchical store
    bytes_reclaimed: AtomicU64,
    /// Total sweep duration in milliseconds
    total_duration_ms: AtomicU64,
}

impl Default for RetentionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RetentionMetrics {
    /// Create a new metrics tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
            archive: ArchiveMetrics::new(),
        }
    }

    /// Counters shared with the archive executor.
    pub fn archive(&self) -> &ArchiveMetrics {
        &self.archive
    }

    pub fn record_sweep_completed(&self, duration_ms: u64) {
        self.inner.sweeps_completed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_duration_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn record_target_evaluated(&self) {
        self.inner.targets_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_files_evaluated(&self, count: usize) {
        self.inner
            .files_evaluated
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Record a successful action on a file of `bytes` bytes
    pub fn record_file_actioned(&self, kind: ActionKind, bytes: u64) {
        if kind == ActionKind::Delete {
            self.inner.files_deleted.fetch_add(1, Ordering::Relaxed);
        }
        self.inner
            .bytes_reclaimed
            .fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_action_failure(&self) {
        self.inner.action_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dir_pruned(&self) {
        self.inner.dirs_pruned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dry_run_action(&self) {
        self.inner.dry_run_actions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sweeps_completed(&self) -> usize {
        self.inner.sweeps_completed.load(Ordering::Relaxed)
    }

    pub fn targets_evaluated(&self) -> usize {
        self.inner.targets_evaluated.load(Ordering::Relaxed)
    }

    pub fn files_evaluated(&self) -> usize {
        self.inner.files_evaluated.load(Ordering::Relaxed)
    }

    pub fn files_deleted(&self) -> usize {
        self.inner.files_deleted.load(Ordering::Relaxed)
    }

    pub fn action_failures(&self) -> usize {
        self.inner.action_failures.load(Ordering::Relaxed)
    }

    pub fn dirs_pruned(&self) -> usize {
        self.inner.dirs_pruned.load(Ordering::Relaxed)
    }

    pub fn dry_run_actions(&self) -> usize {
        self.inner.dry_run_actions.load(Ordering::Relaxed)
    }

    pub fn bytes_reclaimed(&self) -> u64 {
        self.inner.bytes_reclaimed.load(Ordering::Relaxed)
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.inner.total_duration_ms.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            sweeps_completed: self.sweeps_completed(),
            targets_evaluated: self.targets_evaluated(),
            files_evaluated: self.files_evaluated(),
            files_deleted: self.files_deleted(),
            files_archived: self.archive.files_archived(),
            files_restored: self.archive.files_restored(),
            action_failures: self.action_failures(),
            archive_failures: self.archive.archive_failures(),
            restore_failures: self.archive.restore_failures(),
            dirs_pruned: self.dirs_pruned(),
            dry_run_actions: self.dry_run_actions(),
            bytes_reclaimed: self.bytes_reclaimed(),
            total_duration_ms: self.total_duration_ms(),
        }
    }

    /// Create a new metrics instance for testing
    #[cfg(test)]
    pub fn new_mock() -> Self {
        Self::new()
    }
}

/// Counters for archive and restore transfers
#[derive(Debug, Clone, Default)]
pub struct ArchiveMetrics {
    inner: Arc<ArchiveMetricsInner>,
}

#[derive(Debug, Default)]
struct ArchiveMetricsInner {
    files_archived: AtomicUsize,
    archive_failures: AtomicUsize,
    files_restored: AtomicUsize,
    restore_failures: AtomicUsize,
}

impl ArchiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_archived(&self) {
        self.inner.files_archived.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_archive_failure(&self) {
        self.inner.archive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restored(&self) {
        self.inner.files_restored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restore_failure(&self) {
        self.inner.restore_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn files_archived(&self) -> usize {
        self.inner.files_archived.load(Ordering::Relaxed)
    }

    pub fn archive_failures(&self) -> usize {
        self.inner.archive_failures.load(Ordering::Relaxed)
    }

    pub fn files_restored(&self) -> usize {
        self.inner.files_restored.load(Ordering::Relaxed)
    }

    pub fn restore_failures(&self) -> usize {
        self.inner.restore_failures.load(Ordering::Relaxed)
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub sweeps_completed: usize,
    pub targets_evaluated: usize,
    pub files_evaluated: usize,
    pub files_deleted: usize,
    pub files_archived: usize,
    pub files_restored: usize,
    pub action_failures: usize,
    pub archive_failures: usize,
    pub restore_failures: usize,
    pub dirs_pruned: usize,
    pub dry_run_actions: usize,
    pub bytes_reclaimed: u64,
    pub total_duration_ms: u64,
}

impl MetricsSummary {
    /// Format bytes as MB with 2 decimal places
    fn format_mb(bytes: u64) -> String {
        format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
    }

    fn avg_duration_ms(&self) -> f64 {
        if self.sweeps_completed == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.sweeps_completed as f64
        }
    }

    /// Log the metrics summary
    pub fn log(&self) {
        log::info!("=== Retention Metrics Summary ===");
        log::info!(
            "Sweeps: {} completed, {} targets evaluated",
            self.sweeps_completed,
            self.targets_evaluated
        );
        log::info!(
            "Files: {} evaluated, {} deleted, {} archived, {} restored",
            self.files_evaluated,
            self.files_deleted,
            self.files_archived,
            self.files_restored
        );
        log::info!(
            "Failures: {} actions, {} archives, {} restores",
            self.action_failures,
            self.archive_failures,
            self.restore_failures
        );
        log::info!(
            "Directories pruned: {}, dry-run actions: {}",
            self.dirs_pruned,
            self.dry_run_actions
        );
        log::info!("Reclaimed: {} MB", Self::format_mb(self.bytes_reclaimed));
        log::info!("Average sweep duration: {:.2}ms", self.avg_duration_ms());
    }
}
