//! Retention enforcement for the dataset repository.
//!
//! ## Architecture
//!
//! - `config`: sweep settings derived from the `[cleaner]` section
//! - `policy`: age and size policies, cutoff computation
//! - `job`: per-sweep job planning from configuration and the catalog
//! - `evaluator`: post-order evaluation of one target
//! - `action`: what happens to a selected file
//! - `enforcer`: serial execution of a sweep
//! - `metrics`: counters summarised after each sweep

pub mod action;
pub mod config;
pub mod enforcer;
pub mod evaluator;
pub mod job;
pub mod metrics;
pub mod policy;

pub use action::{ActionError, ActionKind, DeleteFile, FileAction};
pub use config::{RetentionConfig, RetentionConfigError};
pub use enforcer::{JobResult, RetentionEnforcer, SweepRunResult, spawn_sweep_loop};
pub use evaluator::{EvaluationOutcome, RetentionEvaluator};
pub use job::{JobSource, RetentionJob, plan_jobs};
pub use metrics::{ArchiveMetrics, MetricsSummary, RetentionMetrics};
pub use policy::{RetentionCutoff, RetentionPolicy, is_expired};
