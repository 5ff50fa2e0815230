//! datawarden cleaner library
//!
//! Retention sweeps over the dataset repository and archival of expired
//! files into the object store.

pub mod archive;
pub mod retention;

pub use archive::{ArchiveError, ArchiveExecutor, ArchiveManifest, RestoreResult};
pub use retention::{
    RetentionConfig, RetentionEnforcer, RetentionMetrics, SweepRunResult, spawn_sweep_loop,
};
