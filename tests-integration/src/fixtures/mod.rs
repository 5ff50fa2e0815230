//! Test fixtures for integration testing
//!
//! This module provides reusable test contexts for the metadata store, the
//! dataset filesystem and complete retention scenarios.

mod catalog_context;
mod retention_context;
mod storage_context;

pub use catalog_context::CatalogTestContext;
pub use retention_context::{ARCHIVE_CONTAINER, DATA_REPO, RetentionTestContext};
pub use storage_context::StorageTestContext;
