//! Dataset catalog: discovery, reconciliation with persisted records, and
//! the service answering catalog reads and operator mutations.

pub mod collector;
pub mod error;
pub mod reconciler;
pub mod service;
pub mod validation;

pub use error::CatalogError;
pub use reconciler::{CatalogSnapshot, ReconcileReport, reconcile, reconcile_with_report};
pub use service::{BatchResult, CatalogMutation, CatalogService, spawn_sync_loop};
