use common::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("dataset '{0}' not found")]
    NotFound(String),

    #[error("invalid request: {0}")]
    SchemaViolation(String),

    #[error("metadata store unavailable, mutations are disabled")]
    MetadataUnavailable,

    #[error("metadata store error: {0}")]
    Store(#[from] StoreError),
}
