//! Actions a retention sweep applies to expired files.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use common::dataset::Mode;
use common::store::{HierarchicalStore, StoreError};
use thiserror::Error;
use tracing::debug;

use crate::archive::ArchiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Delete,
    Archive,
}

impl ActionKind {
    /// The action a dataset mode selects. `Keep` selects none.
    pub fn from_mode(mode: Mode) -> Option<Self> {
        match mode {
            Mode::Keep => None,
            Mode::Archive => Some(Self::Archive),
            Mode::Delete => Some(Self::Delete),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Failed to delete {path}: {source}")]
    Delete { path: String, source: StoreError },

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Something done to a single file once a policy selects it.
#[async_trait]
pub trait FileAction: Send + Sync {
    fn kind(&self) -> ActionKind;

    async fn apply(&self, path: &str) -> Result<(), ActionError>;
}

/// Removes the file from the hierarchical store.
#[derive(Clone)]
pub struct DeleteFile {
    filesystem: Arc<dyn HierarchicalStore>,
}

impl DeleteFile {
    pub fn new(filesystem: Arc<dyn HierarchicalStore>) -> Self {
        Self { filesystem }
    }
}

#[async_trait]
impl FileAction for DeleteFile {
    fn kind(&self) -> ActionKind {
        ActionKind::Delete
    }

    async fn apply(&self, path: &str) -> Result<(), ActionError> {
        debug!(path, "Deleting file");
        self.filesystem
            .delete(path)
            .await
            .map_err(|source| ActionError::Delete {
                path: path.to_string(),
                source,
            })
    }
}
