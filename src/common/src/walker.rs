//! Post-order traversal of a directory subtree.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::Stream;
use tracing::warn;

use crate::store::{ChildEntry, HierarchicalStore, StoreError, join};

/// One file or directory yielded by a [`DirectoryWalker`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
}

struct Frame {
    path: String,
    pending: VecDeque<ChildEntry>,
}

/// Lazy post-order walk: a directory is yielded after everything below it,
/// and the root comes last.
///
/// Listing happens one directory at a time as the walk descends, so the
/// caller may delete entries it has already been handed. A subtree that
/// cannot be listed, or an entry that cannot be stat'ed, is reported as an
/// `Err` item and the walk carries on with its siblings.
pub struct DirectoryWalker {
    store: Arc<dyn HierarchicalStore>,
    root: String,
    stack: Vec<Frame>,
}

impl DirectoryWalker {
    /// Start a walk. Fails when the root cannot be listed.
    pub async fn open(
        store: Arc<dyn HierarchicalStore>,
        root: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let mut walker = Self {
            store,
            root: root.into(),
            stack: Vec::new(),
        };
        walker.restart().await?;
        Ok(walker)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Begin again from the root with a fresh listing.
    pub async fn restart(&mut self) -> Result<(), StoreError> {
        let children = self.store.list_children(&self.root).await?;
        self.stack = vec![Frame {
            path: self.root.clone(),
            pending: children.into(),
        }];
        Ok(())
    }

    pub async fn next(&mut self) -> Option<Result<WalkEntry, StoreError>> {
        loop {
            let frame = self.stack.last_mut()?;
            match frame.pending.pop_front() {
                Some(child) => {
                    let path = join(&frame.path, &child.name);
                    if child.is_dir {
                        match self.store.list_children(&path).await {
                            Ok(children) => self.stack.push(Frame {
                                path,
                                pending: children.into(),
                            }),
                            Err(e) => return Some(Err(e)),
                        }
                    } else {
                        return Some(self.entry(path, false).await);
                    }
                }
                None => {
                    let finished = self.stack.pop()?;
                    return Some(self.entry(finished.path, true).await);
                }
            }
        }
    }

    async fn entry(&self, path: String, is_dir: bool) -> Result<WalkEntry, StoreError> {
        let status = self.store.stat(&path).await?;
        Ok(WalkEntry {
            path,
            size: if is_dir { 0 } else { status.size },
            modified: status.modified,
            is_dir,
        })
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<WalkEntry, StoreError>> + Send {
        futures::stream::unfold(self, |mut walker| async move {
            walker.next().await.map(|item| (item, walker))
        })
    }
}

/// Total size of the files below `root`. Entries that fail are logged and skipped.
pub async fn subtree_size(
    store: Arc<dyn HierarchicalStore>,
    root: &str,
) -> Result<u64, StoreError> {
    let mut walker = DirectoryWalker::open(store, root).await?;
    let mut total = 0u64;
    while let Some(item) = walker.next().await {
        match item {
            Ok(entry) if !entry.is_dir => total = total.saturating_add(entry.size),
            Ok(_) => {}
            Err(e) => warn!(root, error = %e, "Skipping unreadable entry while sizing"),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryFileSystem;
    use futures::StreamExt;

    fn tree() -> Arc<MemoryFileSystem> {
        let fs = MemoryFileSystem::new();
        fs.add_file("/d/a/1", 10, Utc::now());
        fs.add_file("/d/a/2", 20, Utc::now());
        fs.add_file("/d/b", 5, Utc::now());
        fs.add_dir("/d/c");
        Arc::new(fs)
    }

    async fn collect(walker: &mut DirectoryWalker) -> Vec<String> {
        let mut paths = Vec::new();
        while let Some(item) = walker.next().await {
            paths.push(item.unwrap().path);
        }
        paths
    }

    #[tokio::test]
    async fn test_post_order() {
        let mut walker = DirectoryWalker::open(tree(), "/d").await.unwrap();
        assert_eq!(
            collect(&mut walker).await,
            vec!["/d/a/1", "/d/a/2", "/d/a", "/d/b", "/d/c", "/d"]
        );
    }

    #[tokio::test]
    async fn test_restart() {
        let mut walker = DirectoryWalker::open(tree(), "/d").await.unwrap();
        let first = collect(&mut walker).await;
        walker.restart().await.unwrap();
        assert_eq!(collect(&mut walker).await, first);
    }

    #[tokio::test]
    async fn test_missing_root() {
        let err = DirectoryWalker::open(tree(), "/missing").await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unlistable_subtree_is_reported_and_skipped() {
        let fs = tree();
        fs.fail_path("/d/a");
        let mut walker = DirectoryWalker::open(fs, "/d").await.unwrap();

        let mut ok = Vec::new();
        let mut errors = 0;
        while let Some(item) = walker.next().await {
            match item {
                Ok(entry) => ok.push(entry.path),
                Err(_) => errors += 1,
            }
        }
        assert_eq!(errors, 1);
        assert_eq!(ok, vec!["/d/b", "/d/c", "/d"]);
    }

    #[tokio::test]
    async fn test_stream_and_sizes() {
        let fs = tree();
        let entries: Vec<_> = DirectoryWalker::open(fs.clone(), "/d")
            .await
            .unwrap()
            .into_stream()
            .collect()
            .await;
        assert_eq!(entries.len(), 6);

        assert_eq!(subtree_size(fs, "/d").await.unwrap(), 35);
    }
}
