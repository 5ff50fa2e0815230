//! In-memory store doubles with fault injection.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::store::{
    ChildEntry, FileStatus, Fields, HierarchicalStore, MetadataStore, StoreError, basename, parent,
};

#[derive(Clone, Debug)]
enum Node {
    Dir {
        modified: DateTime<Utc>,
    },
    File {
        size: u64,
        data: Bytes,
        modified: DateTime<Utc>,
    },
}

/// Hierarchical store held in a map keyed by absolute path.
///
/// Files can be sparse: [`MemoryFileSystem::add_file`] records a size
/// without allocating content, so multi-gigabyte trees are cheap to model.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    nodes: Mutex<BTreeMap<String, Node>>,
    failing: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn child_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{path}/")
    }
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.lock().insert(
            "/".to_string(),
            Node::Dir {
                modified: DateTime::<Utc>::UNIX_EPOCH,
            },
        );
        fs
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Node>> {
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn create_parents(nodes: &mut BTreeMap<String, Node>, path: &str, modified: DateTime<Utc>) {
        let mut current = parent(path);
        while let Some(dir) = current {
            nodes
                .entry(dir.to_string())
                .or_insert(Node::Dir { modified });
            current = parent(dir);
        }
    }

    /// Add a sparse file of `size` bytes, creating parent directories.
    pub fn add_file(&self, path: &str, size: u64, modified: DateTime<Utc>) {
        let path = normalize(path);
        let mut nodes = self.lock();
        Self::create_parents(&mut nodes, &path, modified);
        nodes.insert(
            path,
            Node::File {
                size,
                data: Bytes::new(),
                modified,
            },
        );
    }

    /// Add a file with real content.
    pub fn add_file_with_data(&self, path: &str, data: impl Into<Bytes>, modified: DateTime<Utc>) {
        let path = normalize(path);
        let data = data.into();
        let mut nodes = self.lock();
        Self::create_parents(&mut nodes, &path, modified);
        nodes.insert(
            path,
            Node::File {
                size: data.len() as u64,
                data,
                modified,
            },
        );
    }

    pub fn add_dir(&self, path: &str) {
        let path = normalize(path);
        let now = Utc::now();
        let mut nodes = self.lock();
        Self::create_parents(&mut nodes, &path, now);
        nodes.entry(path).or_insert(Node::Dir { modified: now });
    }

    /// Make every call on `path` fail with a remote error.
    pub fn fail_path(&self, path: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(normalize(path));
    }

    /// Make deletes of `path` fail with a remote error.
    pub fn fail_delete(&self, path: &str) {
        self.failing_deletes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(normalize(path));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().contains_key(&normalize(path))
    }

    /// All file paths, sorted.
    pub fn files(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, node)| matches!(node, Node::File { .. }))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// All directory paths below the root, sorted.
    pub fn dirs(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(path, node)| matches!(node, Node::Dir { .. }) && path.as_str() != "/")
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn check(&self, path: &str) -> Result<(), StoreError> {
        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(path)
        {
            return Err(StoreError::Remote(format!("injected failure on {path}")));
        }
        Ok(())
    }
}

#[async_trait]
impl HierarchicalStore for MemoryFileSystem {
    async fn list_children(&self, path: &str) -> Result<Vec<ChildEntry>, StoreError> {
        let path = normalize(path);
        self.check(&path)?;
        let nodes = self.lock();
        match nodes.get(&path) {
            None => return Err(StoreError::NotFound(path)),
            Some(Node::File { .. }) => {
                return Err(StoreError::Remote(format!("{path} is not a directory")));
            }
            Some(Node::Dir { .. }) => {}
        }
        let prefix = child_prefix(&path);
        Ok(nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/'))
            .map(|(key, node)| ChildEntry {
                name: basename(key).to_string(),
                is_dir: matches!(node, Node::Dir { .. }),
            })
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<FileStatus, StoreError> {
        let path = normalize(path);
        self.check(&path)?;
        match self.lock().get(&path) {
            None => Err(StoreError::NotFound(path)),
            Some(Node::Dir { modified }) => Ok(FileStatus {
                size: 0,
                modified: *modified,
                is_dir: true,
            }),
            Some(Node::File { size, modified, .. }) => Ok(FileStatus {
                size: *size,
                modified: *modified,
                is_dir: false,
            }),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let path = normalize(path);
        self.check(&path)?;
        if self
            .failing_deletes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&path)
        {
            return Err(StoreError::Remote(format!("injected delete failure on {path}")));
        }
        let mut nodes = self.lock();
        match nodes.get(&path) {
            None => return Err(StoreError::NotFound(path)),
            Some(Node::Dir { .. }) => {
                let prefix = child_prefix(&path);
                if nodes
                    .range(prefix.clone()..)
                    .next()
                    .is_some_and(|(key, _)| key.starts_with(&prefix))
                {
                    return Err(StoreError::NotEmpty(path));
                }
            }
            Some(Node::File { .. }) => {}
        }
        nodes.remove(&path);
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        let src = normalize(src);
        let dst = normalize(dst);
        self.check(&src)?;
        let mut nodes = self.lock();
        let node = match nodes.get(&src) {
            Some(node @ Node::File { .. }) => node.clone(),
            Some(Node::Dir { .. }) => {
                return Err(StoreError::Remote(format!("{src} is a directory")));
            }
            None => return Err(StoreError::NotFound(src)),
        };
        Self::create_parents(&mut nodes, &dst, Utc::now());
        nodes.insert(dst, node);
        Ok(())
    }

    async fn mkdir_all(&self, path: &str) -> Result<(), StoreError> {
        let path = normalize(path);
        self.check(&path)?;
        self.add_dir(&path);
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Bytes, StoreError> {
        let path = normalize(path);
        self.check(&path)?;
        match self.lock().get(&path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Dir { .. }) => Err(StoreError::Remote(format!("{path} is a directory"))),
            None => Err(StoreError::NotFound(path)),
        }
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
        let path = normalize(path);
        self.check(&path)?;
        self.add_file_with_data(&path, data, Utc::now());
        Ok(())
    }
}

/// Metadata store held in memory, with injectable scan and per-key failures.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    tables: Mutex<BTreeMap<String, BTreeMap<String, Fields>>>,
    fail_scan: AtomicBool,
    failing_keys: Mutex<HashSet<String>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, BTreeMap<String, Fields>>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn create_table(&self, table: &str) {
        self.lock().entry(table.to_string()).or_default();
    }

    /// Seed a row directly, creating the table.
    pub fn insert(&self, table: &str, key: &str, fields: Fields) {
        self.lock()
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), fields);
    }

    pub fn row(&self, table: &str, key: &str) -> Option<Fields> {
        self.lock().get(table).and_then(|rows| rows.get(key).cloned())
    }

    pub fn keys(&self, table: &str) -> Vec<String> {
        self.lock()
            .get(table)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn set_fail_scan(&self, fail: bool) {
        self.fail_scan.store(fail, Ordering::SeqCst);
    }

    /// Make `put` and `delete` of `key` fail.
    pub fn fail_key(&self, key: &str) {
        self.failing_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string());
    }

    fn check_key(&self, key: &str) -> Result<(), StoreError> {
        if self
            .failing_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
        {
            return Err(StoreError::Remote(format!("injected failure for row {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn ensure_table(&self, table: &str) -> Result<(), StoreError> {
        self.create_table(table);
        Ok(())
    }

    async fn scan_all(&self, table: &str) -> Result<Vec<(String, Fields)>, StoreError> {
        if self.fail_scan.load(Ordering::SeqCst) {
            return Err(StoreError::Remote("injected scan failure".to_string()));
        }
        self.lock()
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(key, fields)| (key.clone(), fields.clone()))
                    .collect()
            })
            .ok_or_else(|| StoreError::NotFound(table.to_string()))
    }

    async fn put(&self, table: &str, key: &str, fields: &Fields) -> Result<(), StoreError> {
        self.check_key(key)?;
        self.insert(table, key, fields.clone());
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<(), StoreError> {
        self.check_key(key)?;
        if let Some(rows) = self.lock().get_mut(table) {
            rows.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_fs_listing_and_delete() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/a/b/c", 3, Utc::now());
        fs.add_dir("/a/d");

        let children = fs.list_children("/a").await.unwrap();
        assert_eq!(children, vec![ChildEntry::dir("b"), ChildEntry::dir("d")]);

        assert!(matches!(
            fs.delete("/a/b").await,
            Err(StoreError::NotEmpty(_))
        ));
        fs.delete("/a/b/c").await.unwrap();
        fs.delete("/a/b").await.unwrap();
        assert_eq!(fs.dirs(), vec!["/a".to_string(), "/a/d".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_fs_sibling_prefixes_are_not_children() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/a/x", 1, Utc::now());
        fs.add_file("/ab/y", 1, Utc::now());

        assert_eq!(
            fs.list_children("/a").await.unwrap(),
            vec![ChildEntry::file("x")]
        );
    }

    #[tokio::test]
    async fn test_memory_metadata_failures() {
        let store = MemoryMetadataStore::new();
        store.ensure_table("t").await.unwrap();
        store.fail_key("bad");

        assert!(store.put("t", "bad", &Fields::new()).await.is_err());
        store.put("t", "good", &Fields::new()).await.unwrap();
        assert_eq!(store.keys("t"), vec!["good".to_string()]);

        store.set_fail_scan(true);
        assert!(store.scan_all("t").await.is_err());
    }
}
