use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{ByteStream, ChildEntry, FileStatus, HierarchicalStore, StoreError};

/// Chunk size for streamed reads.
const READ_CHUNK_BYTES: usize = 1024 * 1024;

/// A mounted filesystem, with store paths resolved below `root`.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)
            .map_err(|e| StoreError::from_io(&root.display().to_string(), e))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let mut resolved = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if segment == ".." {
                return Err(StoreError::InvalidPath {
                    path: path.to_string(),
                    reason: "parent directory references are not allowed".to_string(),
                });
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }
}

#[async_trait]
impl HierarchicalStore for LocalFileSystem {
    async fn list_children(&self, path: &str) -> Result<Vec<ChildEntry>, StoreError> {
        let dir = self.resolve(path)?;
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::from_io(path, e))?;

        let mut children = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| StoreError::from_io(path, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StoreError::from_io(path, e))?;
            children.push(ChildEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn stat(&self, path: &str) -> Result<FileStatus, StoreError> {
        let metadata = tokio::fs::metadata(self.resolve(path)?)
            .await
            .map_err(|e| StoreError::from_io(path, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| StoreError::from_io(path, e))?;
        Ok(FileStatus {
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified: DateTime::<Utc>::from(modified),
            is_dir: metadata.is_dir(),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        if target == self.root {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
                reason: "refusing to delete the filesystem root".to_string(),
            });
        }
        let metadata = tokio::fs::metadata(&target)
            .await
            .map_err(|e| StoreError::from_io(path, e))?;
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir(&target).await
        } else {
            tokio::fs::remove_file(&target).await
        };
        result.map_err(|e| StoreError::from_io(path, e))
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        let from = self.resolve(src)?;
        let to = self.resolve(dst)?;
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::from_io(dst, e))?;
        }
        tokio::fs::copy(&from, &to)
            .await
            .map_err(|e| StoreError::from_io(src, e))?;
        Ok(())
    }

    async fn mkdir_all(&self, path: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(self.resolve(path)?)
            .await
            .map_err(|e| StoreError::from_io(path, e))
    }

    async fn read(&self, path: &str) -> Result<Bytes, StoreError> {
        let data = tokio::fs::read(self.resolve(path)?)
            .await
            .map_err(|e| StoreError::from_io(path, e))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::from_io(path, e))?;
        }
        tokio::fs::write(&target, &data)
            .await
            .map_err(|e| StoreError::from_io(path, e))
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream, StoreError> {
        let file = tokio::fs::File::open(self.resolve(path)?)
            .await
            .map_err(|e| StoreError::from_io(path, e))?;

        let chunks = stream::try_unfold((file, path.to_string()), |(mut file, path)| async move {
            let mut buffer = BytesMut::with_capacity(READ_CHUNK_BYTES);
            let read = file
                .read_buf(&mut buffer)
                .await
                .map_err(|e| StoreError::from_io(&path, e))?;
            if read == 0 {
                Ok(None)
            } else {
                Ok(Some((buffer.freeze(), (file, path))))
            }
        });
        Ok(chunks.boxed())
    }

    async fn write_stream(&self, path: &str, mut data: ByteStream) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::from_io(path, e))?;
        }
        let mut file = tokio::fs::File::create(&target)
            .await
            .map_err(|e| StoreError::from_io(path, e))?;
        while let Some(chunk) = data.try_next().await? {
            file.write_all(&chunk)
                .await
                .map_err(|e| StoreError::from_io(path, e))?;
        }
        file.flush().await.map_err(|e| StoreError::from_io(path, e))
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        tokio::fs::try_exists(self.resolve(path)?)
            .await
            .map_err(|e| StoreError::from_io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalFileSystem) {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();
        (dir, fs)
    }

    #[tokio::test]
    async fn test_write_list_and_stat() {
        let (_dir, fs) = store();
        fs.write("/repo/source=a/b.avro", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        fs.mkdir_all("/repo/source=a/year=2024").await.unwrap();

        let children = fs.list_children("/repo/source=a").await.unwrap();
        assert_eq!(
            children,
            vec![ChildEntry::file("b.avro"), ChildEntry::dir("year=2024")]
        );

        let status = fs.stat("/repo/source=a/b.avro").await.unwrap();
        assert_eq!(status.size, 5);
        assert!(!status.is_dir);
    }

    #[tokio::test]
    async fn test_missing_path_is_not_found() {
        let (_dir, fs) = store();
        let err = fs.list_children("/nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!fs.exists("/nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_refuses_non_empty_directory() {
        let (_dir, fs) = store();
        fs.write("/d/f", Bytes::from_static(b"x")).await.unwrap();

        let err = fs.delete("/d").await.unwrap_err();
        assert!(matches!(err, StoreError::NotEmpty(_)));

        fs.delete("/d/f").await.unwrap();
        fs.delete("/d").await.unwrap();
        assert!(!fs.exists("/d").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_creates_parents() {
        let (_dir, fs) = store();
        fs.write("/a/f", Bytes::from_static(b"data")).await.unwrap();
        fs.copy("/a/f", "/b/c/f").await.unwrap();
        assert_eq!(fs.read("/b/c/f").await.unwrap(), Bytes::from_static(b"data"));
    }

    #[tokio::test]
    async fn test_streamed_write_and_read() {
        let (_dir, fs) = store();
        let data: Vec<u8> = (0..READ_CHUNK_BYTES * 5 / 2).map(|i| (i % 251) as u8).collect();
        let chunks: Vec<Result<Bytes, StoreError>> = data
            .chunks(4096)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        fs.write_stream("/big/part-1", stream::iter(chunks).boxed())
            .await
            .unwrap();

        let read: Vec<Bytes> = fs
            .read_stream("/big/part-1")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(read.len() >= 3);
        assert!(read.iter().all(|chunk| chunk.len() <= READ_CHUNK_BYTES));
        assert_eq!(read.concat(), data);
    }

    #[tokio::test]
    async fn test_read_stream_missing_file() {
        let (_dir, fs) = store();
        let err = fs.read_stream("/nope").await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_parent_references() {
        let (_dir, fs) = store();
        let err = fs.read("/../etc/passwd").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath { .. }));
    }
}
