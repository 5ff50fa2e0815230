use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::{StreamExt, TryStreamExt};
use object_store::{ObjectStore, PutMode, PutPayload, WriteMultipart, path::Path as ObjectPath};
use tracing::debug;

use super::{ByteStream, HierarchicalStore, ObjectStoreClient, StoreError};

/// Files up to this size are uploaded with one conditional put; larger ones
/// go through a multipart upload in parts of this size.
pub const MULTIPART_PART_BYTES: usize = 8 * 1024 * 1024;

/// Parts a multipart upload may have in flight at once.
const MAX_PARTS_IN_FLIGHT: usize = 4;

/// Archive blob store bridging an [`ObjectStore`] and the dataset filesystem.
#[derive(Clone)]
pub struct ArchiveStore {
    objects: Arc<dyn ObjectStore>,
    filesystem: Arc<dyn HierarchicalStore>,
    part_bytes: usize,
}

impl std::fmt::Debug for ArchiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveStore")
            .field("objects", &self.objects.to_string())
            .finish_non_exhaustive()
    }
}

impl ArchiveStore {
    pub fn new(objects: Arc<dyn ObjectStore>, filesystem: Arc<dyn HierarchicalStore>) -> Self {
        Self {
            objects,
            filesystem,
            part_bytes: MULTIPART_PART_BYTES,
        }
    }

    pub fn with_part_size(mut self, part_bytes: usize) -> Self {
        self.part_bytes = part_bytes;
        self
    }

    fn key(key: &str) -> Result<ObjectPath, StoreError> {
        ObjectPath::parse(key).map_err(|e| StoreError::InvalidPath {
            path: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Multipart upload of `head` followed by the rest of `data`.
    ///
    /// Multipart uploads cannot be made conditional, so a taken key is
    /// checked for up front.
    async fn upload_multipart(
        &self,
        location: &ObjectPath,
        head: BytesMut,
        data: &mut ByteStream,
    ) -> Result<(), StoreError> {
        match self.objects.head(location).await {
            Ok(_) => return Err(StoreError::AlreadyExists(location.to_string())),
            Err(object_store::Error::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        debug!(key = %location, "Starting multipart archive upload");
        let upload = self.objects.put_multipart(location).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, self.part_bytes);
        writer.write(&head);

        let streamed: Result<(), StoreError> = async {
            while let Some(chunk) = data.try_next().await? {
                writer.wait_for_capacity(MAX_PARTS_IN_FLIGHT).await?;
                writer.write(&chunk);
            }
            Ok::<(), StoreError>(())
        }
        .await;

        match streamed {
            Ok(()) => {
                writer.finish().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = writer.abort().await {
                    debug!(key = %location, error = %abort, "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ObjectStoreClient for ArchiveStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let prefix = Self::key(prefix)?;
        let mut keys: Vec<String> = self
            .objects
            .list(Some(&prefix))
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;
        keys.sort();
        Ok(keys)
    }

    async fn copy_in(&self, path: &str, key: &str) -> Result<(), StoreError> {
        let location = Self::key(key)?;
        let mut data = self.filesystem.read_stream(path).await?;

        let mut head = BytesMut::new();
        while head.len() <= self.part_bytes {
            match data.try_next().await? {
                Some(chunk) => head.extend_from_slice(&chunk),
                None => {
                    self.objects
                        .put_opts(
                            &location,
                            PutPayload::from_bytes(head.freeze()),
                            PutMode::Create.into(),
                        )
                        .await?;
                    return Ok(());
                }
            }
        }

        self.upload_multipart(&location, head, &mut data).await
    }

    async fn copy_out(&self, key: &str, path: &str) -> Result<(), StoreError> {
        let location = Self::key(key)?;
        let data = self
            .objects
            .get(&location)
            .await?
            .into_stream()
            .map_err(StoreError::from)
            .boxed();
        self.filesystem.write_stream(path, data).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let location = Self::key(key)?;
        self.objects.delete(&location).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalFileSystem;
    use bytes::Bytes;
    use object_store::memory::InMemory;
    use tempfile::TempDir;

    fn archive() -> (TempDir, Arc<LocalFileSystem>, ArchiveStore) {
        let dir = TempDir::new().unwrap();
        let fs = Arc::new(LocalFileSystem::new(dir.path()).unwrap());
        let store = ArchiveStore::new(Arc::new(InMemory::new()), fs.clone());
        (dir, fs, store)
    }

    #[tokio::test]
    async fn test_copy_in_then_list() {
        let (_dir, fs, store) = archive();
        fs.write("/data/f.avro", Bytes::from_static(b"abc"))
            .await
            .unwrap();

        store
            .copy_in("/data/f.avro", "archive/x/x-2024-f.avro")
            .await
            .unwrap();
        store.copy_in("/data/f.avro", "other/f.avro").await.unwrap();

        assert_eq!(
            store.list("archive").await.unwrap(),
            vec!["archive/x/x-2024-f.avro".to_string()]
        );
    }

    #[tokio::test]
    async fn test_copy_out_and_delete() {
        let (_dir, fs, store) = archive();
        fs.write("/data/f", Bytes::from_static(b"payload"))
            .await
            .unwrap();
        store.copy_in("/data/f", "archive/f").await.unwrap();

        store.copy_out("archive/f", "/restored/dir/f").await.unwrap();
        assert_eq!(
            fs.read("/restored/dir/f").await.unwrap(),
            Bytes::from_static(b"payload")
        );

        store.delete("archive/f").await.unwrap();
        assert!(store.list("archive").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_copy_out_missing_key() {
        let (_dir, _fs, store) = archive();
        let err = store.copy_out("archive/none", "/x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_copy_in_never_replaces_an_object() {
        let (_dir, fs, store) = archive();
        fs.write("/x/part-1", Bytes::from_static(b"AAA")).await.unwrap();
        fs.write("/y/part-1", Bytes::from_static(b"BBB")).await.unwrap();

        store.copy_in("/x/part-1", "archive/part-1").await.unwrap();
        let err = store.copy_in("/y/part-1", "archive/part-1").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        store.copy_out("archive/part-1", "/check").await.unwrap();
        assert_eq!(fs.read("/check").await.unwrap(), Bytes::from_static(b"AAA"));
    }

    #[tokio::test]
    async fn test_large_file_uses_multipart_upload() {
        let dir = TempDir::new().unwrap();
        let fs = Arc::new(LocalFileSystem::new(dir.path()).unwrap());
        let store =
            ArchiveStore::new(Arc::new(InMemory::new()), fs.clone()).with_part_size(5 * 1024 * 1024);

        let data: Vec<u8> = (0..12 * 1024 * 1024).map(|i| (i % 253) as u8).collect();
        fs.write("/big/part-1", Bytes::from(data.clone())).await.unwrap();

        store.copy_in("/big/part-1", "archive/big").await.unwrap();
        store.copy_out("archive/big", "/restored/big").await.unwrap();
        assert_eq!(fs.read("/restored/big").await.unwrap().as_ref(), data.as_slice());

        let err = store.copy_in("/big/part-1", "archive/big").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_copy_in_missing_file() {
        let (_dir, _fs, store) = archive();
        let err = store.copy_in("/nope", "archive/nope").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
