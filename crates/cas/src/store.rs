//! FileBlobStore: filesystem-backed object store.
//!
//! Implements the [`BlobStore`] contract using a local directory tree keyed by
//! object key.
//!
//! Layout:
//! ```text
//! {base_path}/
//! ├── objects/
//! │   └── {owner}/{chart}/{hash}        # object bytes
//! ├── metadata/
//! │   └── {owner}/{chart}/{hash}.json   # {content_type, size}
//! └── tmp/                              # atomic write scratch
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::config::CasConfig;
use crate::key::ObjectKey;
use crate::metadata::{content_type, BlobMetadata};

/// Errors surfaced by blob store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid object key segment: {0:?}")]
    InvalidKey(String),

    #[error("blob store is in read-only mode")]
    ReadOnly,

    #[error("failed to {op} {key}: {source}")]
    Io {
        op: &'static str,
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt metadata for {key}: {message}")]
    Metadata { key: String, message: String },

    #[error("backend error for {key}: {message}")]
    Backend { key: String, message: String },
}

impl StoreError {
    fn io(op: &'static str, key: &ObjectKey, source: std::io::Error) -> Self {
        StoreError::Io {
            op,
            key: key.to_string(),
            source,
        }
    }
}

/// Operation contract required from the object store.
///
/// Every operation is idempotent under content addressing: putting the same
/// key twice stores the same bytes, deleting a missing key succeeds.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `key` with the given content type.
    async fn put(&self, key: &ObjectKey, data: Bytes, content_type: &str)
        -> Result<(), StoreError>;

    /// Delete the object at `key`. Missing objects are not an error.
    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;

    /// Fetch an object's bytes.
    async fn get(&self, key: &ObjectKey) -> Result<Option<Bytes>, StoreError>;

    /// Fetch an object's metadata without its bytes.
    async fn head(&self, key: &ObjectKey) -> Result<Option<BlobMetadata>, StoreError>;

    /// List every key starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectKey>, StoreError>;

    async fn exists(&self, key: &ObjectKey) -> Result<bool, StoreError> {
        Ok(self.head(key).await?.is_some())
    }
}

/// Filesystem-based blob store.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    config: CasConfig,
}

impl FileBlobStore {
    /// Create a new store with the given configuration.
    ///
    /// Creates the objects, metadata and tmp directories if they don't exist
    /// (unless in read-only mode).
    pub async fn new(config: CasConfig) -> Result<Self, StoreError> {
        if !config.read_only {
            for dir in [config.objects_dir(), config.metadata_dir(), config.tmp_dir()] {
                fs::create_dir_all(&dir).await.map_err(|source| StoreError::Io {
                    op: "create directory",
                    key: dir.display().to_string(),
                    source,
                })?;
            }
        }

        Ok(Self { config })
    }

    /// Create a store at a specific path.
    pub async fn at_path(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::new(CasConfig::with_base_path(path)).await
    }

    pub fn config(&self) -> &CasConfig {
        &self.config
    }

    fn object_path(&self, key: &ObjectKey) -> PathBuf {
        key.segments()
            .fold(self.config.objects_dir(), |path, segment| path.join(segment))
    }

    fn metadata_path(&self, key: &ObjectKey) -> PathBuf {
        let mut path = self.config.metadata_dir();
        let mut segments = key.segments().peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                path = path.join(segment);
            } else {
                path = path.join(format!("{}.json", segment));
            }
        }
        path
    }

    /// Write via a scratch file and rename so readers never see partial objects.
    async fn write_atomic(&self, key: &ObjectKey, dest: &Path, data: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io("create prefix directory for", key, e))?;
        }

        let scratch = self.config.tmp_dir().join(Uuid::new_v4().simple().to_string());
        fs::write(&scratch, data)
            .await
            .map_err(|e| StoreError::io("write scratch file for", key, e))?;

        if let Err(e) = fs::rename(&scratch, dest).await {
            let _ = fs::remove_file(&scratch).await;
            return Err(StoreError::io("rename scratch file for", key, e));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn put(
        &self,
        key: &ObjectKey,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }

        let obj_path = self.object_path(key);

        // Content-addressed: an existing object already holds these bytes.
        if fs::try_exists(&obj_path)
            .await
            .map_err(|e| StoreError::io("stat", key, e))?
        {
            debug!(blob.key = %key, "object already present, skipping write");
        } else {
            self.write_atomic(key, &obj_path, &data).await?;
        }

        if self.config.store_metadata {
            let metadata = BlobMetadata::new(content_type, data.len() as u64);
            let json = serde_json::to_vec(&metadata).map_err(|e| StoreError::Metadata {
                key: key.to_string(),
                message: e.to_string(),
            })?;
            self.write_atomic(key, &self.metadata_path(key), &json).await?;
        }

        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }

        for path in [self.object_path(key), self.metadata_path(key)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io("delete", key, e)),
            }
        }
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> Result<Option<Bytes>, StoreError> {
        match fs::read(self.object_path(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io("read", key, e)),
        }
    }

    async fn head(&self, key: &ObjectKey) -> Result<Option<BlobMetadata>, StoreError> {
        let obj_meta = match fs::metadata(self.object_path(key)).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io("stat", key, e)),
        };

        match fs::read(self.metadata_path(key)).await {
            Ok(json) => serde_json::from_slice(&json)
                .map(Some)
                .map_err(|e| StoreError::Metadata {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            // No sidecar - infer size from file, use generic content type
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Some(BlobMetadata::new(
                content_type::OCTET_STREAM,
                obj_meta.len(),
            ))),
            Err(e) => Err(StoreError::io("read metadata for", key, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectKey>, StoreError> {
        let objects_dir = self.config.objects_dir();

        // Start from the deepest directory fully named by the prefix.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let mut start = objects_dir.clone();
        for segment in dir_part.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." || segment == "." {
                return Err(StoreError::InvalidKey(prefix.to_string()));
            }
            start = start.join(segment);
        }

        let mut keys = Vec::new();
        let mut stack = vec![start];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(StoreError::Io {
                        op: "list",
                        key: prefix.to_string(),
                        source,
                    })
                }
            };

            while let Some(entry) = entries.next_entry().await.map_err(|source| StoreError::Io {
                op: "list",
                key: prefix.to_string(),
                source,
            })? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|source| StoreError::Io {
                    op: "list",
                    key: prefix.to_string(),
                    source,
                })?;
                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&objects_dir) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(ObjectKey::parse(&key)?);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHash;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn key_for(data: &[u8]) -> ObjectKey {
        ObjectKey::blob("owner", "chart", &ContentHash::from_data(data)).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileBlobStore::at_path(temp_dir.path()).await?;

        let key = key_for(b"Hello, World!");
        store
            .put(&key, Bytes::from_static(b"Hello, World!"), "text/plain")
            .await?;

        let data = store.get(&key).await?.expect("should exist");
        assert_eq!(&data[..], b"Hello, World!");
        Ok(())
    }

    #[tokio::test]
    async fn test_head_reports_content_type() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileBlobStore::at_path(temp_dir.path()).await?;

        let key = key_for(b"png");
        store
            .put(&key, Bytes::from_static(b"png"), content_type::IMAGE_PNG)
            .await?;

        let meta = store.head(&key).await?.expect("should exist");
        assert_eq!(meta.content_type, "image/png");
        assert_eq!(meta.size, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_put_is_idempotent() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileBlobStore::at_path(temp_dir.path()).await?;

        let key = key_for(b"dup");
        store.put(&key, Bytes::from_static(b"dup"), "a/b").await?;
        store.put(&key, Bytes::from_static(b"dup"), "a/b").await?;

        assert_eq!(store.list("owner/chart/").await?, vec![key]);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileBlobStore::at_path(temp_dir.path()).await?;

        let key = key_for(b"never written");
        store.delete(&key).await?;
        assert!(!store.exists(&key).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_removes_object_and_sidecar() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileBlobStore::at_path(temp_dir.path()).await?;

        let key = key_for(b"gone");
        store.put(&key, Bytes::from_static(b"gone"), "a/b").await?;
        store.delete(&key).await?;

        assert!(store.get(&key).await?.is_none());
        assert!(store.head(&key).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_prefix() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileBlobStore::at_path(temp_dir.path()).await?;

        let blob = key_for(b"blob");
        let replay = ObjectKey::parse("owner/chart/replays/r1")?;
        let other = ObjectKey::parse("owner/other/replays/r1")?;
        for key in [&blob, &replay, &other] {
            store.put(key, Bytes::from_static(b"x"), "a/b").await?;
        }

        assert_eq!(store.list("owner/chart/replays/").await?, vec![replay.clone()]);
        assert_eq!(store.list("owner/chart/").await?.len(), 2);
        assert!(store.list("nobody/").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_read_only_prevents_writes() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileBlobStore::new(CasConfig::read_only(temp_dir.path())).await?;

        let result = store.put(&key_for(b"no"), Bytes::from_static(b"no"), "a/b").await;
        assert!(matches!(result, Err(StoreError::ReadOnly)));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_puts_same_key() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = Arc::new(FileBlobStore::at_path(temp_dir.path()).await?);
        let key = key_for(b"Concurrent Data");

        let mut handles = vec![];
        for _ in 0..10 {
            let store = store.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put(&key, Bytes::from_static(b"Concurrent Data"), "a/b")
                    .await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        let data = store.get(&key).await?.expect("should exist");
        assert_eq!(&data[..], b"Concurrent Data");
        Ok(())
    }
}
