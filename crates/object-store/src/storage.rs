//! Object storage backend abstraction over a bucket directory.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Configuration for the object storage backend of a single bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// Local filesystem storage, rooted at the bucket's directory
    Local {
        /// Path to the bucket directory
        path: PathBuf,
    },
}

/// Listing entry for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Key of the object, relative to the bucket root
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Entity tag reported by the backend, if any
    pub e_tag: Option<String>,
}

impl From<ObjectMeta> for ObjectEntry {
    fn from(meta: ObjectMeta) -> Self {
        Self {
            key: meta.location.to_string(),
            size: meta.size as u64,
            e_tag: meta.e_tag,
        }
    }
}

/// Wrapper around different object storage backends.
#[derive(Debug, Clone)]
pub struct Storage {
    inner: Arc<dyn ObjectStore>,
}

impl Storage {
    /// Create a new storage backend from configuration.
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        let inner: Arc<dyn ObjectStore> = match &config {
            ObjectStoreConfig::Local { path } => {
                // Ensure directory exists
                tokio::fs::create_dir_all(path).await?;
                Arc::new(
                    LocalFileSystem::new_with_prefix(path)
                        .map_err(|e| StoreError::InvalidConfig(e.to_string()))?,
                )
            }
        };

        Ok(Self { inner })
    }

    #[cfg(test)]
    pub(crate) fn memory() -> Self {
        Self {
            inner: Arc::new(object_store::memory::InMemory::new()),
        }
    }

    fn path(key: &str) -> ObjectPath {
        ObjectPath::from(key)
    }

    /// List every object in the bucket, recursively.
    pub async fn list(&self) -> Result<Vec<ObjectEntry>> {
        let items: Vec<ObjectMeta> = self.inner.list(None).try_collect().await?;
        Ok(items.into_iter().map(ObjectEntry::from).collect())
    }

    /// Cheap readability check: pull at most one listing entry.
    pub async fn probe(&self) -> Result<()> {
        let mut stream = self.inner.list(None);
        stream.try_next().await?;
        Ok(())
    }

    /// Get metadata for one object.
    pub async fn head(&self, key: &str) -> Result<Option<ObjectEntry>> {
        match self.inner.head(&Self::path(key)).await {
            Ok(meta) => Ok(Some(meta.into())),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Get object data.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        match self.inner.get(&Self::path(key)).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Some(bytes))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Put object data, overwriting any existing object under the key.
    pub async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        self.inner.put(&Self::path(key), data.into()).await?;
        Ok(())
    }

    /// Copy one object into another storage under the same key.
    ///
    /// Backends behind different handles share no server-side copy, so the
    /// bytes are read and written through this process.
    pub async fn copy_to(&self, key: &str, dest: &Storage) -> Result<ObjectEntry> {
        let data = self
            .get(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        dest.put(key, data).await?;
        tracing::trace!(key, "copied object");
        dest.head(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}
