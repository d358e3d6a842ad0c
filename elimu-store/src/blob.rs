use async_trait::async_trait;
use elimu_core::blob::{BlobError, BlobStore};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;

/// Filesystem-backed content store. Content refs are paths relative to a
/// configured root; anything that escapes the root is rejected.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, content_ref: &str) -> Result<PathBuf, BlobError> {
        let rel = Path::new(content_ref);
        let escapes = rel.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(BlobError::NotFound(content_ref.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn fetch(&self, content_ref: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.resolve(content_ref)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(content_ref.to_string()))
            }
            Err(e) => Err(BlobError::Io(e.to_string())),
        }
    }
}

/// In-memory content store for tests and local development.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, content_ref: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.write().await.insert(content_ref.into(), bytes);
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn fetch(&self, content_ref: &str) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .read()
            .await
            .get(content_ref)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(content_ref.to_string()))
    }
}
