use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("content not found: {0}")]
    NotFound(String),

    #[error("blob store error: {0}")]
    Io(String),
}

/// Opaque content storage. The pipeline only ever hands out content refs
/// after an entitlement check; serving bytes is this collaborator's job.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, content_ref: &str) -> Result<Vec<u8>, BlobError>;
}
