use crate::error::Result;
use async_trait::async_trait;

/// Derived embedding index, keyed by `(project_id, path)`.
///
/// Both operations are idempotent: upserting replaces every vector of the path, deleting an
/// absent path succeeds.
#[async_trait]
pub trait EmbeddingIndex: Send + Sync {
    async fn upsert(&self, project_id: &str, path: &str, content: &str) -> Result<()>;

    async fn delete(&self, project_id: &str, path: &str) -> Result<()>;

    /// Persist pending state. In-process indexes without a backing file do nothing.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Used when embeddings are disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmbeddingIndex;

#[async_trait]
impl EmbeddingIndex for NoopEmbeddingIndex {
    async fn upsert(&self, _project_id: &str, _path: &str, _content: &str) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _project_id: &str, _path: &str) -> Result<()> {
        Ok(())
    }
}
