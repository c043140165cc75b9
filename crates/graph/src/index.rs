use crate::error::Result;
use crate::types::{Attrs, FileAttrs, NodeId, RelationshipType};
use async_trait::async_trait;

/// Derived relationship graph, scoped per project.
#[async_trait]
pub trait GraphIndex: Send + Sync {
    /// Create or replace the file node and its declared symbols.
    ///
    /// Symbols of `path` that are not listed in `attrs` are removed, and every edge leaving the
    /// file or its symbols is dropped so the caller can re-add the current set.
    async fn upsert_file_node(&self, project_id: &str, path: &str, attrs: FileAttrs)
        -> Result<NodeId>;

    async fn upsert_relationship(
        &self,
        project_id: &str,
        from: &NodeId,
        to: &NodeId,
        relationship: RelationshipType,
        attrs: Attrs,
    ) -> Result<()>;

    /// Remove the file node, its symbols and every incident edge. Absent files succeed.
    async fn delete_nodes_for_file(&self, project_id: &str, path: &str) -> Result<()>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Used when graph updates are disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGraphIndex;

#[async_trait]
impl GraphIndex for NoopGraphIndex {
    async fn upsert_file_node(
        &self,
        _project_id: &str,
        path: &str,
        _attrs: FileAttrs,
    ) -> Result<NodeId> {
        Ok(NodeId::file(path))
    }

    async fn upsert_relationship(
        &self,
        _project_id: &str,
        _from: &NodeId,
        _to: &NodeId,
        _relationship: RelationshipType,
        _attrs: Attrs,
    ) -> Result<()> {
        Ok(())
    }

    async fn delete_nodes_for_file(&self, _project_id: &str, _path: &str) -> Result<()> {
        Ok(())
    }
}
