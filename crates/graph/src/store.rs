use crate::error::{GraphError, Result};
use crate::graph::{GraphSnapshot, ProjectGraph};
use crate::index::GraphIndex;
use crate::types::{Attrs, FileAttrs, NodeId, RelationshipType};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub const GRAPH_FILE_NAME: &str = "graph.json";

/// In-process graph index (one [`ProjectGraph`] per project) with optional JSON persistence.
#[derive(Default)]
pub struct MemoryGraphIndex {
    projects: RwLock<BTreeMap<String, ProjectGraph>>,
    path: Option<PathBuf>,
}

impl MemoryGraphIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut projects = BTreeMap::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let snapshot: BTreeMap<String, GraphSnapshot> = serde_json::from_str(&raw)?;
                for (project, graph) in snapshot {
                    projects.insert(project, ProjectGraph::from_snapshot(graph));
                }
                log::debug!("Loaded graph from {}", path.display());
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(Self {
            projects: RwLock::new(projects),
            path: Some(path),
        })
    }

    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot: BTreeMap<String, GraphSnapshot> = self
            .projects
            .read()
            .await
            .iter()
            .map(|(project, graph)| (project.clone(), graph.snapshot()))
            .collect();
        let data = serde_json::to_vec(&snapshot)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, path).await?;
        log::debug!("Graph saved to {}", path.display());
        Ok(())
    }

    /// Run `f` against the project's graph (an empty graph if the project is unknown).
    pub async fn with_project<R>(&self, project_id: &str, f: impl FnOnce(&ProjectGraph) -> R) -> R {
        let projects = self.projects.read().await;
        match projects.get(project_id) {
            Some(graph) => f(graph),
            None => f(&ProjectGraph::new()),
        }
    }
}

#[async_trait]
impl GraphIndex for MemoryGraphIndex {
    async fn upsert_file_node(
        &self,
        project_id: &str,
        path: &str,
        attrs: FileAttrs,
    ) -> Result<NodeId> {
        let mut projects = self.projects.write().await;
        let graph = projects.entry(project_id.to_string()).or_default();
        Ok(graph.upsert_file(path, attrs))
    }

    async fn upsert_relationship(
        &self,
        project_id: &str,
        from: &NodeId,
        to: &NodeId,
        relationship: RelationshipType,
        attrs: Attrs,
    ) -> Result<()> {
        let mut projects = self.projects.write().await;
        let graph = projects.entry(project_id.to_string()).or_default();
        if graph.upsert_edge(from, to, relationship, attrs) {
            Ok(())
        } else {
            Err(GraphError::InvalidNodeId(format!("{from} -> {to}")))
        }
    }

    async fn delete_nodes_for_file(&self, project_id: &str, path: &str) -> Result<()> {
        let mut projects = self.projects.write().await;
        if let Some(graph) = projects.get_mut(project_id) {
            let removed = graph.remove_file(path);
            log::debug!("Removed {removed} graph nodes for {path}");
            if graph.node_count() == 0 {
                projects.remove(project_id);
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.save().await
    }
}
