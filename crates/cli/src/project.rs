use anyhow::{Context as AnyhowContext, Result};
use context_graph::{MemoryGraphIndex, GRAPH_FILE_NAME};
use context_indexer::{
    Collaborators, HashStoreBackend, MemoryToolDataStore, SyncConfig, SyncManager,
    TOOL_DATA_FILE_NAME,
};
use context_vector_store::paths::embeddings_path;
use context_vector_store::{HashEmbedder, MemoryEmbeddingIndex};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Command-line values that win over `sync.toml` and the environment.
#[derive(Default)]
pub(crate) struct Overrides {
    pub(crate) backend: Option<HashStoreBackend>,
    pub(crate) state_dir: Option<PathBuf>,
}

/// A project root with its sync manager and file-backed downstream indexes.
pub(crate) struct Project {
    pub(crate) id: String,
    pub(crate) root: PathBuf,
    pub(crate) state_dir: PathBuf,
    pub(crate) manager: SyncManager,
}

impl Project {
    pub(crate) async fn open(
        path: &Path,
        project_id: Option<&str>,
        overrides: &Overrides,
    ) -> Result<Self> {
        let root = path.canonicalize().context("Invalid project path")?;
        let id = project_id
            .map(str::to_string)
            .unwrap_or_else(|| default_project_id(&root));

        let mut config = SyncConfig::load(&root).context("Failed to load sync config")?;
        if let Some(backend) = overrides.backend {
            config.backend = backend;
        }
        if let Some(dir) = &overrides.state_dir {
            let dir = if dir.is_absolute() {
                dir.clone()
            } else {
                std::env::current_dir()?.join(dir)
            };
            config.state_dir = Some(dir);
        }
        let state_dir = config.state_dir(&root);
        tokio::fs::create_dir_all(&state_dir)
            .await
            .with_context(|| format!("Failed to create {}", state_dir.display()))?;
        log::debug!("Project '{id}' at {} (state in {})", root.display(), state_dir.display());

        let embeddings =
            MemoryEmbeddingIndex::open(embeddings_path(&state_dir), HashEmbedder::default())
                .await
                .context("Failed to open embedding index")?;
        let graph = MemoryGraphIndex::open(state_dir.join(GRAPH_FILE_NAME))
            .await
            .context("Failed to open graph index")?;
        let tool_data = MemoryToolDataStore::open(state_dir.join(TOOL_DATA_FILE_NAME))
            .await
            .context("Failed to open tool data store")?;
        let collaborators = Collaborators {
            embeddings: Arc::new(embeddings),
            graph: Arc::new(graph),
            tool_data: Arc::new(tool_data),
        };

        let manager = SyncManager::open(&root, config, collaborators)
            .await
            .context("Failed to open hash store")?;
        Ok(Self {
            id,
            root,
            state_dir,
            manager,
        })
    }

    /// Flushes every store. Read-only commands drop the project instead.
    pub(crate) async fn close(self) -> Result<()> {
        self.manager
            .close()
            .await
            .with_context(|| format!("Failed to close state for '{}'", self.id))
    }
}

fn default_project_id(root: &Path) -> String {
    root.file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("default")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_defaults_to_directory_name() {
        assert_eq!(default_project_id(Path::new("/work/my-app")), "my-app");
        assert_eq!(default_project_id(Path::new("/")), "default");
    }
}
