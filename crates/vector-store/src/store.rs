use crate::embeddings::HashEmbedder;
use crate::error::Result;
use crate::index::EmbeddingIndex;
use crate::types::{EmbeddedChunk, StoredEmbedding};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Lines per embedded window
pub const CHUNK_LINES: usize = 40;

type ProjectEntries = BTreeMap<String, StoredEmbedding>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    model_id: String,
    projects: BTreeMap<String, ProjectEntries>,
}

/// In-process embedding index with optional JSON persistence.
pub struct MemoryEmbeddingIndex {
    embedder: HashEmbedder,
    projects: RwLock<BTreeMap<String, ProjectEntries>>,
    path: Option<PathBuf>,
}

impl MemoryEmbeddingIndex {
    pub fn new(embedder: HashEmbedder) -> Self {
        Self {
            embedder,
            projects: RwLock::new(BTreeMap::new()),
            path: None,
        }
    }

    /// Open (or start) an index persisted at `path`.
    ///
    /// A snapshot produced by a different embedder is discarded: its vectors are not comparable.
    pub async fn open(path: impl AsRef<Path>, embedder: HashEmbedder) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut projects = BTreeMap::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let snapshot: Snapshot = serde_json::from_str(&raw)?;
                if snapshot.model_id == embedder.model_id() {
                    projects = snapshot.projects;
                    log::debug!("Loaded embeddings from {}", path.display());
                } else {
                    log::warn!(
                        "Discarding embeddings at {} (model {} != {})",
                        path.display(),
                        snapshot.model_id,
                        embedder.model_id()
                    );
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(Self {
            embedder,
            projects: RwLock::new(projects),
            path: Some(path),
        })
    }

    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = Snapshot {
            model_id: self.embedder.model_id(),
            projects: self.projects.read().await.clone(),
        };
        let data = serde_json::to_vec(&snapshot)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, path).await?;
        log::debug!("Embeddings saved to {}", path.display());
        Ok(())
    }

    pub async fn len(&self, project_id: &str) -> usize {
        self.projects
            .read()
            .await
            .get(project_id)
            .map_or(0, BTreeMap::len)
    }

    pub async fn contains(&self, project_id: &str, path: &str) -> bool {
        self.projects
            .read()
            .await
            .get(project_id)
            .is_some_and(|entries| entries.contains_key(path))
    }

    pub async fn paths(&self, project_id: &str) -> Vec<String> {
        self.projects
            .read()
            .await
            .get(project_id)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn embed_file(&self, path: &str, content: &str) -> StoredEmbedding {
        let lines: Vec<&str> = content.lines().collect();
        let mut chunks = Vec::new();
        for (idx, window) in lines.chunks(CHUNK_LINES).enumerate() {
            let text = window.join("\n");
            if text.trim().is_empty() {
                continue;
            }
            let start_line = idx * CHUNK_LINES + 1;
            chunks.push(EmbeddedChunk {
                start_line,
                end_line: start_line + window.len() - 1,
                vector: self.embedder.embed(&text),
            });
        }
        StoredEmbedding {
            path: path.to_string(),
            chunks,
        }
    }
}

#[async_trait]
impl EmbeddingIndex for MemoryEmbeddingIndex {
    async fn upsert(&self, project_id: &str, path: &str, content: &str) -> Result<()> {
        let stored = self.embed_file(path, content);
        log::debug!("Embedded {path} ({} chunks)", stored.chunks.len());
        self.projects
            .write()
            .await
            .entry(project_id.to_string())
            .or_default()
            .insert(path.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, project_id: &str, path: &str) -> Result<()> {
        let mut projects = self.projects.write().await;
        if let Some(entries) = projects.get_mut(project_id) {
            entries.remove(path);
            if entries.is_empty() {
                projects.remove(project_id);
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn upsert_replaces_and_delete_removes() {
        let index = MemoryEmbeddingIndex::new(HashEmbedder::default());
        index.upsert("p", "src/a.rs", "fn a() {}").await.unwrap();
        index.upsert("p", "src/a.rs", "fn a() { 1 }").await.unwrap();
        index.upsert("p", "src/b.rs", "fn b() {}").await.unwrap();
        assert_eq!(index.len("p").await, 2);

        index.delete("p", "src/a.rs").await.unwrap();
        index.delete("p", "missing.rs").await.unwrap();
        assert_eq!(index.paths("p").await, vec!["src/b.rs".to_string()]);
        assert_eq!(index.len("other").await, 0);
    }

    #[tokio::test]
    async fn long_files_are_windowed() {
        let index = MemoryEmbeddingIndex::new(HashEmbedder::default());
        let content = (0..100).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let stored = index.embed_file("big.txt", &content);
        let ranges: Vec<(usize, usize)> = stored
            .chunks
            .iter()
            .map(|c| (c.start_line, c.end_line))
            .collect();
        assert_eq!(ranges, vec![(1, 40), (41, 80), (81, 100)]);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".context").join("embeddings.json");

        let index = MemoryEmbeddingIndex::open(&path, HashEmbedder::default())
            .await
            .unwrap();
        index.upsert("p", "a.rs", "fn alpha() {}").await.unwrap();
        index.flush().await.unwrap();

        let reopened = MemoryEmbeddingIndex::open(&path, HashEmbedder::default())
            .await
            .unwrap();
        assert!(reopened.contains("p", "a.rs").await);

        let other_model = MemoryEmbeddingIndex::open(&path, HashEmbedder::new(8).unwrap())
            .await
            .unwrap();
        assert_eq!(other_model.len("p").await, 0);
    }
}
