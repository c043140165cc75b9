use crate::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const LOCAL_CACHE_FILE_NAME: &str = "hash-cache.json";

/// Advisory `path -> content hash` map on disk.
///
/// Never consulted for classification; the hash store stays authoritative. Safe to delete.
#[derive(Debug)]
pub struct LocalHashCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl LocalHashCache {
    pub fn path_for_state_dir(state_dir: &Path) -> PathBuf {
        state_dir.join(LOCAL_CACHE_FILE_NAME)
    }

    /// Missing or unreadable files give an empty cache.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                log::warn!("Ignoring unreadable hash cache {}: {err}", path.display());
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            entries,
            dirty: false,
        }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, path: &str, content_hash: &str) {
        if self.get(path) != Some(content_hash) {
            self.entries
                .insert(path.to_string(), content_hash.to_string());
            self.dirty = true;
        }
    }

    pub fn remove(&mut self, path: &str) {
        if self.entries.remove(path).is_some() {
            self.dirty = true;
        }
    }

    /// Paths whose hash differs from (or is missing in) the cache.
    pub fn stale_count<'a>(&self, current: impl IntoIterator<Item = (&'a str, &'a str)>) -> usize {
        current
            .into_iter()
            .filter(|(path, hash)| self.get(path) != Some(*hash))
            .count()
    }

    pub async fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        self.dirty = false;
        log::debug!("Hash cache saved to {}", self.path.display());
        Ok(())
    }
}
