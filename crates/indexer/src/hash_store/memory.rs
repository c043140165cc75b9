use super::HashStore;
use crate::types::{now_unix_ms, SyncMetadata, TrackedFileRecord};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;

pub const DEFAULT_TTL_DAYS: u64 = 30;
pub const HASH_STORE_SNAPSHOT_FILE_NAME: &str = "hash-store.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Expiring<T> {
    value: T,
    /// Unix ms
    expires_at: u64,
}

impl<T> Expiring<T> {
    fn live(&self, now: u64) -> Option<&T> {
        (self.expires_at > now).then_some(&self.value)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Namespaces {
    records: BTreeMap<String, BTreeMap<String, Expiring<TrackedFileRecord>>>,
    metadata: BTreeMap<String, Expiring<SyncMetadata>>,
}

impl Namespaces {
    fn purge_expired(&mut self, now: u64) -> usize {
        let mut purged = 0;
        for records in self.records.values_mut() {
            let before = records.len();
            records.retain(|_, entry| entry.expires_at > now);
            purged += before - records.len();
        }
        self.records.retain(|_, records| !records.is_empty());
        self.metadata.retain(|_, entry| entry.expires_at > now);
        purged
    }
}

/// Ephemeral key/value backend, namespaced per project, with a per-entry TTL.
///
/// Losing it only costs a full rescan. With a snapshot path, `flush` writes JSON and `open`
/// reloads it, dropping entries that expired in between.
pub struct MemoryHashStore {
    state: RwLock<Namespaces>,
    ttl: Duration,
    path: Option<PathBuf>,
}

impl Default for MemoryHashStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_TTL_DAYS * 24 * 60 * 60))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(Namespaces::default()),
            ttl,
            path: None,
        }
    }

    pub async fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut state = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<Namespaces>(&raw) {
                Ok(state) => state,
                Err(err) => {
                    log::warn!(
                        "Discarding unreadable hash store snapshot {}: {err}",
                        path.display()
                    );
                    Namespaces::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Namespaces::default(),
            Err(err) => return Err(err.into()),
        };
        let purged = state.purge_expired(now_unix_ms());
        if purged > 0 {
            log::debug!("Dropped {purged} expired hash records from {}", path.display());
        }
        Ok(Self {
            state: RwLock::new(state),
            ttl,
            path: Some(path),
        })
    }

    fn expires_at(&self) -> u64 {
        now_unix_ms().saturating_add(self.ttl.as_millis() as u64)
    }
}

#[async_trait]
impl HashStore for MemoryHashStore {
    async fn get(&self, project_id: &str, path: &str) -> Result<Option<TrackedFileRecord>> {
        let now = now_unix_ms();
        let state = self.state.read().await;
        Ok(state
            .records
            .get(project_id)
            .and_then(|records| records.get(path))
            .and_then(|entry| entry.live(now))
            .cloned())
    }

    async fn get_many(
        &self,
        project_id: &str,
        paths: &[String],
    ) -> Result<BTreeMap<String, TrackedFileRecord>> {
        let now = now_unix_ms();
        let state = self.state.read().await;
        let Some(records) = state.records.get(project_id) else {
            return Ok(BTreeMap::new());
        };
        Ok(paths
            .iter()
            .filter_map(|path| {
                let record = records.get(path)?.live(now)?;
                Some((path.clone(), record.clone()))
            })
            .collect())
    }

    async fn put(&self, project_id: &str, record: TrackedFileRecord) -> Result<()> {
        let expires_at = self.expires_at();
        let mut state = self.state.write().await;
        state
            .records
            .entry(project_id.to_string())
            .or_default()
            .insert(
                record.path.clone(),
                Expiring {
                    value: record,
                    expires_at,
                },
            );
        Ok(())
    }

    async fn delete(&self, project_id: &str, path: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(records) = state.records.get_mut(project_id) {
            records.remove(path);
            if records.is_empty() {
                state.records.remove(project_id);
            }
        }
        Ok(())
    }

    async fn list(&self, project_id: &str) -> Result<Vec<TrackedFileRecord>> {
        let now = now_unix_ms();
        let state = self.state.read().await;
        Ok(state
            .records
            .get(project_id)
            .map(|records| {
                records
                    .values()
                    .filter_map(|entry| entry.live(now).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_sync_metadata(&self, project_id: &str) -> Result<Option<SyncMetadata>> {
        let now = now_unix_ms();
        let state = self.state.read().await;
        Ok(state
            .metadata
            .get(project_id)
            .and_then(|entry| entry.live(now))
            .cloned())
    }

    async fn update_sync_metadata(
        &self,
        project_id: &str,
        metadata: SyncMetadata,
    ) -> Result<()> {
        let expires_at = self.expires_at();
        let mut state = self.state.write().await;
        state.metadata.insert(
            project_id.to_string(),
            Expiring {
                value: metadata,
                expires_at,
            },
        );
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = {
            let mut state = self.state.write().await;
            state.purge_expired(now_unix_ms());
            serde_json::to_vec(&*state)?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, path).await?;
        log::debug!("Hash store saved to {}", path.display());
        Ok(())
    }
}
