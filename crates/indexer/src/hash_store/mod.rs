//! Persisted per-file tracking records.
//!
//! One [`HashStore`] is the source of truth per deployment; `backend` in the sync
//! configuration picks which.

mod memory;
mod sqlite;

pub use memory::{MemoryHashStore, DEFAULT_TTL_DAYS, HASH_STORE_SNAPSHOT_FILE_NAME};
pub use sqlite::{SqliteHashStore, HASH_STORE_DB_FILE_NAME};

use crate::types::{SyncMetadata, TrackedFileRecord};
use crate::{Result, SyncError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait HashStore: Send + Sync {
    async fn get(&self, project_id: &str, path: &str) -> Result<Option<TrackedFileRecord>>;

    /// Batched multi-get; absent paths are left out of the map.
    async fn get_many(
        &self,
        project_id: &str,
        paths: &[String],
    ) -> Result<BTreeMap<String, TrackedFileRecord>> {
        let mut found = BTreeMap::new();
        for path in paths {
            if let Some(record) = self.get(project_id, path).await? {
                found.insert(path.clone(), record);
            }
        }
        Ok(found)
    }

    async fn put(&self, project_id: &str, record: TrackedFileRecord) -> Result<()>;

    async fn delete(&self, project_id: &str, path: &str) -> Result<()>;

    /// All records of the project, ordered by path.
    async fn list(&self, project_id: &str) -> Result<Vec<TrackedFileRecord>>;

    async fn get_sync_metadata(&self, project_id: &str) -> Result<Option<SyncMetadata>>;

    async fn update_sync_metadata(&self, project_id: &str, metadata: SyncMetadata)
        -> Result<()>;

    /// Store file bytes next to the record. Backends without content storage ignore it.
    async fn put_content(&self, _project_id: &str, _path: &str, _content: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn get_content(&self, _project_id: &str, _path: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.flush().await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStoreBackend {
    #[default]
    Memory,
    Sqlite,
}

impl HashStoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            HashStoreBackend::Memory => "memory",
            HashStoreBackend::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for HashStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashStoreBackend {
    type Err = SyncError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(HashStoreBackend::Memory),
            "sqlite" => Ok(HashStoreBackend::Sqlite),
            other => Err(SyncError::Config(format!(
                "unknown hash store backend '{other}' (expected memory or sqlite)"
            ))),
        }
    }
}

/// Open the configured backend under `state_dir`.
pub async fn open_hash_store(
    backend: HashStoreBackend,
    state_dir: &Path,
    memory_ttl_days: u64,
    store_content: bool,
) -> Result<Arc<dyn HashStore>> {
    let store: Arc<dyn HashStore> = match backend {
        HashStoreBackend::Memory => Arc::new(
            MemoryHashStore::open(
                state_dir.join(HASH_STORE_SNAPSHOT_FILE_NAME),
                Duration::from_secs(memory_ttl_days.saturating_mul(24 * 60 * 60)),
            )
            .await?,
        ),
        HashStoreBackend::Sqlite => Arc::new(
            SqliteHashStore::open(state_dir.join(HASH_STORE_DB_FILE_NAME))
                .await?
                .with_content_storage(store_content),
        ),
    };
    log::debug!("Opened {backend} hash store under {}", state_dir.display());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!(
            "SQLite".parse::<HashStoreBackend>().unwrap(),
            HashStoreBackend::Sqlite
        );
        assert_eq!(
            " memory ".parse::<HashStoreBackend>().unwrap(),
            HashStoreBackend::Memory
        );
        assert!(matches!(
            "redis".parse::<HashStoreBackend>(),
            Err(SyncError::Config(_))
        ));
    }
}
