use super::HashStore;
use crate::types::{ComponentFlags, SyncMetadata, SyncMode, TrackedFileRecord};
use crate::{Result, SyncError};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const HASH_STORE_DB_FILE_NAME: &str = "hash-store.db";

/// Bound parameters per `IN (...)` batch, below SQLite's default variable limit.
const GET_MANY_CHUNK: usize = 500;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tracked_files (
    project_id        TEXT NOT NULL,
    path              TEXT NOT NULL,
    content_hash      TEXT NOT NULL,
    structure_hash    TEXT NOT NULL,
    size              INTEGER NOT NULL,
    last_modified     INTEGER NOT NULL,
    last_synced_at    INTEGER NOT NULL,
    embedding_version TEXT NOT NULL,
    embedding_synced  INTEGER NOT NULL DEFAULT 0,
    graph_synced      INTEGER NOT NULL DEFAULT 0,
    analysis_synced   INTEGER NOT NULL DEFAULT 0,
    cleanup_attempts  INTEGER NOT NULL DEFAULT 0,
    last_error        TEXT,
    content           BLOB,
    PRIMARY KEY (project_id, path)
);
CREATE TABLE IF NOT EXISTS sync_metadata (
    project_id      TEXT PRIMARY KEY,
    last_sync_time  INTEGER NOT NULL,
    strategy_used   TEXT NOT NULL,
    files_processed INTEGER NOT NULL
);";

const RECORD_COLUMNS: &str = "path, content_hash, structure_hash, size, last_modified, \
     last_synced_at, embedding_version, embedding_synced, graph_synced, analysis_synced, \
     cleanup_attempts, last_error";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<TrackedFileRecord> {
    Ok(TrackedFileRecord {
        path: row.get(0)?,
        content_hash: row.get(1)?,
        structure_hash: row.get(2)?,
        size: row.get::<_, i64>(3)? as u64,
        last_modified: row.get::<_, i64>(4)? as u64,
        last_synced_at: row.get::<_, i64>(5)? as u64,
        embedding_version: row.get(6)?,
        component_flags: ComponentFlags {
            embedding: row.get(7)?,
            graph: row.get(8)?,
            analysis: row.get(9)?,
        },
        cleanup_attempts: row.get::<_, i64>(10)? as u32,
        last_error: row.get(11)?,
    })
}

/// Durable backend: one SQLite file, records keyed by `(project_id, path)`.
///
/// Optionally keeps file bytes so callers can serve content without touching disk.
pub struct SqliteHashStore {
    conn: Arc<Mutex<Connection>>,
    store_content: bool,
}

impl SqliteHashStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(&path)?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )?;
            conn.execute_batch(SCHEMA)?;
            log::debug!("SQLite hash store opened at {}", path.display());
            Ok(conn)
        })
        .await
        .map_err(|err| SyncError::Store(format!("join hash store open: {err}")))??;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            store_content: false,
        }
    }

    pub fn with_content_storage(mut self, enabled: bool) -> Self {
        self.store_content = enabled;
        self
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| SyncError::Store("hash store connection poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|err| SyncError::Store(format!("join hash store task: {err}")))?
    }
}

#[async_trait]
impl HashStore for SqliteHashStore {
    async fn get(&self, project_id: &str, path: &str) -> Result<Option<TrackedFileRecord>> {
        let (project_id, path) = (project_id.to_string(), path.to_string());
        self.with_conn(move |conn| {
            let result = conn.query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM tracked_files WHERE project_id = ?1 AND path = ?2"
                ),
                params![project_id, path],
                record_from_row,
            );
            match result {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    async fn get_many(
        &self,
        project_id: &str,
        paths: &[String],
    ) -> Result<BTreeMap<String, TrackedFileRecord>> {
        let project_id = project_id.to_string();
        let paths = paths.to_vec();
        self.with_conn(move |conn| {
            let mut found = BTreeMap::new();
            for chunk in paths.chunks(GET_MANY_CHUNK) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let mut stmt = conn.prepare(&format!(
                    "SELECT {RECORD_COLUMNS} FROM tracked_files \
                     WHERE project_id = ? AND path IN ({placeholders})"
                ))?;
                let bound = std::iter::once(project_id.as_str())
                    .chain(chunk.iter().map(String::as_str));
                let rows = stmt.query_map(params_from_iter(bound), record_from_row)?;
                for record in rows {
                    let record = record?;
                    found.insert(record.path.clone(), record);
                }
            }
            Ok(found)
        })
        .await
    }

    async fn put(&self, project_id: &str, record: TrackedFileRecord) -> Result<()> {
        let project_id = project_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tracked_files (project_id, path, content_hash, structure_hash, size,
                     last_modified, last_synced_at, embedding_version, embedding_synced,
                     graph_synced, analysis_synced, cleanup_attempts, last_error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(project_id, path) DO UPDATE SET
                     content_hash = excluded.content_hash,
                     structure_hash = excluded.structure_hash,
                     size = excluded.size,
                     last_modified = excluded.last_modified,
                     last_synced_at = excluded.last_synced_at,
                     embedding_version = excluded.embedding_version,
                     embedding_synced = excluded.embedding_synced,
                     graph_synced = excluded.graph_synced,
                     analysis_synced = excluded.analysis_synced,
                     cleanup_attempts = excluded.cleanup_attempts,
                     last_error = excluded.last_error",
                params![
                    project_id,
                    record.path,
                    record.content_hash,
                    record.structure_hash,
                    record.size as i64,
                    record.last_modified as i64,
                    record.last_synced_at as i64,
                    record.embedding_version,
                    record.component_flags.embedding,
                    record.component_flags.graph,
                    record.component_flags.analysis,
                    record.cleanup_attempts as i64,
                    record.last_error,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, project_id: &str, path: &str) -> Result<()> {
        let (project_id, path) = (project_id.to_string(), path.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM tracked_files WHERE project_id = ?1 AND path = ?2",
                params![project_id, path],
            )?;
            Ok(())
        })
        .await
    }

    async fn list(&self, project_id: &str) -> Result<Vec<TrackedFileRecord>> {
        let project_id = project_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM tracked_files WHERE project_id = ?1 ORDER BY path"
            ))?;
            let records = stmt
                .query_map(params![project_id], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn get_sync_metadata(&self, project_id: &str) -> Result<Option<SyncMetadata>> {
        let project_id = project_id.to_string();
        self.with_conn(move |conn| {
            let result = conn.query_row(
                "SELECT last_sync_time, strategy_used, files_processed
                 FROM sync_metadata WHERE project_id = ?1",
                params![project_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            );
            let (last_sync_time, strategy, files_processed) = match result {
                Ok(row) => row,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(err) => return Err(err.into()),
            };
            let strategy_used = strategy.parse::<SyncMode>().map_err(SyncError::Store)?;
            Ok(Some(SyncMetadata {
                last_sync_time: last_sync_time as u64,
                strategy_used,
                files_processed: files_processed as usize,
            }))
        })
        .await
    }

    async fn update_sync_metadata(
        &self,
        project_id: &str,
        metadata: SyncMetadata,
    ) -> Result<()> {
        let project_id = project_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sync_metadata (project_id, last_sync_time, strategy_used, files_processed)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(project_id) DO UPDATE SET
                     last_sync_time = excluded.last_sync_time,
                     strategy_used = excluded.strategy_used,
                     files_processed = excluded.files_processed",
                params![
                    project_id,
                    metadata.last_sync_time as i64,
                    metadata.strategy_used.as_str(),
                    metadata.files_processed as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn put_content(&self, project_id: &str, path: &str, content: &[u8]) -> Result<()> {
        if !self.store_content {
            return Ok(());
        }
        let (project_id, path, content) =
            (project_id.to_string(), path.to_string(), content.to_vec());
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE tracked_files SET content = ?3 WHERE project_id = ?1 AND path = ?2",
                params![project_id, path, content],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_content(&self, project_id: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let (project_id, path) = (project_id.to_string(), path.to_string());
        self.with_conn(move |conn| {
            let result = conn.query_row(
                "SELECT content FROM tracked_files WHERE project_id = ?1 AND path = ?2",
                params![project_id, path],
                |row| row.get::<_, Option<Vec<u8>>>(0),
            );
            match result {
                Ok(content) => Ok(content),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    async fn flush(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
            Ok(())
        })
        .await
    }
}
