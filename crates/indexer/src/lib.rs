//! # Context Indexer
//!
//! Incremental synchronization of project files into derived indexes.
//!
//! ## Pipeline
//!
//! ```text
//! Directory
//!     │
//!     ├──> SCAN          FileScanner (.gitignore aware, include/exclude globs)
//!     ├──> HASH          content + structural hashes
//!     ├──> LOAD_TRACKED  HashStore (memory | sqlite)
//!     ├──> RECONCILE     new / modified / unchanged / deleted
//!     ├──> POLICY        should we sync, and why
//!     │
//!     ├──> DISPATCH      bounded pool, per-file, per-component, fail-open
//!     │      ├─> EmbeddingIndex
//!     │      ├─> GraphIndex (relationship extraction)
//!     │      └─> ToolDataStore (outline, stats)
//!     │
//!     ├──> COMMIT           tracked records + component flags
//!     └──> CLEANUP_DELETED  compensating deletes, tombstone until clean
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use context_indexer::{Collaborators, SyncConfig, SyncManager, SyncOptions};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let root = Path::new("/path/to/project");
//!     let config = SyncConfig::load(root)?;
//!     let manager = SyncManager::open(root, config, Collaborators::noop()).await?;
//!
//!     let result = manager.sync_project("my-project", root, &SyncOptions::default()).await?;
//!     println!("{} new, {} modified, {} deleted", result.new_files, result.changed_files, result.deleted_files);
//!
//!     manager.close().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod dispatcher;
mod error;
pub mod hash_store;
mod limits;
mod local_cache;
mod manager;
pub mod policy;
mod reconciler;
mod result;
mod scanner;
mod sync_lock;
mod tool_data;
mod types;

pub use config::{
    SyncConfig, BACKEND_ENV, CONFIG_FILE_NAME, DEFAULT_MAX_CLEANUP_ATTEMPTS,
    DEFAULT_TIME_THRESHOLD_HOURS, STATE_DIR_ENV,
};
pub use dispatcher::Collaborators;
pub use error::{Result, SyncError};
pub use hash_store::{
    open_hash_store, HashStore, HashStoreBackend, MemoryHashStore, SqliteHashStore,
};
pub use limits::{
    parse_sync_concurrency, DispatchConcurrencySnapshot,
    DEFAULT_SYNC_CONCURRENCY, MAX_SYNC_CONCURRENCY, SYNC_CONCURRENCY_ENV,
};
pub use local_cache::{LocalHashCache, LOCAL_CACHE_FILE_NAME};
pub use manager::{SyncHandle, SyncManager, SyncPlan, SyncStage, SyncStatus};
pub use reconciler::{reconcile, ReconcileInput};
pub use result::{FailureStage, SyncFailure, SyncOutcome, SyncResult};
pub use scanner::{FileScanner, PathFilters, ScanOptions, ScanReport, ScannedFile};
pub use sync_lock::{
    acquire_sync_lock, sync_lock_path, sync_lock_wait_ms_last, sync_lock_wait_ms_max, SyncLock,
};
pub use tool_data::{
    analyzers_for, builtin_analyzer, MemoryToolDataStore, NoopToolDataStore, OutlineAnalyzer,
    StatsAnalyzer, ToolAnalyzer, ToolDataStore, BUILTIN_ANALYZERS, TOOL_DATA_FILE_NAME,
};
pub use types::{
    ChangeSet, Component, ComponentFlags, ComponentSet, RecommendationStats, SyncMetadata,
    SyncMode, SyncOptions, SyncReason, SyncRecommendation, SyncStrategy, TrackedFileRecord,
};

pub use tokio_util::sync::CancellationToken;
