use crate::config::SyncConfig;
use crate::dispatcher::{Collaborators, DispatchJob, Dispatcher, DispatcherParts, FileOutcome};
use crate::hash_store::{open_hash_store, HashStore};
use crate::local_cache::LocalHashCache;
use crate::policy;
use crate::reconciler::{reconcile, ReconcileInput};
use crate::result::{FailureStage, SyncFailure, SyncOutcome, SyncResult};
use crate::scanner::{FileScanner, ScannedFile};
use crate::tool_data::{analyzers_for, ToolAnalyzer};
use crate::types::{
    now_unix_ms, Component, ComponentFlags, SyncMetadata, SyncMode, SyncOptions,
    SyncRecommendation, SyncStrategy, TrackedFileRecord,
};
use crate::{Result, SyncError};
use context_code_signature::{FileHashes, HashEngine};
use context_graph::SymbolTable;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Orchestrator states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Scan,
    Hash,
    LoadTracked,
    Reconcile,
    Policy,
    Dispatch,
    Commit,
    CleanupDeleted,
    Done,
}

impl SyncStage {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStage::Scan => "SCAN",
            SyncStage::Hash => "HASH",
            SyncStage::LoadTracked => "LOAD_TRACKED",
            SyncStage::Reconcile => "RECONCILE",
            SyncStage::Policy => "POLICY",
            SyncStage::Dispatch => "DISPATCH",
            SyncStage::Commit => "COMMIT",
            SyncStage::CleanupDeleted => "CLEANUP_DELETED",
            SyncStage::Done => "DONE",
        }
    }
}

struct StageClock<'a> {
    project_id: &'a str,
    stage: SyncStage,
    started: Instant,
}

impl<'a> StageClock<'a> {
    fn start(project_id: &'a str) -> Self {
        log::debug!("[{project_id}] -> {}", SyncStage::Scan.as_str());
        Self {
            project_id,
            stage: SyncStage::Scan,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: SyncStage) {
        log::debug!(
            "[{}] {} took {} ms -> {}",
            self.project_id,
            self.stage.as_str(),
            self.started.elapsed().as_millis(),
            next.as_str()
        );
        self.stage = next;
        self.started = Instant::now();
    }
}

/// Read-only result of the stages up to POLICY.
#[derive(Debug, Clone, Serialize)]
pub struct SyncPlan {
    pub project_id: String,
    /// After the first-run upgrade to `full`
    pub strategy: SyncStrategy,
    pub recommendation: SyncRecommendation,
    /// Scan and hash failures; those paths were not classified
    pub failures: Vec<SyncFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub project_id: String,
    pub metadata: Option<SyncMetadata>,
    pub tracked_files: usize,
    /// Records of vanished files whose cleanup has not succeeded yet
    pub tombstones: usize,
    /// Live records with at least one component flag unset
    pub incomplete: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_cache_entries: Option<usize>,
}

struct Prepared {
    plan: SyncPlan,
    files: BTreeMap<String, ScannedFile>,
    hashes: BTreeMap<String, FileHashes>,
    tracked: BTreeMap<String, TrackedFileRecord>,
    table: SymbolTable,
}

/// Sequences scan, hash, reconcile, policy, dispatch, commit and cleanup for one project.
///
/// Callers serialize concurrent runs for the same project (see
/// [`acquire_sync_lock`](crate::acquire_sync_lock)).
pub struct SyncManager {
    config: SyncConfig,
    store: Arc<dyn HashStore>,
    collaborators: Collaborators,
    engine: HashEngine,
    analyzers: Vec<Arc<dyn ToolAnalyzer>>,
    local_cache: Option<Mutex<LocalHashCache>>,
}

impl SyncManager {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn HashStore>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;
        let analyzers = analyzers_for(&config.tools)?;
        Ok(Self {
            config,
            store,
            collaborators,
            engine: HashEngine::new(),
            analyzers,
            local_cache: None,
        })
    }

    /// Open the configured hash store (and local cache) under the project's state directory.
    pub async fn open(root: &Path, config: SyncConfig, collaborators: Collaborators) -> Result<Self> {
        let state_dir = config.state_dir(root);
        let store = open_hash_store(
            config.backend,
            &state_dir,
            config.memory_ttl_days,
            config.store_content,
        )
        .await?;
        let local_cache = if config.local_cache {
            Some(LocalHashCache::load(LocalHashCache::path_for_state_dir(&state_dir)).await)
        } else {
            None
        };
        let mut manager = Self::new(config, store, collaborators)?;
        if let Some(cache) = local_cache {
            manager = manager.with_local_cache(cache);
        }
        Ok(manager)
    }

    pub fn with_local_cache(mut self, cache: LocalHashCache) -> Self {
        self.local_cache = Some(Mutex::new(cache));
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn HashStore> {
        &self.store
    }

    /// Everything up to the policy decision, without mutating any store.
    pub async fn plan(&self, project_id: &str, root: &Path, options: &SyncOptions) -> Result<SyncPlan> {
        let mut clock = StageClock::start(project_id);
        let prepared = self.prepare(project_id, root, options, &mut clock).await?;
        clock.advance(SyncStage::Done);
        Ok(prepared.plan)
    }

    pub async fn sync_project(
        &self,
        project_id: &str,
        root: &Path,
        options: &SyncOptions,
    ) -> Result<SyncResult> {
        self.sync_project_with_cancel(project_id, root, options, &CancellationToken::new())
            .await
    }

    /// Run one sync. Errors before DISPATCH leave every store untouched.
    pub async fn sync_project_with_cancel(
        &self,
        project_id: &str,
        root: &Path,
        options: &SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncResult> {
        let started = Instant::now();
        let mut clock = StageClock::start(project_id);
        let Prepared {
            plan,
            files,
            hashes,
            tracked,
            table,
        } = self.prepare(project_id, root, options, &mut clock).await?;

        let strategy = plan.strategy;
        let recommendation = plan.recommendation;
        let changes = &recommendation.change_set;
        let mut result = SyncResult::new(strategy.mode, recommendation.reason);
        result.total_files = changes.current_count();
        result.new_files = changes.new.len();
        result.changed_files = changes.modified.len();
        result.deleted_files = changes.deleted.len();
        for failure in plan.failures {
            result.add_failure(failure);
        }

        if !recommendation.should_sync {
            clock.advance(SyncStage::Done);
            result.outcome = SyncOutcome::Skipped;
            result.duration_ms = started.elapsed().as_millis() as u64;
            log::info!("[{project_id}] Nothing to sync ({})", recommendation.reason);
            return Ok(result);
        }
        log::info!(
            "[{project_id}] Syncing ({}, {}): {} new, {} modified, {} deleted",
            strategy.mode,
            recommendation.reason,
            result.new_files,
            result.changed_files,
            result.deleted_files
        );

        clock.advance(SyncStage::Dispatch);
        let jobs: Vec<DispatchJob> = changes
            .to_dispatch()
            .filter_map(|path| {
                Some(DispatchJob {
                    path: path.clone(),
                    abs_path: files.get(path)?.abs_path.clone(),
                    hashes: hashes.get(path)?.clone(),
                    pending: changes.pending_for(path),
                })
            })
            .collect();
        let dispatcher = Dispatcher::new(DispatcherParts {
            project_id: project_id.to_string(),
            collaborators: self.collaborators.clone(),
            analyzers: self.analyzers.clone(),
            excluded_extensions: self.config.embedding_excluded_extensions.clone(),
            engine: self.engine.clone(),
            table: Arc::new(table),
            keep_content: self.config.store_content,
            max_concurrency: self.config.max_concurrency(options),
        });
        let report = dispatcher.dispatch(jobs, cancel).await;

        clock.advance(SyncStage::Commit);
        let now = now_unix_ms();
        let committed: Vec<String> = report
            .outcomes
            .iter()
            .filter(|outcome| outcome.hashes.is_some())
            .map(|outcome| outcome.path.clone())
            .collect();
        let previous = self.store.get_many(project_id, &committed).await?;
        for outcome in &report.outcomes {
            for failure in &outcome.failures {
                result.add_failure(failure.clone());
            }
            for component in &outcome.updated {
                result.add_update(*component);
            }
            let Some(file_hashes) = &outcome.hashes else {
                continue;
            };
            let modified_ms = files.get(&outcome.path).map(|f| f.modified_ms).unwrap_or(0);
            let record = commit_record(
                previous.get(&outcome.path),
                outcome,
                file_hashes,
                modified_ms,
                &self.config.embedding_version,
                now,
            );
            self.store.put(project_id, record).await?;
            if let Some(content) = &outcome.content {
                self.store.put_content(project_id, &outcome.path, content).await?;
            }
        }
        if let Some(cache) = &self.local_cache {
            let mut cache = cache.lock().await;
            for outcome in &report.outcomes {
                if let Some(file_hashes) = &outcome.hashes {
                    cache.insert(&outcome.path, &file_hashes.content_hash);
                }
            }
            for path in &changes.unchanged {
                if let Some(file_hashes) = hashes.get(path) {
                    cache.insert(path, &file_hashes.content_hash);
                }
            }
        }

        if report.interrupted {
            result.outcome = SyncOutcome::Interrupted;
            log::info!(
                "[{project_id}] Interrupted after {} files; cleanup skipped",
                report.outcomes.len()
            );
        } else {
            clock.advance(SyncStage::CleanupDeleted);
            for path in &changes.deleted {
                self.cleanup_deleted(&dispatcher, project_id, path, &tracked, &mut result)
                    .await?;
            }
            if let Some(cache) = &self.local_cache {
                let mut cache = cache.lock().await;
                for path in &changes.deleted {
                    cache.remove(path);
                }
            }
            self.store
                .update_sync_metadata(
                    project_id,
                    SyncMetadata {
                        last_sync_time: now_unix_ms(),
                        strategy_used: strategy.mode,
                        files_processed: report.outcomes.len(),
                    },
                )
                .await?;
        }

        self.store.flush().await?;
        for err in self.collaborators.flush().await {
            log::warn!("[{project_id}] {err}");
        }

        clock.advance(SyncStage::Done);
        result.duration_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "[{project_id}] Sync {:?} in {} ms: {} embeddings, {} graph, {} tool data, {} cleaned up, {} failures",
            result.outcome,
            result.duration_ms,
            result.updated_embeddings,
            result.updated_graph_nodes,
            result.updated_tool_data,
            result.cleaned_up,
            result.failures.len()
        );
        Ok(result)
    }

    /// Run [`sync_project_with_cancel`](Self::sync_project_with_cancel) on a task.
    pub fn spawn(
        self: &Arc<Self>,
        project_id: impl Into<String>,
        root: impl Into<PathBuf>,
        options: SyncOptions,
    ) -> SyncHandle {
        let cancel = CancellationToken::new();
        let manager = self.clone();
        let token = cancel.clone();
        let (project_id, root) = (project_id.into(), root.into());
        let task = tokio::spawn(async move {
            manager
                .sync_project_with_cancel(&project_id, &root, &options, &token)
                .await
        });
        SyncHandle { cancel, task }
    }

    pub async fn status(&self, project_id: &str) -> Result<SyncStatus> {
        let metadata = self.store.get_sync_metadata(project_id).await?;
        let records = self.store.list(project_id).await?;
        let tombstones = records.iter().filter(|r| r.is_tombstone()).count();
        let incomplete = records
            .iter()
            .filter(|r| !r.is_tombstone() && r.component_flags != ComponentFlags::all())
            .count();
        let local_cache_entries = match &self.local_cache {
            Some(cache) => Some(cache.lock().await.len()),
            None => None,
        };
        Ok(SyncStatus {
            project_id: project_id.to_string(),
            metadata,
            tracked_files: records.len(),
            tombstones,
            incomplete,
            local_cache_entries,
        })
    }

    /// Flush the local cache and close the hash store.
    pub async fn close(&self) -> Result<()> {
        if let Some(cache) = &self.local_cache {
            cache.lock().await.flush().await?;
        }
        self.store.close().await
    }

    async fn prepare(
        &self,
        project_id: &str,
        root: &Path,
        options: &SyncOptions,
        clock: &mut StageClock<'_>,
    ) -> Result<Prepared> {
        let scan_options = self.config.scan_options(options);
        let mut strategy = self.config.strategy(options);
        policy::validate(
            &strategy,
            &scan_options.include_patterns,
            self.config.max_concurrency(options),
        )?;

        let scanner = FileScanner::with_options(root, &scan_options)?;
        let selection = scanner.filters().clone();
        let scan = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(|err| SyncError::Other(format!("join scan task: {err}")))?;
        let mut failures = scan.errors;
        let unreadable: Vec<String> = failures
            .iter()
            .map(|f| f.path.clone())
            .filter(|p| !p.is_empty())
            .collect();

        clock.advance(SyncStage::Hash);
        let mut files = BTreeMap::new();
        let mut hashes = BTreeMap::new();
        for file in scan.files {
            match tokio::fs::read(&file.abs_path).await {
                Ok(content) => {
                    hashes.insert(file.path.clone(), self.engine.hash_file(&content, &file.path));
                    files.insert(file.path.clone(), file);
                }
                Err(err) => {
                    let err = SyncError::Hash {
                        path: file.path.clone(),
                        message: err.to_string(),
                    };
                    log::warn!("{err}");
                    failures.push(SyncFailure::new(file.path, FailureStage::Hash, err.to_string()));
                }
            }
        }

        clock.advance(SyncStage::LoadTracked);
        let tracked: BTreeMap<String, TrackedFileRecord> = self
            .store
            .list(project_id)
            .await?
            .into_iter()
            .map(|record| (record.path.clone(), record))
            .collect();
        let metadata = self.store.get_sync_metadata(project_id).await?;
        if metadata.is_none() && tracked.is_empty() && strategy.mode == SyncMode::Incremental {
            log::debug!("[{project_id}] First sync; using full mode");
            strategy.mode = SyncMode::Full;
        }

        clock.advance(SyncStage::Reconcile);
        let current: BTreeMap<String, String> = hashes
            .iter()
            .map(|(path, h)| (path.clone(), h.content_hash.clone()))
            .collect();
        let required = strategy.required_components();
        let change_set = reconcile(&ReconcileInput {
            current: &current,
            tracked: &tracked,
            mode: strategy.mode,
            required: &required,
            embedding_version: &self.config.embedding_version,
            selection: (strategy.mode == SyncMode::Selective).then_some(&selection),
            unreadable: &unreadable,
        });
        if let Some(cache) = &self.local_cache {
            let stale = cache
                .lock()
                .await
                .stale_count(current.iter().map(|(p, h)| (p.as_str(), h.as_str())));
            log::debug!("[{project_id}] {stale} files differ from the local hash cache");
        }

        clock.advance(SyncStage::Policy);
        let recommendation =
            policy::recommend(change_set, &strategy, metadata.as_ref(), now_unix_ms());
        log::debug!(
            "[{project_id}] Policy: should_sync={} reason={}",
            recommendation.should_sync,
            recommendation.reason
        );

        let mut table = SymbolTable::new();
        for (path, file_hashes) in &hashes {
            match &file_hashes.signature {
                Some(signature) => table.add_signature(path, signature),
                None => table.add_file(path),
            }
        }
        if strategy.mode == SyncMode::Selective && recommendation.should_sync {
            self.seed_unselected(root, &tracked, &hashes, &mut table).await;
        }

        Ok(Prepared {
            plan: SyncPlan {
                project_id: project_id.to_string(),
                strategy,
                recommendation,
                failures,
            },
            files,
            hashes,
            tracked,
            table,
        })
    }

    /// Tracked files outside a selective scope still resolve imports and type references.
    async fn seed_unselected(
        &self,
        root: &Path,
        tracked: &BTreeMap<String, TrackedFileRecord>,
        hashes: &BTreeMap<String, FileHashes>,
        table: &mut SymbolTable,
    ) {
        let unselected = tracked
            .values()
            .filter(|record| !record.is_tombstone() && !hashes.contains_key(&record.path));
        for record in unselected {
            match tokio::fs::read(root.join(&record.path)).await {
                Ok(content) => match self.engine.signature(&content, &record.path) {
                    Some(signature) => table.add_signature(&record.path, &signature),
                    None => table.add_file(&record.path),
                },
                Err(err) => log::debug!("Not resolving against {}: {err}", record.path),
            }
        }
    }

    /// Tombstone-until-clean: the record goes only once every compensating delete succeeded,
    /// or when attempts run out.
    async fn cleanup_deleted(
        &self,
        dispatcher: &Dispatcher,
        project_id: &str,
        path: &str,
        tracked: &BTreeMap<String, TrackedFileRecord>,
        result: &mut SyncResult,
    ) -> Result<()> {
        let failures = dispatcher.compensate(path).await;
        if failures.is_empty() {
            self.store.delete(project_id, path).await?;
            result.cleaned_up += 1;
            log::debug!("[{project_id}] Cleaned up {path}");
            return Ok(());
        }

        let Some(mut record) = tracked.get(path).cloned() else {
            return Ok(());
        };
        record.cleanup_attempts += 1;
        record.last_error = Some(
            failures
                .iter()
                .map(|f| f.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        );
        if record.cleanup_attempts >= self.config.max_cleanup_attempts {
            log::warn!(
                "[{project_id}] Dropping record for {path} after {} failed cleanup attempts: {}",
                record.cleanup_attempts,
                record.last_error.as_deref().unwrap_or_default()
            );
            self.store.delete(project_id, path).await?;
            result.cleaned_up += 1;
        } else {
            log::warn!(
                "[{project_id}] Cleanup of {path} failed (attempt {}), keeping tombstone",
                record.cleanup_attempts
            );
            self.store.put(project_id, record).await?;
        }
        for failure in failures {
            result.add_failure(failure);
        }
        Ok(())
    }
}

/// New record state after dispatching one file.
///
/// Flags survive only while the content hash is unchanged; an embedding version change
/// invalidates the embedding flag. Components that ran set their flag to their outcome.
fn commit_record(
    previous: Option<&TrackedFileRecord>,
    outcome: &FileOutcome,
    hashes: &FileHashes,
    modified_ms: u64,
    embedding_version: &str,
    now: u64,
) -> TrackedFileRecord {
    let mut flags = match previous {
        Some(record) if !record.is_tombstone() && record.content_hash == hashes.content_hash => {
            record.component_flags
        }
        _ => ComponentFlags::default(),
    };
    if previous.is_some_and(|record| record.embedding_version != embedding_version) {
        flags.embedding = false;
    }
    for component in Component::ALL {
        if outcome.succeeded.contains(&component) {
            flags.set(component, true);
        } else if outcome
            .failures
            .iter()
            .any(|f| f.stage == FailureStage::from(component))
        {
            flags.set(component, false);
        }
    }

    TrackedFileRecord {
        path: outcome.path.clone(),
        content_hash: hashes.content_hash.clone(),
        structure_hash: hashes.structure_hash.clone(),
        size: outcome.size,
        last_modified: modified_ms,
        last_synced_at: now,
        embedding_version: embedding_version.to_string(),
        component_flags: flags,
        cleanup_attempts: 0,
        last_error: outcome.failures.first().map(|f| f.message.clone()),
    }
}

/// A sync running on its own task.
pub struct SyncHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<SyncResult>>,
}

impl SyncHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop starting new files; in-flight ones finish and are committed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) -> Result<SyncResult> {
        self.task
            .await
            .map_err(|err| SyncError::Other(format!("join sync task: {err}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn outcome(path: &str, succeeded: &[Component], failed: &[Component]) -> FileOutcome {
        FileOutcome {
            path: path.into(),
            hashes: None,
            size: 3,
            content: None,
            succeeded: succeeded.iter().copied().collect(),
            updated: succeeded.iter().copied().collect(),
            failures: failed
                .iter()
                .map(|c| SyncFailure::new(path, (*c).into(), "boom"))
                .collect(),
        }
    }

    fn previous(hash: &str, flags: ComponentFlags) -> TrackedFileRecord {
        TrackedFileRecord {
            path: "a.ts".into(),
            content_hash: hash.into(),
            structure_hash: hash.into(),
            size: 3,
            last_modified: 0,
            last_synced_at: 0,
            embedding_version: "v1".into(),
            component_flags: flags,
            cleanup_attempts: 0,
            last_error: None,
        }
    }

    #[test]
    fn retry_keeps_flags_for_unchanged_content() {
        let hashes = HashEngine::new().hash_file(b"abc", "a.ts");
        let mut flags = ComponentFlags::all();
        flags.embedding = false;
        let prev = previous(&hashes.content_hash, flags);

        let record = commit_record(
            Some(&prev),
            &outcome("a.ts", &[Component::Embedding], &[]),
            &hashes,
            7,
            "v1",
            100,
        );
        assert_eq!(record.component_flags, ComponentFlags::all());
        assert_eq!(record.last_error, None);
        assert_eq!(record.last_modified, 7);
    }

    #[test]
    fn content_change_resets_flags_that_did_not_run() {
        let hashes = HashEngine::new().hash_file(b"new", "a.ts");
        let prev = previous("old-hash", ComponentFlags::all());

        let record = commit_record(
            Some(&prev),
            &outcome("a.ts", &[Component::Graph], &[Component::Embedding]),
            &hashes,
            0,
            "v2",
            100,
        );
        assert_eq!(
            record.component_flags,
            ComponentFlags {
                embedding: false,
                graph: true,
                analysis: false,
            }
        );
        assert_eq!(record.embedding_version, "v2");
        assert_eq!(record.last_error.as_deref(), Some("boom"));
    }
}
