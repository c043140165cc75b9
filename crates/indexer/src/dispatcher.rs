use crate::limits::DispatchLimiter;
use crate::result::{FailureStage, SyncFailure};
use crate::tool_data::{NoopToolDataStore, ToolAnalyzer, ToolDataStore};
use crate::types::{Component, ComponentSet};
use crate::SyncError;
use context_code_signature::{FileHashes, HashEngine};
use context_graph::{apply_relations, extract_relations, GraphIndex, NoopGraphIndex, SymbolTable};
use context_vector_store::{EmbeddingIndex, NoopEmbeddingIndex};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Derived indexes a sync writes into. Disabled capabilities get the no-op implementations.
#[derive(Clone)]
pub struct Collaborators {
    pub embeddings: Arc<dyn EmbeddingIndex>,
    pub graph: Arc<dyn GraphIndex>,
    pub tool_data: Arc<dyn ToolDataStore>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::noop()
    }
}

impl Collaborators {
    pub fn noop() -> Self {
        Self {
            embeddings: Arc::new(NoopEmbeddingIndex),
            graph: Arc::new(NoopGraphIndex),
            tool_data: Arc::new(NoopToolDataStore),
        }
    }

    /// Flush every collaborator; failures are returned, not raised.
    pub async fn flush(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let Err(err) = self.embeddings.flush().await {
            errors.push(format!("embedding flush: {err}"));
        }
        if let Err(err) = self.graph.flush().await {
            errors.push(format!("graph flush: {err}"));
        }
        if let Err(err) = self.tool_data.flush().await {
            errors.push(format!("tool data flush: {err}"));
        }
        errors
    }
}

/// One new or modified file and the components it still needs.
#[derive(Debug, Clone)]
pub(crate) struct DispatchJob {
    pub path: String,
    pub abs_path: PathBuf,
    /// Hashes computed during the hash stage
    pub hashes: FileHashes,
    pub pending: ComponentSet,
}

#[derive(Debug)]
pub(crate) struct FileOutcome {
    pub path: String,
    /// Hashes of the bytes that were actually dispatched; `None` if the file could not be read
    pub hashes: Option<FileHashes>,
    pub size: u64,
    /// Kept only when the hash store stores content
    pub content: Option<Vec<u8>>,
    /// Components that are now up to date (including satisfied-by-exclusion)
    pub succeeded: ComponentSet,
    /// Components that actually wrote downstream
    pub updated: ComponentSet,
    pub failures: Vec<SyncFailure>,
}

impl FileOutcome {
    fn unreadable(path: String, message: String) -> Self {
        Self {
            failures: vec![SyncFailure::new(path.clone(), FailureStage::Hash, message)],
            path,
            hashes: None,
            size: 0,
            content: None,
            succeeded: ComponentSet::new(),
            updated: ComponentSet::new(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct DispatchReport {
    /// Sorted by path
    pub outcomes: Vec<FileOutcome>,
    pub interrupted: bool,
    /// Jobs never started because of cancellation
    pub not_started: Vec<String>,
}

struct DispatchContext {
    project_id: String,
    collaborators: Collaborators,
    analyzers: Vec<Arc<dyn ToolAnalyzer>>,
    excluded_extensions: Vec<String>,
    engine: HashEngine,
    table: Arc<SymbolTable>,
    keep_content: bool,
}

/// Fail-open per-file fan-out into the collaborators.
pub(crate) struct Dispatcher {
    ctx: Arc<DispatchContext>,
    limiter: DispatchLimiter,
}

pub(crate) struct DispatcherParts {
    pub project_id: String,
    pub collaborators: Collaborators,
    pub analyzers: Vec<Arc<dyn ToolAnalyzer>>,
    pub excluded_extensions: Vec<String>,
    pub engine: HashEngine,
    pub table: Arc<SymbolTable>,
    pub keep_content: bool,
    pub max_concurrency: usize,
}

impl Dispatcher {
    pub(crate) fn new(parts: DispatcherParts) -> Self {
        let excluded_extensions = parts
            .excluded_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self {
            limiter: DispatchLimiter::new(parts.max_concurrency),
            ctx: Arc::new(DispatchContext {
                project_id: parts.project_id,
                collaborators: parts.collaborators,
                analyzers: parts.analyzers,
                excluded_extensions,
                engine: parts.engine,
                table: parts.table,
                keep_content: parts.keep_content,
            }),
        }
    }

    /// Run every job on the bounded pool. After cancellation no new job starts; running ones
    /// finish and are reported.
    pub(crate) async fn dispatch(
        &self,
        jobs: Vec<DispatchJob>,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut tasks = JoinSet::new();
        let mut started: BTreeMap<String, ComponentSet> = BTreeMap::new();

        let mut jobs = jobs.into_iter();
        while let Some(job) = jobs.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = self.limiter.acquire() => Some(permit),
            };
            let Some(permit) = permit else {
                report.interrupted = true;
                report.not_started.push(job.path);
                report.not_started.extend(jobs.by_ref().map(|job| job.path));
                break;
            };

            started.insert(job.path.clone(), job.pending.clone());
            let ctx = self.ctx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                ctx.process_file(job).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    started.remove(&outcome.path);
                    report.outcomes.push(outcome);
                }
                Err(err) => log::warn!("Dispatch task failed: {err}"),
            }
        }
        // Anything left panicked; its components stay unsatisfied.
        for (path, pending) in started {
            let failures = pending
                .iter()
                .map(|component| {
                    SyncFailure::new(path.clone(), (*component).into(), "dispatch task panicked")
                })
                .collect();
            report.outcomes.push(FileOutcome {
                failures,
                ..FileOutcome::unreadable(path, String::new())
            });
        }

        report.outcomes.sort_by(|a, b| a.path.cmp(&b.path));
        log::debug!("Dispatch pool after drain: {:?}", self.limiter.snapshot());
        if report.interrupted {
            log::info!(
                "Dispatch interrupted: {} files done, {} not started",
                report.outcomes.len(),
                report.not_started.len()
            );
        }
        report
    }

    /// Compensating deletes for a vanished file, each store attempted independently.
    pub(crate) async fn compensate(&self, path: &str) -> Vec<SyncFailure> {
        let ctx = &self.ctx;
        let project_id = ctx.project_id.as_str();
        let mut failures = Vec::new();

        if let Err(err) = ctx.collaborators.embeddings.delete(project_id, path).await {
            failures.push(SyncFailure::new(path, FailureStage::Cleanup, format!("embedding: {err}")));
        }
        if let Err(err) = ctx
            .collaborators
            .graph
            .delete_nodes_for_file(project_id, path)
            .await
        {
            failures.push(SyncFailure::new(path, FailureStage::Cleanup, format!("graph: {err}")));
        }
        for analyzer in &ctx.analyzers {
            let tool = analyzer.name();
            if let Err(err) = ctx.collaborators.tool_data.delete(project_id, tool, path).await {
                failures.push(SyncFailure::new(
                    path,
                    FailureStage::Cleanup,
                    format!("analysis/{tool}: {err}"),
                ));
            }
        }
        failures
    }
}

impl DispatchContext {
    async fn process_file(&self, job: DispatchJob) -> FileOutcome {
        let content = match tokio::fs::read(&job.abs_path).await {
            Ok(content) => content,
            Err(err) => {
                let err = SyncError::Hash {
                    path: job.path.clone(),
                    message: err.to_string(),
                };
                log::warn!("{err}");
                return FileOutcome::unreadable(job.path, err.to_string());
            }
        };

        let hashes = if self.engine.content_hash(&content) == job.hashes.content_hash {
            job.hashes
        } else {
            log::debug!("{} changed after hashing; dispatching current bytes", job.path);
            self.engine.hash_file(&content, &job.path)
        };

        let mut outcome = FileOutcome {
            path: job.path.clone(),
            hashes: None,
            size: content.len() as u64,
            content: None,
            succeeded: ComponentSet::new(),
            updated: ComponentSet::new(),
            failures: Vec::new(),
        };

        for component in job.pending {
            match self.run_component(component, &job.path, &content, &hashes).await {
                Ok(wrote) => {
                    outcome.succeeded.insert(component);
                    if wrote {
                        outcome.updated.insert(component);
                    }
                }
                Err(message) => {
                    let err = SyncError::Downstream {
                        path: job.path.clone(),
                        component,
                        message: message.clone(),
                    };
                    log::warn!("{err}");
                    outcome
                        .failures
                        .push(SyncFailure::new(job.path.clone(), component.into(), message));
                }
            }
        }
        log::debug!(
            "{}: synced {:?}, {} failures",
            job.path,
            outcome.succeeded,
            outcome.failures.len()
        );

        outcome.hashes = Some(hashes);
        if self.keep_content {
            outcome.content = Some(content);
        }
        outcome
    }

    /// `Ok(true)` when downstream was written, `Ok(false)` when the component is satisfied
    /// without a call.
    async fn run_component(
        &self,
        component: Component,
        path: &str,
        content: &[u8],
        hashes: &FileHashes,
    ) -> Result<bool, String> {
        let project_id = self.project_id.as_str();
        match component {
            Component::Embedding => {
                if self.is_embedding_excluded(path) {
                    log::debug!("{path}: content type excluded from embeddings");
                    return Ok(false);
                }
                let text = String::from_utf8_lossy(content);
                self.collaborators
                    .embeddings
                    .upsert(project_id, path, &text)
                    .await
                    .map_err(|err| err.to_string())?;
                Ok(true)
            }
            Component::Graph => {
                let relations = extract_relations(path, hashes, &self.table);
                apply_relations(self.collaborators.graph.as_ref(), project_id, path, relations)
                    .await
                    .map_err(|err| err.to_string())?;
                Ok(true)
            }
            Component::Analysis => {
                if self.analyzers.is_empty() {
                    return Ok(false);
                }
                for analyzer in &self.analyzers {
                    let tool = analyzer.name();
                    let payload = analyzer
                        .analyze(path, content, hashes)
                        .map_err(|err| format!("{tool}: {err}"))?;
                    self.collaborators
                        .tool_data
                        .put(project_id, tool, path, payload)
                        .await
                        .map_err(|err| format!("{tool}: {err}"))?;
                }
                Ok(true)
            }
        }
    }

    fn is_embedding_excluded(&self, path: &str) -> bool {
        let lowered = path.to_ascii_lowercase();
        self.excluded_extensions
            .iter()
            .any(|ext| lowered.ends_with(&format!(".{ext}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_data::{analyzers_for, MemoryToolDataStore};
    use async_trait::async_trait;
    use context_graph::MemoryGraphIndex;
    use context_vector_store::{HashEmbedder, MemoryEmbeddingIndex, VectorStoreError};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct RejectingEmbeddings;

    #[async_trait]
    impl EmbeddingIndex for RejectingEmbeddings {
        async fn upsert(
            &self,
            _project_id: &str,
            _path: &str,
            _content: &str,
        ) -> context_vector_store::Result<()> {
            Err(VectorStoreError::EmbeddingError("offline".into()))
        }

        async fn delete(&self, _project_id: &str, _path: &str) -> context_vector_store::Result<()> {
            Err(VectorStoreError::EmbeddingError("offline".into()))
        }
    }

    fn all() -> ComponentSet {
        Component::ALL.into_iter().collect()
    }

    fn job(root: &TempDir, path: &str, source: &str) -> DispatchJob {
        let abs_path = root.path().join(path);
        std::fs::write(&abs_path, source).unwrap();
        DispatchJob {
            path: path.into(),
            abs_path,
            hashes: HashEngine::new().hash_file(source.as_bytes(), path),
            pending: all(),
        }
    }

    fn dispatcher(collaborators: Collaborators, excluded: &[&str]) -> Dispatcher {
        Dispatcher::new(DispatcherParts {
            project_id: "p".into(),
            collaborators,
            analyzers: analyzers_for(&["stats".to_string()]).unwrap(),
            excluded_extensions: excluded.iter().map(|e| e.to_string()).collect(),
            engine: HashEngine::new(),
            table: Arc::new(SymbolTable::new()),
            keep_content: false,
            max_concurrency: 2,
        })
    }

    #[tokio::test]
    async fn one_failing_component_does_not_stop_the_others() {
        let root = TempDir::new().unwrap();
        let tool_data = Arc::new(MemoryToolDataStore::new());
        let graph = Arc::new(MemoryGraphIndex::new());
        let collaborators = Collaborators {
            embeddings: Arc::new(RejectingEmbeddings),
            graph: graph.clone(),
            tool_data: tool_data.clone(),
        };
        let jobs = vec![
            job(&root, "a.ts", "export class A {}\n"),
            job(&root, "b.ts", "export class B {}\n"),
        ];

        let report = dispatcher(collaborators, &[])
            .dispatch(jobs, &CancellationToken::new())
            .await;

        assert!(!report.interrupted);
        let paths: Vec<&str> = report.outcomes.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["a.ts", "b.ts"]);
        for outcome in &report.outcomes {
            assert_eq!(
                outcome.succeeded,
                ComponentSet::from([Component::Graph, Component::Analysis])
            );
            assert_eq!(outcome.failures.len(), 1);
            assert_eq!(outcome.failures[0].stage, FailureStage::Embedding);
        }
        assert!(tool_data.get("p", "stats", "b.ts").await.is_some());
        assert_eq!(graph.with_project("p", |g| g.nodes_for_file("a.ts").len()).await, 2);
    }

    #[tokio::test]
    async fn excluded_content_types_count_as_embedded() {
        let root = TempDir::new().unwrap();
        let embeddings = Arc::new(MemoryEmbeddingIndex::new(HashEmbedder::default()));
        let collaborators = Collaborators {
            embeddings: embeddings.clone(),
            ..Collaborators::noop()
        };
        let jobs = vec![job(&root, "data.json", "{\"a\": 1}\n"), job(&root, "a.ts", "let a = 1;\n")];

        let report = dispatcher(collaborators, &[".JSON"])
            .dispatch(jobs, &CancellationToken::new())
            .await;

        let json = &report.outcomes[1];
        assert_eq!(json.path, "data.json");
        assert!(json.succeeded.contains(&Component::Embedding));
        assert!(!json.updated.contains(&Component::Embedding));
        assert!(report.outcomes[0].updated.contains(&Component::Embedding));
        assert!(!embeddings.contains("p", "data.json").await);
        assert!(embeddings.contains("p", "a.ts").await);
    }

    #[tokio::test]
    async fn vanished_files_and_cancelled_runs() {
        let root = TempDir::new().unwrap();
        let gone = job(&root, "gone.ts", "x");
        std::fs::remove_file(&gone.abs_path).unwrap();

        let report = dispatcher(Collaborators::noop(), &[])
            .dispatch(vec![gone], &CancellationToken::new())
            .await;
        assert!(report.outcomes[0].hashes.is_none());
        assert_eq!(report.outcomes[0].failures[0].stage, FailureStage::Hash);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = dispatcher(Collaborators::noop(), &[])
            .dispatch(vec![job(&root, "a.ts", "x"), job(&root, "b.ts", "y")], &cancel)
            .await;
        assert!(report.interrupted);
        assert!(report.outcomes.is_empty());
        assert_eq!(report.not_started, vec!["a.ts", "b.ts"]);
    }

    #[tokio::test]
    async fn compensation_reports_each_store() {
        let collaborators = Collaborators {
            embeddings: Arc::new(RejectingEmbeddings),
            ..Collaborators::noop()
        };
        let failures = dispatcher(collaborators, &[]).compensate("a.ts").await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, FailureStage::Cleanup);
        assert!(failures[0].message.starts_with("embedding:"));
    }
}
