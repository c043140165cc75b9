use crate::types::{Component, SyncMode, SyncReason};
use serde::{Deserialize, Serialize};

/// Where a per-file failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Scan,
    Hash,
    Embedding,
    Graph,
    Analysis,
    Cleanup,
}

impl From<Component> for FailureStage {
    fn from(component: Component) -> Self {
        match component {
            Component::Embedding => FailureStage::Embedding,
            Component::Graph => FailureStage::Graph,
            Component::Analysis => FailureStage::Analysis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub path: String,
    pub stage: FailureStage,
    pub message: String,
}

impl SyncFailure {
    pub fn new(path: impl Into<String>, stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            stage,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed,
    /// Cancelled during dispatch; finished files were committed, cleanup was skipped
    Interrupted,
    /// Policy decided there was nothing to do
    Skipped,
}

/// Statistics about one sync run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Files present on disk after filtering
    pub total_files: usize,

    pub new_files: usize,

    pub changed_files: usize,

    pub deleted_files: usize,

    pub updated_embeddings: usize,

    pub updated_graph_nodes: usize,

    pub updated_tool_data: usize,

    /// Tracked records removed by cleanup (including those that ran out of attempts)
    pub cleaned_up: usize,

    /// Time taken in milliseconds
    pub duration_ms: u64,

    pub strategy_used: SyncMode,

    pub reason: SyncReason,

    pub outcome: SyncOutcome,

    pub scan_errors: usize,

    /// Per-file failures; none of them stopped the run
    pub failures: Vec<SyncFailure>,
}

impl SyncResult {
    pub fn new(strategy_used: SyncMode, reason: SyncReason) -> Self {
        Self {
            total_files: 0,
            new_files: 0,
            changed_files: 0,
            deleted_files: 0,
            updated_embeddings: 0,
            updated_graph_nodes: 0,
            updated_tool_data: 0,
            cleaned_up: 0,
            duration_ms: 0,
            strategy_used,
            reason,
            outcome: SyncOutcome::Completed,
            scan_errors: 0,
            failures: Vec::new(),
        }
    }

    pub fn add_update(&mut self, component: Component) {
        match component {
            Component::Embedding => self.updated_embeddings += 1,
            Component::Graph => self.updated_graph_nodes += 1,
            Component::Analysis => self.updated_tool_data += 1,
        }
    }

    pub fn add_failure(&mut self, failure: SyncFailure) {
        if failure.stage == FailureStage::Scan {
            self.scan_errors += 1;
        }
        self.failures.push(failure);
    }

    pub fn failures_for(&self, path: &str) -> Vec<FailureStage> {
        self.failures
            .iter()
            .filter(|f| f.path == path)
            .map(|f| f.stage)
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.outcome != SyncOutcome::Interrupted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counters_follow_components_and_stages() {
        let mut result = SyncResult::new(SyncMode::Incremental, SyncReason::Modified);
        result.add_update(Component::Graph);
        result.add_update(Component::Analysis);
        result.add_failure(SyncFailure::new("x", FailureStage::Scan, "denied"));
        result.add_failure(SyncFailure::new(
            "a.ts",
            Component::Embedding.into(),
            "boom",
        ));

        assert_eq!(result.updated_graph_nodes, 1);
        assert_eq!(result.updated_tool_data, 1);
        assert_eq!(result.updated_embeddings, 0);
        assert_eq!(result.scan_errors, 1);
        assert_eq!(result.failures_for("a.ts"), vec![FailureStage::Embedding]);
        assert!(!result.is_clean());
    }

    #[test]
    fn serializes_with_snake_case_enums() {
        let result = SyncResult::new(SyncMode::Full, SyncReason::SessionStart);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["strategy_used"], "full");
        assert_eq!(json["reason"], "session_start");
        assert_eq!(json["outcome"], "completed");
    }
}
