use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Derived index kept in sync per file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Embedding,
    Graph,
    Analysis,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::Embedding, Component::Graph, Component::Analysis];

    pub fn as_str(self) -> &'static str {
        match self {
            Component::Embedding => "embedding",
            Component::Graph => "graph",
            Component::Analysis => "analysis",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type ComponentSet = BTreeSet<Component>;

/// Per-component "up to date for the stored content hash" flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFlags {
    pub embedding: bool,
    pub graph: bool,
    pub analysis: bool,
}

impl ComponentFlags {
    pub fn all() -> Self {
        Self {
            embedding: true,
            graph: true,
            analysis: true,
        }
    }

    pub fn get(&self, component: Component) -> bool {
        match component {
            Component::Embedding => self.embedding,
            Component::Graph => self.graph,
            Component::Analysis => self.analysis,
        }
    }

    pub fn set(&mut self, component: Component, value: bool) {
        match component {
            Component::Embedding => self.embedding = value,
            Component::Graph => self.graph = value,
            Component::Analysis => self.analysis = value,
        }
    }

    /// Required components whose flag is still false.
    pub fn missing(&self, required: &ComponentSet) -> ComponentSet {
        required.iter().copied().filter(|c| !self.get(*c)).collect()
    }
}

/// Persisted bookkeeping for one file, unique per `(project_id, path)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFileRecord {
    /// Project-relative, `/`-separated
    pub path: String,
    pub content_hash: String,
    pub structure_hash: String,
    pub size: u64,
    /// Unix ms
    pub last_modified: u64,
    /// Unix ms
    pub last_synced_at: u64,
    pub embedding_version: String,
    pub component_flags: ComponentFlags,

    /// Failed cleanup rounds since the file disappeared; 0 for live files
    #[serde(default)]
    pub cleanup_attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TrackedFileRecord {
    pub fn is_tombstone(&self) -> bool {
        self.cleanup_attempts > 0
    }

    /// The embedding version only matters while embeddings are required.
    pub fn in_sync(
        &self,
        content_hash: &str,
        embedding_version: &str,
        required: &ComponentSet,
    ) -> bool {
        self.content_hash == content_hash
            && (self.embedding_version == embedding_version
                || !required.contains(&Component::Embedding))
            && self.component_flags.missing(required).is_empty()
    }
}

/// Classification of one run. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub new: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
    pub deleted: BTreeSet<String>,

    /// Components each new/modified path still needs
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pending: BTreeMap<String, ComponentSet>,
}

impl ChangeSet {
    pub fn has_changes(&self) -> bool {
        !self.new.is_empty() || !self.modified.is_empty() || !self.deleted.is_empty()
    }

    /// Files present on disk in this run.
    pub fn current_count(&self) -> usize {
        self.new.len() + self.modified.len() + self.unchanged.len()
    }

    /// New and modified paths, in path order.
    pub fn to_dispatch(&self) -> impl Iterator<Item = &String> {
        let mut paths: Vec<&String> = self.new.iter().chain(self.modified.iter()).collect();
        paths.sort();
        paths.into_iter()
    }

    pub fn pending_for(&self, path: &str) -> ComponentSet {
        self.pending.get(path).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Every current file is treated as new
    Full,
    #[default]
    Incremental,
    /// Only paths matching the include patterns are considered
    Selective,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
            SyncMode::Selective => "selective",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(SyncMode::Full),
            "incremental" => Ok(SyncMode::Incremental),
            "selective" => Ok(SyncMode::Selective),
            other => Err(format!("unknown sync mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStrategy {
    pub mode: SyncMode,
    pub force_sync: bool,
    pub session_start: bool,
    pub time_threshold_hours: f64,
    pub include_embeddings: bool,
    pub include_graph: bool,
    pub include_analysis: bool,
}

impl Default for SyncStrategy {
    fn default() -> Self {
        Self {
            mode: SyncMode::Incremental,
            force_sync: false,
            session_start: false,
            time_threshold_hours: 24.0,
            include_embeddings: true,
            include_graph: true,
            include_analysis: true,
        }
    }
}

impl SyncStrategy {
    /// Components a file needs before it counts as in sync.
    pub fn required_components(&self) -> ComponentSet {
        let mut required = ComponentSet::new();
        if self.include_embeddings {
            required.insert(Component::Embedding);
        }
        if self.include_graph {
            required.insert(Component::Graph);
        }
        if self.include_analysis {
            required.insert(Component::Analysis);
        }
        required
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReason {
    Forced,
    SessionStart,
    New,
    Modified,
    Deleted,
    TimeThreshold,
    Unchanged,
}

impl SyncReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncReason::Forced => "forced",
            SyncReason::SessionStart => "session_start",
            SyncReason::New => "new",
            SyncReason::Modified => "modified",
            SyncReason::Deleted => "deleted",
            SyncReason::TimeThreshold => "time_threshold",
            SyncReason::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationStats {
    pub new: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub deleted: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_since_last_sync: Option<f64>,
}

/// Pure decision value produced by [`crate::policy::recommend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecommendation {
    pub should_sync: bool,
    pub reason: SyncReason,
    pub change_set: ChangeSet,
    pub stats: RecommendationStats,
}

/// Stored per project after every completed sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Unix ms
    pub last_sync_time: u64,
    pub strategy_used: SyncMode,
    pub files_processed: usize,
}

/// Per-call overrides on top of [`crate::SyncConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncOptions {
    pub force_full_sync: Option<bool>,
    /// Explicit mode; otherwise derived from `force_full_sync` and `include_patterns`
    pub mode: Option<SyncMode>,
    pub update_embeddings: Option<bool>,
    pub update_graph: Option<bool>,
    pub update_analysis: Option<bool>,
    pub force_sync: Option<bool>,
    pub session_start: Option<bool>,
    pub max_concurrency: Option<usize>,
    pub include_patterns: Option<Vec<String>>,
    pub exclude_patterns: Option<Vec<String>>,
}

impl SyncOptions {
    pub fn mode(&self) -> SyncMode {
        if let Some(mode) = self.mode {
            return mode;
        }
        if self.force_full_sync.unwrap_or(false) {
            return SyncMode::Full;
        }
        match &self.include_patterns {
            Some(patterns) if !patterns.is_empty() => SyncMode::Selective,
            _ => SyncMode::Incremental,
        }
    }
}

pub(crate) fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(hash: &str, flags: ComponentFlags) -> TrackedFileRecord {
        TrackedFileRecord {
            path: "a.ts".into(),
            content_hash: hash.into(),
            structure_hash: hash.into(),
            size: 1,
            last_modified: 0,
            last_synced_at: 0,
            embedding_version: "v1".into(),
            component_flags: flags,
            cleanup_attempts: 0,
            last_error: None,
        }
    }

    #[test]
    fn in_sync_requires_hash_version_and_flags() {
        let required = SyncStrategy::default().required_components();
        let full = record("h", ComponentFlags::all());
        assert!(full.in_sync("h", "v1", &required));
        assert!(!full.in_sync("other", "v1", &required));
        assert!(!full.in_sync("h", "v2", &required));

        let mut partial = ComponentFlags::all();
        partial.set(Component::Embedding, false);
        let partial = record("h", partial);
        assert!(!partial.in_sync("h", "v1", &required));
        assert_eq!(
            partial.component_flags.missing(&required),
            ComponentSet::from([Component::Embedding])
        );

        let mut no_embeddings = SyncStrategy::default();
        no_embeddings.include_embeddings = false;
        assert!(partial.in_sync("h", "v1", &no_embeddings.required_components()));
        assert!(partial.in_sync("h", "v2", &no_embeddings.required_components()));
    }

    #[test]
    fn options_derive_mode() {
        assert_eq!(SyncOptions::default().mode(), SyncMode::Incremental);
        let full = SyncOptions {
            force_full_sync: Some(true),
            ..Default::default()
        };
        assert_eq!(full.mode(), SyncMode::Full);
        let selective = SyncOptions {
            include_patterns: Some(vec!["src/**".into()]),
            ..Default::default()
        };
        assert_eq!(selective.mode(), SyncMode::Selective);
        assert_eq!("FULL".parse::<SyncMode>(), Ok(SyncMode::Full));
    }

    #[test]
    fn records_without_tombstone_fields_deserialize() {
        let raw = r#"{"path":"a.ts","content_hash":"h","structure_hash":"s","size":3,
            "last_modified":1,"last_synced_at":2,"embedding_version":"v1",
            "component_flags":{"embedding":true,"graph":false,"analysis":true}}"#;
        let parsed: TrackedFileRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.cleanup_attempts, 0);
        assert!(!parsed.is_tombstone());
        assert!(!parsed.component_flags.graph);
    }
}
