use crate::hash_store::{HashStoreBackend, DEFAULT_TTL_DAYS};
use crate::limits::{
    parse_sync_concurrency, DEFAULT_SYNC_CONCURRENCY, MAX_SYNC_CONCURRENCY, SYNC_CONCURRENCY_ENV,
};
use crate::scanner::{ScanOptions, DEFAULT_MAX_FILE_SIZE_BYTES};
use crate::tool_data::BUILTIN_ANALYZERS;
use crate::types::{SyncOptions, SyncStrategy};
use crate::{Result, SyncError};
use context_vector_store::paths::context_dir_for_project_root;
use context_vector_store::HashEmbedder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "sync.toml";
pub const BACKEND_ENV: &str = "CONTEXT_SYNC_BACKEND";
pub const STATE_DIR_ENV: &str = "CONTEXT_SYNC_STATE_DIR";
pub const DEFAULT_MAX_CLEANUP_ATTEMPTS: u32 = 3;
pub const DEFAULT_TIME_THRESHOLD_HOURS: f64 = 24.0;

fn default_embedding_version() -> String {
    HashEmbedder::default().model_id()
}

/// Sync settings: defaults, then `<root>/.context/sync.toml`, then environment, then flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub backend: HashStoreBackend,

    /// Where stores, caches and locks live; `<root>/.context` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    pub memory_ttl_days: u64,

    pub max_concurrency: usize,

    /// Changing this re-queues every embedding
    pub embedding_version: String,

    pub embedding_excluded_extensions: Vec<String>,

    pub max_file_size_bytes: u64,

    pub time_threshold_hours: f64,

    pub max_cleanup_attempts: u32,

    /// Analyzers run for the `analysis` component
    pub tools: Vec<String>,

    /// Maintain `<state_dir>/hash-cache.json`
    pub local_cache: bool,

    /// Keep file bytes in the hash store (sqlite backend only)
    pub store_content: bool,

    pub include_patterns: Vec<String>,

    pub exclude_patterns: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backend: HashStoreBackend::Memory,
            state_dir: None,
            memory_ttl_days: DEFAULT_TTL_DAYS,
            max_concurrency: DEFAULT_SYNC_CONCURRENCY,
            embedding_version: default_embedding_version(),
            embedding_excluded_extensions: vec!["lock".into(), "map".into(), "svg".into()],
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            time_threshold_hours: DEFAULT_TIME_THRESHOLD_HOURS,
            max_cleanup_attempts: DEFAULT_MAX_CLEANUP_ATTEMPTS,
            tools: BUILTIN_ANALYZERS.iter().map(|t| t.to_string()).collect(),
            local_cache: true,
            store_content: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn config_path(root: &Path) -> PathBuf {
        context_dir_for_project_root(root).join(CONFIG_FILE_NAME)
    }

    /// Defaults, the project's `sync.toml` (if any), then environment overrides.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::config_path(root);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(raw) => Self::from_toml_str(&raw).map_err(|err| {
                SyncError::Config(format!("{}: {err}", path.display()))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                return Err(SyncError::Config(format!(
                    "read {}: {err}",
                    path.display()
                )))
            }
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `CONTEXT_SYNC_*` overrides read through `lookup`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup(SYNC_CONCURRENCY_ENV).filter(|v| !v.trim().is_empty()) {
            if raw.trim().parse::<usize>().is_err() {
                return Err(SyncError::Config(format!(
                    "{SYNC_CONCURRENCY_ENV} must be a positive integer, got '{raw}'"
                )));
            }
            self.max_concurrency = parse_sync_concurrency(Some(&raw), self.max_concurrency);
        }
        if let Some(raw) = lookup(BACKEND_ENV).filter(|v| !v.trim().is_empty()) {
            self.backend = raw.parse()?;
        }
        if let Some(raw) = lookup(STATE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.state_dir = Some(PathBuf::from(raw.trim()));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(SyncError::Config("max_concurrency must be at least 1".into()));
        }
        if self.max_cleanup_attempts == 0 {
            return Err(SyncError::Config(
                "max_cleanup_attempts must be at least 1".into(),
            ));
        }
        if self.embedding_version.trim().is_empty() {
            return Err(SyncError::Config("embedding_version must not be empty".into()));
        }
        if !self.time_threshold_hours.is_finite() || self.time_threshold_hours < 0.0 {
            return Err(SyncError::Config(format!(
                "time_threshold_hours must be a non-negative number, got {}",
                self.time_threshold_hours
            )));
        }
        Ok(())
    }

    pub fn state_dir(&self, root: &Path) -> PathBuf {
        match &self.state_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => context_dir_for_project_root(root),
        }
    }

    pub fn strategy(&self, options: &SyncOptions) -> SyncStrategy {
        SyncStrategy {
            mode: options.mode(),
            force_sync: options.force_sync.unwrap_or(false),
            session_start: options.session_start.unwrap_or(false),
            time_threshold_hours: self.time_threshold_hours,
            include_embeddings: options.update_embeddings.unwrap_or(true),
            include_graph: options.update_graph.unwrap_or(true),
            include_analysis: options.update_analysis.unwrap_or(true),
        }
    }

    /// Zero is left for policy validation to reject; larger values are capped.
    pub fn max_concurrency(&self, options: &SyncOptions) -> usize {
        options
            .max_concurrency
            .unwrap_or(self.max_concurrency)
            .min(MAX_SYNC_CONCURRENCY)
    }

    /// Per-call include patterns replace the configured ones; excludes accumulate.
    pub fn scan_options(&self, options: &SyncOptions) -> ScanOptions {
        let include_patterns = match &options.include_patterns {
            Some(patterns) if !patterns.is_empty() => patterns.clone(),
            _ => self.include_patterns.clone(),
        };
        let mut exclude_patterns = self.exclude_patterns.clone();
        if let Some(extra) = &options.exclude_patterns {
            exclude_patterns.extend(extra.iter().cloned());
        }
        ScanOptions {
            include_patterns,
            exclude_patterns,
            max_file_size_bytes: self.max_file_size_bytes,
        }
    }
}
