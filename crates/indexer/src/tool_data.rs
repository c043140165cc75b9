use crate::{Result, SyncError};
use async_trait::async_trait;
use context_code_signature::FileHashes;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const TOOL_DATA_FILE_NAME: &str = "tool-data.json";

/// Auxiliary per-tool metadata, keyed by `(project_id, tool, path)`.
#[async_trait]
pub trait ToolDataStore: Send + Sync {
    async fn put(&self, project_id: &str, tool: &str, path: &str, payload: Value) -> Result<()>;

    /// Absent entries succeed.
    async fn delete(&self, project_id: &str, tool: &str, path: &str) -> Result<()>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Used when analysis is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopToolDataStore;

#[async_trait]
impl ToolDataStore for NoopToolDataStore {
    async fn put(&self, _project_id: &str, _tool: &str, _path: &str, _payload: Value) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _project_id: &str, _tool: &str, _path: &str) -> Result<()> {
        Ok(())
    }
}

type ToolPayloads = BTreeMap<String, BTreeMap<String, BTreeMap<String, Value>>>;

/// project -> tool -> path -> payload, optionally persisted as one JSON file.
#[derive(Default)]
pub struct MemoryToolDataStore {
    data: RwLock<ToolPayloads>,
    path: Option<PathBuf>,
}

impl MemoryToolDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|err| SyncError::Other(format!("parse {}: {err}", path.display())))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => ToolPayloads::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            data: RwLock::new(data),
            path: Some(path),
        })
    }

    pub async fn get(&self, project_id: &str, tool: &str, path: &str) -> Option<Value> {
        let data = self.data.read().await;
        data.get(project_id)?.get(tool)?.get(path).cloned()
    }

    /// Paths with a payload for `tool`, in order.
    pub async fn paths(&self, project_id: &str, tool: &str) -> Vec<String> {
        let data = self.data.read().await;
        data.get(project_id)
            .and_then(|tools| tools.get(tool))
            .map(|paths| paths.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ToolDataStore for MemoryToolDataStore {
    async fn put(&self, project_id: &str, tool: &str, path: &str, payload: Value) -> Result<()> {
        let mut data = self.data.write().await;
        data.entry(project_id.to_string())
            .or_default()
            .entry(tool.to_string())
            .or_default()
            .insert(path.to_string(), payload);
        Ok(())
    }

    async fn delete(&self, project_id: &str, tool: &str, path: &str) -> Result<()> {
        let mut data = self.data.write().await;
        if let Some(tools) = data.get_mut(project_id) {
            if let Some(paths) = tools.get_mut(tool) {
                paths.remove(path);
                if paths.is_empty() {
                    tools.remove(tool);
                }
            }
            if tools.is_empty() {
                data.remove(project_id);
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(&*self.data.read().await)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        log::debug!("Tool data saved to {}", path.display());
        Ok(())
    }
}

/// Produces one JSON payload per file for the `analysis` component.
pub trait ToolAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    fn analyze(&self, path: &str, content: &[u8], hashes: &FileHashes) -> Result<Value>;
}

/// Declarations, imports and heritage as seen by the signature extractor.
pub struct OutlineAnalyzer;

impl ToolAnalyzer for OutlineAnalyzer {
    fn name(&self) -> &str {
        "outline"
    }

    fn analyze(&self, _path: &str, _content: &[u8], hashes: &FileHashes) -> Result<Value> {
        let Some(signature) = &hashes.signature else {
            return Ok(json!({
                "language": hashes.language.as_str(),
                "extracted": false,
            }));
        };
        let symbols: Vec<Value> = signature
            .tokens
            .iter()
            .map(|token| {
                json!({
                    "token": token.render(),
                    "container": token.container,
                    "line": token.line,
                })
            })
            .collect();
        Ok(json!({
            "language": hashes.language.as_str(),
            "extracted": true,
            "structure_hash": hashes.structure_hash,
            "symbols": symbols,
            "heritage": signature.heritage,
        }))
    }
}

/// Byte and line counts.
pub struct StatsAnalyzer;

impl ToolAnalyzer for StatsAnalyzer {
    fn name(&self) -> &str {
        "stats"
    }

    fn analyze(&self, _path: &str, content: &[u8], hashes: &FileHashes) -> Result<Value> {
        let text = String::from_utf8_lossy(content);
        let lines = text.lines().count();
        let blank = text.lines().filter(|l| l.trim().is_empty()).count();
        Ok(json!({
            "language": hashes.language.as_str(),
            "bytes": content.len(),
            "lines": lines,
            "blank_lines": blank,
        }))
    }
}

pub const BUILTIN_ANALYZERS: &[&str] = &["outline", "stats"];

pub fn builtin_analyzer(name: &str) -> Option<Arc<dyn ToolAnalyzer>> {
    match name {
        "outline" => Some(Arc::new(OutlineAnalyzer)),
        "stats" => Some(Arc::new(StatsAnalyzer)),
        _ => None,
    }
}

/// Resolve configured tool names; unknown names are a configuration error.
pub fn analyzers_for(names: &[String]) -> Result<Vec<Arc<dyn ToolAnalyzer>>> {
    let mut seen = std::collections::BTreeSet::new();
    let mut analyzers = Vec::new();
    for name in names {
        let name = name.trim();
        if !seen.insert(name.to_string()) {
            continue;
        }
        let analyzer = builtin_analyzer(name).ok_or_else(|| {
            SyncError::Config(format!(
                "unknown tool '{name}' (available: {})",
                BUILTIN_ANALYZERS.join(", ")
            ))
        })?;
        analyzers.push(analyzer);
    }
    Ok(analyzers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_code_signature::HashEngine;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn builtin_analyzers_describe_the_file() {
        let source = b"export class A extends B {\n\n  run() {}\n}\n";
        let hashes = HashEngine::new().hash_file(source, "a.ts");

        let outline = OutlineAnalyzer.analyze("a.ts", source, &hashes).unwrap();
        assert_eq!(outline["language"], "typescript");
        assert_eq!(outline["symbols"][0]["token"], "class:A");
        assert_eq!(outline["heritage"][0]["parent"], "B");

        let stats = StatsAnalyzer.analyze("a.ts", source, &hashes).unwrap();
        assert_eq!(stats["lines"], 4);
        assert_eq!(stats["blank_lines"], 1);
        assert_eq!(stats["bytes"], source.len());
    }

    #[test]
    fn unknown_tools_are_rejected_and_duplicates_collapse() {
        let names = vec!["stats".to_string(), "stats".to_string(), "outline".to_string()];
        let analyzers = analyzers_for(&names).unwrap();
        let resolved: Vec<&str> = analyzers.iter().map(|a| a.name()).collect();
        assert_eq!(resolved, vec!["stats", "outline"]);

        let err = analyzers_for(&["lint".to_string()]).err().unwrap();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[tokio::test]
    async fn memory_store_persists_and_prunes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(TOOL_DATA_FILE_NAME);
        let store = MemoryToolDataStore::open(&path).await.unwrap();
        store.put("p", "stats", "a.ts", json!({"lines": 1})).await.unwrap();
        store.put("p", "stats", "b.ts", json!({"lines": 2})).await.unwrap();
        store.delete("p", "stats", "b.ts").await.unwrap();
        store.delete("p", "outline", "b.ts").await.unwrap();
        store.flush().await.unwrap();

        let reopened = MemoryToolDataStore::open(&path).await.unwrap();
        assert_eq!(reopened.paths("p", "stats").await, vec!["a.ts"]);
        assert_eq!(
            reopened.get("p", "stats", "a.ts").await,
            Some(json!({"lines": 1}))
        );
    }
}
