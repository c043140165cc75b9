use context_code_signature::TokenKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form node/edge attributes
pub type Attrs = BTreeMap<String, serde_json::Value>;

/// Deterministic node identifier.
///
/// - file nodes: `file:<path>`
/// - symbol nodes: `sym:<path>#<kind>:<name>` (methods use `Container.name`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn file(path: &str) -> Self {
        Self(format!("file:{path}"))
    }

    pub fn symbol(path: &str, kind: NodeKind, name: &str) -> Self {
        Self(format!("sym:{path}#{}:{name}", kind.as_str()))
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let id = Self(raw.to_string());
        id.path().is_some().then_some(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of the file that owns this node.
    pub fn path(&self) -> Option<&str> {
        if let Some(path) = self.0.strip_prefix("file:") {
            return Some(path);
        }
        let rest = self.0.strip_prefix("sym:")?;
        rest.rsplit_once('#').map(|(path, _)| path)
    }

    pub fn is_file(&self) -> bool {
        self.0.starts_with("file:")
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Class,
    Function,
    Method,
    Interface,
    Enum,
    Constant,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Class => "class",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Interface => "interface",
            NodeKind::Enum => "enum",
            NodeKind::Constant => "constant",
        }
    }

    /// Declarations map to symbol kinds; imports have no node of their own.
    pub fn from_token(kind: TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Class => Some(NodeKind::Class),
            TokenKind::Function => Some(NodeKind::Function),
            TokenKind::Method => Some(NodeKind::Method),
            TokenKind::Interface => Some(NodeKind::Interface),
            TokenKind::Enum => Some(NodeKind::Enum),
            TokenKind::Constant => Some(NodeKind::Constant),
            TokenKind::Import => None,
        }
    }
}

/// Type of relationship between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// File imports another in-project file
    Imports,

    /// File declares a symbol
    Defines,

    /// Type extends another type
    Extends,

    /// Type implements an interface/trait
    Implements,

    /// Function or method calls another
    Calls,
}

impl RelationshipType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipType::Imports => "IMPORTS",
            RelationshipType::Defines => "DEFINES",
            RelationshipType::Extends => "EXTENDS",
            RelationshipType::Implements => "IMPLEMENTS",
            RelationshipType::Calls => "CALLS",
        }
    }
}

/// Symbol declared by a file, as handed to [`GraphIndex::upsert_file_node`](crate::GraphIndex)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolAttrs {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub line: usize,

    /// Callees that resolved to nothing in the same class or file
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_calls: Vec<String>,
}

/// Attributes of a file node. The symbol list is authoritative: symbols of the file that are
/// not listed are removed on upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttrs {
    pub language: String,
    pub content_hash: String,
    pub structure_hash: String,
    #[serde(default)]
    pub symbols: Vec<SymbolAttrs>,

    /// Unresolved calls made at file scope
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_calls: Vec<String>,
}

/// Node in the project graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub attrs: Attrs,

    /// Created as an edge target before its file was upserted
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
}

/// Edge in the project graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub relationship: RelationshipType,
    #[serde(default)]
    pub attrs: Attrs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_deterministic_and_carry_their_path() {
        let file = NodeId::file("src/a.ts");
        let sym = NodeId::symbol("src/a.ts", NodeKind::Method, "UserService.load");
        assert_eq!(file.as_str(), "file:src/a.ts");
        assert_eq!(sym.as_str(), "sym:src/a.ts#method:UserService.load");
        assert_eq!(file.path(), Some("src/a.ts"));
        assert_eq!(sym.path(), Some("src/a.ts"));
        assert!(NodeId::parse("nonsense").is_none());
        assert_eq!(NodeId::parse(sym.as_str()), Some(sym.clone()));
        assert_eq!(
            serde_json::to_string(&RelationshipType::Implements).unwrap(),
            "\"IMPLEMENTS\""
        );
    }
}
