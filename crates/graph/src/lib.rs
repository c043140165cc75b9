//! # Context Graph
//!
//! Relationship graph derived from structural signatures.
//!
//! ## Architecture
//!
//! ```text
//! FileHashes (signature) + SymbolTable (whole project)
//!     │
//!     ├──> Relationship extraction
//!     │      ├─ IMPORTS    file → in-project file
//!     │      ├─ DEFINES    file → class/function/method/interface/enum/constant
//!     │      ├─ EXTENDS / IMPLEMENTS (first match by path)
//!     │      └─ CALLS      same class, then same file; otherwise `unresolved_calls`
//!     │
//!     └──> GraphIndex
//!            ├─ MemoryGraphIndex (petgraph StableGraph per project, JSON snapshot)
//!            └─ NoopGraphIndex
//! ```
//!
//! Node ids are deterministic (`file:<path>`, `sym:<path>#<kind>:<name>`), so an edge may
//! point at a file that has not been written yet; such targets exist as placeholders until
//! their file is upserted.

mod error;
mod graph;
mod index;
mod relations;
mod store;
mod types;

pub use error::{GraphError, Result};
pub use graph::ProjectGraph;
pub use index::{GraphIndex, NoopGraphIndex};
pub use relations::{
    apply_relations, extract_relations, resolve_import, symbol_id, FileRelations, PlannedEdge,
    SymbolTable,
};
pub use store::{MemoryGraphIndex, GRAPH_FILE_NAME};
pub use types::{
    Attrs, FileAttrs, GraphEdge, GraphNode, NodeId, NodeKind, RelationshipType, SymbolAttrs,
};
