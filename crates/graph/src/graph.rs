use crate::types::{Attrs, FileAttrs, GraphEdge, GraphNode, NodeId, NodeKind, RelationshipType};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Relationship graph of one project.
///
/// Node indices are stable across removals; lookups go through the id index.
#[derive(Debug, Default)]
pub struct ProjectGraph {
    graph: StableDiGraph<GraphNode, GraphEdge>,
    index: HashMap<NodeId, NodeIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EdgeRecord {
    pub from: NodeId,
    pub to: NodeId,
    pub relationship: RelationshipType,
    #[serde(default)]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<EdgeRecord>,
}

impl ProjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.index.get(id).and_then(|idx| self.graph.node_weight(*idx))
    }

    /// Nodes owned by `path` (the file node and its symbols), sorted by id.
    pub fn nodes_for_file(&self, path: &str) -> Vec<&GraphNode> {
        let mut nodes: Vec<&GraphNode> = self
            .graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .filter(|node| node.path == path)
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// Outgoing edges as `(relationship, target)`, sorted.
    pub fn edges_from(&self, id: &NodeId) -> Vec<(RelationshipType, NodeId)> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<(RelationshipType, NodeId)> = self
            .graph
            .edges(idx)
            .filter_map(|edge| {
                let target = self.graph.node_weight(edge.target())?;
                Some((edge.weight().relationship, target.id.clone()))
            })
            .collect();
        edges.sort();
        edges
    }

    /// Replace the file node and reconcile its symbol nodes with `attrs.symbols`.
    ///
    /// Outgoing edges of the file and its symbols are dropped; the caller re-adds them.
    pub(crate) fn upsert_file(&mut self, path: &str, attrs: FileAttrs) -> NodeId {
        let file_id = NodeId::file(path);
        let keep: BTreeSet<NodeId> = attrs
            .symbols
            .iter()
            .map(|s| s.id.clone())
            .chain(std::iter::once(file_id.clone()))
            .collect();

        let owned: Vec<(NodeId, NodeIndex)> = self
            .index
            .iter()
            .filter(|(id, _)| id.path() == Some(path))
            .map(|(id, idx)| (id.clone(), *idx))
            .collect();
        for (id, idx) in owned {
            if keep.contains(&id) {
                let outgoing: Vec<_> = self.graph.edges(idx).map(|e| e.id()).collect();
                for edge in outgoing {
                    self.graph.remove_edge(edge);
                }
            } else {
                self.graph.remove_node(idx);
                self.index.remove(&id);
            }
        }

        let mut file_attrs = Attrs::new();
        file_attrs.insert("language".into(), attrs.language.clone().into());
        file_attrs.insert("content_hash".into(), attrs.content_hash.clone().into());
        file_attrs.insert("structure_hash".into(), attrs.structure_hash.clone().into());
        if !attrs.unresolved_calls.is_empty() {
            file_attrs.insert(
                "unresolved_calls".into(),
                serde_json::json!(attrs.unresolved_calls),
            );
        }
        self.put_node(GraphNode {
            id: file_id.clone(),
            kind: NodeKind::File,
            path: path.to_string(),
            name: path.to_string(),
            attrs: file_attrs,
            placeholder: false,
        });

        for symbol in attrs.symbols {
            let mut sym_attrs = Attrs::new();
            sym_attrs.insert("line".into(), symbol.line.into());
            if let Some(container) = &symbol.container {
                sym_attrs.insert("container".into(), container.clone().into());
            }
            if !symbol.unresolved_calls.is_empty() {
                sym_attrs.insert(
                    "unresolved_calls".into(),
                    serde_json::json!(symbol.unresolved_calls),
                );
            }
            self.put_node(GraphNode {
                id: symbol.id,
                kind: symbol.kind,
                path: path.to_string(),
                name: symbol.name,
                attrs: sym_attrs,
                placeholder: false,
            });
        }

        file_id
    }

    /// Insert or update one edge; a missing endpoint becomes a placeholder node.
    pub(crate) fn upsert_edge(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        relationship: RelationshipType,
        attrs: Attrs,
    ) -> bool {
        if from.path().is_none() || to.path().is_none() {
            return false;
        }
        let (Some(from_idx), Some(to_idx)) = (self.ensure_node(from), self.ensure_node(to)) else {
            return false;
        };
        let existing = self
            .graph
            .edges(from_idx)
            .find(|edge| edge.target() == to_idx && edge.weight().relationship == relationship)
            .map(|edge| edge.id());
        match existing {
            Some(edge) => {
                if let Some(weight) = self.graph.edge_weight_mut(edge) {
                    weight.attrs = attrs;
                }
            }
            None => {
                self.graph
                    .add_edge(from_idx, to_idx, GraphEdge { relationship, attrs });
            }
        }
        true
    }

    /// Remove every node owned by `path`, with all incident edges. Returns the removed count.
    pub(crate) fn remove_file(&mut self, path: &str) -> usize {
        let owned: Vec<NodeId> = self
            .index
            .keys()
            .filter(|id| id.path() == Some(path))
            .cloned()
            .collect();
        for id in &owned {
            if let Some(idx) = self.index.remove(id) {
                self.graph.remove_node(idx);
            }
        }
        owned.len()
    }

    fn put_node(&mut self, node: GraphNode) {
        match self.index.get(&node.id) {
            Some(&idx) => {
                if let Some(slot) = self.graph.node_weight_mut(idx) {
                    *slot = node;
                }
            }
            None => {
                let id = node.id.clone();
                let idx = self.graph.add_node(node);
                self.index.insert(id, idx);
            }
        }
    }

    fn ensure_node(&mut self, id: &NodeId) -> Option<NodeIndex> {
        if let Some(&idx) = self.index.get(id) {
            return Some(idx);
        }
        let path = id.path()?.to_string();
        let (kind, name) = if id.is_file() {
            (NodeKind::File, path.clone())
        } else {
            let tail = id.as_str().rsplit_once('#').map(|(_, tail)| tail)?;
            let (kind, name) = tail.split_once(':')?;
            let kind = [
                NodeKind::Class,
                NodeKind::Function,
                NodeKind::Method,
                NodeKind::Interface,
                NodeKind::Enum,
                NodeKind::Constant,
            ]
            .into_iter()
            .find(|k| k.as_str() == kind)?;
            (kind, name.to_string())
        };
        let idx = self.graph.add_node(GraphNode {
            id: id.clone(),
            kind,
            path,
            name,
            attrs: Attrs::new(),
            placeholder: true,
        });
        self.index.insert(id.clone(), idx);
        Some(idx)
    }

    pub(crate) fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<GraphNode> = self
            .graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut edges: Vec<EdgeRecord> = self
            .graph
            .edge_indices()
            .filter_map(|edge| {
                let (source, target) = self.graph.edge_endpoints(edge)?;
                let weight = self.graph.edge_weight(edge)?;
                Some(EdgeRecord {
                    from: self.graph.node_weight(source)?.id.clone(),
                    to: self.graph.node_weight(target)?.id.clone(),
                    relationship: weight.relationship,
                    attrs: weight.attrs.clone(),
                })
            })
            .collect();
        edges.sort_by(|a, b| {
            (&a.from, &a.to, a.relationship).cmp(&(&b.from, &b.to, b.relationship))
        });
        GraphSnapshot { nodes, edges }
    }

    pub(crate) fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut graph = Self::new();
        for node in snapshot.nodes {
            graph.put_node(node);
        }
        for edge in snapshot.edges {
            graph.upsert_edge(&edge.from, &edge.to, edge.relationship, edge.attrs);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SymbolAttrs;
    use pretty_assertions::assert_eq;

    fn symbol(path: &str, kind: NodeKind, name: &str) -> SymbolAttrs {
        SymbolAttrs {
            id: NodeId::symbol(path, kind, name),
            kind,
            name: name.to_string(),
            container: None,
            line: 1,
            unresolved_calls: Vec::new(),
        }
    }

    fn attrs(symbols: Vec<SymbolAttrs>) -> FileAttrs {
        FileAttrs {
            language: "typescript".into(),
            symbols,
            ..FileAttrs::default()
        }
    }

    #[test]
    fn upsert_reconciles_symbols_and_drops_owned_edges() {
        let mut graph = ProjectGraph::new();
        let file = graph.upsert_file(
            "a.ts",
            attrs(vec![
                symbol("a.ts", NodeKind::Function, "one"),
                symbol("a.ts", NodeKind::Function, "two"),
            ]),
        );
        let one = NodeId::symbol("a.ts", NodeKind::Function, "one");
        let two = NodeId::symbol("a.ts", NodeKind::Function, "two");
        graph.upsert_edge(&file, &one, RelationshipType::Defines, Attrs::new());
        graph.upsert_edge(&one, &two, RelationshipType::Calls, Attrs::new());
        assert_eq!(
            graph.edges_from(&one),
            vec![(RelationshipType::Calls, two.clone())]
        );

        graph.upsert_file("a.ts", attrs(vec![symbol("a.ts", NodeKind::Function, "one")]));
        assert!(graph.node(&two).is_none());
        assert!(graph.edges_from(&file).is_empty());
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn edges_to_unknown_nodes_create_placeholders() {
        let mut graph = ProjectGraph::new();
        let file = graph.upsert_file("a.ts", attrs(Vec::new()));
        let target = NodeId::file("b.ts");
        assert!(graph.upsert_edge(&file, &target, RelationshipType::Imports, Attrs::new()));
        assert!(graph.upsert_edge(&file, &target, RelationshipType::Imports, Attrs::new()));
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.node(&target).is_some_and(|n| n.placeholder));

        graph.upsert_file("b.ts", attrs(Vec::new()));
        assert!(graph.node(&target).is_some_and(|n| !n.placeholder));
        assert_eq!(graph.edges_from(&file), vec![(RelationshipType::Imports, target)]);
    }

    #[test]
    fn remove_file_drops_incident_edges() {
        let mut graph = ProjectGraph::new();
        let a = graph.upsert_file("a.ts", attrs(Vec::new()));
        let b = graph.upsert_file("b.ts", attrs(vec![symbol("b.ts", NodeKind::Class, "B")]));
        graph.upsert_edge(&a, &b, RelationshipType::Imports, Attrs::new());
        assert_eq!(graph.edges_from(&a), vec![(RelationshipType::Imports, b.clone())]);

        assert_eq!(graph.remove_file("b.ts"), 2);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn snapshot_restores_nodes_and_edges() {
        let mut graph = ProjectGraph::new();
        let a = graph.upsert_file("a.ts", attrs(Vec::new()));
        let b = graph.upsert_file("b.ts", attrs(Vec::new()));
        graph.upsert_edge(&a, &b, RelationshipType::Imports, Attrs::new());

        let restored = ProjectGraph::from_snapshot(graph.snapshot());
        assert_eq!(restored.node_count(), 2);
        assert_eq!(restored.edges_from(&a), vec![(RelationshipType::Imports, b)]);
    }
}
