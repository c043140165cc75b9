//! Turns structural signatures into graph edges.
//!
//! - `IMPORTS`: file → in-project file. External packages are not resolved.
//! - `DEFINES`: file → each declared symbol.
//! - `EXTENDS` / `IMPLEMENTS`: first type with that name in the project, ordered by path.
//!   Duplicate names are ambiguous; the lowest path wins.
//! - `CALLS`: resolved in the caller's class, then in the caller's file. Anything else is
//!   recorded as `unresolved_calls` on the caller instead of inventing a target node.

use crate::error::Result;
use crate::index::GraphIndex;
use crate::types::{Attrs, FileAttrs, NodeId, NodeKind, RelationshipType, SymbolAttrs};
use context_code_signature::{FileHashes, HeritageKind, Language, Signature, SignatureToken, TokenKind};
use std::collections::{BTreeMap, BTreeSet};

const SCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts"];

/// Project-wide view of files and type declarations used to resolve cross-file edges.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    files: BTreeSet<String>,
    types: BTreeMap<String, BTreeSet<(String, NodeId)>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: &str) {
        self.files.insert(path.to_string());
    }

    pub fn add_signature(&mut self, path: &str, signature: &Signature) {
        self.add_file(path);
        for token in signature.tokens.iter().filter(|t| t.kind.is_type()) {
            let Some(kind) = NodeKind::from_token(token.kind) else {
                continue;
            };
            self.types
                .entry(token.name.clone())
                .or_default()
                .insert((path.to_string(), NodeId::symbol(path, kind, &token.name)));
        }
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    /// First type declaration named `name`, by path order.
    pub fn resolve_type(&self, name: &str) -> Option<&NodeId> {
        self.types
            .get(name)
            .and_then(|decls| decls.iter().next())
            .map(|(_, id)| id)
    }

    fn first_file_with_suffix(&self, suffix: &str) -> Option<&String> {
        let nested = format!("/{suffix}");
        self.files
            .iter()
            .find(|path| path.as_str() == suffix || path.ends_with(&nested))
    }
}

/// Edge to be written after the file node
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub relationship: RelationshipType,
    pub attrs: Attrs,
}

/// Everything the graph needs to reflect one file's current content
#[derive(Debug, Clone, PartialEq)]
pub struct FileRelations {
    pub attrs: FileAttrs,
    pub edges: Vec<PlannedEdge>,
}

/// Node id for a declaration token; methods are qualified with their container.
pub fn symbol_id(path: &str, token: &SignatureToken) -> Option<NodeId> {
    let kind = NodeKind::from_token(token.kind)?;
    Some(NodeId::symbol(path, kind, &qualified_name(token)))
}

fn qualified_name(token: &SignatureToken) -> String {
    match (&token.kind, &token.container) {
        (TokenKind::Method, Some(container)) => format!("{container}.{}", token.name),
        _ => token.name.clone(),
    }
}

#[derive(Default)]
struct LocalSymbols {
    types: BTreeMap<String, NodeId>,
    functions: BTreeMap<String, NodeId>,
    methods: BTreeMap<(String, String), NodeId>,
    methods_by_name: BTreeMap<String, NodeId>,
}

impl LocalSymbols {
    fn remember(&mut self, token: &SignatureToken, id: &NodeId) {
        match token.kind {
            TokenKind::Class | TokenKind::Interface | TokenKind::Enum => {
                self.types.entry(token.name.clone()).or_insert_with(|| id.clone());
            }
            TokenKind::Function => {
                self.functions
                    .entry(token.name.clone())
                    .or_insert_with(|| id.clone());
            }
            TokenKind::Method => {
                if let Some(container) = &token.container {
                    self.methods
                        .entry((container.clone(), token.name.clone()))
                        .or_insert_with(|| id.clone());
                }
                self.methods_by_name
                    .entry(token.name.clone())
                    .or_insert_with(|| id.clone());
            }
            TokenKind::Constant | TokenKind::Import => {}
        }
    }

    fn caller(&self, name: &str, class: Option<&str>) -> Option<&NodeId> {
        class
            .and_then(|class| self.methods.get(&(class.to_string(), name.to_string())))
            .or_else(|| self.functions.get(name))
            .or_else(|| self.methods_by_name.get(name))
    }

    fn in_class(&self, class: &str, name: &str) -> Option<&NodeId> {
        self.methods.get(&(class.to_string(), name.to_string()))
    }

    fn in_file(&self, name: &str) -> Option<&NodeId> {
        self.functions
            .get(name)
            .or_else(|| self.methods_by_name.get(name))
            .or_else(|| self.types.get(name))
    }
}

/// Compute the file node attributes and outgoing edges for `path`.
pub fn extract_relations(path: &str, hashes: &FileHashes, table: &SymbolTable) -> FileRelations {
    let file_id = NodeId::file(path);
    let mut attrs = FileAttrs {
        language: hashes.language.as_str().to_string(),
        content_hash: hashes.content_hash.clone(),
        structure_hash: hashes.structure_hash.clone(),
        symbols: Vec::new(),
        unresolved_calls: Vec::new(),
    };
    let Some(signature) = &hashes.signature else {
        return FileRelations {
            attrs,
            edges: Vec::new(),
        };
    };

    let mut edges: BTreeMap<(NodeId, NodeId, RelationshipType), Attrs> = BTreeMap::new();
    let mut local = LocalSymbols::default();
    let mut symbols: BTreeMap<NodeId, SymbolAttrs> = BTreeMap::new();

    for token in signature.declarations() {
        let (Some(id), Some(kind)) = (symbol_id(path, token), NodeKind::from_token(token.kind))
        else {
            continue;
        };
        local.remember(token, &id);
        if symbols.contains_key(&id) {
            continue;
        }
        edges.insert(
            (file_id.clone(), id.clone(), RelationshipType::Defines),
            line_attrs(token.line),
        );
        symbols.insert(
            id.clone(),
            SymbolAttrs {
                id,
                kind,
                name: qualified_name(token),
                container: token.container.clone(),
                line: token.line,
                unresolved_calls: Vec::new(),
            },
        );
    }

    for import in signature.imports() {
        let Some(target) = resolve_import(path, &import.name, signature.language, table) else {
            continue;
        };
        if target == path {
            continue;
        }
        let mut edge_attrs = line_attrs(import.line);
        edge_attrs.insert("specifier".into(), import.name.clone().into());
        edges
            .entry((file_id.clone(), NodeId::file(&target), RelationshipType::Imports))
            .or_insert(edge_attrs);
    }

    for heritage in &signature.heritage {
        let Some(child) = local.types.get(&heritage.child) else {
            continue;
        };
        let parent_name = last_segment(&heritage.parent);
        let Some(parent) = table.resolve_type(parent_name) else {
            log::debug!("Unresolved parent type {parent_name} of {child}");
            continue;
        };
        if parent == child {
            continue;
        }
        let relationship = match heritage.kind {
            HeritageKind::Extends => RelationshipType::Extends,
            HeritageKind::Implements => RelationshipType::Implements,
        };
        edges
            .entry((child.clone(), parent.clone(), relationship))
            .or_default();
    }

    let mut unresolved: BTreeMap<NodeId, BTreeSet<String>> = BTreeMap::new();
    for call in &signature.calls {
        let caller = call
            .caller
            .as_deref()
            .and_then(|name| local.caller(name, call.class.as_deref()))
            .cloned()
            .unwrap_or_else(|| file_id.clone());
        let callee = call
            .class
            .as_deref()
            .and_then(|class| local.in_class(class, &call.callee))
            .or_else(|| local.in_file(&call.callee));
        match callee {
            Some(target) => {
                edges
                    .entry((caller, target.clone(), RelationshipType::Calls))
                    .or_insert_with(|| line_attrs(call.line));
            }
            None => {
                unresolved
                    .entry(caller)
                    .or_default()
                    .insert(call.callee.clone());
            }
        }
    }
    for (caller, names) in unresolved {
        let names: Vec<String> = names.into_iter().collect();
        if caller == file_id {
            attrs.unresolved_calls = names;
        } else if let Some(symbol) = symbols.get_mut(&caller) {
            symbol.unresolved_calls = names;
        }
    }

    attrs.symbols = symbols.into_values().collect();
    FileRelations {
        attrs,
        edges: edges
            .into_iter()
            .map(|((from, to, relationship), attrs)| PlannedEdge {
                from,
                to,
                relationship,
                attrs,
            })
            .collect(),
    }
}

/// Write a file's node and edges into `graph`.
pub async fn apply_relations(
    graph: &dyn GraphIndex,
    project_id: &str,
    path: &str,
    relations: FileRelations,
) -> Result<NodeId> {
    let file_id = graph
        .upsert_file_node(project_id, path, relations.attrs)
        .await?;
    for edge in relations.edges {
        graph
            .upsert_relationship(project_id, &edge.from, &edge.to, edge.relationship, edge.attrs)
            .await?;
    }
    Ok(file_id)
}

fn line_attrs(line: usize) -> Attrs {
    Attrs::from([("line".to_string(), line.into())])
}

fn last_segment(name: &str) -> &str {
    name.rsplit(['.', ':']).next().unwrap_or(name)
}

/// Resolve an import specifier to a project file, if it names one.
pub fn resolve_import(
    from: &str,
    specifier: &str,
    language: Language,
    table: &SymbolTable,
) -> Option<String> {
    let candidates = match language {
        Language::TypeScript | Language::JavaScript => script_candidates(from, specifier)?,
        Language::Python => python_candidates(from, specifier)?,
        Language::Rust => rust_candidates(from, specifier)?,
        Language::Java | Language::Kotlin => {
            let suffix = specifier.trim_end_matches(".*").replace('.', "/");
            return ["java", "kt", "kts"]
                .iter()
                .find_map(|ext| table.first_file_with_suffix(&format!("{suffix}.{ext}")))
                .cloned();
        }
        Language::C | Language::Cpp => {
            let local = join_normalized(parent_dir(from), specifier);
            if let Some(local) = local.filter(|p| table.contains_file(p)) {
                return Some(local);
            }
            return table.first_file_with_suffix(specifier).cloned();
        }
        _ => return None,
    };
    candidates.into_iter().find(|c| table.contains_file(c))
}

fn script_candidates(from: &str, specifier: &str) -> Option<Vec<String>> {
    if !specifier.starts_with('.') {
        return None;
    }
    let base = join_normalized(parent_dir(from), specifier)?;
    let mut out = vec![base.clone()];
    // `./util.js` written against a TypeScript source.
    if let Some(stem) = base
        .strip_suffix(".js")
        .or_else(|| base.strip_suffix(".mjs"))
        .or_else(|| base.strip_suffix(".jsx"))
    {
        out.push(format!("{stem}.ts"));
        out.push(format!("{stem}.tsx"));
    }
    for ext in SCRIPT_EXTENSIONS {
        out.push(format!("{base}.{ext}"));
    }
    for ext in SCRIPT_EXTENSIONS {
        out.push(join_path(&base, &format!("index.{ext}")));
    }
    Some(out)
}

fn python_candidates(from: &str, specifier: &str) -> Option<Vec<String>> {
    let dots = specifier.chars().take_while(|c| *c == '.').count();
    let module = specifier[dots..].replace('.', "/");
    let mut bases = Vec::new();
    if dots > 0 {
        let mut dir = parent_dir(from).to_string();
        for _ in 1..dots {
            dir = parent_dir(&dir).to_string();
        }
        bases.push(if module.is_empty() {
            dir
        } else {
            join_path(&dir, &module)
        });
    } else {
        if module.is_empty() {
            return None;
        }
        bases.push(module.clone());
        bases.push(join_path(parent_dir(from), &module));
    }
    Some(
        bases
            .iter()
            .flat_map(|base| {
                let init = join_path(base, "__init__.py");
                if base.is_empty() {
                    vec![init]
                } else {
                    vec![format!("{base}.py"), init]
                }
            })
            .collect(),
    )
}

fn rust_candidates(from: &str, specifier: &str) -> Option<Vec<String>> {
    let mut segments = specifier.split("::").filter(|s| !s.is_empty());
    let root = match segments.next()? {
        "crate" => crate_src_root(from),
        "self" => rust_module_dir(from),
        "super" => parent_dir(&rust_module_dir(from)).to_string(),
        _ => return None,
    };
    let rest: Vec<&str> = segments.collect();
    let mut out = Vec::new();
    for len in (1..=rest.len()).rev() {
        let module = join_path(&root, &rest[..len].join("/"));
        out.push(format!("{module}.rs"));
        out.push(join_path(&module, "mod.rs"));
    }
    Some(out)
}

fn crate_src_root(from: &str) -> String {
    if from.starts_with("src/") {
        return "src".to_string();
    }
    match from.rfind("/src/") {
        Some(idx) => from[..idx + 4].to_string(),
        None => parent_dir(from).to_string(),
    }
}

/// Directory holding the children of the module defined by `from`.
fn rust_module_dir(from: &str) -> String {
    let dir = parent_dir(from);
    let file = from.rsplit('/').next().unwrap_or(from);
    match file {
        "mod.rs" | "lib.rs" | "main.rs" => dir.to_string(),
        _ => join_path(dir, file.trim_end_matches(".rs")),
    }
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

fn join_path(dir: &str, rest: &str) -> String {
    if dir.is_empty() {
        rest.to_string()
    } else {
        format!("{dir}/{rest}")
    }
}

/// Join and collapse `.` / `..`; `None` if the result escapes the project root.
fn join_normalized(dir: &str, rel: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    for part in rel.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_code_signature::HashEngine;
    use pretty_assertions::assert_eq;

    fn hashes(path: &str, source: &str) -> FileHashes {
        HashEngine::new().hash_file(source.as_bytes(), path)
    }

    fn table(files: &[(&str, &FileHashes)]) -> SymbolTable {
        let mut table = SymbolTable::new();
        for (path, hashes) in files {
            match &hashes.signature {
                Some(sig) => table.add_signature(path, sig),
                None => table.add_file(path),
            }
        }
        table
    }

    fn edges_of(relations: &FileRelations) -> Vec<(String, String, RelationshipType)> {
        relations
            .edges
            .iter()
            .map(|e| (e.from.to_string(), e.to.to_string(), e.relationship))
            .collect()
    }

    #[test]
    fn typescript_project_edges() {
        let base = hashes(
            "src/base.ts",
            "export class BaseService {}\nexport interface Repo {}\n",
        );
        let user = hashes(
            "src/user.ts",
            r#"import { BaseService, Repo } from './base';
import express from 'express';

export class UserService extends BaseService implements Repo {
  load(id) {
    this.validate(id);
    return fetchRemote(id);
  }

  validate(id) {
    return id;
  }
}
"#,
        );
        let table = table(&[("src/base.ts", &base), ("src/user.ts", &user)]);
        let relations = extract_relations("src/user.ts", &user, &table);

        assert_eq!(
            edges_of(&relations),
            vec![
                (
                    "file:src/user.ts".into(),
                    "file:src/base.ts".into(),
                    RelationshipType::Imports
                ),
                (
                    "file:src/user.ts".into(),
                    "sym:src/user.ts#class:UserService".into(),
                    RelationshipType::Defines
                ),
                (
                    "file:src/user.ts".into(),
                    "sym:src/user.ts#method:UserService.load".into(),
                    RelationshipType::Defines
                ),
                (
                    "file:src/user.ts".into(),
                    "sym:src/user.ts#method:UserService.validate".into(),
                    RelationshipType::Defines
                ),
                (
                    "sym:src/user.ts#class:UserService".into(),
                    "sym:src/base.ts#class:BaseService".into(),
                    RelationshipType::Extends
                ),
                (
                    "sym:src/user.ts#class:UserService".into(),
                    "sym:src/base.ts#interface:Repo".into(),
                    RelationshipType::Implements
                ),
                (
                    "sym:src/user.ts#method:UserService.load".into(),
                    "sym:src/user.ts#method:UserService.validate".into(),
                    RelationshipType::Calls
                ),
            ]
        );

        let load = relations
            .attrs
            .symbols
            .iter()
            .find(|s| s.name == "UserService.load")
            .expect("load symbol");
        assert_eq!(load.unresolved_calls, vec!["fetchRemote".to_string()]);
    }

    #[test]
    fn duplicate_type_names_resolve_to_lowest_path() {
        let a = hashes("a/model.py", "class Model:\n    pass\n");
        let b = hashes("b/model.py", "class Model:\n    pass\n");
        let child = hashes("c/user.py", "class User(Model):\n    pass\n");
        let table = table(&[("b/model.py", &b), ("c/user.py", &child), ("a/model.py", &a)]);
        let relations = extract_relations("c/user.py", &child, &table);
        assert!(edges_of(&relations).contains(&(
            "sym:c/user.py#class:User".into(),
            "sym:a/model.py#class:Model".into(),
            RelationshipType::Extends
        )));
    }

    #[test]
    fn resolves_python_and_rust_imports() {
        let mut table = SymbolTable::new();
        for file in [
            "pkg/__init__.py",
            "pkg/models.py",
            "pkg/api/views.py",
            "crates/core/src/lib.rs",
            "crates/core/src/store/mod.rs",
            "crates/core/src/helpers.rs",
        ] {
            table.add_file(file);
        }

        let resolve = |from: &str, spec: &str, lang| resolve_import(from, spec, lang, &table);
        assert_eq!(
            resolve("pkg/api/views.py", "..models", Language::Python).as_deref(),
            Some("pkg/models.py")
        );
        assert_eq!(
            resolve("pkg/api/views.py", "pkg.models", Language::Python).as_deref(),
            Some("pkg/models.py")
        );
        assert_eq!(
            resolve("pkg/models.py", ".", Language::Python).as_deref(),
            Some("pkg/__init__.py")
        );
        assert_eq!(resolve("pkg/models.py", "os", Language::Python), None);
        assert_eq!(
            resolve("crates/core/src/helpers.rs", "crate::store::Store", Language::Rust)
                .as_deref(),
            Some("crates/core/src/store/mod.rs")
        );
        assert_eq!(
            resolve("crates/core/src/lib.rs", "self::helpers", Language::Rust).as_deref(),
            Some("crates/core/src/helpers.rs")
        );
        assert_eq!(
            resolve("crates/core/src/lib.rs", "std::collections::HashMap", Language::Rust),
            None
        );
    }

    #[test]
    fn external_and_escaping_script_imports_are_ignored() {
        let mut table = SymbolTable::new();
        table.add_file("src/util/index.ts");
        assert_eq!(
            resolve_import("src/app.ts", "./util", Language::TypeScript, &table).as_deref(),
            Some("src/util/index.ts")
        );
        assert_eq!(
            resolve_import("src/app.ts", "react", Language::TypeScript, &table),
            None
        );
        assert_eq!(
            resolve_import("app.ts", "../../outside", Language::TypeScript, &table),
            None
        );
    }

    #[test]
    fn unreadable_structure_yields_a_bare_file_node() {
        let mut hashes = hashes("blob.bin", "whatever");
        hashes.signature = None;
        let relations = extract_relations("blob.bin", &hashes, &SymbolTable::new());
        assert!(relations.edges.is_empty());
        assert!(relations.attrs.symbols.is_empty());
    }
}
