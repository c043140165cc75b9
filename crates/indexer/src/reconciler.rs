use crate::scanner::PathFilters;
use crate::types::{ChangeSet, Component, ComponentSet, SyncMode, TrackedFileRecord};
use std::collections::BTreeMap;

/// Everything classification depends on. Scan order never matters: all inputs are ordered maps.
pub struct ReconcileInput<'a> {
    /// Current path -> content hash, after filtering and hashing
    pub current: &'a BTreeMap<String, String>,
    pub tracked: &'a BTreeMap<String, TrackedFileRecord>,
    pub mode: SyncMode,
    pub required: &'a ComponentSet,
    pub embedding_version: &'a str,
    /// In selective mode only tracked paths matching these filters may become deleted
    pub selection: Option<&'a PathFilters>,
    /// Paths (or directory prefixes) the scan could not read; their records are left alone
    pub unreadable: &'a [String],
}

/// Diff the current scan against the tracked records.
pub fn reconcile(input: &ReconcileInput<'_>) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (path, content_hash) in input.current {
        let record = input.tracked.get(path);
        let pending = match (input.mode, record) {
            (SyncMode::Full, _) | (_, None) => {
                changes.new.insert(path.clone());
                input.required.clone()
            }
            (_, Some(record)) => match classify(record, content_hash, input) {
                Some(pending) => {
                    changes.modified.insert(path.clone());
                    pending
                }
                None => {
                    changes.unchanged.insert(path.clone());
                    continue;
                }
            },
        };
        log::debug!("{path}: pending {pending:?}");
        changes.pending.insert(path.clone(), pending);
    }

    for path in input.tracked.keys() {
        if input.current.contains_key(path) || is_unreadable(path, input.unreadable) {
            continue;
        }
        if input.mode == SyncMode::Selective {
            let in_scope = input.selection.map(|f| f.matches(path)).unwrap_or(true);
            if !in_scope {
                continue;
            }
        }
        changes.deleted.insert(path.clone());
    }

    changes
}

/// `None` when the record is in sync; otherwise the components to (re)run.
fn classify(
    record: &TrackedFileRecord,
    content_hash: &str,
    input: &ReconcileInput<'_>,
) -> Option<ComponentSet> {
    // A reappearing tombstone may have lost some artifacts already.
    if record.is_tombstone() || record.content_hash != content_hash {
        return Some(input.required.clone());
    }
    if record.in_sync(content_hash, input.embedding_version, input.required) {
        return None;
    }
    let mut pending = record.component_flags.missing(input.required);
    if record.embedding_version != input.embedding_version
        && input.required.contains(&Component::Embedding)
    {
        pending.insert(Component::Embedding);
    }
    Some(pending)
}

fn is_unreadable(path: &str, unreadable: &[String]) -> bool {
    unreadable.iter().any(|prefix| {
        !prefix.is_empty()
            && (path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/')))
    })
}
