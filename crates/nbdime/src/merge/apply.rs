//! Applying merge decisions.
//!
//! Resolved diffs of all decisions are folded into one nested diff against
//! the base document, which is then patched in a single pass.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use nbdime_path::{Key, Path};

use crate::diff_format::{sort_entries, Diff, DiffEntry};
use crate::error::MergeError;
use crate::patch::apply_diff;

use super::decide::decide_merge;
use super::decisions::MergeDecision;
use super::strategies::MergeConfig;

/// Non-patch entries by container, keyed by path.
#[derive(Debug, Default)]
struct DiffTree {
    entries: Diff,
    children: BTreeMap<Key, DiffTree>,
}

impl DiffTree {
    fn node(&mut self, path: &[Key]) -> &mut DiffTree {
        let mut node = self;
        for key in path {
            node = node.children.entry(key.clone()).or_default();
        }
        node
    }

    fn insert(&mut self, path: Path, diff: Diff) {
        let mut stack = vec![(path, diff)];
        while let Some((path, diff)) = stack.pop() {
            for entry in diff {
                match entry {
                    DiffEntry::Patch { key, diff } => {
                        let mut sub = path.clone();
                        sub.push(key);
                        stack.push((sub, diff));
                    }
                    other => self.node(&path).entries.push(other),
                }
            }
        }
    }

    fn into_diff(self) -> Diff {
        let DiffTree { mut entries, children } = self;
        for (key, child) in children {
            let diff = child.into_diff();
            if !diff.is_empty() {
                entries.push(DiffEntry::Patch { key, diff });
            }
        }
        coalesce(entries)
    }
}

/// Sort entries and join insertions at one position, in arrival order.
fn coalesce(mut entries: Diff) -> Diff {
    sort_entries(&mut entries);
    let mut out: Diff = Vec::with_capacity(entries.len());
    for entry in entries {
        if let (Some(DiffEntry::AddRange { key: prev, values: joined }), DiffEntry::AddRange { key, values }) =
            (out.last_mut(), &entry)
        {
            if prev == key {
                joined.extend(values.iter().cloned());
                continue;
            }
        }
        out.push(entry);
    }
    out
}

/// Diffs addressed to subpaths, folded into one diff at the root.
pub(crate) fn nest_diffs(parts: Vec<(Path, Diff)>) -> Diff {
    let mut tree = DiffTree::default();
    for (path, diff) in parts {
        tree.insert(path, diff);
    }
    tree.into_diff()
}

/// One diff against `base` equivalent to applying every decision.
pub fn build_merged_diff(base: &Value, decisions: &[MergeDecision]) -> Result<Diff, MergeError> {
    let parts = decisions
        .iter()
        .map(|dec| Ok((dec.common_path.clone(), dec.resolved_diff(base)?)))
        .collect::<Result<Vec<_>, MergeError>>()?;
    Ok(nest_diffs(parts))
}

/// `base` with every decision applied, conflicted ones by their current action.
///
/// ```
/// use nbdime::merge::{apply_decisions, Action, MergeDecision};
/// use nbdime::DiffEntry;
/// use nbdime_path::Key;
/// use serde_json::json;
///
/// let base = json!({"a": [1, 2], "b": 0});
/// let decisions = vec![
///     MergeDecision::new(vec![Key::from("a")], Action::Remote, vec![], vec![DiffEntry::RemoveRange { key: 0, length: 1 }]),
///     MergeDecision::new(vec![], Action::Local, vec![DiffEntry::Replace { key: Key::from("b"), value: json!(1) }], vec![]),
/// ];
/// assert_eq!(apply_decisions(&base, &decisions).unwrap(), json!({"a": [2], "b": 1}));
/// ```
pub fn apply_decisions(base: &Value, decisions: &[MergeDecision]) -> Result<Value, MergeError> {
    let diff = build_merged_diff(base, decisions)?;
    Ok(apply_diff(base, Some(&diff[..]))?)
}

/// Result of a three-way merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotebookMerge {
    pub merged: Value,
    pub decisions: Vec<MergeDecision>,
}

impl NotebookMerge {
    pub fn has_conflicts(&self) -> bool {
        self.decisions.iter().any(|d| d.conflict)
    }

    /// Decisions still in conflict, in document order.
    pub fn conflicts(&self) -> Vec<&MergeDecision> {
        self.decisions.iter().filter(|d| d.conflict).collect()
    }
}

/// Decide and apply in one step.
pub fn merge_notebooks(
    base: &Value,
    local_diff: &[DiffEntry],
    remote_diff: &[DiffEntry],
    config: &MergeConfig,
) -> Result<NotebookMerge, MergeError> {
    let decisions = decide_merge(base, local_diff, remote_diff, config)?;
    let merged = apply_decisions(base, &decisions)?;
    let merge = NotebookMerge { merged, decisions };
    debug!(decisions = merge.decisions.len(), conflicts = merge.conflicts().len(), "merged");
    Ok(merge)
}
