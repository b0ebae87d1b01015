//! Three-way merge decisions.
//!
//! Both diffs are walked together. Containers touched by one side only
//! get one decision; where both sides touch a container, the entries are
//! grouped by interference and each group is taken from one side, taken
//! from both, merged one level down, or left as a conflict.
//!
//! The walk keeps its own work stack, like the patch engine.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use nbdime_path::{join_path, Key, Path};

use crate::diff_format::{sort_entries, Diff, DiffEntry};
use crate::error::{MergeError, PatchError};

use super::autoresolve::autoresolve;
use super::decisions::{Action, MergeDecision};
use super::strategies::MergeConfig;

// ── Nodes ─────────────────────────────────────────────────────────────────

/// A value the merge descends into. Texts are sequences of lines and each
/// line a sequence of characters.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Node<'a> {
    Value(&'a Value),
    Line(&'a str),
}

/// The node at `path`, reading an integer key on a text as a line number.
pub(crate) fn locate<'a>(root: &'a Value, path: &[Key]) -> Option<Node<'a>> {
    if let Some(value) = nbdime_path::get(root, path) {
        return Some(Node::Value(value));
    }
    let (Key::Index(line), text) = path.split_last()? else {
        return None;
    };
    match nbdime_path::get(root, text)? {
        Value::String(text) => Some(Node::Line(text.split_inclusive('\n').nth(*line)?)),
        _ => None,
    }
}

// ── Driver ────────────────────────────────────────────────────────────────

enum Work<'a> {
    Emit(MergeDecision),
    Decide { path: Path, node: Node<'a>, local: &'a [DiffEntry], remote: &'a [DiffEntry] },
}

/// Decide how to merge two diffs of `base`.
///
/// Decisions come out in document order, each container's clean changes
/// ahead of the groups below it. Conflicts are then passed through the
/// configured strategies.
///
/// ```
/// use nbdime::merge::{decide_merge, Action, MergeConfig};
/// use nbdime::DiffEntry;
/// use serde_json::json;
///
/// let base = json!([1, 2, 3, 4, 5]);
/// let local = vec![DiffEntry::AddRange { key: 0, values: vec![json!(0)] }];
/// let remote = vec![DiffEntry::AddRange { key: 5, values: vec![json!(6)] }];
/// let decisions = decide_merge(&base, &local, &remote, &MergeConfig::generic()).unwrap();
/// assert_eq!(decisions.len(), 1);
/// assert_eq!(decisions[0].action, Action::Custom);
/// assert!(!decisions[0].conflict);
/// assert_eq!(decisions[0].custom_diff, [local, remote].concat());
/// ```
pub fn decide_merge(
    base: &Value,
    local_diff: &[DiffEntry],
    remote_diff: &[DiffEntry],
    config: &MergeConfig,
) -> Result<Vec<MergeDecision>, MergeError> {
    let mut decisions = Vec::new();
    let mut stack = vec![Work::Decide { path: Vec::new(), node: Node::Value(base), local: local_diff, remote: remote_diff }];
    while let Some(work) = stack.pop() {
        match work {
            Work::Emit(dec) => decisions.push(dec),
            Work::Decide { path, node, local, remote } => {
                let next = decide_node(path, node, local, remote, config)?;
                stack.extend(next.into_iter().rev());
            }
        }
    }
    debug!(
        decisions = decisions.len(),
        conflicts = decisions.iter().filter(|d| d.conflict).count(),
        "merge decisions generated"
    );
    let decisions = autoresolve(base, decisions, &config.strategies)?;
    debug!(
        decisions = decisions.len(),
        conflicts = decisions.iter().filter(|d| d.conflict).count(),
        "conflicts autoresolved"
    );
    Ok(decisions)
}

fn decide_node<'a>(
    path: Path,
    node: Node<'a>,
    local: &'a [DiffEntry],
    remote: &'a [DiffEntry],
    config: &MergeConfig,
) -> Result<Vec<Work<'a>>, MergeError> {
    let single = |action: Action| -> Result<Vec<Work<'a>>, MergeError> {
        Ok(vec![Work::Emit(MergeDecision::new(path.clone(), action, local.to_vec(), remote.to_vec()))])
    };
    match (local.is_empty(), remote.is_empty()) {
        (true, true) => return Ok(Vec::new()),
        (false, true) => return single(Action::Local),
        (true, false) => return single(Action::Remote),
        _ if local == remote => return single(Action::Either),
        _ => {}
    }
    match node {
        Node::Value(Value::Object(map)) => decide_mapping(path, map, local, remote, config),
        Node::Value(Value::Array(items)) => {
            let children: Vec<Node<'a>> = items.iter().map(Node::Value).collect();
            decide_sequence(path, &children, children.len(), local, remote, config)
        }
        Node::Value(Value::String(text)) => {
            let lines: Vec<Node<'a>> = text.split_inclusive('\n').map(Node::Line).collect();
            decide_sequence(path, &lines, lines.len(), local, remote, config)
        }
        Node::Line(line) => decide_sequence(path, &[], line.chars().count(), local, remote, config),
        Node::Value(other) => Err(PatchError::mismatch(&path, format!("cannot merge into scalar {other}")).into()),
    }
}

// ── Clean changes ─────────────────────────────────────────────────────────

/// Entries of one container that merge without conflict.
#[derive(Default)]
struct Clean {
    local: Diff,
    remote: Diff,
    both: Diff,
}

impl Clean {
    /// One decision for everything clean in the container.
    fn into_decision(self, path: &[Key]) -> Option<MergeDecision> {
        let Clean { local, remote, both } = self;
        if local.is_empty() && remote.is_empty() && both.is_empty() {
            return None;
        }
        let joined = |side: &Diff| {
            let mut diff: Diff = side.iter().chain(&both).cloned().collect();
            sort_entries(&mut diff);
            diff
        };
        let local_diff = joined(&local);
        let remote_diff = joined(&remote);
        let path = path.to_vec();
        Some(match (local.is_empty(), remote.is_empty()) {
            (true, true) => MergeDecision::new(path, Action::Either, local_diff, remote_diff),
            (false, true) => MergeDecision::new(path, Action::Local, local_diff, remote_diff),
            (true, false) => MergeDecision::new(path, Action::Remote, local_diff, remote_diff),
            (false, false) => {
                let mut custom: Diff = local.into_iter().chain(remote).chain(both).collect();
                sort_entries(&mut custom);
                MergeDecision::new(path, Action::Custom, local_diff, remote_diff).with_custom(Action::Custom, custom)
            }
        })
    }
}

// ── Mappings ──────────────────────────────────────────────────────────────

type KeyPair<'a> = (Option<&'a DiffEntry>, Option<&'a DiffEntry>);

fn decide_mapping<'a>(
    path: Path,
    map: &'a Map<String, Value>,
    local: &'a [DiffEntry],
    remote: &'a [DiffEntry],
    config: &MergeConfig,
) -> Result<Vec<Work<'a>>, MergeError> {
    let mut pairs: BTreeMap<String, KeyPair<'a>> = BTreeMap::new();
    for (side, diff) in [local, remote].into_iter().enumerate() {
        for entry in diff {
            let Key::Name(name) = entry.key() else {
                return Err(PatchError::mismatch(&path, format!("{} keyed by index on a mapping", entry.op_name())).into());
            };
            let pair = pairs.entry(name).or_default();
            if side == 0 {
                pair.0 = Some(entry);
            } else {
                pair.1 = Some(entry);
            }
        }
    }

    // derived fields go stale when their sibling is merged from both sides
    let mut cleared = BTreeSet::new();
    for (derived, sibling) in config.derived_fields(&path) {
        if let Some((Some(l), Some(r))) = pairs.get(&sibling) {
            if l != r {
                cleared.insert(derived);
            }
        }
    }
    for derived in &cleared {
        pairs.entry(derived.clone()).or_default();
    }

    let mut clean = Clean::default();
    let mut rest = Vec::new();
    for (name, pair) in pairs {
        if cleared.contains(&name) {
            let custom = match map.contains_key(&name) {
                true => vec![DiffEntry::Replace { key: Key::Name(name.clone()), value: Value::Null }],
                false => Vec::new(),
            };
            let (l, r): (Diff, Diff) = (pair.0.into_iter().cloned().collect(), pair.1.into_iter().cloned().collect());
            if !(l.is_empty() && r.is_empty() && custom.is_empty()) {
                rest.push(Work::Emit(MergeDecision::new(path.clone(), Action::Clear, l, r).with_custom(Action::Clear, custom)));
            }
            continue;
        }
        match pair {
            (Some(l), None) => clean.local.push(l.clone()),
            (None, Some(r)) => clean.remote.push(r.clone()),
            (Some(l), Some(r)) if l == r => clean.both.push(l.clone()),
            (Some(DiffEntry::Patch { diff: ld, .. }), Some(DiffEntry::Patch { diff: rd, .. })) => {
                let Some(child) = map.get(&name) else {
                    return Err(PatchError::mismatch(&path, format!("patch of missing key {name:?}")).into());
                };
                let mut child_path = path.clone();
                child_path.push(Key::Name(name));
                rest.push(Work::Decide { path: child_path, node: Node::Value(child), local: ld.as_slice(), remote: rd.as_slice() });
            }
            (Some(l), Some(r)) => rest.push(Work::Emit(MergeDecision::conflicted(
                path.clone(),
                config.conflict_default,
                vec![l.clone()],
                vec![r.clone()],
            ))),
            (None, None) => {}
        }
    }
    debug!(path = %join_path(&path), groups = rest.len(), "mapping decided");
    let mut out: Vec<Work<'a>> = clean.into_decision(&path).map(Work::Emit).into_iter().collect();
    out.extend(rest);
    Ok(out)
}

// ── Sequences ─────────────────────────────────────────────────────────────

/// A sequence entry with the base range it consumes.
struct Item<'a> {
    side: usize,
    entry: &'a DiffEntry,
    start: usize,
    end: usize,
}

impl Item<'_> {
    fn is_insert(&self) -> bool {
        self.start == self.end
    }
}

/// True if two entries must be decided together.
///
/// Across sides: ranges that intersect, an insertion strictly inside a
/// range, or two insertions at one position. On one side: an insertion and
/// the entry starting where it inserts.
fn linked(a: &Item<'_>, b: &Item<'_>) -> bool {
    if a.side == b.side {
        return a.start == b.start && a.is_insert() != b.is_insert();
    }
    match (a.is_insert(), b.is_insert()) {
        (true, true) => a.start == b.start,
        (true, false) => b.start < a.start && a.start < b.end,
        (false, true) => a.start < b.start && b.start < a.end,
        (false, false) => a.start < b.end && b.start < a.end,
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Both sides patch one item, with insertions before it from at most one
/// side (or the same insertions from both).
struct PatchPair<'a> {
    index: usize,
    local: &'a [DiffEntry],
    remote: &'a [DiffEntry],
    local_inserts: Vec<&'a DiffEntry>,
    remote_inserts: Vec<&'a DiffEntry>,
}

fn patch_pair<'a>(l: &[&'a DiffEntry], r: &[&'a DiffEntry]) -> Option<PatchPair<'a>> {
    let (lp, local_inserts): (Vec<&'a DiffEntry>, Vec<&'a DiffEntry>) = l.iter().copied().partition(|e| !e.is_insert());
    let (rp, remote_inserts): (Vec<&'a DiffEntry>, Vec<&'a DiffEntry>) = r.iter().copied().partition(|e| !e.is_insert());
    let ([lpatch], [rpatch]) = (lp.as_slice(), rp.as_slice()) else { return None };
    let (lpatch, rpatch): (&'a DiffEntry, &'a DiffEntry) = (*lpatch, *rpatch);
    match (lpatch, rpatch) {
        (DiffEntry::Patch { key: Key::Index(a), diff: ld }, DiffEntry::Patch { key: Key::Index(b), diff: rd }) if a == b => {
            if !local_inserts.is_empty() && !remote_inserts.is_empty() && local_inserts != remote_inserts {
                return None;
            }
            Some(PatchPair { index: *a, local: ld, remote: rd, local_inserts, remote_inserts })
        }
        _ => None,
    }
}

fn decide_sequence<'a>(
    path: Path,
    children: &[Node<'a>],
    len: usize,
    local: &'a [DiffEntry],
    remote: &'a [DiffEntry],
    config: &MergeConfig,
) -> Result<Vec<Work<'a>>, MergeError> {
    let mut items = Vec::with_capacity(local.len() + remote.len());
    for (side, diff) in [local, remote].into_iter().enumerate() {
        for entry in diff {
            let Some((start, end)) = entry.base_range() else {
                return Err(PatchError::mismatch(&path, entry.range_fault()).into());
            };
            if end > len {
                return Err(PatchError::mismatch(&path, format!("range {start}..{end} out of bounds for length {len}")).into());
            }
            items.push(Item { side, entry, start, end });
        }
    }

    let mut parent: Vec<usize> = (0..items.len()).collect();
    for a in 0..items.len() {
        for b in (a + 1)..items.len() {
            if linked(&items[a], &items[b]) {
                let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                if ra != rb {
                    parent[ra.max(rb)] = ra.min(rb);
                }
            }
        }
    }
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..items.len() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(i);
    }
    let mut groups: Vec<Vec<usize>> = groups.into_values().collect();
    groups.sort_by_key(|g| g.iter().map(|&i| (items[i].start, items[i].end)).min());

    let mut clean = Clean::default();
    let mut rest = Vec::new();
    for group in groups {
        let side = |s: usize| -> Vec<&'a DiffEntry> {
            group.iter().filter(|&&i| items[i].side == s).map(|&i| items[i].entry).collect()
        };
        let (l, r) = (side(0), side(1));
        if r.is_empty() {
            clean.local.extend(l.into_iter().cloned());
        } else if l.is_empty() {
            clean.remote.extend(r.into_iter().cloned());
        } else if l == r {
            clean.both.extend(l.into_iter().cloned());
        } else if let Some(pair) = patch_pair(&l, &r) {
            let Some(&child) = children.get(pair.index) else {
                return Err(PatchError::mismatch(&path, format!("patch of missing item {}", pair.index)).into());
            };
            if !pair.local_inserts.is_empty() && pair.local_inserts == pair.remote_inserts {
                clean.both.extend(pair.local_inserts.into_iter().cloned());
            } else {
                clean.local.extend(pair.local_inserts.into_iter().cloned());
                clean.remote.extend(pair.remote_inserts.into_iter().cloned());
            }
            let mut child_path = path.clone();
            child_path.push(Key::Index(pair.index));
            rest.push(Work::Decide { path: child_path, node: child, local: pair.local, remote: pair.remote });
        } else {
            rest.push(Work::Emit(MergeDecision::conflicted(
                path.clone(),
                config.conflict_default,
                l.into_iter().cloned().collect(),
                r.into_iter().cloned().collect(),
            )));
        }
    }
    debug!(path = %join_path(&path), groups = rest.len(), "sequence decided");
    let mut out: Vec<Work<'a>> = clean.into_decision(&path).map(Work::Emit).into_iter().collect();
    out.extend(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decide(base: &Value, local: &[DiffEntry], remote: &[DiffEntry]) -> Vec<MergeDecision> {
        decide_merge(base, local, remote, &MergeConfig::generic()).unwrap()
    }

    fn replace(key: &str, value: Value) -> DiffEntry {
        DiffEntry::Replace { key: Key::from(key), value }
    }

    fn patch(key: impl Into<Key>, diff: Diff) -> DiffEntry {
        DiffEntry::Patch { key: key.into(), diff }
    }

    fn add(key: usize, values: Vec<Value>) -> DiffEntry {
        DiffEntry::AddRange { key, values }
    }

    fn rm(key: usize, length: usize) -> DiffEntry {
        DiffEntry::RemoveRange { key, length }
    }

    #[test]
    fn locate_walks_into_text() {
        let doc = json!({"cells": [{"source": "a\nbc\n"}]});
        let path = vec![Key::from("cells"), Key::from(0), Key::from("source"), Key::from(1)];
        assert!(matches!(locate(&doc, &path), Some(Node::Line("bc\n"))));
        assert!(locate(&doc, &[Key::from("cells"), Key::from(3)]).is_none());
        assert!(matches!(locate(&doc, &path[..3]), Some(Node::Value(Value::String(_)))));
        let mut past = path.clone();
        past[3] = Key::from(2);
        assert!(locate(&doc, &past).is_none());
        past[3] = Key::from(1);
        past.push(Key::from(0));
        assert!(locate(&doc, &past).is_none());
    }

    #[test]
    fn one_sided_and_identical() {
        let base = json!({"a": 1});
        let d = vec![replace("a", json!(2))];
        assert_eq!(decide(&base, &d, &[])[0].action, Action::Local);
        assert_eq!(decide(&base, &[], &d)[0].action, Action::Remote);
        let both = decide(&base, &d, &d);
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].action, Action::Either);
        assert!(decide(&base, &[], &[]).is_empty());
    }

    #[test]
    fn same_key_different_values_conflict() {
        let base = json!({"k": "x", "other": 0});
        let local = vec![replace("k", json!("A"))];
        let remote = vec![replace("k", json!("B")), replace("other", json!(1))];
        let decisions = decide(&base, &local, &remote);
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].action, Action::Remote);
        assert_eq!(decisions[0].remote_diff, vec![replace("other", json!(1))]);
        assert!(decisions[1].conflict);
        assert_eq!(decisions[1].action, Action::Local);
        assert_eq!(decisions[1].local_diff, local);
    }

    #[test]
    fn disjoint_keys_merge_clean() {
        let base = json!({"a": 1, "b": 2});
        let local = vec![replace("a", json!(10))];
        let remote = vec![DiffEntry::Remove { key: Key::from("b") }];
        let decisions = decide(&base, &local, &remote);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].action, Action::Custom);
        assert_eq!(decisions[0].custom_diff, vec![local[0].clone(), remote[0].clone()]);
    }

    #[test]
    fn both_patch_recurses() {
        let base = json!({"m": {"x": 1, "y": 2}});
        let local = vec![patch("m", vec![replace("x", json!(5))])];
        let remote = vec![patch("m", vec![replace("y", json!(6))])];
        let decisions = decide(&base, &local, &remote);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].common_path, vec![Key::from("m")]);
        assert_eq!(decisions[0].action, Action::Custom);
    }

    #[test]
    fn overlapping_ranges_conflict() {
        let base = json!([1, 2, 3, 4]);
        let local = vec![rm(0, 2)];
        let remote = vec![rm(1, 2), add(4, vec![json!(5)])];
        let decisions = decide(&base, &local, &remote);
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].action, Action::Remote);
        assert_eq!(decisions[0].remote_diff, vec![add(4, vec![json!(5)])]);
        assert!(decisions[1].conflict);
        assert_eq!(decisions[1].remote_diff, vec![rm(1, 2)]);
    }

    #[test]
    fn insertion_edges() {
        let base = json!([1, 2, 3, 4]);
        // adjacent to a removed range: no conflict
        let decisions = decide(&base, &[rm(1, 2)], &[add(1, vec![json!(9)]), add(3, vec![json!(8)])]);
        assert_eq!(decisions.len(), 1);
        assert!(!decisions[0].conflict);
        // strictly inside: conflict
        let decisions = decide(&base, &[rm(1, 2)], &[add(2, vec![json!(9)])]);
        assert!(decisions[0].conflict);
        // two different insertions at one point: conflict
        let decisions = decide(&base, &[add(2, vec![json!("l")])], &[add(2, vec![json!("r")])]);
        assert!(decisions[0].conflict);
    }

    #[test]
    fn replacement_is_one_unit() {
        let base = json!(["a", "b", "c"]);
        let local = vec![add(1, vec![json!("B")]), rm(1, 1)];
        let remote = vec![patch(1usize, vec![])];
        let decisions = decide(&base, &local, &remote);
        assert_eq!(decisions.len(), 1);
        assert!(decisions[0].conflict);
        assert_eq!(decisions[0].local_diff, local);
    }

    #[test]
    fn patched_items_recurse_with_inserts() {
        let base = json!([{"a": 1, "b": 1}]);
        let local = vec![add(0, vec![json!({})]), patch(0usize, vec![replace("a", json!(2))])];
        let remote = vec![patch(0usize, vec![replace("b", json!(2))])];
        let decisions = decide(&base, &local, &remote);
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].common_path, Vec::<Key>::new());
        assert_eq!(decisions[0].action, Action::Local);
        assert_eq!(decisions[0].local_diff, vec![add(0, vec![json!({})])]);
        assert_eq!(decisions[1].common_path, vec![Key::from(0)]);
        assert_eq!(decisions[1].action, Action::Custom);
    }

    #[test]
    fn text_lines_and_characters() {
        let base = json!({"s": "abc\ndef\n"});
        let local = vec![patch("s", vec![patch(0usize, vec![rm(0, 1)])])];
        let remote = vec![patch("s", vec![patch(0usize, vec![add(3, vec![json!("!")])]), rm(1, 1)])];
        let decisions = decide(&base, &local, &remote);
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].common_path, vec![Key::from("s")]);
        assert_eq!(decisions[0].action, Action::Remote);
        assert_eq!(decisions[1].common_path, vec![Key::from("s"), Key::from(0)]);
        assert_eq!(decisions[1].action, Action::Custom);
        let merged = crate::merge::apply_decisions(&base, &decisions).unwrap();
        assert_eq!(merged, json!({"s": "bc!\n"}));
    }

    #[test]
    fn conflict_default_is_configurable() {
        let base = json!({"k": 0});
        let config = MergeConfig { conflict_default: Action::Remote, ..MergeConfig::generic() };
        let decisions = decide_merge(&base, &[replace("k", json!(1))], &[replace("k", json!(2))], &config).unwrap();
        assert_eq!(decisions[0].action, Action::Remote);
        assert!(decisions[0].conflict);
    }

    #[test]
    fn malformed_diffs_are_mismatches() {
        let base = json!([1]);
        let err = decide_merge(&base, &[rm(0, 3)], &[rm(0, 1)], &MergeConfig::generic());
        assert!(matches!(err, Err(MergeError::Patch(_))));
        let err = decide_merge(&json!(1), &[rm(0, 1)], &[add(0, vec![])], &MergeConfig::generic());
        assert!(matches!(err, Err(MergeError::Patch(_))));
        let err = decide_merge(&json!([1, 2, 3]), &[rm(1, usize::MAX)], &[rm(0, 1)], &MergeConfig::generic());
        assert!(matches!(err, Err(MergeError::Patch(_))));
    }
}
