//! Merge decisions and the utilities that reshape them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use nbdime_path::{join_path, Key, Path};

use crate::diff_format::{sort_entries, Diff, DiffEntry};
use crate::error::MergeError;

use super::decide::{locate, Node};

/// What a decision contributes to the merged document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Keep the base value.
    Base,
    #[default]
    Local,
    Remote,
    /// Both sides made the same change.
    Either,
    /// Reset the touched values to empty.
    Clear,
    /// Apply `custom_diff`.
    Custom,
    /// Local changes, then the remote changes that do not clash with them.
    LocalThenRemote,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Base => "base",
            Action::Local => "local",
            Action::Remote => "remote",
            Action::Either => "either",
            Action::Clear => "clear",
            Action::Custom => "custom",
            Action::LocalThenRemote => "local_then_remote",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved or conflicted instruction for one subtree.
///
/// The diffs are relative to the value at `common_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeDecision {
    pub common_path: Path,
    pub action: Action,
    #[serde(default)]
    pub conflict: bool,
    #[serde(default)]
    pub local_diff: Diff,
    #[serde(default)]
    pub remote_diff: Diff,
    #[serde(default)]
    pub custom_diff: Diff,
}

impl MergeDecision {
    pub fn new(common_path: Path, action: Action, local_diff: Diff, remote_diff: Diff) -> Self {
        MergeDecision { common_path, action, conflict: false, local_diff, remote_diff, custom_diff: Vec::new() }
    }

    /// A decision left for external resolution, displayed as `action`.
    pub fn conflicted(common_path: Path, action: Action, local_diff: Diff, remote_diff: Diff) -> Self {
        MergeDecision { common_path, action, conflict: true, local_diff, remote_diff, custom_diff: Vec::new() }
    }

    pub fn with_custom(mut self, action: Action, custom_diff: Diff) -> Self {
        self.action = action;
        self.custom_diff = custom_diff;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.local_diff.is_empty() && self.remote_diff.is_empty() && self.custom_diff.is_empty()
    }

    /// The diff this decision contributes at `common_path`.
    ///
    /// `base` is the document root; it is only read by a `clear` decision
    /// without a custom diff.
    ///
    /// ```
    /// use nbdime::merge::{Action, MergeDecision};
    /// use nbdime::DiffEntry;
    /// use nbdime_path::Key;
    /// use serde_json::json;
    ///
    /// let base = json!({"a": 1});
    /// let local = vec![DiffEntry::Replace { key: Key::from("a"), value: json!(2) }];
    /// let remote = vec![DiffEntry::Replace { key: Key::from("a"), value: json!(3) }];
    /// let mut dec = MergeDecision::conflicted(vec![], Action::Local, local.clone(), remote);
    /// assert_eq!(dec.resolved_diff(&base).unwrap(), local);
    /// dec.action = Action::Clear;
    /// assert_eq!(
    ///     dec.resolved_diff(&base).unwrap(),
    ///     vec![DiffEntry::Replace { key: Key::from("a"), value: json!(null) }]
    /// );
    /// ```
    pub fn resolved_diff(&self, base: &Value) -> Result<Diff, MergeError> {
        Ok(match self.action {
            Action::Base => Vec::new(),
            Action::Local => self.local_diff.clone(),
            Action::Remote => self.remote_diff.clone(),
            Action::Either if self.local_diff.is_empty() => self.remote_diff.clone(),
            Action::Either => self.local_diff.clone(),
            Action::Custom => self.custom_diff.clone(),
            Action::LocalThenRemote => combine_local_then_remote(&self.local_diff, &self.remote_diff),
            Action::Clear if !self.custom_diff.is_empty() => self.custom_diff.clone(),
            Action::Clear => match locate(base, &self.common_path) {
                Some(Node::Value(Value::Object(map))) => clear_mapping_diff(map, &self.local_diff, &self.remote_diff),
                Some(_) => clear_range_diff(&self.local_diff, &self.remote_diff),
                None => {
                    return Err(MergeError::InvalidDecision(format!(
                        "nothing to clear at {}",
                        join_path(&self.common_path)
                    )));
                }
            },
        })
    }
}

// ── Combining ─────────────────────────────────────────────────────────────

/// Local entries plus the remote entries that do not clash with them.
///
/// A remote insertion falling strictly inside a local range moves to the
/// start of that range; insertions at the same position are joined, local
/// values first. Other remote entries overlapping a local one are dropped.
///
/// ```
/// use nbdime::merge::combine_local_then_remote;
/// use nbdime::DiffEntry;
/// use serde_json::json;
///
/// let local = vec![DiffEntry::AddRange { key: 1, values: vec![json!("l")] }];
/// let remote = vec![DiffEntry::AddRange { key: 1, values: vec![json!("r")] }];
/// assert_eq!(
///     combine_local_then_remote(&local, &remote),
///     vec![DiffEntry::AddRange { key: 1, values: vec![json!("l"), json!("r")] }]
/// );
/// ```
pub fn combine_local_then_remote(local: &[DiffEntry], remote: &[DiffEntry]) -> Diff {
    let mut out: Diff = local.to_vec();
    let local_ranges: Vec<(usize, usize)> =
        local.iter().filter_map(DiffEntry::base_range).filter(|(s, e)| e > s).collect();
    for entry in remote {
        match entry {
            DiffEntry::AddRange { key, values } => {
                let at = local_ranges.iter().find(|(s, e)| s < key && key < e).map_or(*key, |(s, _)| *s);
                match out.iter_mut().find(|e| matches!(e, DiffEntry::AddRange { key: k, .. } if *k == at)) {
                    Some(DiffEntry::AddRange { values: existing, .. }) => existing.extend(values.iter().cloned()),
                    _ => out.push(DiffEntry::AddRange { key: at, values: values.clone() }),
                }
            }
            _ => {
                let clash = match entry.base_range() {
                    Some((s, e)) => local_ranges.iter().any(|&(ls, le)| ls < e && s < le),
                    None => {
                        let key = entry.key();
                        local.iter().any(|l| l.key() == key)
                    }
                };
                if !clash {
                    out.push(entry.clone());
                }
            }
        }
    }
    sort_entries(&mut out);
    out
}

// ── Clearing ──────────────────────────────────────────────────────────────

/// The empty value of the same kind as `value`; scalars clear to `null`.
pub fn empty_like(value: &Value) -> Value {
    match value {
        Value::Array(_) => Value::Array(Vec::new()),
        Value::Object(_) => Value::Object(Map::new()),
        Value::String(_) => Value::String(String::new()),
        _ => Value::Null,
    }
}

/// Replace every touched key present in `map` by an empty value.
pub(crate) fn clear_mapping_diff(map: &Map<String, Value>, local: &[DiffEntry], remote: &[DiffEntry]) -> Diff {
    let names: BTreeSet<String> =
        local.iter().chain(remote).filter_map(|e| e.key().as_name().map(str::to_string)).collect();
    names
        .into_iter()
        .filter_map(|name| {
            let value = empty_like(map.get(&name)?);
            Some(DiffEntry::Replace { key: Key::Name(name), value })
        })
        .collect()
}

/// Remove every base range touched by either side.
pub(crate) fn clear_range_diff(local: &[DiffEntry], remote: &[DiffEntry]) -> Diff {
    let mut ranges: Vec<(usize, usize)> =
        local.iter().chain(remote).filter_map(DiffEntry::base_range).filter(|(s, e)| e > s).collect();
    ranges.sort_unstable();
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
    for (s, e) in ranges {
        match merged.last_mut() {
            Some((_, last)) if s <= *last => *last = (*last).max(e),
            _ => merged.push((s, e)),
        }
    }
    merged.into_iter().map(|(s, e)| DiffEntry::RemoveRange { key: s, length: e - s }).collect()
}

// ── Reshaping ─────────────────────────────────────────────────────────────

/// Move a decision up by `prefix`, the trailing keys of its path.
///
/// Each non-empty diff is wrapped in `patch` entries so it still addresses
/// the same subtree.
pub fn push_patch_decision(dec: &MergeDecision, prefix: &[Key]) -> Result<MergeDecision, MergeError> {
    if !dec.common_path.ends_with(prefix) {
        return Err(MergeError::InvalidDecision(format!(
            "{} does not end with {}",
            join_path(&dec.common_path),
            join_path(prefix)
        )));
    }
    let mut out = dec.clone();
    out.common_path.truncate(dec.common_path.len() - prefix.len());
    for key in prefix.iter().rev() {
        for diff in [&mut out.local_diff, &mut out.remote_diff, &mut out.custom_diff] {
            if !diff.is_empty() {
                *diff = vec![DiffEntry::Patch { key: key.clone(), diff: std::mem::take(diff) }];
            }
        }
    }
    Ok(out)
}

/// Move a decision down one level.
///
/// Possible when every non-empty diff is a single `patch` of one shared
/// key; returns `None` otherwise.
pub fn pop_patch_decision(dec: &MergeDecision) -> Option<MergeDecision> {
    let mut key: Option<&Key> = None;
    for diff in [&dec.local_diff, &dec.remote_diff, &dec.custom_diff] {
        match diff.as_slice() {
            [] => {}
            [DiffEntry::Patch { key: k, .. }] => {
                if key.is_some_and(|prev| prev != k) {
                    return None;
                }
                key = Some(k);
            }
            _ => return None,
        }
    }
    let mut common_path = dec.common_path.clone();
    common_path.push(key?.clone());
    let inner = |diff: &Diff| match diff.as_slice() {
        [DiffEntry::Patch { diff, .. }] => diff.clone(),
        _ => Vec::new(),
    };
    Some(MergeDecision {
        common_path,
        action: dec.action,
        conflict: dec.conflict,
        local_diff: inner(&dec.local_diff),
        remote_diff: inner(&dec.remote_diff),
        custom_diff: inner(&dec.custom_diff),
    })
}

/// Pop a decision as far down as it goes.
pub fn pop_all_patch_decisions(dec: MergeDecision) -> MergeDecision {
    let mut dec = dec;
    while let Some(next) = pop_patch_decision(&dec) {
        dec = next;
    }
    dec
}

/// Slot of an entry: its key, with insertions ahead of the item they precede.
type Slot = (Key, u8);

fn slots(entry: &DiffEntry) -> Vec<(Slot, DiffEntry)> {
    match entry {
        DiffEntry::AddRange { key, .. } => vec![((Key::Index(*key), 0), entry.clone())],
        DiffEntry::RemoveRange { .. } => match entry.base_range() {
            Some((start, end)) => {
                (start..end).map(|i| ((Key::Index(i), 1), DiffEntry::RemoveRange { key: i, length: 1 })).collect()
            }
            None => vec![((entry.key(), 1), entry.clone())],
        },
        other => vec![((other.key(), 1), other.clone())],
    }
}

/// Action of one piece of a split decision.
///
/// Pieces of a `custom` decision that match a side take that side.
fn piece_action(action: Action, local: &Diff, remote: &Diff, custom: &Diff) -> Action {
    if action != Action::Custom {
        action
    } else if custom.is_empty() {
        Action::Base
    } else if custom == local && custom == remote {
        Action::Either
    } else if custom == local {
        Action::Local
    } else if custom == remote {
        Action::Remote
    } else {
        Action::Custom
    }
}

/// Split a decision into one decision per key it touches.
///
/// Range removals are split into one removal per item, so every piece
/// touches exactly one item or one insertion point.
///
/// ```
/// use nbdime::merge::{split_decision_by_key, Action, MergeDecision};
/// use nbdime::DiffEntry;
/// use serde_json::json;
///
/// let local = vec![DiffEntry::AddRange { key: 0, values: vec![json!(1)] }];
/// let remote = vec![DiffEntry::RemoveRange { key: 1, length: 2 }];
/// let custom = [local.clone(), remote.clone()].concat();
/// let dec = MergeDecision::new(vec![], Action::Custom, local, remote).with_custom(Action::Custom, custom);
/// let pieces = split_decision_by_key(&dec);
/// assert_eq!(pieces.len(), 3);
/// assert_eq!(pieces[0].action, Action::Local);
/// assert_eq!(pieces[2].remote_diff, vec![DiffEntry::RemoveRange { key: 2, length: 1 }]);
/// ```
pub fn split_decision_by_key(dec: &MergeDecision) -> Vec<MergeDecision> {
    let mut pieces: BTreeMap<Slot, [Diff; 3]> = BTreeMap::new();
    for (side, diff) in [&dec.local_diff, &dec.remote_diff, &dec.custom_diff].into_iter().enumerate() {
        for entry in diff {
            for (slot, piece) in slots(entry) {
                pieces.entry(slot).or_default()[side].push(piece);
            }
        }
    }
    pieces
        .into_values()
        .map(|[local_diff, remote_diff, custom]| {
            let action = piece_action(dec.action, &local_diff, &remote_diff, &custom);
            let custom_diff = match action {
                Action::Custom | Action::Clear => custom,
                _ => Vec::new(),
            };
            MergeDecision { common_path: dec.common_path.clone(), action, conflict: dec.conflict, local_diff, remote_diff, custom_diff }
        })
        .collect()
}
