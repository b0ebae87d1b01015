//! Core types for the diff format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use nbdime_path::Key;

/// A single structural change.
///
/// Serializes in the `op`-tagged shape:
///
/// ```
/// use nbdime::DiffEntry;
/// use serde_json::json;
///
/// let e = DiffEntry::AddRange { key: 0, values: vec![json!("x\n")] };
/// assert_eq!(serde_json::to_value(&e).unwrap(), json!({"op": "addrange", "key": 0, "valuelist": ["x\n"]}));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum DiffEntry {
    /// Insert `values` before position `key` of a sequence.
    AddRange {
        key: usize,
        #[serde(rename = "valuelist")]
        values: Vec<Value>,
    },
    /// Delete `length` elements of a sequence starting at `key`.
    RemoveRange { key: usize, length: usize },
    /// Insert a new mapping key.
    Add { key: String, value: Value },
    /// Replace the value at an existing key.
    Replace { key: Key, value: Value },
    /// Delete the value at an existing key.
    Remove { key: Key },
    /// Apply a nested diff to the value at `key`.
    Patch { key: Key, diff: Diff },
}

/// An ordered list of entries addressing one container.
pub type Diff = Vec<DiffEntry>;

impl DiffEntry {
    /// The key this entry addresses.
    pub fn key(&self) -> Key {
        match self {
            DiffEntry::AddRange { key, .. } | DiffEntry::RemoveRange { key, .. } => Key::Index(*key),
            DiffEntry::Add { key, .. } => Key::Name(key.clone()),
            DiffEntry::Replace { key, .. } | DiffEntry::Remove { key } | DiffEntry::Patch { key, .. } => key.clone(),
        }
    }

    /// Returns true if the entry addresses `key`.
    pub fn has_key(&self, key: &Key) -> bool {
        match (self, key) {
            (DiffEntry::AddRange { key: k, .. }, Key::Index(i))
            | (DiffEntry::RemoveRange { key: k, .. }, Key::Index(i)) => k == i,
            (DiffEntry::Add { key: k, .. }, Key::Name(n)) => k == n,
            (DiffEntry::Replace { key: k, .. }, _)
            | (DiffEntry::Remove { key: k }, _)
            | (DiffEntry::Patch { key: k, .. }, _) => k == key,
            _ => false,
        }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            DiffEntry::AddRange { .. } => "addrange",
            DiffEntry::RemoveRange { .. } => "removerange",
            DiffEntry::Add { .. } => "add",
            DiffEntry::Replace { .. } => "replace",
            DiffEntry::Remove { .. } => "remove",
            DiffEntry::Patch { .. } => "patch",
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, DiffEntry::AddRange { .. })
    }

    pub fn is_patch(&self) -> bool {
        matches!(self, DiffEntry::Patch { .. })
    }

    /// Half-open range of base positions consumed by a sequence entry.
    ///
    /// Insertions consume nothing (`key..key`). Returns `None` for entries
    /// keyed by name and for ranges that end past `usize::MAX`.
    pub fn base_range(&self) -> Option<(usize, usize)> {
        match self {
            DiffEntry::AddRange { key, .. } => Some((*key, *key)),
            DiffEntry::RemoveRange { key, length } => Some((*key, key.checked_add(*length)?)),
            DiffEntry::Replace { key: Key::Index(i), .. }
            | DiffEntry::Remove { key: Key::Index(i) }
            | DiffEntry::Patch { key: Key::Index(i), .. } => Some((*i, i.checked_add(1)?)),
            _ => None,
        }
    }

    /// Why [`base_range`](Self::base_range) gave no range.
    pub(crate) fn range_fault(&self) -> String {
        match self.key() {
            Key::Name(_) => format!("{} keyed by name in a sequence", self.op_name()),
            Key::Index(i) => format!("{} at {i} ends past the largest index", self.op_name()),
        }
    }

    /// Sort key keeping insertions ahead of other entries at the same key.
    pub fn sort_key(&self) -> (Key, u8) {
        (self.key(), if self.is_insert() { 0 } else { 1 })
    }

    /// The same entry moved to another sequence position.
    pub fn with_index(&self, index: usize) -> DiffEntry {
        match self {
            DiffEntry::AddRange { values, .. } => DiffEntry::AddRange { key: index, values: values.clone() },
            DiffEntry::RemoveRange { length, .. } => DiffEntry::RemoveRange { key: index, length: *length },
            DiffEntry::Add { key, value } => DiffEntry::Add { key: key.clone(), value: value.clone() },
            DiffEntry::Replace { value, .. } => DiffEntry::Replace { key: Key::Index(index), value: value.clone() },
            DiffEntry::Remove { .. } => DiffEntry::Remove { key: Key::Index(index) },
            DiffEntry::Patch { diff, .. } => DiffEntry::Patch { key: Key::Index(index), diff: diff.clone() },
        }
    }
}

/// Sort entries by key, insertions first at equal keys. Stable.
pub fn sort_entries(diff: &mut Diff) {
    diff.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}
