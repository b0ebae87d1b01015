//! Builders producing validated diffs.

use serde_json::Value;

use nbdime_path::Key;

use super::types::{sort_entries, Diff, DiffEntry};
use super::validate::validate_diff;
use crate::error::PatchError;

/// Builds a diff for a mapping, one entry per key.
///
/// ```
/// use nbdime::MappingDiffBuilder;
/// use serde_json::json;
///
/// let mut b = MappingDiffBuilder::new();
/// b.replace("b", json!(2)).remove("a");
/// let diff = b.validated().unwrap();
/// assert_eq!(diff[0].op_name(), "remove");
/// ```
#[derive(Debug, Default, Clone)]
pub struct MappingDiffBuilder {
    entries: Diff,
}

impl MappingDiffBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.entries.push(DiffEntry::Add { key: key.into(), value });
        self
    }

    pub fn replace(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.entries.push(DiffEntry::Replace { key: Key::Name(key.into()), value });
        self
    }

    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.entries.push(DiffEntry::Remove { key: Key::Name(key.into()) });
        self
    }

    /// Record a nested diff. Empty diffs are dropped.
    pub fn patch(&mut self, key: impl Into<String>, diff: Diff) -> &mut Self {
        if !diff.is_empty() {
            self.entries.push(DiffEntry::Patch { key: Key::Name(key.into()), diff });
        }
        self
    }

    /// Sort by key and check the result. Fails on duplicate keys.
    pub fn validated(self) -> Result<Diff, PatchError> {
        let mut entries = self.entries;
        sort_entries(&mut entries);
        validate_diff(&entries)?;
        Ok(entries)
    }
}

/// Builds a diff for a sequence (or for the lines of a text).
///
/// Consecutive insertions at one index are coalesced, as are adjacent
/// removals.
#[derive(Debug, Default, Clone)]
pub struct SequenceDiffBuilder {
    entries: Diff,
}

impl SequenceDiffBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn addrange(&mut self, key: usize, values: Vec<Value>) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        if let Some(DiffEntry::AddRange { key: last, values: prev }) = self.entries.last_mut() {
            if *last == key {
                prev.extend(values);
                return self;
            }
        }
        self.entries.push(DiffEntry::AddRange { key, values });
        self
    }

    pub fn removerange(&mut self, key: usize, length: usize) -> &mut Self {
        if length == 0 {
            return self;
        }
        if let Some(DiffEntry::RemoveRange { key: last, length: prev }) = self.entries.last_mut() {
            if *last + *prev == key {
                *prev += length;
                return self;
            }
        }
        self.entries.push(DiffEntry::RemoveRange { key, length });
        self
    }

    /// Record a nested diff for item `key`. Empty diffs are dropped.
    pub fn patch(&mut self, key: usize, diff: Diff) -> &mut Self {
        if !diff.is_empty() {
            self.entries.push(DiffEntry::Patch { key: Key::Index(key), diff });
        }
        self
    }

    pub fn validated(self) -> Result<Diff, PatchError> {
        let mut entries = self.entries;
        sort_entries(&mut entries);
        validate_diff(&entries)?;
        Ok(entries)
    }
}
