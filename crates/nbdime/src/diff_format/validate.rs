//! Diff validation.

use nbdime_path::{Key, Path};

use super::types::DiffEntry;
use crate::error::PatchError;

/// Check the ordering invariants of a diff, at every nesting level.
///
/// Entries addressing one container must all be keyed the same way, be in
/// ascending key order, keep insertions ahead of other entries at the same
/// index, and never overlap. `Add` is only valid on mappings and the range
/// operations only on sequences.
pub fn validate_diff(diff: &[DiffEntry]) -> Result<(), PatchError> {
    let mut stack: Vec<(Path, &[DiffEntry])> = vec![(Vec::new(), diff)];
    while let Some((path, entries)) = stack.pop() {
        validate_level(&path, entries)?;
        for entry in entries {
            if let DiffEntry::Patch { key, diff } = entry {
                let mut sub = path.clone();
                sub.push(key.clone());
                stack.push((sub, diff.as_slice()));
            }
        }
    }
    Ok(())
}

fn validate_level(path: &[Key], entries: &[DiffEntry]) -> Result<(), PatchError> {
    let Some(first) = entries.first() else { return Ok(()) };
    match first.key() {
        Key::Index(_) => validate_sequence_level(path, entries),
        Key::Name(_) => validate_mapping_level(path, entries),
    }
}

fn validate_sequence_level(path: &[Key], entries: &[DiffEntry]) -> Result<(), PatchError> {
    // Next base position not yet consumed, and the last insertion point.
    let mut consumed = 0usize;
    let mut last_insert: Option<usize> = None;
    for entry in entries {
        let Some((start, end)) = entry.base_range() else {
            return Err(PatchError::mismatch(path, entry.range_fault()));
        };
        if start < consumed {
            return Err(PatchError::mismatch(path, format!("entry at {start} overlaps or is out of order")));
        }
        match entry {
            DiffEntry::AddRange { key, .. } => {
                if last_insert == Some(*key) {
                    return Err(PatchError::mismatch(path, format!("two insertions at {key}")));
                }
                last_insert = Some(*key);
            }
            DiffEntry::RemoveRange { length: 0, key } => {
                return Err(PatchError::mismatch(path, format!("empty removerange at {key}")));
            }
            _ => consumed = end,
        }
    }
    Ok(())
}

fn validate_mapping_level(path: &[Key], entries: &[DiffEntry]) -> Result<(), PatchError> {
    let mut previous: Option<String> = None;
    for entry in entries {
        let name = match entry.key() {
            Key::Name(name) => name,
            Key::Index(i) => {
                return Err(PatchError::mismatch(path, format!("{} at index {i} in a mapping diff", entry.op_name())));
            }
        };
        if let Some(prev) = &previous {
            if *prev >= name {
                return Err(PatchError::mismatch(path, format!("key {name:?} duplicated or out of order")));
            }
        }
        previous = Some(name);
    }
    Ok(())
}
