//! Queries over the top level of a diff.
//!
//! Both walk only the entries of the outermost container, never nested
//! diffs, so asking about one field of a cell costs one pass over the
//! cell's own entries.

use nbdime_path::Key;

use crate::diff_format::DiffEntry;

/// The nested diff of the `patch` entry at `key`, if any.
///
/// `None` means the key was not patched at all (it may still have been
/// replaced or removed, see [`get_diff_entry_by_key`]).
///
/// ```
/// use nbdime::{get_sub_diff_by_key, DiffEntry};
/// use nbdime_path::Key;
///
/// let diff = vec![DiffEntry::Patch { key: Key::from("source"), diff: vec![DiffEntry::RemoveRange { key: 0, length: 1 }] }];
/// assert_eq!(get_sub_diff_by_key(&diff, &Key::from("source")).map(|d| d.len()), Some(1));
/// assert!(get_sub_diff_by_key(&diff, &Key::from("metadata")).is_none());
/// ```
pub fn get_sub_diff_by_key<'a>(diff: &'a [DiffEntry], key: &Key) -> Option<&'a [DiffEntry]> {
    diff.iter().find_map(|e| match e {
        DiffEntry::Patch { key: k, diff } if k == key => Some(diff.as_slice()),
        _ => None,
    })
}

/// The non-recursive entry (`add`, `replace` or `remove`) at `key`, if any.
pub fn get_diff_entry_by_key<'a>(diff: &'a [DiffEntry], key: &Key) -> Option<&'a DiffEntry> {
    diff.iter().find(|e| {
        matches!(e, DiffEntry::Add { .. } | DiffEntry::Replace { .. } | DiffEntry::Remove { .. }) && e.has_key(key)
    })
}
