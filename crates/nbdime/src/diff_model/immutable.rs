//! Diff model for atomic values.

use serde_json::Value;

use crate::diff_format::DiffEntry;
use crate::error::PatchError;

/// Diff model for a value that is only ever replaced as a whole, such as
/// an execution count.
#[derive(Debug, Clone, PartialEq)]
pub struct ImmutableDiffModel {
    base: Option<Value>,
    remote: Option<Value>,
    unchanged: bool,
}

impl ImmutableDiffModel {
    /// Build a model from a base, a fallback remote and an optional entry.
    ///
    /// With an entry the remote is taken from it: `replace`/`add` supply the
    /// new value and mark the model changed even if the value is equal to
    /// the base, `remove` leaves no remote. Without an entry the model
    /// compares `base` and `remote`.
    ///
    /// ```
    /// use nbdime::{DiffEntry, ImmutableDiffModel};
    /// use nbdime_path::Key;
    /// use serde_json::json;
    ///
    /// let base = json!(3);
    /// let same = DiffEntry::Replace { key: Key::from("execution_count"), value: json!(3) };
    /// let m = ImmutableDiffModel::create(Some(&base), Some(&base), Some(&same)).unwrap();
    /// assert!(!m.unchanged());
    /// assert!(ImmutableDiffModel::create(Some(&base), Some(&base), None).unwrap().unchanged());
    /// ```
    pub fn create(base: Option<&Value>, remote: Option<&Value>, entry: Option<&DiffEntry>) -> Result<Self, PatchError> {
        let (remote, unchanged) = match entry {
            None => (remote.cloned(), base == remote),
            Some(DiffEntry::Replace { value, .. }) | Some(DiffEntry::Add { value, .. }) => (Some(value.clone()), false),
            Some(DiffEntry::Remove { .. }) => (None, false),
            Some(other) => {
                return Err(PatchError::StructuralMismatch {
                    path: other.key().to_string(),
                    reason: format!("{} on an atomic value", other.op_name()),
                });
            }
        };
        Ok(ImmutableDiffModel { base: base.cloned(), remote, unchanged })
    }

    pub fn base(&self) -> Option<&Value> {
        self.base.as_ref()
    }

    pub fn remote(&self) -> Option<&Value> {
        self.remote.as_ref()
    }

    pub fn unchanged(&self) -> bool {
        self.unchanged
    }

    pub fn added(&self) -> bool {
        self.base.is_none() && self.remote.is_some()
    }

    pub fn deleted(&self) -> bool {
        self.base.is_some() && self.remote.is_none()
    }
}
