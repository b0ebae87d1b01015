//! Merge model of one notebook cell.
//!
//! Each cell of the merge view holds the base cell, one diff model per side,
//! the merged model and the decisions that touch the cell.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use nbdime_path::{Key, Path};

use crate::diff_format::{Diff, DiffEntry};
use crate::diff_model::{CellDiffModel, FieldDiffModel};
use crate::error::MergeError;
use crate::patch::apply_diff;

use super::apply::nest_diffs;
use super::decisions::MergeDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Local => "local",
            Side::Remote => "remote",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Classification ────────────────────────────────────────────────────────

/// How a cell changed across the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellMergeKind {
    Unchanged,
    /// Added on one side only.
    Added(Side),
    /// Deleted on one side, unchanged on the other.
    Deleted(Side),
    /// Both sides added the same cell.
    AgreedAddition,
    DeletedOnBoth,
    /// Both sides added a cell here, with different content.
    AddedOnBoth,
    /// Changed on both sides, or changed on one and deleted on the other.
    Modified,
}

impl CellMergeKind {
    /// True if every field needs its own base/local/remote/merged view.
    pub fn needs_four_way(&self) -> bool {
        matches!(self, CellMergeKind::Modified | CellMergeKind::AddedOnBoth)
    }

    /// Header shown over a cell merged as a whole.
    pub fn title(&self) -> Option<&'static str> {
        match self {
            CellMergeKind::Unchanged | CellMergeKind::Modified => None,
            CellMergeKind::Added(Side::Local) => Some("Cell added locally"),
            CellMergeKind::Added(Side::Remote) => Some("Cell added remotely"),
            CellMergeKind::Deleted(Side::Local) => Some("Cell deleted locally"),
            CellMergeKind::Deleted(Side::Remote) => Some("Cell deleted remotely"),
            CellMergeKind::AgreedAddition => Some("Cell added identically on both sides"),
            CellMergeKind::DeletedOnBoth => Some("Deleted on both sides"),
            CellMergeKind::AddedOnBoth => Some("Added on both sides"),
        }
    }
}

/// Classification inputs from one side's cell model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellFlags {
    pub unchanged: bool,
    pub added: bool,
    pub deleted: bool,
}

impl CellFlags {
    pub fn of(model: &CellDiffModel) -> Self {
        CellFlags { unchanged: model.unchanged(), added: model.added(), deleted: model.deleted() }
    }
}

/// Classify a cell. `None` means the cell does not exist on that side.
///
/// ```
/// use nbdime::merge::{classify_cell, CellFlags, CellMergeKind, Side};
///
/// let unchanged = CellFlags { unchanged: true, ..CellFlags::default() };
/// let deleted = CellFlags { deleted: true, ..CellFlags::default() };
/// assert_eq!(classify_cell(Some(deleted), Some(unchanged), false), CellMergeKind::Deleted(Side::Local));
/// assert_eq!(classify_cell(None, Some(unchanged), false), CellMergeKind::Added(Side::Remote));
/// ```
pub fn classify_cell(local: Option<CellFlags>, remote: Option<CellFlags>, agreed: bool) -> CellMergeKind {
    let (l, r) = match (local, remote) {
        (None, None) => return CellMergeKind::Unchanged,
        (Some(_), None) => return CellMergeKind::Added(Side::Local),
        (None, Some(_)) => return CellMergeKind::Added(Side::Remote),
        (Some(l), Some(r)) => (l, r),
    };
    if l.unchanged && r.unchanged {
        CellMergeKind::Unchanged
    } else if l.added && r.added {
        if agreed {
            CellMergeKind::AgreedAddition
        } else {
            CellMergeKind::AddedOnBoth
        }
    } else if l.added {
        CellMergeKind::Added(Side::Local)
    } else if r.added {
        CellMergeKind::Added(Side::Remote)
    } else if l.deleted && r.deleted {
        CellMergeKind::DeletedOnBoth
    } else if l.deleted && r.unchanged {
        CellMergeKind::Deleted(Side::Local)
    } else if r.deleted && l.unchanged {
        CellMergeKind::Deleted(Side::Remote)
    } else {
        CellMergeKind::Modified
    }
}

// ── Model ─────────────────────────────────────────────────────────────────

/// Where a merged cell comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CellOrigin {
    /// The base cell at this index.
    Base(usize),
    /// The `ordinal`th cell inserted before base index `at`.
    Inserted { at: usize, ordinal: usize },
}

/// One side's change to a base cell, rooted at the cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CellChange {
    pub removed: bool,
    pub diff: Diff,
}

impl CellChange {
    /// Fold the diffs `pick` takes from each decision into one cell diff.
    pub(crate) fn collect(
        decisions: &[&MergeDecision],
        mut pick: impl FnMut(&MergeDecision) -> Result<Diff, MergeError>,
    ) -> Result<Self, MergeError> {
        let mut removed = false;
        let mut parts: Vec<(Path, Diff)> = Vec::new();
        for dec in decisions {
            let diff = pick(dec)?;
            match dec.common_path.get(2..) {
                Some(rest) => parts.push((rest.to_vec(), diff)),
                None => {
                    for entry in diff {
                        match entry {
                            DiffEntry::RemoveRange { .. } => removed = true,
                            DiffEntry::Patch { diff, .. } => parts.push((Vec::new(), diff)),
                            _ => {}
                        }
                    }
                }
            }
        }
        Ok(CellChange { removed, diff: nest_diffs(parts) })
    }

    fn is_empty(&self) -> bool {
        !self.removed && self.diff.is_empty()
    }

    fn model(&self, base_cell: &Value, nb_mimetype: &str) -> Result<CellDiffModel, MergeError> {
        Ok(match self.removed {
            true => CellDiffModel::create_deleted(base_cell, nb_mimetype)?,
            false => CellDiffModel::create_patched(base_cell, Some(&self.diff[..]), nb_mimetype)?,
        })
    }
}

/// The models of one field across the merge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldMerge<'a> {
    pub name: &'static str,
    pub local: Option<FieldDiffModel<'a>>,
    pub remote: Option<FieldDiffModel<'a>>,
    pub merged: FieldDiffModel<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellMergeModel {
    pub origin: CellOrigin,
    pub base: Option<Value>,
    pub local: Option<CellDiffModel>,
    pub remote: Option<CellDiffModel>,
    pub merged: CellDiffModel,
    /// The cell written out unless `delete_cell` is set.
    pub merged_cell: Value,
    /// Indices into the session's decisions.
    pub decisions: Vec<usize>,
    pub delete_cell: bool,
    /// Both sides made the same change to this cell.
    pub agreed_cell: bool,
}

impl CellMergeModel {
    pub(crate) fn from_base(
        index: usize,
        base_cell: &Value,
        local: CellChange,
        remote: CellChange,
        merged: CellChange,
        decisions: Vec<usize>,
        nb_mimetype: &str,
    ) -> Result<Self, MergeError> {
        let agreed_cell = !local.is_empty() && local == remote;
        let (merged_model, merged_cell) = match merged.removed {
            true => (CellDiffModel::create_deleted(base_cell, nb_mimetype)?, base_cell.clone()),
            false => (
                CellDiffModel::create_patched(base_cell, Some(&merged.diff[..]), nb_mimetype)?,
                apply_diff(base_cell, Some(&merged.diff[..]))?,
            ),
        };
        Ok(CellMergeModel {
            origin: CellOrigin::Base(index),
            base: Some(base_cell.clone()),
            local: Some(local.model(base_cell, nb_mimetype)?),
            remote: Some(remote.model(base_cell, nb_mimetype)?),
            merged: merged_model,
            merged_cell,
            decisions,
            delete_cell: merged.removed,
            agreed_cell,
        })
    }

    /// A cell not in base. `merged` is `None` when the merge drops it.
    pub(crate) fn inserted(
        origin: CellOrigin,
        local: Option<&Value>,
        remote: Option<&Value>,
        merged: Option<&Value>,
        decision: usize,
        nb_mimetype: &str,
    ) -> Result<Self, MergeError> {
        let Some(shown) = merged.or(local).or(remote) else {
            return Err(MergeError::InvalidDecision("inserted cell has no content".to_string()));
        };
        let added = |v: Option<&Value>| v.map(|v| CellDiffModel::create_added(v, nb_mimetype)).transpose();
        Ok(CellMergeModel {
            origin,
            base: None,
            local: added(local)?,
            remote: added(remote)?,
            merged: CellDiffModel::create_added(shown, nb_mimetype)?,
            merged_cell: shown.clone(),
            decisions: vec![decision],
            delete_cell: merged.is_none(),
            agreed_cell: local.is_some() && local == remote,
        })
    }

    pub fn classify(&self) -> CellMergeKind {
        classify_cell(self.local.as_ref().map(CellFlags::of), self.remote.as_ref().map(CellFlags::of), self.agreed_cell)
    }

    pub fn set_delete_cell(&mut self, delete: bool) {
        self.delete_cell = delete;
    }

    /// The decision touching this cell's execution count, if any.
    pub fn execution_count_decision<'d>(&self, decisions: &'d [MergeDecision]) -> Option<&'d MergeDecision> {
        let name = Key::from("execution_count");
        self.decisions.iter().filter_map(|&i| decisions.get(i)).find(|d| {
            d.common_path.len() == 2
                && [&d.local_diff, &d.remote_diff, &d.custom_diff].iter().any(|diff| diff.iter().any(|e| e.key() == name))
        })
    }

    /// Per-field models, in the merged cell's field order.
    pub fn sub_models(&self) -> Vec<FieldMerge<'_>> {
        self.merged
            .fields()
            .into_iter()
            .map(|(name, merged)| FieldMerge {
                name,
                local: self.local.as_ref().and_then(|m| m.field(name).ok()),
                remote: self.remote.as_ref().and_then(|m| m.field(name).ok()),
                merged,
            })
            .collect()
    }
}
