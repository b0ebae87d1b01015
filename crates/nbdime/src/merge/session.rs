//! Merge session: one notebook merge in progress.
//!
//! The session owns the base notebook and the decisions, scoped so that
//! every decision touches one cell, one insertion point or the notebook
//! outside `cells`. Cell merge models are rebuilt whenever a decision is
//! resolved.
//!
//! ```
//! use nbdime::merge::{MergeConfig, MergeSession};
//! use nbdime::DiffEntry;
//! use nbdime_path::Key;
//! use serde_json::json;
//!
//! let cell = |s: &str| json!({"cell_type": "markdown", "source": s, "metadata": {}});
//! let base = json!({"cells": [cell("a"), cell("b"), cell("c")], "metadata": {}});
//! let remote = vec![DiffEntry::Patch {
//!     key: Key::from("cells"),
//!     diff: vec![DiffEntry::RemoveRange { key: 1, length: 1 }],
//! }];
//! let session = MergeSession::from_diffs(base, &[], &remote, MergeConfig::notebook()).unwrap();
//! assert!(session.cells()[1].delete_cell);
//! assert_eq!(session.serialize().unwrap()["cells"], json!([cell("a"), cell("c")]));
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use nbdime_path::Key;

use crate::diff_format::{validate_diff, Diff, DiffEntry};
use crate::error::MergeError;
use crate::notebook::{cells, notebook_mimetype};

use super::apply::apply_decisions;
use super::cell::{CellChange, CellMergeModel, CellOrigin};
use super::decide::decide_merge;
use super::decisions::{pop_patch_decision, split_decision_by_key, Action, MergeDecision};
use super::strategies::MergeConfig;

const CELLS: &str = "cells";

/// What a scoped decision touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Notebook,
    Cell(usize),
    Insert(usize),
}

fn scope_of(dec: &MergeDecision) -> Scope {
    match dec.common_path.as_slice() {
        [Key::Name(c), Key::Index(i), ..] if c == CELLS => Scope::Cell(*i),
        [Key::Name(c)] if c == CELLS => {
            let first = dec.local_diff.first().or(dec.remote_diff.first()).or(dec.custom_diff.first());
            match first {
                Some(DiffEntry::AddRange { key, .. }) => Scope::Insert(*key),
                Some(entry) => match entry.key() {
                    Key::Index(i) => Scope::Cell(i),
                    Key::Name(_) => Scope::Notebook,
                },
                None => Scope::Notebook,
            }
        }
        _ => Scope::Notebook,
    }
}

/// Split decisions on the cell list into one decision per cell slot,
/// moving patches of one cell down to that cell.
fn split_cells(dec: &MergeDecision) -> Vec<MergeDecision> {
    split_decision_by_key(dec)
        .into_iter()
        .map(|piece| match pop_patch_decision(&piece) {
            Some(popped) => popped,
            None => piece,
        })
        .collect()
}

fn scope_decisions(decisions: Vec<MergeDecision>) -> Vec<MergeDecision> {
    let mut out = Vec::with_capacity(decisions.len());
    for dec in decisions {
        match dec.common_path.as_slice() {
            [] => {
                for piece in split_decision_by_key(&dec) {
                    let on_cells = [&piece.local_diff, &piece.remote_diff, &piece.custom_diff]
                        .iter()
                        .any(|diff| diff.iter().any(|e| matches!(e, DiffEntry::Patch { key, .. } if key.is_name(CELLS))));
                    match on_cells.then(|| pop_patch_decision(&piece)).flatten() {
                        Some(popped) => out.extend(split_cells(&popped)),
                        None => out.push(piece),
                    }
                }
            }
            [Key::Name(c)] if c == CELLS => out.extend(split_cells(&dec)),
            _ => out.push(dec),
        }
    }
    out
}

/// The merged notebook and the conflicts left in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeSubmission {
    pub merged: Value,
    pub conflicts: Vec<MergeDecision>,
}

#[derive(Debug, Clone)]
pub struct MergeSession {
    base: Value,
    config: MergeConfig,
    decisions: Vec<MergeDecision>,
    cells: Vec<CellMergeModel>,
    /// `delete_cell` values set by hand, kept across rebuilds.
    overrides: BTreeMap<CellOrigin, bool>,
}

impl MergeSession {
    /// Start a session from decisions against `base`.
    pub fn load(base: Value, decisions: Vec<MergeDecision>, config: MergeConfig) -> Result<Self, MergeError> {
        if cells(&base).is_none() {
            return Err(MergeError::InvalidDecision("merge base has no cells".to_string()));
        }
        let mut session = MergeSession {
            base,
            config,
            decisions: scope_decisions(decisions),
            cells: Vec::new(),
            overrides: BTreeMap::new(),
        };
        session.rebuild()?;
        debug!(
            cells = session.cells.len(),
            decisions = session.decisions.len(),
            conflicts = session.conflicts().len(),
            "merge session loaded"
        );
        Ok(session)
    }

    /// Decide the merge of two diffs and start a session on the result.
    pub fn from_diffs(
        base: Value,
        local_diff: &[DiffEntry],
        remote_diff: &[DiffEntry],
        config: MergeConfig,
    ) -> Result<Self, MergeError> {
        let decisions = decide_merge(&base, local_diff, remote_diff, &config)?;
        Self::load(base, decisions, config)
    }

    pub fn base(&self) -> &Value {
        &self.base
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn decisions(&self) -> &[MergeDecision] {
        &self.decisions
    }

    pub fn cells(&self) -> &[CellMergeModel] {
        &self.cells
    }

    /// Decisions still in conflict, in order.
    pub fn conflicts(&self) -> Vec<&MergeDecision> {
        self.decisions.iter().filter(|d| d.conflict).collect()
    }

    /// Take `action` for decision `index`.
    pub fn resolve(&mut self, index: usize, action: Action) -> Result<(), MergeError> {
        let dec = self.decision_mut(index)?;
        dec.action = action;
        dec.conflict = false;
        self.refresh(index)
    }

    /// Resolve decision `index` with a hand-written diff.
    pub fn resolve_custom(&mut self, index: usize, diff: Diff) -> Result<(), MergeError> {
        validate_diff(&diff)?;
        let dec = self.decision_mut(index)?;
        dec.action = Action::Custom;
        dec.custom_diff = diff;
        dec.conflict = false;
        self.refresh(index)
    }

    pub fn set_delete_cell(&mut self, cell: usize, delete: bool) -> Result<(), MergeError> {
        let model = self
            .cells
            .get_mut(cell)
            .ok_or_else(|| MergeError::InvalidDecision(format!("no cell {cell} in merge")))?;
        model.set_delete_cell(delete);
        self.overrides.insert(model.origin, delete);
        Ok(())
    }

    /// The merged notebook. Cells flagged for deletion are left out.
    pub fn serialize(&self) -> Result<Value, MergeError> {
        let outside: Vec<MergeDecision> =
            self.decisions.iter().filter(|d| scope_of(d) == Scope::Notebook).cloned().collect();
        let mut merged = apply_decisions(&self.base, &outside)?;
        let kept: Vec<Value> = self.cells.iter().filter(|c| !c.delete_cell).map(|c| c.merged_cell.clone()).collect();
        let Some(nb) = merged.as_object_mut() else {
            return Err(MergeError::InvalidDecision("merged notebook is not a mapping".to_string()));
        };
        nb.insert(CELLS.to_string(), Value::Array(kept));
        let conflicts = self.conflicts().len();
        if conflicts > 0 {
            info!(conflicts, "serializing merge with unresolved conflicts");
        }
        Ok(merged)
    }

    /// Merged notebook plus residual conflicts, for handing to storage.
    pub fn submission(&self) -> Result<MergeSubmission, MergeError> {
        Ok(MergeSubmission { merged: self.serialize()?, conflicts: self.conflicts().into_iter().cloned().collect() })
    }

    fn decision_mut(&mut self, index: usize) -> Result<&mut MergeDecision, MergeError> {
        self.decisions
            .get_mut(index)
            .ok_or_else(|| MergeError::InvalidDecision(format!("no decision {index} in merge")))
    }

    fn refresh(&mut self, index: usize) -> Result<(), MergeError> {
        for cell in &self.cells {
            if cell.decisions.contains(&index) {
                self.overrides.remove(&cell.origin);
            }
        }
        debug!(decision = index, action = %self.decisions[index].action, "decision resolved");
        self.rebuild()
    }

    fn rebuild(&mut self) -> Result<(), MergeError> {
        let Some(base_cells) = cells(&self.base) else {
            return Err(MergeError::InvalidDecision("merge base has no cells".to_string()));
        };
        let nb_mimetype = notebook_mimetype(&self.base, &self.config.notebook_mimetype);

        let mut by_cell: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut inserts: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, dec) in self.decisions.iter().enumerate() {
            match scope_of(dec) {
                Scope::Cell(c) if c < base_cells.len() => by_cell.entry(c).or_default().push(i),
                Scope::Insert(p) if p <= base_cells.len() => inserts.entry(p).or_default().push(i),
                Scope::Notebook => {}
                Scope::Cell(at) | Scope::Insert(at) => {
                    return Err(MergeError::InvalidDecision(format!(
                        "decision {i} addresses cell {at} of {}",
                        base_cells.len()
                    )));
                }
            }
        }

        let mut models = Vec::with_capacity(base_cells.len());
        for at in 0..=base_cells.len() {
            for &index in inserts.get(&at).into_iter().flatten() {
                models.extend(self.inserted_cells(index, at, nb_mimetype)?);
            }
            let Some(base_cell) = base_cells.get(at) else { break };
            let attached = by_cell.remove(&at).unwrap_or_default();
            let decs: Vec<&MergeDecision> = attached.iter().map(|&i| &self.decisions[i]).collect();
            let local = CellChange::collect(&decs, |d| Ok(d.local_diff.clone()))?;
            let remote = CellChange::collect(&decs, |d| Ok(d.remote_diff.clone()))?;
            let merged = CellChange::collect(&decs, |d| d.resolved_diff(&self.base))?;
            models.push(CellMergeModel::from_base(at, base_cell, local, remote, merged, attached, nb_mimetype)?);
        }
        for model in &mut models {
            if let Some(&delete) = self.overrides.get(&model.origin) {
                model.delete_cell = delete;
            }
        }
        self.cells = models;
        Ok(())
    }

    /// Models of the cells one decision inserts before base cell `at`.
    fn inserted_cells(&self, index: usize, at: usize, nb_mimetype: &str) -> Result<Vec<CellMergeModel>, MergeError> {
        let dec = &self.decisions[index];
        let values = |diff: &Diff| -> Vec<Value> {
            diff.iter()
                .filter_map(|e| match e {
                    DiffEntry::AddRange { values, .. } => Some(values.iter().cloned()),
                    _ => None,
                })
                .flatten()
                .collect()
        };
        let local = values(&dec.local_diff);
        let remote = values(&dec.remote_diff);
        let origin = |ordinal| CellOrigin::Inserted { at, ordinal };

        if dec.action == Action::LocalThenRemote {
            let sides = local.iter().map(|v| (Some(v), None)).chain(remote.iter().map(|v| (None, Some(v))));
            return sides
                .enumerate()
                .map(|(k, (l, r))| CellMergeModel::inserted(origin(k), l, r, l.or(r), index, nb_mimetype))
                .collect();
        }
        let kept = values(&dec.resolved_diff(&self.base)?);
        let n = local.len().max(remote.len()).max(kept.len());
        (0..n)
            .map(|k| CellMergeModel::inserted(origin(k), local.get(k), remote.get(k), kept.get(k), index, nb_mimetype))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::CellMergeKind;
    use serde_json::json;

    fn code(source: &str) -> Value {
        json!({"cell_type": "code", "source": source, "metadata": {}, "outputs": [], "execution_count": null})
    }

    fn notebook(cells: Vec<Value>) -> Value {
        json!({"cells": cells, "metadata": {}, "nbformat": 4, "nbformat_minor": 5})
    }

    fn on_cells(diff: Diff) -> Diff {
        vec![DiffEntry::Patch { key: Key::from(CELLS), diff }]
    }

    #[test]
    fn rejects_non_notebooks() {
        let err = MergeSession::load(json!({"a": 1}), vec![], MergeConfig::notebook());
        assert!(matches!(err, Err(MergeError::InvalidDecision(_))));
    }

    #[test]
    fn decisions_are_scoped_to_cells() {
        let base = notebook(vec![code("a\n"), code("b\n")]);
        let local = on_cells(vec![
            DiffEntry::AddRange { key: 0, values: vec![code("new\n")] },
            DiffEntry::Patch {
                key: Key::from(1),
                diff: vec![DiffEntry::Patch { key: Key::from("source"), diff: vec![DiffEntry::RemoveRange { key: 0, length: 1 }] }],
            },
        ]);
        let session = MergeSession::from_diffs(base, &local, &[], MergeConfig::notebook()).unwrap();
        let paths: Vec<_> = session.decisions().iter().map(|d| nbdime_path::join_path(&d.common_path)).collect();
        assert_eq!(paths, vec!["/cells", "/cells/1"]);
        let kinds: Vec<_> = session.cells().iter().map(CellMergeModel::classify).collect();
        assert_eq!(
            kinds,
            vec![CellMergeKind::Added(crate::merge::Side::Local), CellMergeKind::Unchanged, CellMergeKind::Modified]
        );
        let merged = session.serialize().unwrap();
        assert_eq!(merged["cells"], json!([code("new\n"), code("a\n"), code("")]));
    }

    #[test]
    fn diverging_insertions_pair_up() {
        let base = notebook(vec![code("a\n")]);
        let local = on_cells(vec![DiffEntry::AddRange { key: 1, values: vec![code("l\n")] }]);
        let remote = on_cells(vec![DiffEntry::AddRange { key: 1, values: vec![code("r\n")] }]);
        let mut session = MergeSession::from_diffs(base, &local, &remote, MergeConfig::notebook()).unwrap();
        assert_eq!(session.conflicts().len(), 1);
        assert_eq!(session.cells().len(), 2);
        assert_eq!(session.cells()[1].classify(), CellMergeKind::AddedOnBoth);
        assert_eq!(session.cells()[1].merged_cell, code("l\n"));

        let index = session.decisions().iter().position(|d| d.conflict).unwrap();
        session.resolve(index, Action::LocalThenRemote).unwrap();
        assert!(session.conflicts().is_empty());
        let merged = session.serialize().unwrap();
        assert_eq!(merged["cells"], json!([code("a\n"), code("l\n"), code("r\n")]));
    }

    #[test]
    fn resolve_errors() {
        let base = notebook(vec![code("a\n")]);
        let mut session = MergeSession::from_diffs(base, &[], &[], MergeConfig::notebook()).unwrap();
        assert!(matches!(session.resolve(0, Action::Local), Err(MergeError::InvalidDecision(_))));
        assert!(session.set_delete_cell(4, true).is_err());
        let bad = vec![DiffEntry::RemoveRange { key: 2, length: 1 }, DiffEntry::RemoveRange { key: 1, length: 1 }];
        assert!(matches!(session.resolve_custom(0, bad), Err(MergeError::Patch(_))));
    }

    #[test]
    fn delete_override_survives_unrelated_resolution() {
        let base = notebook(vec![code("a\n"), code("b\n")]);
        let local = on_cells(vec![DiffEntry::Patch {
            key: Key::from(1),
            diff: vec![DiffEntry::Replace { key: Key::from("execution_count"), value: json!(1) }],
        }]);
        let remote = on_cells(vec![DiffEntry::Patch {
            key: Key::from(1),
            diff: vec![DiffEntry::Replace { key: Key::from("execution_count"), value: json!(2) }],
        }]);
        let mut session = MergeSession::from_diffs(base, &local, &remote, MergeConfig::generic()).unwrap();
        session.set_delete_cell(0, true).unwrap();
        let index = session.decisions().iter().position(|d| d.conflict).unwrap();
        session.resolve(index, Action::Remote).unwrap();
        assert!(session.cells()[0].delete_cell);
        let merged = session.serialize().unwrap();
        assert_eq!(merged["cells"].as_array().unwrap().len(), 1);
        assert_eq!(merged["cells"][0]["execution_count"], json!(2));
        let submission = serde_json::to_value(session.submission().unwrap()).unwrap();
        assert_eq!(submission["conflicts"], json!([]));
    }
}
