//! Three-way merge: decisions, strategies, cell merge models and sessions.

pub mod apply;
pub mod autoresolve;
pub mod cell;
pub mod decide;
pub mod decisions;
pub mod session;
pub mod strategies;

pub use apply::{apply_decisions, build_merged_diff, merge_notebooks, NotebookMerge};
pub use autoresolve::{autoresolve, CONFLICTS_KEY};
pub use cell::{classify_cell, CellFlags, CellMergeKind, CellMergeModel, CellOrigin, FieldMerge, Side};
pub use decide::decide_merge;
pub use decisions::{
    combine_local_then_remote, empty_like, pop_all_patch_decisions, pop_patch_decision, push_patch_decision,
    split_decision_by_key, Action, MergeDecision,
};
pub use session::{MergeSession, MergeSubmission};
pub use strategies::{MergeConfig, Strategies, Strategy};
