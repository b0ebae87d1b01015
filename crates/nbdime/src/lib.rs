//! nbdime: diffing and three-way merging of notebooks.
//!
//! Documents are `serde_json::Value` trees of mappings, sequences and
//! scalars. A diff is a list of [`DiffEntry`] values; the patch engine
//! applies it, diff models classify it per field and per cell, and the
//! merge engine turns two diffs of one base into merge decisions.
//!
//! ```
//! use nbdime::{apply_diff, DiffEntry};
//! use nbdime_path::Key;
//! use serde_json::json;
//!
//! let base = json!({"source": "a\nb\n"});
//! let diff = vec![DiffEntry::Patch {
//!     key: Key::from("source"),
//!     diff: vec![DiffEntry::RemoveRange { key: 0, length: 1 }],
//! }];
//! assert_eq!(apply_diff(&base, Some(&diff[..])).unwrap(), json!({"source": "b\n"}));
//! ```

pub mod diff_format;
pub mod diff_model;
pub mod error;
pub mod merge;
pub mod notebook;
pub mod patch;
pub mod pretty;

pub use diff_format::{sort_entries, validate_diff, Diff, DiffEntry, MappingDiffBuilder, SequenceDiffBuilder};
pub use diff_model::{
    build_diff_models, make_output_models, set_mimetype_from_cell_type, CellDiffModel, FieldDiffModel,
    ImmutableDiffModel, OutputDiffModel, PresentationHints, TextDiffModel,
};
pub use error::{MergeError, ModelError, PatchError};
pub use notebook::CellType;
pub use patch::{apply_diff, apply_diff_entry, get_diff_entry_by_key, get_sub_diff_by_key};
pub use pretty::present_diff;
