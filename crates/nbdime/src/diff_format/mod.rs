//! The diff format: entries, builders and validation.

pub mod builder;
pub mod types;
pub mod validate;

pub use builder::{MappingDiffBuilder, SequenceDiffBuilder};
pub use types::{sort_entries, Diff, DiffEntry};
pub use validate::validate_diff;
