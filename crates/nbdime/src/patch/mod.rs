//! The patch engine.

pub mod apply;
pub mod query;

pub use apply::{apply_diff, apply_diff_entry};
pub use query::{get_diff_entry_by_key, get_sub_diff_by_key};
