//! Error types.
//!
//! Conflicts are not errors: they are a normal merge outcome carried on
//! [`MergeDecision::conflict`](crate::merge::MergeDecision).

use thiserror::Error;

use nbdime_path::{join_path, Key, PathError};

// ── Patch ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatchError {
    /// A diff entry does not fit the value it is applied to.
    #[error("structural mismatch at {path}: {reason}")]
    StructuralMismatch { path: String, reason: String },
}

impl PatchError {
    pub(crate) fn mismatch(path: &[Key], reason: impl Into<String>) -> Self {
        PatchError::StructuralMismatch {
            path: join_path(path),
            reason: reason.into(),
        }
    }
}

// ── Models ────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("invalid cell: {0}")]
    InvalidCell(String),
    #[error("unrecognized model: {0}")]
    UnrecognizedModel(String),
    #[error(transparent)]
    Patch(#[from] PatchError),
}

// ── Merge ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("not expecting a conflict at path {path}")]
    UnexpectedConflict { path: String },
    #[error("invalid decision: {0}")]
    InvalidDecision(String),
    #[error("invalid merge config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("invalid merge config path: {0}")]
    ConfigPath(#[from] PathError),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}
