//! Validation of string paths.

use thiserror::Error;

use crate::types::Path;
use crate::split_path;

/// Maximum allowed path depth.
const MAX_PATH_DEPTH: usize = 256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path must start with '/': {0:?}")]
    NotAbsolute(String),
    #[error("path too deep ({0} segments)")]
    TooDeep(usize),
    #[error("invalid escape in path segment {0:?}")]
    InvalidEscape(String),
}

/// Validate and split an absolute path string.
///
/// ```
/// use nbdime_path::{validate_path, Key};
///
/// assert_eq!(validate_path("/cells/0").unwrap(), vec![Key::from("cells"), Key::from(0)]);
/// assert!(validate_path("cells").is_err());
/// assert!(validate_path("/a~2").is_err());
/// ```
pub fn validate_path(path: &str) -> Result<Path, PathError> {
    if !path.starts_with('/') {
        return Err(PathError::NotAbsolute(path.to_string()));
    }
    for segment in path.split('/') {
        let mut chars = segment.chars();
        while let Some(c) = chars.next() {
            if c == '~' && !matches!(chars.next(), Some('0') | Some('1')) {
                return Err(PathError::InvalidEscape(segment.to_string()));
            }
        }
    }
    let keys = split_path(path);
    if keys.len() > MAX_PATH_DEPTH {
        return Err(PathError::TooDeep(keys.len()));
    }
    Ok(keys)
}
