//! Type definitions for document paths.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One step in a document path.
///
/// Sequences are addressed by [`Key::Index`], mappings by [`Key::Name`].
/// Serializes untagged, so a JSON path `["cells", 0, "source"]` decodes to
/// `[Name("cells"), Index(0), Name("source")]`.
///
/// Ordering puts every index before every name; indices compare
/// numerically and names lexically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Index(usize),
    Name(String),
}

/// A document path.
pub type Path = Vec<Key>;

impl Key {
    /// The index, if this key addresses a sequence element.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Name(_) => None,
        }
    }

    /// The name, if this key addresses a mapping entry.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Index(_) => None,
            Key::Name(s) => Some(s),
        }
    }

    /// Returns true if this key is `name`.
    pub fn is_name(&self, name: &str) -> bool {
        matches!(self, Key::Name(s) if s == name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{i}"),
            Key::Name(s) => f.write_str(s),
        }
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Name(s)
    }
}
