//! Document path utilities.
//!
//! Paths address a subtree of a document made of mappings, sequences and
//! scalars. They are written as slash-joined strings (`/cells/0/source`)
//! and, for strategy lookup, as star-paths where every sequence index is
//! replaced by `*` (`/cells/*/source`).
//!
//! # Example
//!
//! ```
//! use nbdime_path::{join_path, split_path, star_path, get, Key};
//!
//! let path = split_path("/cells/0/source");
//! assert_eq!(path, vec![Key::from("cells"), Key::from(0), Key::from("source")]);
//! assert_eq!(join_path(&path), "/cells/0/source");
//! assert_eq!(star_path(&path), "/cells/*/source");
//!
//! let doc = serde_json::json!({"cells": [{"source": "x = 1"}]});
//! assert_eq!(get(&doc, &path), Some(&serde_json::json!("x = 1")));
//! ```

use serde_json::Value;

pub mod types;
pub use types::{Key, Path};

pub mod validate;
pub use validate::{validate_path, PathError};

/// Escapes for names, `~` first: unescaping runs backwards so `~01` reads as `~1`.
const ESCAPES: [(&str, &str); 2] = [("~", "~0"), ("/", "~1")];

fn rewrite<'a>(component: &str, pairs: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    pairs.fold(component.to_string(), |s, (from, to)| if s.contains(from) { s.replace(from, to) } else { s })
}

fn escape_component(component: &str) -> String {
    rewrite(component, ESCAPES.into_iter())
}

fn unescape_component(component: &str) -> String {
    rewrite(component, ESCAPES.into_iter().rev().map(|(raw, escaped)| (escaped, raw)))
}

/// Returns true if `s` is a non-empty run of ASCII digits.
pub fn is_integer(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Join path keys into a slash-separated string.
///
/// The root path is `/`. Names are escaped.
///
/// ```
/// use nbdime_path::{join_path, Key};
///
/// assert_eq!(join_path(&[]), "/");
/// assert_eq!(join_path(&[Key::from("cells"), Key::from(2)]), "/cells/2");
/// ```
pub fn join_path(path: &[Key]) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len() * 8);
    for key in path {
        out.push('/');
        match key {
            Key::Index(i) => out.push_str(&i.to_string()),
            Key::Name(s) => out.push_str(&escape_component(s)),
        }
    }
    out
}

/// Split a slash-separated path into keys.
///
/// Empty segments are skipped, decimal segments become [`Key::Index`].
///
/// ```
/// use nbdime_path::{split_path, Key};
///
/// assert_eq!(split_path("/"), Vec::<Key>::new());
/// assert_eq!(split_path("cells/1/"), vec![Key::from("cells"), Key::from(1)]);
/// ```
pub fn split_path(path: &str) -> Path {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<usize>() {
            Ok(i) if is_integer(s) => Key::Index(i),
            _ => Key::Name(unescape_component(s)),
        })
        .collect()
}

/// Join a path with every index (and every decimal name) replaced by `*`.
///
/// ```
/// use nbdime_path::{star_path, Key};
///
/// let path = vec![Key::from("cells"), Key::from(7), Key::from("outputs"), Key::from("0")];
/// assert_eq!(star_path(&path), "/cells/*/outputs/*");
/// ```
pub fn star_path(path: &[Key]) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len() * 8);
    for key in path {
        out.push('/');
        match key {
            Key::Index(_) => out.push('*'),
            Key::Name(s) if is_integer(s) => out.push('*'),
            Key::Name(s) => out.push_str(&escape_component(s)),
        }
    }
    out
}

/// Normalise a string path to its star form.
///
/// ```
/// use nbdime_path::star_path_str;
///
/// assert_eq!(star_path_str("/cells/12/source"), "/cells/*/source");
/// assert_eq!(star_path_str("/cells/*/source"), "/cells/*/source");
/// ```
pub fn star_path_str(path: &str) -> String {
    star_path(&split_path(path))
}

/// Check if `prefix` is a (non-strict) prefix of `path`.
pub fn is_prefix(prefix: &[Key], path: &[Key]) -> bool {
    path.len() >= prefix.len() && path[..prefix.len()] == prefix[..]
}

/// Get a value from a document by path.
///
/// Returns `None` if the path doesn't exist or a key kind doesn't match the
/// container (an index into a mapping, a name into a sequence).
pub fn get<'a>(val: &'a Value, path: &[Key]) -> Option<&'a Value> {
    let mut current = val;
    for key in path {
        current = match (current, key) {
            (Value::Array(arr), Key::Index(i)) => arr.get(*i)?,
            (Value::Object(map), Key::Name(name)) => map.get(name)?,
            _ => return None,
        };
    }
    Some(current)
}
