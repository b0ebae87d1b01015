//! Plain-text presentation of diffs.
//!
//! Each entry becomes a heading naming the operation and path, followed by
//! the values it removes (`-`) and inserts (`+`). Cells and outputs are
//! shown field by field; long base64 payloads are shortened.

use serde_json::{Map, Value};

use nbdime_path::Key;

use crate::diff_format::DiffEntry;
use crate::error::PatchError;
use crate::patch::apply_diff;

const INDENT: &str = "  ";

/// Payloads shorter than this are shown in full.
const BASE64_MIN_LEN: usize = 64;

fn base64_regex() -> &'static regex::Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^(?:[A-Za-z0-9+/]{4})*(?:[A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$").unwrap())
}

fn is_base64(text: &str) -> bool {
    let text = text.trim_end_matches('\n');
    text.len() > BASE64_MIN_LEN && base64_regex().is_match(text)
}

fn trim_base64(text: &str) -> String {
    if !is_base64(text) {
        return text.to_string();
    }
    let text = text.trim_end_matches('\n');
    format!("{}...<snip base64>...{}", &text[..16], &text[text.len() - 16..])
}

/// Render `diff` of `base`, with headings relative to `path`.
///
/// ```
/// use nbdime::{present_diff, DiffEntry};
/// use serde_json::json;
///
/// let base = json!(["a", "b"]);
/// let diff = vec![DiffEntry::RemoveRange { key: 1, length: 1 }];
/// assert_eq!(present_diff(&base, &diff, "/items").unwrap(), vec!["delete /items/1:", "-b"]);
/// ```
pub fn present_diff(base: &Value, diff: &[DiffEntry], path: &str) -> Result<Vec<String>, PatchError> {
    let mut out = Vec::new();
    present_into(&mut out, base, diff, path)?;
    Ok(out)
}

fn child_path(path: &str, key: &Key) -> String {
    format!("{}/{key}", path.trim_end_matches('/'))
}

fn mismatch(path: &str, reason: String) -> PatchError {
    PatchError::StructuralMismatch { path: path.to_string(), reason }
}

fn present_into(out: &mut Vec<String>, base: &Value, diff: &[DiffEntry], path: &str) -> Result<(), PatchError> {
    if let Value::String(text) = base {
        return present_text(out, text, diff, path);
    }
    for entry in diff {
        let at = child_path(path, &entry.key());
        match entry {
            DiffEntry::AddRange { values, .. } => {
                out.push(format!("insert before {at}:"));
                values.iter().for_each(|v| present_value(out, "+", v));
            }
            DiffEntry::RemoveRange { length, .. } => {
                let (start, end) = entry.base_range().ok_or_else(|| mismatch(path, entry.range_fault()))?;
                let removed = base
                    .as_array()
                    .and_then(|items| items.get(start..end))
                    .ok_or_else(|| mismatch(path, format!("no items {start}..{end} to delete")))?;
                match *length {
                    0 | 1 => out.push(format!("delete {at}:")),
                    _ => out.push(format!("delete {at}-{}:", end - 1)),
                }
                removed.iter().for_each(|v| present_value(out, "-", v));
            }
            DiffEntry::Add { value, .. } => {
                out.push(format!("insert at {at}:"));
                present_value(out, "+", value);
            }
            DiffEntry::Remove { key } => {
                out.push(format!("delete from {at}:"));
                present_value(out, "-", lookup(base, key, path)?);
            }
            DiffEntry::Replace { key, value } => {
                out.push(format!("replace at {at}:"));
                present_value(out, "-", lookup(base, key, path)?);
                present_value(out, "+", value);
            }
            DiffEntry::Patch { key, diff } => present_into(out, lookup(base, key, path)?, diff, &at)?,
        }
    }
    Ok(())
}

fn lookup<'a>(base: &'a Value, key: &Key, path: &str) -> Result<&'a Value, PatchError> {
    let found = match key {
        Key::Index(i) => base.get(*i),
        Key::Name(name) => base.get(name),
    };
    found.ok_or_else(|| mismatch(path, format!("no value at key {key}")))
}

/// A text diff as removed and inserted lines.
fn present_text(out: &mut Vec<String>, text: &str, diff: &[DiffEntry], path: &str) -> Result<(), PatchError> {
    out.push(format!("patch {path}:"));
    if is_base64(text) {
        out.push("<base64 data changed>".to_string());
        return Ok(());
    }
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    for entry in diff {
        match entry {
            DiffEntry::AddRange { values, .. } => {
                for value in values {
                    present_lines(out, "+", value.as_str().unwrap_or_default());
                }
            }
            DiffEntry::RemoveRange { .. } => {
                let (start, end) = entry.base_range().ok_or_else(|| mismatch(path, entry.range_fault()))?;
                let removed = lines
                    .get(start..end)
                    .ok_or_else(|| mismatch(path, format!("no lines {start}..{end} to delete")))?;
                removed.iter().for_each(|line| present_lines(out, "-", line));
            }
            DiffEntry::Patch { key: Key::Index(i), diff } => {
                let old = lines.get(*i).ok_or_else(|| mismatch(path, format!("no line {i} to patch")))?;
                let line_patch = [DiffEntry::Patch { key: Key::Index(0), diff: diff.clone() }];
                let new = apply_diff(&Value::String(old.to_string()), Some(&line_patch[..]))?;
                present_lines(out, "-", old);
                present_lines(out, "+", new.as_str().unwrap_or_default());
            }
            other => return Err(mismatch(path, format!("{} in a text diff", other.op_name()))),
        }
    }
    Ok(())
}

fn present_lines(out: &mut Vec<String>, prefix: &str, text: &str) {
    out.extend(text.lines().map(|line| format!("{prefix}{line}")));
}

/// A value with every line prefixed.
fn present_value(out: &mut Vec<String>, prefix: &str, value: &Value) {
    match value {
        Value::String(text) => present_lines(out, prefix, &trim_base64(text)),
        Value::Object(map) if map.contains_key("cell_type") => {
            let cell_type = map.get("cell_type").and_then(Value::as_str).unwrap_or("unknown");
            out.push(String::new());
            out.push(format!("{prefix}{cell_type} cell:"));
            present_fields(out, &format!("{prefix}{INDENT}"), map, "cell_type");
        }
        Value::Object(map) if map.contains_key("output_type") => {
            let output_type = map.get("output_type").and_then(Value::as_str).unwrap_or("unknown");
            out.push(format!("{prefix}output_type: {output_type}"));
            present_fields(out, prefix, map, "output_type");
        }
        Value::Object(map) => present_fields(out, prefix, map, ""),
        other => {
            let text = serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string());
            present_lines(out, prefix, &text);
        }
    }
}

fn present_fields(out: &mut Vec<String>, prefix: &str, map: &Map<String, Value>, skip: &str) {
    let nested = format!("{prefix}{INDENT}");
    for (key, value) in map.iter().filter(|(k, _)| k.as_str() != skip) {
        match value {
            Value::Array(outputs) if key == "outputs" && !outputs.is_empty() => {
                out.push(format!("{prefix}outputs:"));
                for (i, output) in outputs.iter().enumerate() {
                    out.push(format!("{nested}output {i}:"));
                    present_value(out, &format!("{nested}{INDENT}"), output);
                }
            }
            Value::String(s) if !s.trim_end_matches('\n').contains('\n') => {
                out.push(format!("{prefix}{key}: {}", trim_base64(s).trim_end_matches('\n')));
            }
            Value::Array(items) if items.is_empty() => out.push(format!("{prefix}{key}: []")),
            Value::Object(fields) if fields.is_empty() => out.push(format!("{prefix}{key}: {{}}")),
            Value::String(_) | Value::Array(_) | Value::Object(_) => {
                out.push(format!("{prefix}{key}:"));
                present_value(out, &nested, value);
            }
            scalar => out.push(format!("{prefix}{key}: {scalar}")),
        }
    }
}
