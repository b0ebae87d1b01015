//! Text diff model.

use serde_json::Value;

use crate::diff_format::DiffEntry;
use crate::error::PatchError;
use crate::notebook::{text_of, JSON_MIMETYPE, PLAIN_MIMETYPE};
use crate::patch::apply_diff;

/// Rendering hints. Never read by classification or equality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentationHints {
    pub collapsible: bool,
    pub collapsible_header: String,
    pub start_collapsed: bool,
}

/// A half-open range of character offsets into a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffRange {
    pub from: usize,
    pub to: usize,
}

/// Diff model for a text field, or for a mapping rendered as JSON text.
#[derive(Debug, Clone)]
pub struct TextDiffModel {
    base: Option<String>,
    remote: Option<String>,
    mimetype: String,
    additions: Vec<DiffRange>,
    deletions: Vec<DiffRange>,
    unchanged: bool,
    pub hints: PresentationHints,
}

impl PartialEq for TextDiffModel {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
            && self.remote == other.remote
            && self.mimetype == other.mimetype
            && self.additions == other.additions
            && self.deletions == other.deletions
            && self.unchanged == other.unchanged
    }
}

/// Strings stay as they are, anything else becomes pretty JSON.
fn stringify(value: &Value) -> String {
    text_of(value).unwrap_or_else(|| serde_json::to_string_pretty(value).unwrap_or_default())
}

fn default_mimetype(value: Option<&Value>) -> &'static str {
    match value {
        Some(v) if text_of(v).is_none() => JSON_MIMETYPE,
        _ => PLAIN_MIMETYPE,
    }
}

fn whole(text: &Option<String>) -> Vec<DiffRange> {
    match text {
        Some(t) if !t.is_empty() => vec![DiffRange { from: 0, to: t.chars().count() }],
        _ => Vec::new(),
    }
}

impl TextDiffModel {
    /// Model from already-resolved values; nothing is patched.
    ///
    /// ```
    /// use nbdime::TextDiffModel;
    /// use serde_json::json;
    ///
    /// let v = json!("x = 1\n");
    /// assert!(TextDiffModel::direct(Some(&v), Some(&v)).unchanged());
    /// assert!(TextDiffModel::direct(None, Some(&v)).added());
    /// ```
    pub fn direct(base: Option<&Value>, remote: Option<&Value>) -> Self {
        let unchanged = base == remote;
        let mimetype = default_mimetype(base.or(remote)).to_string();
        let base = base.map(stringify);
        let remote = remote.map(stringify);
        let (additions, deletions) = if unchanged { (Vec::new(), Vec::new()) } else { (whole(&remote), whole(&base)) };
        TextDiffModel { base, remote, mimetype, additions, deletions, unchanged, hints: PresentationHints::default() }
    }

    /// Model for `base` patched by `diff`.
    ///
    /// `unchanged` follows the diff, not a comparison of the two texts.
    pub fn patched(base: &Value, diff: &[DiffEntry]) -> Result<Self, PatchError> {
        let remote_value = apply_diff(base, Some(diff))?;
        let (additions, deletions) = match base {
            Value::String(text) => line_ranges(text, diff),
            _ => (Vec::new(), Vec::new()),
        };
        Ok(TextDiffModel {
            base: Some(stringify(base)),
            remote: Some(stringify(&remote_value)),
            mimetype: default_mimetype(Some(base)).to_string(),
            additions,
            deletions,
            unchanged: diff.is_empty(),
            hints: PresentationHints::default(),
        })
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn remote(&self) -> Option<&str> {
        self.remote.as_deref()
    }

    pub fn mimetype(&self) -> &str {
        &self.mimetype
    }

    pub fn set_mimetype(&mut self, mimetype: impl Into<String>) {
        self.mimetype = mimetype.into();
    }

    /// Ranges of `remote` that were inserted.
    pub fn additions(&self) -> &[DiffRange] {
        &self.additions
    }

    /// Ranges of `base` that were deleted.
    pub fn deletions(&self) -> &[DiffRange] {
        &self.deletions
    }

    pub fn unchanged(&self) -> bool {
        self.unchanged
    }

    pub fn added(&self) -> bool {
        self.base.is_none() && self.remote.is_some()
    }

    pub fn deleted(&self) -> bool {
        self.base.is_some() && self.remote.is_none()
    }
}

// ── Highlight ranges ──────────────────────────────────────────────────────

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn text_len(values: &[Value]) -> usize {
    values.iter().filter_map(Value::as_str).map(char_len).sum()
}

/// Character ranges touched by a line diff of `base`.
///
/// Assumes the diff already applied cleanly; out of range keys are clamped.
fn line_ranges(base: &str, diff: &[DiffEntry]) -> (Vec<DiffRange>, Vec<DiffRange>) {
    let lines: Vec<&str> = base.split_inclusive('\n').collect();
    let mut starts = Vec::with_capacity(lines.len() + 1);
    let mut offset = 0;
    for line in &lines {
        starts.push(offset);
        offset += char_len(line);
    }
    starts.push(offset);
    let base_at = |i: usize| starts[i.min(lines.len())];

    let mut additions = Vec::new();
    let mut deletions = Vec::new();
    let mut take = 0usize;
    let mut remote_pos = 0usize;
    for entry in diff {
        let Some((key, end)) = entry.base_range() else { continue };
        let key = key.min(lines.len());
        remote_pos += base_at(key) - base_at(take.min(key));
        take = take.max(key);
        match entry {
            DiffEntry::AddRange { values, .. } => {
                let len = text_len(values);
                additions.push(DiffRange { from: remote_pos, to: remote_pos + len });
                remote_pos += len;
            }
            DiffEntry::RemoveRange { .. } => {
                let end = end.min(lines.len());
                deletions.push(DiffRange { from: base_at(key), to: base_at(end) });
                take = end;
            }
            DiffEntry::Patch { diff: line_diff, .. } if key < lines.len() => {
                let line_start = base_at(key);
                let line_len = char_len(lines[key]);
                let mut ctake = 0usize;
                let mut cpos = remote_pos;
                for op in line_diff {
                    let Some((ckey, cend)) = op.base_range() else { continue };
                    let ckey = ckey.min(line_len);
                    cpos += ckey.saturating_sub(ctake);
                    ctake = ctake.max(ckey);
                    match op {
                        DiffEntry::AddRange { values, .. } => {
                            let len = text_len(values);
                            additions.push(DiffRange { from: cpos, to: cpos + len });
                            cpos += len;
                        }
                        DiffEntry::RemoveRange { .. } => {
                            let end = cend.min(line_len);
                            deletions.push(DiffRange { from: line_start + ckey, to: line_start + end });
                            ctake = end;
                        }
                        _ => {}
                    }
                }
                remote_pos = cpos + line_len.saturating_sub(ctake);
                take = key + 1;
            }
            _ => {}
        }
    }
    (additions, deletions)
}
