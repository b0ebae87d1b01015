//! Diff models for cell outputs.

use serde_json::Value;

use crate::diff_format::DiffEntry;
use crate::error::{ModelError, PatchError};
use crate::notebook::{text_of, PLAIN_MIMETYPE};
use crate::patch::apply_diff;

use super::string::{PresentationHints, TextDiffModel};

/// Diff model for one output record.
#[derive(Debug, Clone)]
pub struct OutputDiffModel {
    base: Option<Value>,
    remote: Option<Value>,
    diff: Option<Vec<DiffEntry>>,
    unchanged: bool,
    pub hints: PresentationHints,
}

impl PartialEq for OutputDiffModel {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base && self.remote == other.remote && self.diff == other.diff && self.unchanged == other.unchanged
    }
}

impl OutputDiffModel {
    /// With a diff, the remote is `base` patched by it.
    pub fn new(base: Option<&Value>, remote: Option<&Value>, diff: Option<&[DiffEntry]>) -> Result<Self, PatchError> {
        let (remote, unchanged) = match (base, diff) {
            (Some(b), Some(d)) => (Some(apply_diff(b, Some(d))?), d.is_empty()),
            _ => (remote.cloned(), base == remote),
        };
        Ok(OutputDiffModel {
            base: base.cloned(),
            remote,
            diff: diff.map(<[DiffEntry]>::to_vec),
            unchanged,
            hints: PresentationHints::default(),
        })
    }

    pub fn base(&self) -> Option<&Value> {
        self.base.as_ref()
    }

    pub fn remote(&self) -> Option<&Value> {
        self.remote.as_ref()
    }

    pub fn diff(&self) -> Option<&[DiffEntry]> {
        self.diff.as_deref()
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

    /// Mimetypes carried by either side, base order first.
    pub fn mimetypes(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for value in [&self.base, &self.remote].into_iter().flatten() {
            for key in payload_keys(value) {
                if !out.contains(&key) {
                    out.push(key);
                }
            }
        }
        out
    }

    pub fn has_mimetype(&self, key: &str) -> bool {
        [&self.base, &self.remote].into_iter().flatten().any(|v| payload(v, key).is_some())
    }

    /// Text model of one payload (`key`), or of every payload joined.
    ///
    /// ```
    /// use nbdime::OutputDiffModel;
    /// use serde_json::json;
    ///
    /// let out = json!({"output_type": "execute_result", "data": {"text/plain": ["4\n", "2"]}});
    /// let model = OutputDiffModel::new(Some(&out), Some(&out), None).unwrap();
    /// let text = model.stringify(Some("text/plain"));
    /// assert_eq!(text.base(), Some("4\n2"));
    /// assert!(text.unchanged());
    /// ```
    pub fn stringify(&self, key: Option<&str>) -> TextDiffModel {
        let render = |value: &Option<Value>| -> Option<Value> {
            let value = value.as_ref()?;
            match key {
                Some(k) => payload(value, k).map(|p| Value::String(payload_text(p))),
                None => Some(Value::String(all_payloads_text(value))),
            }
        };
        let base = render(&self.base);
        let remote = render(&self.remote);
        let mut model = TextDiffModel::direct(base.as_ref(), remote.as_ref());
        model.set_mimetype(key.unwrap_or(PLAIN_MIMETYPE));
        model
    }
}

// ── Payloads ──────────────────────────────────────────────────────────────

/// Payload names of an output: its `data` mimetypes, or `text` for streams.
fn payload_keys(output: &Value) -> Vec<String> {
    if let Some(data) = output.get("data").and_then(Value::as_object) {
        return data.keys().cloned().collect();
    }
    ["text", "traceback"].iter().filter(|k| output.get(**k).is_some()).map(|k| k.to_string()).collect()
}

fn payload<'a>(output: &'a Value, key: &str) -> Option<&'a Value> {
    match output.get("data") {
        Some(data) => data.get(key),
        None => output.get(key),
    }
}

fn payload_text(value: &Value) -> String {
    match value {
        Value::Array(lines) if lines.iter().all(Value::is_string) && lines.iter().any(|l| l.as_str().is_some_and(|s| s.ends_with('\n'))) => {
            text_of(value).unwrap_or_default()
        }
        // tracebacks are a list of lines without terminators
        Value::Array(lines) if lines.iter().all(Value::is_string) => {
            lines.iter().filter_map(Value::as_str).collect::<Vec<_>>().join("\n")
        }
        other => text_of(other).unwrap_or_else(|| serde_json::to_string_pretty(other).unwrap_or_default()),
    }
}

fn all_payloads_text(output: &Value) -> String {
    let keys = payload_keys(output);
    let mut parts = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(p) = payload(output, &key) {
            parts.push(payload_text(p));
        }
    }
    if parts.is_empty() {
        if let (Some(name), Some(value)) = (output.get("ename"), output.get("evalue")) {
            parts.push(format!("{}: {}", name.as_str().unwrap_or_default(), value.as_str().unwrap_or_default()));
        }
    }
    parts.join("\n")
}

// ── List models ───────────────────────────────────────────────────────────

/// Per-output models for an outputs list.
///
/// * `base` and `diff`: walk the diff, untouched outputs are unchanged,
///   inserted ones added, removed ones deleted, patched ones patched.
/// * `base` and `remote`: outputs paired by position.
/// * only `base`: everything deleted; only `remote`: everything added.
pub fn make_output_models(
    base: Option<&[Value]>,
    remote: Option<&[Value]>,
    diff: Option<&[DiffEntry]>,
) -> Result<Vec<OutputDiffModel>, ModelError> {
    let mut models = Vec::new();
    match (base, remote, diff) {
        (Some(base), _, Some(diff)) => {
            let mut take = 0usize;
            for entry in diff {
                let Some((key, end)) = entry.base_range() else {
                    return Err(
                        PatchError::StructuralMismatch { path: "/outputs".to_string(), reason: entry.range_fault() }.into()
                    );
                };
                if key < take || end > base.len() {
                    return Err(PatchError::StructuralMismatch {
                        path: "/outputs".to_string(),
                        reason: format!("entry at {key} out of order or out of bounds"),
                    }
                    .into());
                }
                for o in &base[take..key] {
                    models.push(OutputDiffModel::new(Some(o), Some(o), None)?);
                }
                take = key;
                match entry {
                    DiffEntry::AddRange { values, .. } => {
                        for v in values {
                            models.push(OutputDiffModel::new(None, Some(v), None)?);
                        }
                    }
                    DiffEntry::RemoveRange { .. } => {
                        for o in &base[key..end] {
                            models.push(OutputDiffModel::new(Some(o), None, None)?);
                        }
                        take = end;
                    }
                    DiffEntry::Patch { diff, .. } => {
                        models.push(OutputDiffModel::new(Some(&base[key]), None, Some(diff.as_slice()))?);
                        take = end;
                    }
                    other => {
                        return Err(PatchError::StructuralMismatch {
                            path: format!("/outputs/{key}"),
                            reason: format!("{} on outputs", other.op_name()),
                        }
                        .into());
                    }
                }
            }
            for o in &base[take..] {
                models.push(OutputDiffModel::new(Some(o), Some(o), None)?);
            }
        }
        (base, remote, None) => {
            let base = base.unwrap_or(&[]);
            let remote = remote.unwrap_or(&[]);
            for i in 0..base.len().max(remote.len()) {
                models.push(OutputDiffModel::new(base.get(i), remote.get(i), None)?);
            }
        }
        (None, _, Some(_)) => {
            return Err(ModelError::InvalidCell("outputs diff without base outputs".to_string()));
        }
    }
    Ok(models)
}
