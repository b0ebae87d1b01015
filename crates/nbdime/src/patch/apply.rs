//! Diff application.
//!
//! Nested `patch` entries are handled with an explicit frame stack, so the
//! depth of the document never grows the call stack.

use serde_json::{Map, Value};
use tracing::trace;

use nbdime_path::{join_path, Key, Path};

use crate::diff_format::DiffEntry;
use crate::error::PatchError;

// ── Frames ────────────────────────────────────────────────────────────────

/// The value a frame patches.
#[derive(Clone, Copy)]
enum Target<'a> {
    Value(&'a Value),
    /// One line of a text; its diff is character based.
    Line(&'a str),
}

impl Target<'_> {
    fn unchanged(self) -> Output {
        match self {
            Target::Value(v) => Output::Value(v.clone()),
            Target::Line(s) => Output::Text(s.to_string()),
        }
    }
}

/// A finished frame.
enum Output {
    Value(Value),
    Text(String),
}

/// What a frame asks the driver to do next.
enum Step<'a> {
    Continue,
    Descend(Key, Target<'a>, &'a [DiffEntry]),
    Done(Output),
}

/// Cursor over entries addressing one sequence-like container.
struct Cursor<'a> {
    entries: &'a [DiffEntry],
    pos: usize,
    /// First base position not yet copied or consumed.
    take: usize,
}

impl<'a> Cursor<'a> {
    fn new(entries: &'a [DiffEntry]) -> Self {
        Cursor { entries, pos: 0, take: 0 }
    }

    fn next(&mut self) -> Option<&'a DiffEntry> {
        let entry = self.entries.get(self.pos)?;
        self.pos += 1;
        Some(entry)
    }
}

enum Frame<'a> {
    Seq { base: &'a [Value], cur: Cursor<'a>, out: Vec<Value> },
    Map { base: &'a Map<String, Value>, entries: &'a [DiffEntry], pos: usize, out: Map<String, Value>, removed: Vec<String> },
    Lines { base: Vec<&'a str>, cur: Cursor<'a>, out: String },
    Chars { base: Vec<char>, cur: Cursor<'a>, out: String },
}

impl<'a> Frame<'a> {
    fn open(target: Target<'a>, entries: &'a [DiffEntry], path: &[Key]) -> Result<Self, PatchError> {
        Ok(match target {
            Target::Value(Value::Array(arr)) => Frame::Seq { base: arr, cur: Cursor::new(entries), out: Vec::with_capacity(arr.len()) },
            Target::Value(Value::Object(map)) => {
                Frame::Map { base: map, entries, pos: 0, out: map.clone(), removed: Vec::new() }
            }
            Target::Value(Value::String(s)) => {
                Frame::Lines { base: s.split_inclusive('\n').collect(), cur: Cursor::new(entries), out: String::with_capacity(s.len()) }
            }
            Target::Line(s) => Frame::Chars { base: s.chars().collect(), cur: Cursor::new(entries), out: String::with_capacity(s.len()) },
            Target::Value(other) => {
                return Err(PatchError::mismatch(path, format!("cannot patch scalar {other}")));
            }
        })
    }

    fn step(&mut self, path: &[Key]) -> Result<Step<'a>, PatchError> {
        match self {
            Frame::Seq { base, cur, out } => {
                let base: &'a [Value] = *base;
                let Some(entry) = cur.next() else {
                    out.extend(base[cur.take..].iter().cloned());
                    return Ok(Step::Done(Output::Value(Value::Array(std::mem::take(out)))));
                };
                trace!(path = %join_path(path), op = entry.op_name(), "applying diff entry");
                let (index, end) = seek(cur, entry, base.len(), path)?;
                out.extend(base[cur.take..index].iter().cloned());
                cur.take = index;
                match entry {
                    DiffEntry::AddRange { values, .. } => out.extend(values.iter().cloned()),
                    DiffEntry::RemoveRange { .. } => cur.take = end,
                    DiffEntry::Patch { key, diff } => {
                        cur.take = end;
                        return Ok(Step::Descend(key.clone(), Target::Value(&base[index]), diff));
                    }
                    _ => not_a_sequence_op(entry, path)?,
                }
                Ok(Step::Continue)
            }
            Frame::Lines { base, cur, out } => {
                let Some(entry) = cur.next() else {
                    base[cur.take..].iter().for_each(|line| out.push_str(line));
                    return Ok(Step::Done(Output::Value(Value::String(std::mem::take(out)))));
                };
                trace!(path = %join_path(path), op = entry.op_name(), "applying line diff entry");
                let (index, end) = seek(cur, entry, base.len(), path)?;
                base[cur.take..index].iter().for_each(|line| out.push_str(line));
                cur.take = index;
                match entry {
                    DiffEntry::AddRange { values, .. } => push_text(out, values, path)?,
                    DiffEntry::RemoveRange { .. } => cur.take = end,
                    DiffEntry::Patch { key, diff } => {
                        cur.take = end;
                        return Ok(Step::Descend(key.clone(), Target::Line(base[index]), diff));
                    }
                    _ => not_a_sequence_op(entry, path)?,
                }
                Ok(Step::Continue)
            }
            Frame::Chars { base, cur, out } => {
                let Some(entry) = cur.next() else {
                    out.extend(base[cur.take..].iter());
                    return Ok(Step::Done(Output::Text(std::mem::take(out))));
                };
                let (index, end) = seek(cur, entry, base.len(), path)?;
                out.extend(base[cur.take..index].iter());
                cur.take = index;
                match entry {
                    DiffEntry::AddRange { values, .. } => push_text(out, values, path)?,
                    DiffEntry::RemoveRange { .. } => cur.take = end,
                    _ => {
                        return Err(PatchError::mismatch(path, format!("{} on a character", entry.op_name())));
                    }
                }
                Ok(Step::Continue)
            }
            Frame::Map { base, entries, pos, out, removed } => {
                let (base, entries): (&'a Map<String, Value>, &'a [DiffEntry]) = (*base, *entries);
                let Some(entry) = entries.get(*pos) else {
                    let mut map = std::mem::take(out);
                    if !removed.is_empty() {
                        map = map.into_iter().filter(|(k, _)| !removed.contains(k)).collect();
                    }
                    return Ok(Step::Done(Output::Value(Value::Object(map))));
                };
                *pos += 1;
                trace!(path = %join_path(path), op = entry.op_name(), "applying diff entry");
                let name = match entry.key() {
                    Key::Name(name) => name,
                    Key::Index(i) => {
                        return Err(PatchError::mismatch(path, format!("{} at index {i} on a mapping", entry.op_name())));
                    }
                };
                let present = base.contains_key(&name) && !removed.contains(&name);
                match entry {
                    DiffEntry::Add { value, .. } => {
                        if out.contains_key(&name) {
                            return Err(PatchError::mismatch(path, format!("add of existing key {name:?}")));
                        }
                        out.insert(name, value.clone());
                    }
                    DiffEntry::Replace { value, .. } => {
                        if !present {
                            return Err(PatchError::mismatch(path, format!("replace of missing key {name:?}")));
                        }
                        out.insert(name, value.clone());
                    }
                    DiffEntry::Remove { .. } => {
                        if !present {
                            return Err(PatchError::mismatch(path, format!("remove of missing key {name:?}")));
                        }
                        removed.push(name);
                    }
                    DiffEntry::Patch { key, diff } => {
                        let Some(child) = base.get(&name) else {
                            return Err(PatchError::mismatch(path, format!("patch of missing key {name:?}")));
                        };
                        return Ok(Step::Descend(key.clone(), Target::Value(child), diff));
                    }
                    DiffEntry::AddRange { .. } | DiffEntry::RemoveRange { .. } => {
                        return Err(PatchError::mismatch(path, format!("{} on a mapping", entry.op_name())));
                    }
                }
                Ok(Step::Continue)
            }
        }
    }

    /// Take the output of a finished child frame.
    fn accept(&mut self, key: Key, output: Output, path: &[Key]) -> Result<(), PatchError> {
        match (self, output) {
            (Frame::Seq { out, .. }, Output::Value(v)) => out.push(v),
            (Frame::Map { out, .. }, Output::Value(v)) => {
                out.insert(key.to_string(), v);
            }
            (Frame::Lines { out, .. }, Output::Text(s)) => out.push_str(&s),
            _ => return Err(PatchError::mismatch(path, "nested result does not fit its container")),
        }
        Ok(())
    }
}

/// Validate a sequence entry's range against the cursor and base length.
fn seek(cur: &Cursor<'_>, entry: &DiffEntry, len: usize, path: &[Key]) -> Result<(usize, usize), PatchError> {
    let Some((start, end)) = entry.base_range() else {
        return Err(PatchError::mismatch(path, entry.range_fault()));
    };
    if start < cur.take {
        return Err(PatchError::mismatch(path, format!("entry at {start} overlaps or is out of order")));
    }
    if end > len {
        return Err(PatchError::mismatch(path, format!("range {start}..{end} out of bounds for length {len}")));
    }
    Ok((start, end))
}

fn not_a_sequence_op(entry: &DiffEntry, path: &[Key]) -> Result<(), PatchError> {
    Err(PatchError::mismatch(path, format!("{} on a sequence", entry.op_name())))
}

fn push_text(out: &mut String, values: &[Value], path: &[Key]) -> Result<(), PatchError> {
    for value in values {
        match value {
            Value::String(s) => out.push_str(s),
            other => return Err(PatchError::mismatch(path, format!("cannot insert {other} into text"))),
        }
    }
    Ok(())
}

// ── Public API ────────────────────────────────────────────────────────────

/// Apply a diff to `base`, returning the patched value.
///
/// `None` and an empty diff both return a copy of `base`.
///
/// ```
/// use nbdime::{apply_diff, DiffEntry};
/// use nbdime_path::Key;
/// use serde_json::json;
///
/// let base = json!({"source": "a\nb\n", "n": 1});
/// let diff = vec![
///     DiffEntry::Replace { key: Key::from("n"), value: json!(2) },
///     DiffEntry::Patch { key: Key::from("source"), diff: vec![DiffEntry::RemoveRange { key: 0, length: 1 }] },
/// ];
/// assert_eq!(apply_diff(&base, Some(&diff[..])).unwrap(), json!({"source": "b\n", "n": 2}));
/// ```
pub fn apply_diff(base: &Value, diff: Option<&[DiffEntry]>) -> Result<Value, PatchError> {
    let diff = match diff {
        Some(d) if !d.is_empty() => d,
        _ => return Ok(base.clone()),
    };
    let mut path: Path = Vec::new();
    let mut stack: Vec<(Option<Key>, Frame<'_>)> = vec![(None, Frame::open(Target::Value(base), diff, &path)?)];
    while let Some((_, frame)) = stack.last_mut() {
        match frame.step(&path)? {
            Step::Continue => {}
            Step::Descend(key, target, []) => frame.accept(key, target.unchanged(), &path)?,
            Step::Descend(key, target, sub) => {
                path.push(key.clone());
                let child = Frame::open(target, sub, &path)?;
                stack.push((Some(key), child));
            }
            Step::Done(output) => {
                let Some((key, _)) = stack.pop() else { break };
                match (key, stack.last_mut()) {
                    (Some(key), Some((_, parent))) => {
                        path.pop();
                        parent.accept(key, output, &path)?;
                    }
                    (_, _) => {
                        return match output {
                            Output::Value(v) => Ok(v),
                            Output::Text(s) => Ok(Value::String(s)),
                        };
                    }
                }
            }
        }
    }
    Ok(base.clone())
}

/// Apply a single entry to `base`.
pub fn apply_diff_entry(base: &Value, entry: &DiffEntry) -> Result<Value, PatchError> {
    apply_diff(base, Some(std::slice::from_ref(entry)))
}
