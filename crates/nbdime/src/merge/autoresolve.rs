//! Automatic resolution of conflicts by configured strategy.
//!
//! A conflicted decision is lifted to the nearest ancestor with a
//! strategy, resolved there and pushed back down as far as it goes.

use serde_json::{json, Map, Value};
use tracing::warn;

use nbdime_path::{join_path, Key, Path};

use crate::diff_format::{Diff, DiffEntry};
use crate::error::MergeError;
use crate::patch::apply_diff;

use super::decide::{locate, Node};
use super::decisions::{
    clear_mapping_diff, clear_range_diff, empty_like, pop_all_patch_decisions, push_patch_decision, Action,
    MergeDecision,
};
use super::strategies::{Strategies, Strategy};

/// Key under which `record-conflict` stores both sides.
pub const CONFLICTS_KEY: &str = "nbdime-conflicts";

/// Resolve what the strategies can; other decisions pass through in order.
pub fn autoresolve(base: &Value, decisions: Vec<MergeDecision>, strategies: &Strategies) -> Result<Vec<MergeDecision>, MergeError> {
    let mut out = Vec::with_capacity(decisions.len());
    for dec in decisions {
        if dec.conflict {
            out.extend(autoresolve_decision(base, dec, strategies)?);
        } else {
            out.push(dec);
        }
    }
    Ok(out)
}

fn autoresolve_decision(base: &Value, dec: MergeDecision, strategies: &Strategies) -> Result<Vec<MergeDecision>, MergeError> {
    let mut dec = dec;
    for n in 1..=dec.common_path.len() {
        match strategies.get(&dec.common_path[..n]) {
            None => {}
            Some(Strategy::Mergetool) => return Ok(vec![dec]),
            Some(_) => {
                let tail: Path = dec.common_path[n - 1..].to_vec();
                dec = push_patch_decision(&dec, &tail)?;
                break;
            }
        }
    }
    let decisions = match locate(base, &dec.common_path) {
        Some(Node::Value(Value::Object(map))) => on_mapping(map, dec, strategies)?,
        Some(Node::Value(container @ (Value::Array(_) | Value::String(_)))) => {
            on_sequence(empty_like(container), dec, strategies)?
        }
        Some(Node::Line(_)) => on_sequence(Value::String(String::new()), dec, strategies)?,
        _ => {
            return Err(MergeError::InvalidDecision(format!(
                "conflict at {} does not address a container",
                join_path(&dec.common_path)
            )));
        }
    };
    Ok(decisions.into_iter().map(pop_all_patch_decisions).collect())
}

fn settle(mut dec: MergeDecision, action: Action) -> MergeDecision {
    dec.action = action;
    dec.conflict = false;
    dec
}

/// Lift `dec` one level and replace the container it addresses by `emptied`.
///
/// A conflict at the document root stays as it is.
fn clear_parent(dec: MergeDecision, emptied: Value) -> Result<MergeDecision, MergeError> {
    let Some(key) = dec.common_path.last().cloned() else {
        return Ok(dec);
    };
    let lifted = push_patch_decision(&dec, std::slice::from_ref(&key))?;
    let custom = match key {
        Key::Index(i) => vec![
            DiffEntry::AddRange { key: i, values: vec![emptied] },
            DiffEntry::RemoveRange { key: i, length: 1 },
        ],
        key => vec![DiffEntry::Replace { key, value: emptied }],
    };
    Ok(settle(lifted, Action::Clear).with_custom(Action::Clear, custom))
}

/// True if every change in `diff` lies under a transient path.
fn all_transient(diff: &[DiffEntry], path: &[Key], strategies: &Strategies) -> bool {
    let mut stack: Vec<(Path, &[DiffEntry])> = vec![(path.to_vec(), diff)];
    while let Some((path, diff)) = stack.pop() {
        for entry in diff {
            let mut sub = path.clone();
            sub.push(entry.key());
            if strategies.is_transient(&sub) {
                continue;
            }
            match entry {
                DiffEntry::Patch { diff, .. } => stack.push((sub, diff)),
                _ => return false,
            }
        }
    }
    true
}

// ── Mappings ──────────────────────────────────────────────────────────────

fn on_mapping(map: &Map<String, Value>, dec: MergeDecision, strategies: &Strategies) -> Result<Vec<MergeDecision>, MergeError> {
    let (le, re) = match (dec.local_diff.as_slice(), dec.remote_diff.as_slice()) {
        ([l], [r]) if l.key() == r.key() => (Some(l.clone()), Some(r.clone())),
        ([l], []) => (Some(l.clone()), None),
        ([], [r]) => (None, Some(r.clone())),
        _ => return Ok(vec![dec]),
    };
    let key = match (&le, &re) {
        (Some(e), _) | (None, Some(e)) => e.key(),
        (None, None) => return Ok(vec![dec]),
    };
    let mut subpath = dec.common_path.clone();
    subpath.push(key);

    if let Some(strategy) = strategies.get(&subpath) {
        return resolve_in_mapping(map, le.as_ref(), re.as_ref(), strategy, &subpath, dec);
    }

    // changes to transient values give way to a deletion
    let deleting = match (&le, &re) {
        (Some(DiffEntry::Patch { diff, .. }), Some(DiffEntry::Remove { .. })) => Some((diff, Action::Remote)),
        (Some(DiffEntry::Remove { .. }), Some(DiffEntry::Patch { diff, .. })) => Some((diff, Action::Local)),
        _ => None,
    };
    if let Some((diff, action)) = deleting {
        if all_transient(diff, &subpath, strategies) {
            return Ok(vec![settle(dec, action)]);
        }
    }

    match strategies.fall_back {
        Some(strategy) => resolve_in_mapping(map, le.as_ref(), re.as_ref(), strategy, &subpath, dec),
        None => Ok(vec![dec]),
    }
}

/// The value of one side, given the base value and that side's entry.
fn side_value(base: Option<&Value>, entry: Option<&DiffEntry>) -> Result<Option<Value>, MergeError> {
    Ok(match entry {
        None => base.cloned(),
        Some(DiffEntry::Add { value, .. } | DiffEntry::Replace { value, .. }) => Some(value.clone()),
        Some(DiffEntry::Remove { .. }) => None,
        Some(DiffEntry::Patch { diff, .. }) => match base {
            Some(base) => Some(apply_diff(base, Some(diff))?),
            None => None,
        },
        Some(_) => None,
    })
}

/// Base lines `begin..end` touched by one side's change to a text.
fn touched_lines(entry: &DiffEntry, line_count: usize) -> Option<(usize, usize)> {
    let DiffEntry::Patch { diff, .. } = entry else {
        return Some((0, line_count));
    };
    diff.iter().try_fold(None, |span: Option<(usize, usize)>, e| {
        let (s, t) = match e {
            DiffEntry::AddRange { key, .. } => (*key, *key),
            other => other.base_range()?,
        };
        Some(Some(span.map_or((s, t), |(b, d)| (b.min(s), d.max(t)))))
    })?
}

fn push_lines<S: AsRef<str>>(out: &mut Vec<Value>, lines: &[S]) {
    for line in lines {
        let line = line.as_ref();
        if line.ends_with('\n') {
            out.push(json!(line));
        } else {
            out.push(json!(format!("{line}\n")));
        }
    }
}

/// The base lines both sides edit and the marked-up lines replacing them.
///
/// Returns `None` when an entry does not address lines of `source`.
fn inline_source(
    source: &str,
    le: &DiffEntry,
    re: &DiffEntry,
) -> Result<Option<(usize, usize, Vec<Value>)>, MergeError> {
    let base: Vec<&str> = source.split_inclusive('\n').collect();
    let (Some((lb, lend)), Some((rb, rend))) = (touched_lines(le, base.len()), touched_lines(re, base.len()))
    else {
        return Ok(None);
    };
    let (begin, end) = (lb.min(rb), lend.max(rend));
    if end > base.len() {
        return Ok(None);
    }
    let base_value = Value::String(source.to_string());
    let mut sides: Vec<Vec<String>> = Vec::with_capacity(2);
    for entry in [le, re] {
        let text = match side_value(Some(&base_value), Some(entry))? {
            Some(Value::String(text)) => text,
            _ => String::new(),
        };
        let lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
        // lines after `end` are untouched on both sides
        let Some(stop) = lines.len().checked_sub(base.len() - end).filter(|stop| *stop >= begin) else {
            return Ok(None);
        };
        sides.push(lines[begin..stop].to_vec());
    }
    let mut inlined = vec![json!("<<<<<<< local\n")];
    push_lines(&mut inlined, &sides[0]);
    inlined.push(json!("||||||| base\n"));
    push_lines(&mut inlined, &base[begin..end]);
    inlined.push(json!("=======\n"));
    push_lines(&mut inlined, &sides[1]);
    inlined.push(json!(">>>>>>> remote\n"));
    Ok(Some((begin, end, inlined)))
}

fn conflict_marker(text: &str) -> Value {
    json!({"output_type": "stream", "name": "stderr", "text": text})
}

fn resolve_in_mapping(
    map: &Map<String, Value>,
    le: Option<&DiffEntry>,
    re: Option<&DiffEntry>,
    strategy: Strategy,
    subpath: &[Key],
    dec: MergeDecision,
) -> Result<Vec<MergeDecision>, MergeError> {
    if strategy != Strategy::Mergetool {
        warn!(path = %join_path(subpath), strategy = %strategy, "autoresolving conflict");
    }
    let Some(Key::Name(name)) = subpath.last() else {
        return Ok(vec![dec]);
    };
    let base_value = map.get(name);
    let decision = match strategy {
        Strategy::Clear => {
            let custom = clear_mapping_diff(map, &dec.local_diff, &dec.remote_diff);
            settle(dec, Action::Clear).with_custom(Action::Clear, custom)
        }
        Strategy::UseBase => settle(dec, Action::Base),
        Strategy::UseLocal => settle(dec, Action::Local),
        Strategy::UseRemote => settle(dec, Action::Remote),
        Strategy::ClearParent => clear_parent(dec, Value::Object(Map::new()))?,
        Strategy::TakeMax => {
            let number = |e: Option<&DiffEntry>| match e {
                Some(DiffEntry::Replace { value, .. } | DiffEntry::Add { value, .. }) => value.as_f64(),
                Some(_) => None,
                None => base_value.and_then(Value::as_f64),
            };
            let (Some(b), Some(l), Some(r)) = (base_value.and_then(Value::as_f64), number(le), number(re)) else {
                return Ok(vec![dec]);
            };
            let max = b.max(l).max(r);
            if b >= max {
                return Ok(Vec::new());
            }
            settle(dec, if l >= max { Action::Local } else { Action::Remote })
        }
        _ if le.is_none() => settle(dec, Action::Remote),
        _ if re.is_none() => settle(dec, Action::Local),
        _ if le == re => settle(dec, Action::Either),
        Strategy::Union => match base_value {
            Some(Value::Array(_) | Value::String(_)) => settle(dec, Action::LocalThenRemote),
            _ => dec,
        },
        Strategy::InlineSource => {
            let (Some(Value::String(source)), Some(le), Some(re)) = (base_value, le, re) else {
                return Ok(vec![dec]);
            };
            let Some((begin, end, inlined)) = inline_source(source, le, re)? else {
                return Ok(vec![dec]);
            };
            let mut lines = vec![DiffEntry::AddRange { key: begin, values: inlined }];
            if end > begin {
                lines.push(DiffEntry::RemoveRange { key: begin, length: end - begin });
            }
            let custom = vec![DiffEntry::Patch { key: Key::Name(name.clone()), diff: lines }];
            dec.with_custom(Action::Custom, custom)
        }
        Strategy::InlineOutputs => {
            let Some(Value::Array(base_items)) = base_value else {
                return Ok(vec![dec]);
            };
            let items = |v: Option<Value>| match v {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            let local = items(side_value(base_value, le)?);
            let remote = items(side_value(base_value, re)?);
            let mut outputs = vec![conflict_marker("<<<<<<< local\n")];
            outputs.extend(local);
            outputs.push(conflict_marker("||||||| base\n"));
            outputs.extend(base_items.iter().cloned());
            outputs.push(conflict_marker("=======\n"));
            outputs.extend(remote);
            outputs.push(conflict_marker(">>>>>>> remote"));
            let custom = vec![DiffEntry::Replace { key: Key::Name(name.clone()), value: Value::Array(outputs) }];
            dec.with_custom(Action::Custom, custom)
        }
        Strategy::RecordConflict => {
            let Some(Value::Object(base_map)) = base_value else {
                return Ok(vec![dec]);
            };
            let mut recorded = base_map.clone();
            recorded.insert(
                CONFLICTS_KEY.to_string(),
                json!({"local": serde_json::to_value(le)?, "remote": serde_json::to_value(re)?}),
            );
            let custom = vec![DiffEntry::Replace { key: Key::Name(name.clone()), value: Value::Object(recorded) }];
            dec.with_custom(Action::Custom, custom)
        }
        Strategy::Mergetool => dec,
        Strategy::Fail => return Err(MergeError::UnexpectedConflict { path: join_path(subpath) }),
    };
    Ok(vec![decision])
}

// ── Sequences ─────────────────────────────────────────────────────────────

fn patches_only(diff: &Diff) -> bool {
    !diff.is_empty() && diff.iter().all(DiffEntry::is_patch)
}

fn deletes_only(diff: &Diff) -> bool {
    diff.iter().any(|e| matches!(e, DiffEntry::RemoveRange { .. })) && !diff.iter().any(DiffEntry::is_patch)
}

/// `emptied` is the empty value of the sequence itself.
fn on_sequence(emptied: Value, dec: MergeDecision, strategies: &Strategies) -> Result<Vec<MergeDecision>, MergeError> {
    let mut items = dec.common_path.clone();
    items.push(Key::from("*"));
    if let Some(strategy) = strategies.get(&items) {
        return resolve_in_sequence(strategy, dec, &items, emptied);
    }

    // items patched on one side and deleted on the other
    let deleting = if patches_only(&dec.local_diff) && deletes_only(&dec.remote_diff) {
        Some((&dec.local_diff, Action::Remote))
    } else if patches_only(&dec.remote_diff) && deletes_only(&dec.local_diff) {
        Some((&dec.remote_diff, Action::Local))
    } else {
        None
    };
    let give_way = deleting.and_then(|(patched, action)| {
        let transient = patched.iter().all(|entry| match entry {
            DiffEntry::Patch { key, diff } => {
                let mut sub = dec.common_path.clone();
                sub.push(key.clone());
                all_transient(diff, &sub, strategies)
            }
            _ => false,
        });
        transient.then_some(action)
    });
    if let Some(action) = give_way {
        return Ok(vec![settle(dec, action)]);
    }

    match strategies.fall_back {
        Some(strategy) => resolve_in_sequence(strategy, dec, &items, emptied),
        None => Ok(vec![dec]),
    }
}

fn resolve_in_sequence(
    strategy: Strategy,
    dec: MergeDecision,
    items: &[Key],
    emptied: Value,
) -> Result<Vec<MergeDecision>, MergeError> {
    if strategy != Strategy::Mergetool {
        warn!(path = %join_path(items), strategy = %strategy, "autoresolving conflict");
    }
    let decision = match strategy {
        Strategy::UseBase => settle(dec, Action::Base),
        Strategy::UseLocal => settle(dec, Action::Local),
        Strategy::UseRemote => settle(dec, Action::Remote),
        Strategy::Union => settle(dec, Action::LocalThenRemote),
        Strategy::Clear => {
            let custom = clear_range_diff(&dec.local_diff, &dec.remote_diff);
            settle(dec, Action::Clear).with_custom(Action::Clear, custom)
        }
        Strategy::ClearParent => clear_parent(dec, emptied)?,
        Strategy::Mergetool => dec,
        Strategy::Fail => return Err(MergeError::UnexpectedConflict { path: join_path(items) }),
        other => {
            return Err(MergeError::InvalidDecision(format!(
                "strategy {other} cannot resolve items at {}",
                join_path(&dec.common_path)
            )));
        }
    };
    Ok(vec![decision])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn replace(key: &str, value: Value) -> DiffEntry {
        DiffEntry::Replace { key: Key::from(key), value }
    }

    fn conflict(path: &[&str], local: Diff, remote: Diff) -> MergeDecision {
        MergeDecision::conflicted(path.iter().map(|k| Key::from(*k)).collect(), Action::Local, local, remote)
    }

    fn with(path: &str, strategy: Strategy) -> Strategies {
        let mut s = Strategies::default();
        s.insert(path, strategy);
        s
    }

    #[test]
    fn untouched_without_strategies() {
        let base = json!({"a": 1});
        let dec = conflict(&[], vec![replace("a", json!(2))], vec![replace("a", json!(3))]);
        let out = autoresolve(&base, vec![dec.clone()], &Strategies::default()).unwrap();
        assert_eq!(out, vec![dec]);
    }

    #[test]
    fn side_strategies() {
        let base = json!({"a": 1});
        let dec = conflict(&[], vec![replace("a", json!(2))], vec![replace("a", json!(3))]);
        for (strategy, action) in
            [(Strategy::UseBase, Action::Base), (Strategy::UseLocal, Action::Local), (Strategy::UseRemote, Action::Remote)]
        {
            let out = autoresolve(&base, vec![dec.clone()], &with("/a", strategy)).unwrap();
            assert_eq!(out[0].action, action);
            assert!(!out[0].conflict);
        }
    }

    #[test]
    fn strategy_on_ancestor_lifts_and_lowers() {
        let base = json!({"meta": {"deep": {"x": 1}}});
        let dec = conflict(&["meta", "deep"], vec![replace("x", json!(2))], vec![replace("x", json!(3))]);
        let out = autoresolve(&base, vec![dec], &with("/meta", Strategy::UseBase)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].common_path, vec![Key::from("meta"), Key::from("deep")]);
        assert_eq!(out[0].action, Action::Base);
        assert_eq!(out[0].local_diff, vec![replace("x", json!(2))]);
    }

    #[test]
    fn take_max() {
        let base = json!({"minor": 2});
        let dec = |l, r| conflict(&[], vec![replace("minor", json!(l))], vec![replace("minor", json!(r))]);
        let s = with("/minor", Strategy::TakeMax);
        assert_eq!(autoresolve(&base, vec![dec(4, 3)], &s).unwrap()[0].action, Action::Local);
        assert_eq!(autoresolve(&base, vec![dec(3, 5)], &s).unwrap()[0].action, Action::Remote);
        assert!(autoresolve(&base, vec![dec(1, 0)], &s).unwrap().is_empty());
    }

    #[test]
    fn clear_mapping_value() {
        let base = json!({"count": 4});
        let dec = conflict(&[], vec![replace("count", json!(5))], vec![replace("count", json!(6))]);
        let out = autoresolve(&base, vec![dec], &with("/count", Strategy::Clear)).unwrap();
        assert_eq!(out[0].action, Action::Clear);
        assert_eq!(out[0].custom_diff, vec![replace("count", Value::Null)]);
    }

    #[test]
    fn fail_raises() {
        let base = json!({"nbformat": 4});
        let dec = conflict(&[], vec![replace("nbformat", json!(5))], vec![replace("nbformat", json!(3))]);
        let err = autoresolve(&base, vec![dec], &with("/nbformat", Strategy::Fail)).unwrap_err();
        assert!(matches!(err, MergeError::UnexpectedConflict { path } if path == "/nbformat"));
    }

    #[test]
    fn union_on_list() {
        let base = json!({"outputs": [1]});
        let local = vec![DiffEntry::Patch {
            key: Key::from("outputs"),
            diff: vec![DiffEntry::AddRange { key: 1, values: vec![json!(2)] }],
        }];
        let remote = vec![DiffEntry::Patch {
            key: Key::from("outputs"),
            diff: vec![DiffEntry::AddRange { key: 1, values: vec![json!(3)] }],
        }];
        let dec = conflict(&[], local, remote);
        let out = autoresolve(&base, vec![dec], &with("/outputs", Strategy::Union)).unwrap();
        assert_eq!(out[0].common_path, vec![Key::from("outputs")]);
        assert_eq!(out[0].action, Action::LocalThenRemote);
        let merged = crate::merge::apply_decisions(&base, &out).unwrap();
        assert_eq!(merged, json!({"outputs": [1, 2, 3]}));
    }

    #[test]
    fn sequence_strategy_on_items() {
        let base = json!({"l": [1, 2]});
        let dec = conflict(
            &["l"],
            vec![DiffEntry::RemoveRange { key: 0, length: 2 }],
            vec![DiffEntry::RemoveRange { key: 1, length: 1 }],
        );
        let out = autoresolve(&base, vec![dec.clone()], &with("/l/*", Strategy::Clear)).unwrap();
        assert_eq!(out[0].custom_diff, vec![DiffEntry::RemoveRange { key: 0, length: 2 }]);
        let err = autoresolve(&base, vec![dec], &with("/l/*", Strategy::TakeMax)).unwrap_err();
        assert!(matches!(err, MergeError::InvalidDecision(_)));
    }

    #[test]
    fn transient_changes_give_way_to_deletion() {
        let base = json!({"cells": [{"outputs": [], "source": ""}]});
        let patched = vec![DiffEntry::Patch {
            key: Key::from(0),
            diff: vec![DiffEntry::Patch {
                key: Key::from("outputs"),
                diff: vec![DiffEntry::AddRange { key: 0, values: vec![json!({})] }],
            }],
        }];
        let deleted = vec![DiffEntry::RemoveRange { key: 0, length: 1 }];
        let dec = conflict(&["cells"], patched, deleted);
        let mut s = Strategies::default();
        s.transients.push("/cells/*/outputs".to_string());
        let out = autoresolve(&base, vec![dec.clone()], &s).unwrap();
        assert_eq!(out[0].action, Action::Remote);
        assert!(!out[0].conflict);
        assert!(autoresolve(&base, vec![dec], &Strategies::default()).unwrap()[0].conflict);
    }

    #[test]
    fn inline_outputs_keeps_conflict() {
        let out1 = json!({"output_type": "stream", "name": "stdout", "text": "a"});
        let base = json!({"outputs": []});
        let local = vec![replace("outputs", json!([out1.clone()]))];
        let remote = vec![replace("outputs", json!([]))];
        let dec = conflict(&[], local, remote);
        let out = autoresolve(&base, vec![dec], &with("/outputs", Strategy::InlineOutputs)).unwrap();
        assert_eq!(out[0].action, Action::Custom);
        assert!(out[0].conflict);
        let DiffEntry::Replace { value: Value::Array(items), .. } = &out[0].custom_diff[0] else { panic!() };
        assert_eq!(items.len(), 5);
        assert_eq!(items[1], out1);
        assert_eq!(items[4]["text"], json!(">>>>>>> remote"));
    }

    #[test]
    fn inline_source_marks_conflicting_lines() {
        let base = json!({"source": "a\nb\nc\n"});
        let swap = |text: &str| {
            vec![
                DiffEntry::AddRange { key: 1, values: vec![json!(text)] },
                DiffEntry::RemoveRange { key: 1, length: 1 },
            ]
        };
        let dec = conflict(&["source"], swap("L\n"), swap("R\n"));
        let out = autoresolve(&base, vec![dec], &with("/source", Strategy::InlineSource)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].common_path, vec![Key::from("source")]);
        assert_eq!(out[0].action, Action::Custom);
        assert!(out[0].conflict);
        let merged = crate::merge::apply_decisions(&base, &out).unwrap();
        assert_eq!(
            merged["source"],
            json!("a\n<<<<<<< local\nL\n||||||| base\nb\n=======\nR\n>>>>>>> remote\nc\n")
        );
    }

    #[test]
    fn inline_source_spans_both_sides() {
        let base = json!({"source": "a\nb\nc"});
        let local = vec![DiffEntry::RemoveRange { key: 0, length: 2 }];
        let remote = vec![
            DiffEntry::AddRange { key: 1, values: vec![json!("x\n")] },
            DiffEntry::Patch { key: Key::from(2), diff: vec![DiffEntry::AddRange { key: 1, values: vec![json!("!")] }] },
        ];
        let dec = conflict(&["source"], local, remote);
        let out = autoresolve(&base, vec![dec], &with("/source", Strategy::InlineSource)).unwrap();
        let merged = crate::merge::apply_decisions(&base, &out).unwrap();
        assert_eq!(
            merged["source"],
            json!("<<<<<<< local\nc\n||||||| base\na\nb\nc\n=======\na\nx\nb\nc!\n>>>>>>> remote\n")
        );
    }

    #[test]
    fn clear_parent_of_sequence_items() {
        let base = json!({"cells": [{"outputs": [1, 2], "source": "x"}]});
        let path = vec![Key::from("cells"), Key::from(0), Key::from("outputs")];
        let local = vec![DiffEntry::AddRange { key: 1, values: vec![json!(3)] }];
        let remote = vec![DiffEntry::AddRange { key: 1, values: vec![json!(4)] }];
        let dec = MergeDecision::conflicted(path, Action::Local, local, remote);
        let out = autoresolve(&base, vec![dec], &with("/cells/*/outputs/*", Strategy::ClearParent)).unwrap();
        assert_eq!(out[0].common_path, vec![Key::from("cells"), Key::from(0)]);
        assert_eq!(out[0].action, Action::Clear);
        assert!(!out[0].conflict);
        let merged = crate::merge::apply_decisions(&base, &out).unwrap();
        assert_eq!(merged, json!({"cells": [{"outputs": [], "source": "x"}]}));
    }

    #[test]
    fn clear_parent_of_mapping_keys() {
        let base = json!({"meta": {"a": 1, "b": 2}, "l": [{"k": 1}]});
        let dec = conflict(&["meta"], vec![replace("a", json!(2))], vec![replace("a", json!(3))]);
        let out = autoresolve(&base, vec![dec], &with("/meta/a", Strategy::ClearParent)).unwrap();
        assert_eq!(out[0].custom_diff, vec![replace("meta", json!({}))]);
        assert_eq!(crate::merge::apply_decisions(&base, &out).unwrap()["meta"], json!({}));

        let path = vec![Key::from("l"), Key::from(0)];
        let dec = MergeDecision::conflicted(path, Action::Local, vec![replace("k", json!(2))], vec![replace("k", json!(3))]);
        let out = autoresolve(&base, vec![dec], &with("/l/*/k", Strategy::ClearParent)).unwrap();
        assert_eq!(out[0].common_path, vec![Key::from("l")]);
        assert_eq!(crate::merge::apply_decisions(&base, &out).unwrap()["l"], json!([{}]));

        // nothing holds the root
        let dec = conflict(&[], vec![replace("b", json!(5))], vec![replace("b", json!(6))]);
        let out = autoresolve(&base, vec![dec.clone()], &with("/b", Strategy::ClearParent)).unwrap();
        assert_eq!(out, vec![dec]);
    }

    #[test]
    fn record_conflict_stores_sides() {
        let base = json!({"metadata": {"k": 1}});
        let local = vec![replace("metadata", json!({"k": 2}))];
        let remote = vec![replace("metadata", json!({"k": 3}))];
        let dec = conflict(&[], local, remote);
        let out = autoresolve(&base, vec![dec], &with("/metadata", Strategy::RecordConflict)).unwrap();
        let merged = crate::merge::apply_decisions(&base, &out).unwrap();
        assert_eq!(merged["metadata"]["k"], json!(1));
        assert_eq!(merged["metadata"][CONFLICTS_KEY]["local"]["value"], json!({"k": 2}));
    }
}
