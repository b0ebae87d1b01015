use nbdime::merge::{merge_notebooks, Action, CellMergeKind, CellOrigin, MergeConfig, MergeDecision, MergeSession, Side};
use nbdime::{Diff, DiffEntry};
use nbdime_path::{is_prefix, Key};
use serde_json::{json, Value};

fn code(source: &str, execution_count: Value) -> Value {
    json!({
        "cell_type": "code",
        "execution_count": execution_count,
        "metadata": {},
        "outputs": [],
        "source": source,
    })
}

fn markdown(source: &str) -> Value {
    json!({"cell_type": "markdown", "metadata": {}, "source": source})
}

fn notebook(cells: Vec<Value>) -> Value {
    json!({"cells": cells, "metadata": {}, "nbformat": 4, "nbformat_minor": 5})
}

fn patch(key: impl Into<Key>, diff: Diff) -> DiffEntry {
    DiffEntry::Patch { key: key.into(), diff }
}

/// A diff patching field `field` of cell `cell`.
fn cell_patch(cell: usize, field: &str, diff: Diff) -> Diff {
    vec![patch("cells", vec![patch(cell, vec![patch(field, diff)])])]
}

/// Replace whole line `line` of a text.
fn swap_line(line: usize, text: &str) -> Diff {
    vec![
        DiffEntry::AddRange { key: line, values: vec![json!(text)] },
        DiffEntry::RemoveRange { key: line, length: 1 },
    ]
}

/// No decision addresses something a decision above it also changes.
fn assert_disjoint(decisions: &[MergeDecision]) {
    for outer in decisions {
        for inner in decisions {
            let depth = outer.common_path.len();
            if inner.common_path.len() == depth || !is_prefix(&outer.common_path, &inner.common_path) {
                continue;
            }
            let below = &inner.common_path[depth];
            for diff in [&outer.local_diff, &outer.remote_diff, &outer.custom_diff] {
                assert!(
                    !diff.iter().any(|e| !e.is_insert() && &e.key() == below),
                    "{:?} overlaps {:?}",
                    outer.common_path,
                    inner.common_path
                );
            }
        }
    }
}

#[test]
fn source_edit_and_new_output_merge_cleanly() {
    let base = notebook(vec![code("x=1", json!(1))]);
    let local = cell_patch(0, "source", swap_line(0, "x=2"));
    let output = json!({"output_type": "stream", "name": "stdout", "text": "2"});
    let remote = cell_patch(0, "outputs", vec![DiffEntry::AddRange { key: 0, values: vec![output.clone()] }]);

    let merge = merge_notebooks(&base, &local, &remote, &MergeConfig::notebook()).unwrap();
    assert!(!merge.has_conflicts());
    assert_eq!(merge.decisions.len(), 1);
    assert_eq!(merge.decisions[0].action, Action::Custom);

    let cell = &merge.merged["cells"][0];
    assert_eq!(cell["source"], json!("x=2"));
    assert_eq!(cell["outputs"], json!([output]));
    assert_eq!(cell["execution_count"], json!(1));
}

#[test]
fn execution_count_cleared_when_both_edit_source() {
    let base = notebook(vec![code("a\nb\n", json!(3))]);
    let local = cell_patch(0, "source", swap_line(0, "A\n"));
    let mut remote = cell_patch(0, "source", swap_line(1, "B\n"));
    if let DiffEntry::Patch { diff: cells, .. } = &mut remote[0] {
        if let DiffEntry::Patch { diff: cell, .. } = &mut cells[0] {
            cell.insert(0, DiffEntry::Replace { key: Key::from("execution_count"), value: json!(4) });
        }
    }

    let merge = merge_notebooks(&base, &local, &remote, &MergeConfig::notebook()).unwrap();
    assert!(!merge.has_conflicts());
    let cell = &merge.merged["cells"][0];
    assert_eq!(cell["source"], json!("A\nB\n"));
    assert_eq!(cell["execution_count"], Value::Null);

    let session = MergeSession::from_diffs(base, &local, &remote, MergeConfig::notebook()).unwrap();
    let decision = session.cells()[0].execution_count_decision(session.decisions()).unwrap();
    assert_eq!(decision.action, Action::Clear);
    assert_eq!(session.serialize().unwrap()["cells"][0]["execution_count"], Value::Null);
}

#[test]
fn one_sided_source_edit_keeps_execution_count() {
    let base = notebook(vec![code("a\n", json!(3))]);
    let local = cell_patch(0, "source", swap_line(0, "b\n"));
    let merge = merge_notebooks(&base, &local, &[], &MergeConfig::notebook()).unwrap();
    assert_eq!(merge.merged["cells"][0]["execution_count"], json!(3));
    assert_eq!(merge.decisions.len(), 1);
    assert_eq!(merge.decisions[0].action, Action::Local);
}

#[test]
fn inserts_at_both_ends_merge_cleanly() {
    let base = notebook(vec![markdown("a"), markdown("b"), markdown("c")]);
    let local = vec![patch("cells", vec![DiffEntry::AddRange { key: 0, values: vec![markdown("first")] }])];
    let remote = vec![patch("cells", vec![DiffEntry::AddRange { key: 3, values: vec![markdown("last")] }])];

    let merge = merge_notebooks(&base, &local, &remote, &MergeConfig::notebook()).unwrap();
    assert!(!merge.has_conflicts());
    let sources: Vec<&Value> = merge.merged["cells"].as_array().unwrap().iter().map(|c| &c["source"]).collect();
    assert_eq!(sources, [&json!("first"), &json!("a"), &json!("b"), &json!("c"), &json!("last")]);

    let session = MergeSession::from_diffs(base, &local, &remote, MergeConfig::notebook()).unwrap();
    let cells = session.cells();
    assert_eq!(cells.len(), 5);
    assert_eq!(cells[0].origin, CellOrigin::Inserted { at: 0, ordinal: 0 });
    assert_eq!(cells[0].classify(), CellMergeKind::Added(Side::Local));
    assert_eq!(cells[4].origin, CellOrigin::Inserted { at: 3, ordinal: 0 });
    assert_eq!(cells[4].classify(), CellMergeKind::Added(Side::Remote));
    assert_eq!(cells[2].classify(), CellMergeKind::Unchanged);
    assert_eq!(session.serialize().unwrap(), merge.merged);
}

#[test]
fn conflicting_metadata_value() {
    let base = json!({"cells": [], "metadata": {}, "k": "x"});
    let local = vec![DiffEntry::Replace { key: Key::from("k"), value: json!("A") }];
    let remote = vec![DiffEntry::Replace { key: Key::from("k"), value: json!("B") }];

    let merge = merge_notebooks(&base, &local, &remote, &MergeConfig::notebook()).unwrap();
    let conflicts = merge.conflicts();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].local_diff, local);
    assert_eq!(conflicts[0].remote_diff, remote);
    assert_eq!(merge.merged["k"], json!("A"));
}

#[test]
fn conflicting_outputs_are_inlined() {
    let base = notebook(vec![code("x\n", json!(1))]);
    let stdout = |text: &str| json!({"output_type": "stream", "name": "stdout", "text": text});
    let local = cell_patch(0, "outputs", vec![DiffEntry::AddRange { key: 0, values: vec![stdout("l")] }]);
    let remote = cell_patch(0, "outputs", vec![DiffEntry::AddRange { key: 0, values: vec![stdout("r")] }]);

    let merge = merge_notebooks(&base, &local, &remote, &MergeConfig::notebook()).unwrap();
    let conflicts = merge.conflicts();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].action, Action::Custom);
    let outputs = merge.merged["cells"][0]["outputs"].as_array().unwrap();
    assert_eq!(outputs.len(), 6);
    assert_eq!(outputs[0]["text"], json!("<<<<<<< local\n"));
    assert_eq!(outputs[1], stdout("l"));
    assert_eq!(outputs[4], stdout("r"));
    assert_eq!(merge.merged["cells"][0]["execution_count"], json!(1));
}

#[test]
fn notebook_metadata_conflicts_use_base() {
    let base = json!({"cells": [], "metadata": {"kernel": "py3"}});
    let local = vec![patch("metadata", vec![DiffEntry::Replace { key: Key::from("kernel"), value: json!("py2") }])];
    let remote = vec![patch("metadata", vec![DiffEntry::Replace { key: Key::from("kernel"), value: json!("julia") }])];

    let merge = merge_notebooks(&base, &local, &remote, &MergeConfig::notebook()).unwrap();
    assert!(!merge.has_conflicts());
    assert_eq!(merge.merged["metadata"], json!({"kernel": "py3"}));
}

#[test]
fn resolving_a_source_conflict() {
    let base = notebook(vec![code("a\n", Value::Null), markdown("text")]);
    let local = cell_patch(0, "source", swap_line(0, "b\n"));
    let remote = cell_patch(0, "source", swap_line(0, "c\n"));

    let mut session = MergeSession::from_diffs(base, &local, &remote, MergeConfig::notebook()).unwrap();
    let conflicts = session.conflicts();
    assert_eq!(conflicts.len(), 1);
    let path = conflicts[0].common_path.clone();
    assert_eq!(path, vec![Key::from("cells"), Key::from(0), Key::from("source")]);
    assert_eq!(session.cells()[0].merged_cell["source"], json!("b\n"));
    assert_eq!(session.cells()[0].classify(), CellMergeKind::Modified);

    let index = session.decisions().iter().position(|d| d.conflict).unwrap();
    session.resolve(index, Action::Remote).unwrap();
    assert!(session.conflicts().is_empty());
    let merged = session.serialize().unwrap();
    assert_eq!(merged["cells"][0]["source"], json!("c\n"));
    assert_eq!(merged["cells"][1], markdown("text"));

    let submission = session.submission().unwrap();
    assert!(submission.conflicts.is_empty());
    assert_eq!(submission.merged, merged);
}

#[test]
fn custom_resolution_is_validated() {
    let base = notebook(vec![code("a\n", Value::Null)]);
    let local = cell_patch(0, "source", swap_line(0, "b\n"));
    let remote = cell_patch(0, "source", swap_line(0, "c\n"));
    let mut session = MergeSession::from_diffs(base, &local, &remote, MergeConfig::notebook()).unwrap();
    let index = session.decisions().iter().position(|d| d.conflict).unwrap();

    let bad = vec![DiffEntry::RemoveRange { key: 0, length: 0 }];
    assert!(session.resolve_custom(index, bad).is_err());
    assert_eq!(session.conflicts().len(), 1);

    session.resolve_custom(index, swap_line(0, "d\n")).unwrap();
    assert!(session.conflicts().is_empty());
    assert_eq!(session.serialize().unwrap()["cells"][0]["source"], json!("d\n"));
}

#[test]
fn deleting_a_cell_by_hand() {
    let base = notebook(vec![markdown("a"), markdown("b"), markdown("c")]);
    let mut session = MergeSession::from_diffs(base, &[], &[], MergeConfig::notebook()).unwrap();
    assert!(session.decisions().is_empty());
    assert_eq!(session.cells().len(), 3);

    session.set_delete_cell(1, true).unwrap();
    assert_eq!(session.serialize().unwrap()["cells"], json!([markdown("a"), markdown("c")]));
    assert!(session.set_delete_cell(7, true).is_err());

    session.set_delete_cell(1, false).unwrap();
    assert_eq!(session.serialize().unwrap()["cells"].as_array().unwrap().len(), 3);
}

#[test]
fn decisions_are_disjoint() {
    let base = notebook(vec![code("a\nb\n", json!(1)), markdown("m"), code("c\n", json!(2))]);
    let mut local_cells = vec![
        DiffEntry::AddRange { key: 0, values: vec![markdown("new")] },
        patch(0, vec![patch("source", swap_line(0, "A\n"))]),
        DiffEntry::RemoveRange { key: 1, length: 1 },
    ];
    local_cells.push(patch(2, vec![DiffEntry::Replace { key: Key::from("execution_count"), value: json!(5) }]));
    let local = vec![patch("cells", local_cells)];
    let remote = vec![
        patch(
            "cells",
            vec![
                patch(0, vec![patch("source", swap_line(1, "B\n"))]),
                patch(2, vec![patch("source", swap_line(0, "C\n"))]),
            ],
        ),
        patch("metadata", vec![DiffEntry::Add { key: "tag".to_string(), value: json!(1) }]),
    ];

    let merge = merge_notebooks(&base, &local, &remote, &MergeConfig::notebook()).unwrap();
    assert_disjoint(&merge.decisions);
    assert!(!merge.has_conflicts());
    let cells = merge.merged["cells"].as_array().unwrap();
    assert_eq!(cells.len(), 3);
    assert_eq!(cells[0], markdown("new"));
    assert_eq!(cells[1]["source"], json!("A\nB\n"));
    assert_eq!(cells[2]["source"], json!("C\n"));
    assert_eq!(cells[2]["execution_count"], json!(5));

    let session = MergeSession::from_diffs(base, &local, &remote, MergeConfig::notebook()).unwrap();
    assert_disjoint(session.decisions());
    assert_eq!(session.serialize().unwrap()["cells"], merge.merged["cells"]);
}
