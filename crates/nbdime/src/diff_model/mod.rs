//! Diff models: base and remote values of a field plus classification.
//!
//! Models are built once and never change, apart from the
//! [`PresentationHints`] a renderer may read or adjust.

pub mod cell;
pub mod immutable;
pub mod output;
pub mod string;

pub use cell::{build_diff_models, CellDiffModel};
pub use immutable::ImmutableDiffModel;
pub use output::{make_output_models, OutputDiffModel};
pub use string::{DiffRange, PresentationHints, TextDiffModel};

use crate::notebook::CellType;

/// A field model of any kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDiffModel<'a> {
    Text(&'a TextDiffModel),
    Immutable(&'a ImmutableDiffModel),
    Outputs(&'a [OutputDiffModel]),
}

impl FieldDiffModel<'_> {
    pub fn unchanged(&self) -> bool {
        match self {
            FieldDiffModel::Text(m) => m.unchanged(),
            FieldDiffModel::Immutable(m) => m.unchanged(),
            FieldDiffModel::Outputs(ms) => ms.iter().all(OutputDiffModel::unchanged),
        }
    }

    /// For output lists: every output was added (and there is at least one).
    pub fn added(&self) -> bool {
        match self {
            FieldDiffModel::Text(m) => m.added(),
            FieldDiffModel::Immutable(m) => m.added(),
            FieldDiffModel::Outputs(ms) => !ms.is_empty() && ms.iter().all(OutputDiffModel::added),
        }
    }

    pub fn deleted(&self) -> bool {
        match self {
            FieldDiffModel::Text(m) => m.deleted(),
            FieldDiffModel::Immutable(m) => m.deleted(),
            FieldDiffModel::Outputs(ms) => !ms.is_empty() && ms.iter().all(OutputDiffModel::deleted),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FieldDiffModel::Text(_) => "text",
            FieldDiffModel::Immutable(_) => "immutable",
            FieldDiffModel::Outputs(_) => "outputs",
        }
    }
}

/// Set the source model's mimetype from the cell type.
pub fn set_mimetype_from_cell_type(model: &mut TextDiffModel, cell_type: CellType, nb_mimetype: &str) {
    model.set_mimetype(cell_type.mimetype(nb_mimetype));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mimetype_derivation_is_total() {
        let v = json!("x");
        for (cell_type, expected) in
            [(CellType::Code, "text/x-python"), (CellType::Markdown, "text/markdown"), (CellType::Raw, "text/plain")]
        {
            let mut model = TextDiffModel::direct(Some(&v), Some(&v));
            set_mimetype_from_cell_type(&mut model, cell_type, "text/x-python");
            assert_eq!(model.mimetype(), expected);
            assert!(model.unchanged());
        }
    }

    #[test]
    fn output_list_flags() {
        let o = json!({"output_type": "stream", "name": "stdout", "text": "a"});
        let added = vec![OutputDiffModel::new(None, Some(&o), None).unwrap()];
        let field = FieldDiffModel::Outputs(&added);
        assert!(field.added() && !field.deleted() && !field.unchanged());
        assert!(FieldDiffModel::Outputs(&[]).unchanged());
        assert_eq!(field.kind(), "outputs");
    }
}
