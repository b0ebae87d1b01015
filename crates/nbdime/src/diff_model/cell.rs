//! Diff model for one notebook cell.

use serde_json::Value;

use nbdime_path::Key;

use crate::diff_format::DiffEntry;
use crate::error::{ModelError, PatchError};
use crate::notebook::{cells, CellType};
use crate::patch::{get_diff_entry_by_key, get_sub_diff_by_key};

use super::immutable::ImmutableDiffModel;
use super::output::{make_output_models, OutputDiffModel};
use super::string::TextDiffModel;
use super::{set_mimetype_from_cell_type, FieldDiffModel};

pub const METADATA_HEADER: &str = "Metadata changed";

/// Field models of one cell, seen from one side.
///
/// `outputs` and `execution_count` are present exactly for code cells.
#[derive(Debug, Clone, PartialEq)]
pub struct CellDiffModel {
    pub source: TextDiffModel,
    pub metadata: TextDiffModel,
    pub outputs: Option<Vec<OutputDiffModel>>,
    pub execution_count: Option<ImmutableDiffModel>,
    pub cell_type: CellType,
}

fn field<'a>(cell: &'a Value, name: &str) -> Option<&'a Value> {
    cell.get(name)
}

fn outputs_of(cell: &Value) -> Option<&[Value]> {
    field(cell, "outputs").and_then(Value::as_array).map(Vec::as_slice)
}

impl CellDiffModel {
    /// Assemble a cell model, checking the code cell invariant.
    pub fn new(
        source: TextDiffModel,
        mut metadata: TextDiffModel,
        outputs: Option<Vec<OutputDiffModel>>,
        execution_count: Option<ImmutableDiffModel>,
        cell_type: CellType,
    ) -> Result<Self, ModelError> {
        match (cell_type, outputs.is_some(), execution_count.is_some()) {
            (CellType::Code, false, _) => {
                return Err(ModelError::InvalidCell("code cell is missing outputs".to_string()));
            }
            (CellType::Markdown | CellType::Raw, true, _) | (CellType::Markdown | CellType::Raw, _, true) => {
                return Err(ModelError::InvalidCell(format!("{cell_type} cell cannot carry outputs")));
            }
            _ => {}
        }
        metadata.hints.collapsible = true;
        metadata.hints.collapsible_header = METADATA_HEADER.to_string();
        metadata.hints.start_collapsed = true;
        Ok(CellDiffModel { source, metadata, outputs, execution_count, cell_type })
    }

    /// `base` patched by a cell diff. Fields without entries are unchanged.
    pub fn create_patched(base: &Value, diff: Option<&[DiffEntry]>, nb_mimetype: &str) -> Result<Self, ModelError> {
        let diff = diff.unwrap_or(&[]);
        let cell_type = CellType::of(base)?;
        let source_base = required(base, "source")?;
        let mut source = match get_sub_diff_by_key(diff, &Key::from("source")) {
            Some(sub) => TextDiffModel::patched(source_base, sub)?,
            None => TextDiffModel::direct(Some(source_base), Some(source_base)),
        };
        set_mimetype_from_cell_type(&mut source, cell_type, nb_mimetype);

        let metadata_base = required(base, "metadata")?;
        let metadata = match get_sub_diff_by_key(diff, &Key::from("metadata")) {
            Some(sub) => TextDiffModel::patched(metadata_base, sub)?,
            None => TextDiffModel::direct(Some(metadata_base), Some(metadata_base)),
        };

        let (outputs, execution_count) = if cell_type == CellType::Code {
            let outputs_base = outputs_of(base);
            let outputs = match (outputs_base, get_sub_diff_by_key(diff, &Key::from("outputs"))) {
                (None, _) => None,
                (Some(b), Some(sub)) => Some(make_output_models(Some(b), None, Some(sub))?),
                (Some(b), None) => Some(make_output_models(Some(b), Some(b), None)?),
            };
            let exec_base = field(base, "execution_count");
            let exec_entry = get_diff_entry_by_key(diff, &Key::from("execution_count"));
            (outputs, Some(ImmutableDiffModel::create(exec_base, exec_base, exec_entry)?))
        } else {
            (None, None)
        };
        Self::new(source, metadata, outputs, execution_count, cell_type)
    }

    /// `base` compared with itself.
    pub fn create_unchanged(base: &Value, nb_mimetype: &str) -> Result<Self, ModelError> {
        Self::create_patched(base, None, nb_mimetype)
    }

    /// A cell present only on the remote side.
    pub fn create_added(remote: &Value, nb_mimetype: &str) -> Result<Self, ModelError> {
        let cell_type = CellType::of(remote)?;
        let mut source = TextDiffModel::direct(None, Some(required(remote, "source")?));
        set_mimetype_from_cell_type(&mut source, cell_type, nb_mimetype);
        let metadata = TextDiffModel::direct(None, Some(required(remote, "metadata")?));
        let (outputs, execution_count) = if cell_type == CellType::Code {
            let outputs = match outputs_of(remote) {
                Some(o) => Some(make_output_models(None, Some(o), None)?),
                None => None,
            };
            (outputs, Some(ImmutableDiffModel::create(None, field(remote, "execution_count"), None)?))
        } else {
            (None, None)
        };
        Self::new(source, metadata, outputs, execution_count, cell_type)
    }

    /// A cell present only on the base side.
    pub fn create_deleted(base: &Value, nb_mimetype: &str) -> Result<Self, ModelError> {
        let cell_type = CellType::of(base)?;
        let mut source = TextDiffModel::direct(Some(required(base, "source")?), None);
        set_mimetype_from_cell_type(&mut source, cell_type, nb_mimetype);
        let metadata = TextDiffModel::direct(Some(required(base, "metadata")?), None);
        let (outputs, execution_count) = if cell_type == CellType::Code {
            let outputs = match outputs_of(base) {
                Some(o) => Some(make_output_models(Some(o), None, None)?),
                None => None,
            };
            (outputs, Some(ImmutableDiffModel::create(field(base, "execution_count"), None, None)?))
        } else {
            (None, None)
        };
        Self::new(source, metadata, outputs, execution_count, cell_type)
    }

    /// True iff every field model is unchanged.
    pub fn unchanged(&self) -> bool {
        self.source.unchanged()
            && self.metadata.unchanged()
            && self.outputs.iter().flatten().all(OutputDiffModel::unchanged)
            && self.execution_count.as_ref().map_or(true, ImmutableDiffModel::unchanged)
    }

    pub fn added(&self) -> bool {
        self.source.added()
    }

    pub fn deleted(&self) -> bool {
        self.source.deleted()
    }

    /// Field model by field name.
    pub fn field(&self, name: &str) -> Result<FieldDiffModel<'_>, ModelError> {
        match name {
            "source" => Ok(FieldDiffModel::Text(&self.source)),
            "metadata" => Ok(FieldDiffModel::Text(&self.metadata)),
            "outputs" => match &self.outputs {
                Some(outputs) => Ok(FieldDiffModel::Outputs(outputs)),
                None => Err(ModelError::UnrecognizedModel(format!("{} cell has no outputs", self.cell_type))),
            },
            "execution_count" => match &self.execution_count {
                Some(ec) => Ok(FieldDiffModel::Immutable(ec)),
                None => Err(ModelError::UnrecognizedModel(format!("{} cell has no execution count", self.cell_type))),
            },
            other => Err(ModelError::UnrecognizedModel(format!("no diff model for cell field {other:?}"))),
        }
    }

    /// All present field models, in display order.
    pub fn fields(&self) -> Vec<(&'static str, FieldDiffModel<'_>)> {
        let mut out = vec![("source", FieldDiffModel::Text(&self.source)), ("metadata", FieldDiffModel::Text(&self.metadata))];
        if let Some(outputs) = &self.outputs {
            out.push(("outputs", FieldDiffModel::Outputs(outputs)));
        }
        if let Some(ec) = &self.execution_count {
            out.push(("execution_count", FieldDiffModel::Immutable(ec)));
        }
        out
    }
}

fn required<'a>(cell: &'a Value, name: &str) -> Result<&'a Value, ModelError> {
    field(cell, name).ok_or_else(|| ModelError::InvalidCell(format!("cell is missing {name:?}")))
}

/// Cell models for a notebook diff view, in document order.
///
/// Cells untouched by the diff are unchanged, inserted cells added, removed
/// cells deleted and patched cells patched.
pub fn build_diff_models(base_nb: &Value, diff: Option<&[DiffEntry]>, nb_mimetype: &str) -> Result<Vec<CellDiffModel>, ModelError> {
    let base_cells = cells(base_nb).ok_or_else(|| ModelError::InvalidCell("notebook has no cells".to_string()))?;
    let cells_diff = get_sub_diff_by_key(diff.unwrap_or(&[]), &Key::from("cells")).unwrap_or(&[]);
    let mut models = Vec::with_capacity(base_cells.len());
    let mut take = 0usize;
    for entry in cells_diff {
        let (key, end) = match entry.base_range() {
            Some((key, end)) if key >= take && end <= base_cells.len() => (key, end),
            _ => {
                return Err(PatchError::mismatch(&[Key::from("cells")], format!("bad {} in cells diff", entry.op_name())).into());
            }
        };
        for cell in &base_cells[take..key] {
            models.push(CellDiffModel::create_unchanged(cell, nb_mimetype)?);
        }
        take = key;
        match entry {
            DiffEntry::AddRange { values, .. } => {
                for cell in values {
                    models.push(CellDiffModel::create_added(cell, nb_mimetype)?);
                }
            }
            DiffEntry::RemoveRange { .. } => {
                for cell in &base_cells[key..end] {
                    models.push(CellDiffModel::create_deleted(cell, nb_mimetype)?);
                }
                take = end;
            }
            DiffEntry::Patch { diff, .. } => {
                models.push(CellDiffModel::create_patched(&base_cells[key], Some(diff.as_slice()), nb_mimetype)?);
                take = end;
            }
            other => {
                return Err(PatchError::mismatch(&[Key::from("cells")], format!("{} on cells", other.op_name())).into());
            }
        }
    }
    for cell in &base_cells[take..] {
        models.push(CellDiffModel::create_unchanged(cell, nb_mimetype)?);
    }
    Ok(models)
}
