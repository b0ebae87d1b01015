//! Notebook shape helpers.

use std::fmt;

use serde_json::Value;

use crate::error::ModelError;

pub const MARKDOWN_MIMETYPE: &str = "text/markdown";
pub const PLAIN_MIMETYPE: &str = "text/plain";
pub const JSON_MIMETYPE: &str = "application/json";

/// Kind of a notebook cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    Code,
    Markdown,
    Raw,
}

impl CellType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellType::Code => "code",
            CellType::Markdown => "markdown",
            CellType::Raw => "raw",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ModelError> {
        match s {
            "code" => Ok(CellType::Code),
            "markdown" => Ok(CellType::Markdown),
            "raw" => Ok(CellType::Raw),
            other => Err(ModelError::InvalidCell(format!("unknown cell type {other:?}"))),
        }
    }

    /// Cell type of a cell value.
    pub fn of(cell: &Value) -> Result<Self, ModelError> {
        match cell.get("cell_type").and_then(Value::as_str) {
            Some(s) => Self::parse(s),
            None => Err(ModelError::InvalidCell("missing cell_type".to_string())),
        }
    }

    /// Display mimetype for the source of a cell of this type.
    ///
    /// ```
    /// use nbdime::CellType;
    ///
    /// assert_eq!(CellType::Code.mimetype("text/x-rsrc"), "text/x-rsrc");
    /// assert_eq!(CellType::Markdown.mimetype("text/x-rsrc"), "text/markdown");
    /// assert_eq!(CellType::Raw.mimetype("text/x-rsrc"), "text/plain");
    /// ```
    pub fn mimetype<'a>(&self, notebook_mimetype: &'a str) -> &'a str {
        match self {
            CellType::Code => notebook_mimetype,
            CellType::Markdown => MARKDOWN_MIMETYPE,
            CellType::Raw => PLAIN_MIMETYPE,
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The code mimetype declared by a notebook, or `fallback`.
///
/// Reads `metadata.language_info.mimetype`.
pub fn notebook_mimetype<'a>(nb: &'a Value, fallback: &'a str) -> &'a str {
    nb.pointer("/metadata/language_info/mimetype")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
}

/// Text of a source-like value: strings as is, nbformat multiline lists
/// joined.
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) if parts.iter().all(Value::is_string) => {
            Some(parts.iter().filter_map(Value::as_str).collect())
        }
        _ => None,
    }
}

/// The cells of a notebook.
pub fn cells(nb: &Value) -> Option<&Vec<Value>> {
    nb.get("cells").and_then(Value::as_array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_cell_types() {
        assert_eq!(CellType::of(&json!({"cell_type": "code"})).unwrap(), CellType::Code);
        assert!(matches!(CellType::of(&json!({"cell_type": "heading"})), Err(ModelError::InvalidCell(_))));
        assert!(CellType::of(&json!({})).is_err());
    }

    #[test]
    fn notebook_mimetype_from_language_info() {
        let nb = json!({"metadata": {"language_info": {"mimetype": "text/x-julia"}}});
        assert_eq!(notebook_mimetype(&nb, "text/x-python"), "text/x-julia");
        assert_eq!(notebook_mimetype(&json!({}), "text/x-python"), "text/x-python");
    }

    #[test]
    fn multiline_text() {
        assert_eq!(text_of(&json!(["a\n", "b"])).as_deref(), Some("a\nb"));
        assert_eq!(text_of(&json!("x")).as_deref(), Some("x"));
        assert_eq!(text_of(&json!({"a": 1})), None);
    }
}
