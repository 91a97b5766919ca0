//! Records the validation pod prints. Field names are snake_case on the wire; the camelCase
//! spellings are accepted too so status documents can be fed back in.

use nbv_core::{CellExecutionResult, CellOutput, CellStatus, GoldenCell};
use serde::Deserialize;
use serde_json::Value;

pub const CELL_PREFIX: &str = "NBV_CELL ";
pub const RESULT_PREFIX: &str = "NBV_RESULT ";
pub const LEGACY_RESULTS_MARKER: &str = "Results Summary:";
pub const GOLDEN_MARKER: &str = "Golden Notebook Summary:";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TextValue {
    One(String),
    Lines(Vec<String>),
}

impl TextValue {
    fn joined(self) -> String {
        match self {
            TextValue::One(s) => s,
            TextValue::Lines(lines) => lines.concat(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireOutput {
    #[serde(default, alias = "outputType")]
    pub output_type: Option<String>,
    #[serde(default)]
    pub text: Option<TextValue>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub ename: Option<String>,
    #[serde(default)]
    pub evalue: Option<String>,
}

impl WireOutput {
    pub fn into_output(self) -> CellOutput {
        let output_type = self.output_type.unwrap_or_else(|| "stream".to_string());
        let text = match (self.text, &self.data, &self.ename) {
            (Some(text), _, _) => text.joined(),
            (None, Some(data), _) => match data.get("text/plain") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Array(lines)) => lines.iter().filter_map(Value::as_str).collect(),
                _ => String::new(),
            },
            (None, None, Some(ename)) => format!("{ename}: {}", self.evalue.unwrap_or_default()),
            _ => String::new(),
        };
        CellOutput { output_type, text }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireCell {
    #[serde(alias = "cellIndex")]
    pub cell_index: Option<usize>,
    #[serde(default, alias = "cellType")]
    pub cell_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, alias = "executionCount")]
    pub execution_count: Option<u32>,
    #[serde(default)]
    pub outputs: Vec<WireOutput>,
}

fn cell_status(status: Option<&str>, cell_type: &str) -> CellStatus {
    match status.map(str::to_ascii_lowercase).as_deref() {
        Some("succeeded" | "success" | "ok" | "passed") => CellStatus::Succeeded,
        Some("failed" | "failure" | "error") => CellStatus::Failed,
        Some("skipped") => CellStatus::Skipped,
        Some(_) => CellStatus::Unknown,
        None if cell_type != "code" => CellStatus::Skipped,
        None => CellStatus::Unknown,
    }
}

impl WireCell {
    pub fn into_result(self, fallback_index: usize) -> CellExecutionResult {
        let cell_type = self.cell_type.unwrap_or_else(nbv_core::default_cell_type);
        CellExecutionResult {
            cell_index: self.cell_index.unwrap_or(fallback_index),
            status: cell_status(self.status.as_deref(), &cell_type),
            cell_type,
            error: self.error.filter(|e| !e.is_empty()),
            execution_count: self.execution_count,
            outputs: self.outputs.into_iter().map(WireOutput::into_output).collect(),
        }
    }

    pub fn into_golden(self, fallback_index: usize) -> GoldenCell {
        GoldenCell {
            cell_index: self.cell_index.unwrap_or(fallback_index),
            cell_type: self.cell_type.unwrap_or_else(nbv_core::default_cell_type),
            outputs: self.outputs.into_iter().map(WireOutput::into_output).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WireSummary {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "exitCode")]
    pub exit_code: Option<i32>,
    #[serde(default, alias = "notebookPath")]
    pub notebook_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Present only in the legacy single-document summary. Kept raw so one bad cell does not
    /// sink the rest.
    #[serde(default)]
    pub cells: Option<Vec<Value>>,
}

impl WireSummary {
    pub fn reports_failure(&self) -> bool {
        matches!(self.status.as_deref().map(str::to_ascii_lowercase).as_deref(), Some("failed" | "failure" | "error"))
            || self.exit_code.is_some_and(|c| c != 0)
    }
}

#[derive(Debug, Deserialize)]
pub struct WireGolden {
    #[serde(default, alias = "notebookPath")]
    pub notebook_path: Option<String>,
    #[serde(default)]
    pub cells: Vec<Value>,
}
