use serde::{Deserialize, Serialize};

use crate::model::*;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CellOutput {
    pub output_type: String,
    #[serde(default)]
    pub text: String,
}

impl CellOutput {
    pub fn new(output_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self { output_type: output_type.into(), text: text.into() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CellExecutionResult {
    pub cell_index: usize,
    #[serde(default = "default_cell_type")]
    pub cell_type: String,
    pub status: CellStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_count: Option<u32>,
    #[serde(default)]
    pub outputs: Vec<CellOutput>,
}

pub fn default_cell_type() -> String {
    "code".to_string()
}

impl CellExecutionResult {
    /// Placeholder for a cell whose record was lost or unreadable.
    pub fn unknown(cell_index: usize, error: Option<String>) -> Self {
        Self { cell_index, cell_type: default_cell_type(), status: CellStatus::Unknown, error, execution_count: None, outputs: Vec::new() }
    }
}

/// Parsed execution of one notebook run. Produced only by the log parser.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotebookExecutionResult {
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_path: Option<String>,
    #[serde(default)]
    pub cells: Vec<CellExecutionResult>,
    /// Failure text recovered from the logs when the executor died before reporting cells.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotebookExecutionResult {
    pub fn count(&self, status: CellStatus) -> usize {
        self.cells.iter().filter(|c| c.status == status).count()
    }

    pub fn cell(&self, index: usize) -> Option<&CellExecutionResult> {
        self.cells.iter().find(|c| c.cell_index == index)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GoldenCell {
    pub cell_index: usize,
    #[serde(default = "default_cell_type")]
    pub cell_type: String,
    #[serde(default)]
    pub outputs: Vec<CellOutput>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GoldenNotebook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_path: Option<String>,
    pub cells: Vec<GoldenCell>,
}

impl GoldenNotebook {
    /// Treats a successful execution as its own golden reference.
    pub fn from_execution(result: &NotebookExecutionResult) -> Self {
        Self {
            notebook_path: result.notebook_path.clone(),
            cells: result
                .cells
                .iter()
                .map(|c| GoldenCell { cell_index: c.cell_index, cell_type: c.cell_type.clone(), outputs: c.outputs.clone() })
                .collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Matched,
    Mismatched,
    /// Present in golden, absent from the run.
    Missing,
    /// The cell itself failed or its record was unreadable.
    NotExecuted,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CellVerdict {
    pub cell_index: usize,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl CellVerdict {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Matched
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformCheck {
    pub platform: ServingPlatform,
    pub passed: bool,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub passed: bool,
    pub matched: usize,
    pub mismatched: usize,
    pub missing: usize,
    #[serde(default)]
    pub cells: Vec<CellVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformCheck>,
    pub summary: String,
}

impl ValidationOutcome {
    /// Folds a serving check into an existing outcome; a failing check fails the whole outcome.
    pub fn with_platform(mut self, check: PlatformCheck) -> Self {
        if !check.passed {
            self.passed = false;
            self.summary = format!("{}; {} check failed: {}", self.summary, check.platform, check.detail);
        }
        self.platform = Some(check);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_defaults_when_fields_absent() {
        let c: CellExecutionResult = serde_json::from_str(r#"{"cellIndex":3,"status":"failed"}"#).unwrap();
        assert_eq!(c.cell_type, "code");
        assert_eq!(c.status, CellStatus::Failed);
        assert!(c.outputs.is_empty());
    }

    #[test]
    fn failing_platform_check_fails_outcome() {
        let o = ValidationOutcome { passed: true, matched: 2, mismatched: 0, missing: 0, cells: vec![], platform: None, summary: "2/2 cells matched".into() };
        let o = o.with_platform(PlatformCheck { platform: ServingPlatform::KServe, passed: false, detail: "prediction 0 differs".into() });
        assert!(!o.passed);
        assert!(o.summary.contains("kserve check failed"));
    }
}
