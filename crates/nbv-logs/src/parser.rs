use std::collections::BTreeMap;
use std::sync::OnceLock;

use nbv_core::{CellExecutionResult, CellStatus, ExecutionStatus, GoldenNotebook, NotebookExecutionResult, OperationError};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::wire::*;

const ERROR_PATTERNS: [&str; 6] = ["ERROR:", "Error:", "FAILED:", "Failed:", "Exception:", "Traceback"];
const MAX_ERROR_LINES: usize = 5;
pub const GENERIC_FAILURE: &str = "Validation failed (see pod logs for details)";

fn index_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""cell_?[iI]ndex"\s*:\s*(\d+)"#).ok()).as_ref()
}

/// First JSON document after the first `{`; whatever follows it is ignored.
fn json_after(text: &str) -> Option<Result<Value, serde_json::Error>> {
    let brace = text.find('{')?;
    serde_json::Deserializer::from_str(&text[brace..]).into_iter::<Value>().next()
}

#[derive(Default)]
struct Collected {
    cells: BTreeMap<usize, CellExecutionResult>,
    well_formed: usize,
    summary: Option<WireSummary>,
    next_index: usize,
}

impl Collected {
    fn good(&mut self, cell: CellExecutionResult) {
        self.well_formed += 1;
        self.next_index = self.next_index.max(cell.cell_index.saturating_add(1));
        self.cells.insert(cell.cell_index, cell);
    }

    fn degraded(&mut self, partial: &str, reason: String) {
        let index = index_pattern()
            .and_then(|re| re.captures(partial))
            .and_then(|c| c[1].parse::<usize>().ok())
            .unwrap_or(self.next_index);
        self.next_index = self.next_index.max(index.saturating_add(1));
        self.cells.entry(index).or_insert_with(|| CellExecutionResult::unknown(index, Some(reason)));
    }

    fn cell_value(&mut self, raw: &str, value: Result<Value, serde_json::Error>) {
        let fallback = self.next_index;
        match value.and_then(serde_json::from_value::<WireCell>) {
            Ok(cell) => self.good(cell.into_result(fallback)),
            Err(e) => self.degraded(raw, format!("unreadable cell record: {e}")),
        }
    }
}

/// Parses the validator container's log into per-cell results.
///
/// Accepts `NBV_CELL`/`NBV_RESULT` line records and the older single `Results Summary:` JSON
/// document. Unreadable cell records become `unknown` cells; the parse only fails when no
/// cell record at all could be read.
pub fn parse_results(logs: &str) -> Result<NotebookExecutionResult, OperationError> {
    let mut collected = Collected::default();

    for line in logs.lines() {
        if let Some(pos) = line.find(CELL_PREFIX) {
            let raw = line[pos + CELL_PREFIX.len()..].trim();
            collected.cell_value(raw, serde_json::from_str(raw));
        } else if let Some(pos) = line.find(RESULT_PREFIX) {
            let raw = line[pos + RESULT_PREFIX.len()..].trim();
            match serde_json::from_str::<WireSummary>(raw) {
                Ok(summary) => collected.summary = Some(summary),
                Err(e) => warn!(error = %e, "unreadable result summary record"),
            }
        }
    }

    if let Some(pos) = logs.find(LEGACY_RESULTS_MARKER) {
        match json_after(&logs[pos + LEGACY_RESULTS_MARKER.len()..]) {
            Some(Ok(doc)) => match serde_json::from_value::<WireSummary>(doc) {
                Ok(mut summary) => {
                    for cell in summary.cells.take().unwrap_or_default() {
                        let raw = cell.to_string();
                        collected.cell_value(&raw, Ok(cell));
                    }
                    collected.summary.get_or_insert(summary);
                }
                Err(e) => warn!(error = %e, "legacy results summary has an unexpected shape"),
            },
            Some(Err(e)) => warn!(error = %e, "legacy results summary is not valid JSON"),
            None => warn!("legacy results marker without a JSON document"),
        }
    }

    if collected.well_formed == 0 {
        return Err(OperationError::ParseError(match collected.cells.len() {
            0 => "no cell records found in validator logs".to_string(),
            n => format!("none of {n} cell records in validator logs could be read"),
        }));
    }

    let cells: Vec<CellExecutionResult> = collected.cells.into_values().collect();
    let summary = collected.summary;
    let any_failed = cells.iter().any(|c| c.status == CellStatus::Failed);
    let any_unknown = cells.iter().any(|c| c.status == CellStatus::Unknown);
    let status = if any_failed || summary.as_ref().is_some_and(WireSummary::reports_failure) {
        ExecutionStatus::Failed
    } else if any_unknown || summary.is_none() {
        ExecutionStatus::Partial
    } else {
        ExecutionStatus::Succeeded
    };
    debug!(cells = cells.len(), ?status, "parsed validator logs");

    let (exit_code, notebook_path, error) = match summary {
        Some(s) => (s.exit_code, s.notebook_path, s.error.filter(|e| !e.is_empty())),
        None => (None, None, None),
    };
    Ok(NotebookExecutionResult { status, exit_code, notebook_path, cells, error })
}

/// Golden notebook block, when the pod printed one. A garbled block is logged and skipped.
pub fn parse_golden(logs: &str) -> Option<GoldenNotebook> {
    let pos = logs.find(GOLDEN_MARKER)?;
    let doc = match json_after(&logs[pos + GOLDEN_MARKER.len()..])? {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "golden notebook summary is not valid JSON");
            return None;
        }
    };
    let golden = match serde_json::from_value::<WireGolden>(doc) {
        Ok(golden) => golden,
        Err(e) => {
            warn!(error = %e, "golden notebook summary has an unexpected shape");
            return None;
        }
    };
    let cells = golden
        .cells
        .into_iter()
        .enumerate()
        .filter_map(|(pos, cell)| match serde_json::from_value::<WireCell>(cell) {
            Ok(cell) => Some(cell.into_golden(pos)),
            Err(e) => {
                warn!(cell = pos, error = %e, "skipping unreadable golden cell");
                None
            }
        })
        .collect();
    Some(GoldenNotebook { notebook_path: golden.notebook_path, cells })
}

/// The first few error-looking lines, for the job status message.
pub fn extract_error(logs: &str) -> String {
    let lines: Vec<&str> = logs
        .lines()
        .filter(|line| ERROR_PATTERNS.iter().any(|p| line.contains(p)))
        .map(str::trim)
        .take(MAX_ERROR_LINES)
        .collect();
    if lines.is_empty() {
        GENERIC_FAILURE.to_string()
    } else {
        lines.join("\n")
    }
}
