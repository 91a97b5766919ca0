use nbv_core::{
    CellExecutionResult, CellOutput, CellStatus, CellVerdict, ExecutionStatus, GoldenCell, GoldenNotebook, NotebookExecutionResult, OperationError,
    Tolerance, ValidationOutcome, Verdict,
};
use tracing::debug;

use crate::diff::unified_diff;
use crate::normalize::Normalizer;

fn output_text(outputs: &[CellOutput], normalizer: &Normalizer) -> String {
    outputs
        .iter()
        .filter(|o| !normalizer.ignores(&o.output_type))
        .map(|o| o.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn judge(golden: &GoldenCell, actual: Option<&CellExecutionResult>, normalizer: &Normalizer) -> CellVerdict {
    let verdict = |verdict, diff| CellVerdict { cell_index: golden.cell_index, verdict, diff };
    let Some(actual) = actual else {
        return verdict(Verdict::Missing, None);
    };
    match actual.status {
        CellStatus::Failed | CellStatus::Unknown => {
            let detail = actual.error.clone().unwrap_or_else(|| match actual.status {
                CellStatus::Failed => "cell failed".to_string(),
                _ => "cell result unknown".to_string(),
            });
            return verdict(Verdict::NotExecuted, Some(detail));
        }
        CellStatus::Succeeded | CellStatus::Skipped => {}
    }
    let expected = output_text(&golden.outputs, normalizer);
    let got = output_text(&actual.outputs, normalizer);
    if normalizer.texts_match(&expected, &got) {
        verdict(Verdict::Matched, None)
    } else {
        verdict(Verdict::Mismatched, Some(unified_diff(&expected, &got)))
    }
}

/// Judges an execution against its golden notebook.
///
/// Golden cells drive the comparison: cells only the run produced are ignored, golden cells the
/// run lacks are missing, and failed or unreadable cells never pass. Without a golden notebook
/// the run passes when it succeeded outright.
pub fn compare(actual: &NotebookExecutionResult, golden: Option<&GoldenNotebook>, tolerance: &Tolerance) -> Result<ValidationOutcome, OperationError> {
    let normalizer = Normalizer::new(tolerance)?;
    let Some(golden) = golden else {
        return Ok(execution_only(actual));
    };

    let cells: Vec<CellVerdict> = golden.cells.iter().map(|g| judge(g, actual.cell(g.cell_index), &normalizer)).collect();
    let count = |v: Verdict| cells.iter().filter(|c| c.verdict == v).count();
    let (matched, mismatched, missing, not_executed) = (count(Verdict::Matched), count(Verdict::Mismatched), count(Verdict::Missing), count(Verdict::NotExecuted));
    let run_failed = actual.status == ExecutionStatus::Failed;
    let passed = mismatched == 0 && missing == 0 && not_executed == 0 && !run_failed;

    let mut summary = format!("{matched}/{} cells matched golden notebook", cells.len());
    let mut problems = Vec::new();
    if mismatched > 0 {
        problems.push(format!("{mismatched} mismatched"));
    }
    if missing > 0 {
        problems.push(format!("{missing} missing"));
    }
    if not_executed > 0 {
        problems.push(format!("{not_executed} not executed"));
    }
    if run_failed {
        problems.push("notebook run failed".to_string());
    }
    if !problems.is_empty() {
        summary = format!("{summary} ({})", problems.join(", "));
    }
    debug!(matched, mismatched, missing, not_executed, passed, "compared against golden notebook");

    Ok(ValidationOutcome { passed, matched, mismatched, missing, cells, platform: None, summary })
}

fn execution_only(actual: &NotebookExecutionResult) -> ValidationOutcome {
    let cells: Vec<CellVerdict> = actual
        .cells
        .iter()
        .map(|c| CellVerdict {
            cell_index: c.cell_index,
            verdict: match c.status {
                CellStatus::Succeeded | CellStatus::Skipped => Verdict::Matched,
                CellStatus::Failed | CellStatus::Unknown => Verdict::NotExecuted,
            },
            diff: c.error.clone(),
        })
        .collect();
    let matched = cells.iter().filter(|c| c.passed()).count();
    let passed = actual.status == ExecutionStatus::Succeeded;
    let summary = match actual.status {
        ExecutionStatus::Succeeded => format!("notebook executed successfully ({} cells)", cells.len()),
        ExecutionStatus::Failed => match &actual.error {
            Some(error) if cells.is_empty() => format!("notebook execution failed: {error}"),
            _ => format!("notebook execution failed ({} of {} cells failed)", actual.count(CellStatus::Failed), cells.len()),
        },
        ExecutionStatus::Partial => format!("notebook execution incomplete ({} cells without a result)", actual.count(CellStatus::Unknown)),
    };
    ValidationOutcome { passed, matched, mismatched: 0, missing: 0, cells, platform: None, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(index: usize, status: CellStatus, text: &str) -> CellExecutionResult {
        CellExecutionResult {
            cell_index: index,
            cell_type: "code".into(),
            status,
            error: None,
            execution_count: None,
            outputs: vec![CellOutput::new("stream", text)],
        }
    }

    fn run(cells: Vec<CellExecutionResult>) -> NotebookExecutionResult {
        NotebookExecutionResult { status: ExecutionStatus::Succeeded, exit_code: Some(0), notebook_path: None, cells, error: None }
    }

    #[test]
    fn without_golden_success_decides() {
        let r = run(vec![cell(0, CellStatus::Succeeded, "x")]);
        assert!(compare(&r, None, &Tolerance::default()).unwrap().passed);
        let failed = NotebookExecutionResult { status: ExecutionStatus::Failed, ..r.clone() };
        assert!(!compare(&failed, None, &Tolerance::default()).unwrap().passed);
        let partial = NotebookExecutionResult { status: ExecutionStatus::Partial, ..r };
        assert!(!compare(&partial, None, &Tolerance::default()).unwrap().passed);
    }

    #[test]
    fn golden_cells_drive_the_verdicts() {
        let actual = run(vec![
            cell(0, CellStatus::Succeeded, "accuracy 0.96667"),
            cell(1, CellStatus::Succeeded, "rows 150"),
            cell(2, CellStatus::Failed, ""),
            cell(9, CellStatus::Succeeded, "extra"),
        ]);
        let golden = GoldenNotebook::from_execution(&run(vec![
            cell(0, CellStatus::Succeeded, "accuracy 0.96670"),
            cell(1, CellStatus::Succeeded, "rows 151"),
            cell(2, CellStatus::Succeeded, "ok"),
            cell(3, CellStatus::Succeeded, "late"),
        ]));
        let o = compare(&actual, Some(&golden), &Tolerance::default()).unwrap();
        let verdicts: Vec<_> = o.cells.iter().map(|c| c.verdict).collect();
        assert_eq!(verdicts, vec![Verdict::Matched, Verdict::Mismatched, Verdict::NotExecuted, Verdict::Missing]);
        assert_eq!((o.matched, o.mismatched, o.missing), (1, 1, 1));
        assert!(!o.passed);
        assert!(o.cells[1].diff.as_deref().unwrap().contains("- rows 151\n+ rows 150"));
        assert!(o.summary.starts_with("1/4 cells matched"), "{}", o.summary);
    }

    #[test]
    fn ignored_output_types_are_skipped() {
        let mut a = cell(0, CellStatus::Succeeded, "42");
        a.outputs.push(CellOutput::new("display_data", "<Figure 640x480>"));
        let g = GoldenNotebook::from_execution(&run(vec![cell(0, CellStatus::Succeeded, "42")]));
        let t = Tolerance { ignore_output_types: vec!["display_data".into()], ..Tolerance::default() };
        assert!(compare(&run(vec![a.clone()]), Some(&g), &t).unwrap().passed);
        assert!(!compare(&run(vec![a]), Some(&g), &Tolerance::default()).unwrap().passed);
    }
}
