use nbv_core::*;
use nbv_eval::*;
use proptest::prelude::*;

fn execution(texts: &[String]) -> NotebookExecutionResult {
    NotebookExecutionResult {
        status: ExecutionStatus::Succeeded,
        exit_code: Some(0),
        notebook_path: Some("/workspace/repo/nb/iris.ipynb".into()),
        cells: texts
            .iter()
            .enumerate()
            .map(|(i, t)| CellExecutionResult {
                cell_index: i,
                cell_type: "code".into(),
                status: CellStatus::Succeeded,
                error: None,
                execution_count: Some(i as u32 + 1),
                outputs: vec![CellOutput::new("stream", t.clone())],
            })
            .collect(),
        error: None,
    }
}

#[test]
fn test_timestamped_outputs_match_golden() {
    let actual = execution(&["trained at 2025-03-01 10:00:00 in 12.5s".into(), "accuracy=0.96667".into()]);
    let golden = GoldenNotebook::from_execution(&execution(&["trained at 2024-11-20 08:30:12 in 9.1s".into(), "accuracy=0.9667".into()]));
    let tolerance = Tolerance { numeric_absolute: 1e-3, ..Tolerance::default() };
    let outcome = compare(&actual, Some(&golden), &tolerance).unwrap();
    assert!(outcome.passed, "{:?}", outcome);
    assert_eq!(outcome.matched, 2);
}

#[test]
fn test_platform_check_folds_into_outcome() {
    let actual = execution(&["ok".into()]);
    let outcome = compare(&actual, None, &Tolerance::default()).unwrap();
    let check = validate_platform_response(ServingPlatform::Seldon, &serde_json::json!({"data": {"ndarray": [2]}}), &serde_json::json!([1]), &Tolerance::default());
    let outcome = outcome.with_platform(check);
    assert!(!outcome.passed);
    assert!(outcome.summary.contains("seldon check failed"));
}

const OUTPUT_TYPES: [&str; 4] = ["stream", "execute_result", "display_data", "error"];
const KNOWN_PATTERNS: [&str; 5] = [r"run-[0-9a-f]{8}", r"\d+ms", r"pid=\d+", r"[A-Z]{3}-\d{4}", r"0x[0-9a-f]+"];

fn tolerance() -> impl Strategy<Value = Tolerance> {
    (
        prop_oneof![Just(0.0), -1.0f64..0.0, 0.0f64..1.0],
        prop_oneof![Just(0.0), -1.0f64..0.0, 0.0f64..1.0],
        prop_oneof![Just(TextMatch::Exact), Just(TextMatch::Normalized), Just(TextMatch::Fuzzy)],
        0.0f64..=1.0,
        any::<bool>(),
        prop::sample::subsequence(KNOWN_PATTERNS.to_vec(), 0..=KNOWN_PATTERNS.len()),
        prop::sample::subsequence(OUTPUT_TYPES.to_vec(), 0..=OUTPUT_TYPES.len()),
    )
        .prop_map(|(absolute, relative, text, fuzzy_threshold, ignore_timestamps, patterns, ignored)| Tolerance {
            numeric_absolute: absolute,
            numeric_relative: relative,
            text,
            fuzzy_threshold,
            ignore_timestamps,
            timestamp_patterns: patterns.into_iter().map(String::from).collect(),
            ignore_output_types: ignored.into_iter().map(String::from).collect(),
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_execution_matches_itself(
        texts in prop::collection::vec("[ -~\n]{0,60}", 1..8),
        kinds in prop::collection::vec(0usize..OUTPUT_TYPES.len(), 8),
        tolerance in tolerance(),
    ) {
        let mut actual = execution(&texts);
        for (cell, kind) in actual.cells.iter_mut().zip(&kinds) {
            cell.outputs[0].output_type = OUTPUT_TYPES[*kind].to_string();
        }
        let golden = GoldenNotebook::from_execution(&actual);
        let outcome = compare(&actual, Some(&golden), &tolerance).unwrap();
        prop_assert!(outcome.passed, "{:?} {:?}", tolerance, outcome);
        prop_assert_eq!(outcome.matched, texts.len());
    }
}
