use std::time::Duration;

use nbv_core::*;
use nbv_logs::*;
use proptest::prelude::*;

fn good_cell(index: usize) -> String {
    format!("NBV_CELL {{\"cell_index\": {index}, \"cell_type\": \"code\", \"status\": \"succeeded\", \"outputs\": []}}")
}

fn pod() -> ExecutionPod {
    ExecutionPod {
        name: "iris-g1-a1".into(),
        namespace: "ml".into(),
        generation: 1,
        attempt: 1,
        phase: PodPhase::Succeeded,
        reason: None,
        message: None,
        exit_code: Some(0),
        spec_digest: None,
    }
}

#[test]
fn test_scripted_operations_count_calls() {
    let ops = ScriptedLogOperations::with_logs(format!("{}\n{}\n", good_cell(0), good_cell(1)));
    let logs = ops.collect_logs(&pod(), Duration::from_secs(60)).unwrap();
    let result = ops.parse_results(&logs).unwrap();
    assert_eq!(result.cells.len(), 2);
    assert!(ops.parse_golden(&logs).is_none());
    assert_eq!(ops.collected(), vec!["iris-g1-a1".to_string()]);
    assert_eq!((ops.parse_calls(), ops.golden_calls()), (1, 1));
}

#[test]
fn test_scripted_errors_are_served_in_order() {
    let ops = ScriptedLogOperations::new();
    ops.push_error(OperationError::LogCollectionTimeout { pod: "iris-g1-a1".into(), timeout_secs: 60 });
    ops.push_logs(good_cell(0));
    assert!(ops.collect_logs(&pod(), Duration::ZERO).is_err());
    assert!(ops.collect_logs(&pod(), Duration::ZERO).is_ok());
    assert!(ops.collect_logs(&pod(), Duration::ZERO).is_ok());
}

#[test]
fn test_truncated_log_keeps_known_cells() {
    let logs = format!("{}\n{}\nNBV_CELL {{\"cell_index\": 2, \"cell_type\": \"co", good_cell(0), good_cell(1));
    let result = parse_results(&logs).unwrap();
    assert_eq!(result.count(CellStatus::Succeeded), 2);
    assert_eq!(result.cell(2).map(|c| c.status), Some(CellStatus::Unknown));
    assert_eq!(result.status, ExecutionStatus::Partial);
}

#[test]
fn test_largest_cell_index_is_accepted() {
    let logs = format!("{}\n{}\n", good_cell(0), good_cell(usize::MAX));
    let result = parse_results(&logs).unwrap();
    assert_eq!(result.cell(usize::MAX).map(|c| c.status), Some(CellStatus::Succeeded));
    assert_eq!(result.cells.len(), 2);

    let truncated = format!("{}\nNBV_CELL {{\"cell_index\": 18446744073709551615, \"cell_type\": \"co", good_cell(0));
    let result = parse_results(&truncated).unwrap();
    assert_eq!(result.cell(usize::MAX).map(|c| c.status), Some(CellStatus::Unknown));
    assert_eq!(result.count(CellStatus::Succeeded), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_noise_never_hides_a_good_cell(
        noise in prop::collection::vec("[a-zA-Z0-9 {}\",.]{0,40}", 0..20),
        broken in prop::collection::vec("[a-z0-9 {\",]{0,20}", 0..4),
        at in 0usize..20,
    ) {
        let mut lines: Vec<String> = noise;
        lines.extend(broken.iter().map(|b| format!("NBV_CELL {{{b}")));
        let at = at.min(lines.len());
        lines.insert(at, good_cell(7));
        let result = parse_results(&lines.join("\n"));
        prop_assert!(result.is_ok());
        let result = result.unwrap();
        prop_assert!(result.cells.iter().any(|c| c.cell_index == 7));
        prop_assert_ne!(result.status, ExecutionStatus::Succeeded);
    }
}
