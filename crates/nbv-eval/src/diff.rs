pub const MAX_DIFF_CHARS: usize = 1000;
const TRUNCATED: &str = "... (truncated)";

/// Cuts `s` to at most `max` characters, marking the cut.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte, _)) => format!("{}{TRUNCATED}", &s[..byte]),
        None => s.to_string(),
    }
}

/// Line-by-line diff of expected against actual, positionally aligned.
pub fn unified_diff(expected: &str, actual: &str) -> String {
    let expected: Vec<&str> = expected.split('\n').collect();
    let actual: Vec<&str> = actual.split('\n').collect();
    let mut out = vec!["--- expected".to_string(), "+++ actual".to_string()];
    for i in 0..expected.len().max(actual.len()) {
        match (expected.get(i), actual.get(i)) {
            (Some(e), Some(a)) if e == a => {}
            (Some(e), Some(a)) => {
                out.push(format!("- {e}"));
                out.push(format!("+ {a}"));
            }
            (Some(e), None) => out.push(format!("- {e}")),
            (None, Some(a)) => out.push(format!("+ {a}")),
            (None, None) => {}
        }
    }
    truncate(&out.join("\n"), MAX_DIFF_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_marks_changed_and_extra_lines() {
        let d = unified_diff("a\nb\nc", "a\nB");
        assert_eq!(d, "--- expected\n+++ actual\n- b\n+ B\n- c");
    }

    #[test]
    fn long_diffs_are_truncated_on_char_boundary() {
        let d = unified_diff(&"é".repeat(3000), "x");
        assert!(d.ends_with("... (truncated)"));
        assert_eq!(d.chars().count(), MAX_DIFF_CHARS + "... (truncated)".len());
    }
}
