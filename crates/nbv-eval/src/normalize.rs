use std::sync::OnceLock;

use nbv_core::{OperationError, TextMatch, Tolerance};
use regex::Regex;

pub const TIMESTAMP_MASK: &str = "[TIMESTAMP]";

/// Built-in volatile patterns: ISO and common date-times, US dates, durations and epoch stamps.
pub const DEFAULT_TIMESTAMP_PATTERNS: [&str; 7] = [
    r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?",
    r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(\.\d+)?",
    r"\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}",
    r"Execution time: \d+\.\d+s",
    r"Duration: \d+ms",
    r"\b\d+\.\d+s\b",
    r"\b\d{10,13}\b",
];

fn number_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-+]?(\d+\.\d*|\.\d+|\d+)([eE][-+]?\d+)?").ok()).as_ref()
}

fn whitespace_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").ok()).as_ref()
}

/// Compiled comparison rules for one tolerance setting.
pub struct Normalizer {
    tolerance: Tolerance,
    masks: Vec<Regex>,
}

impl Normalizer {
    pub fn new(tolerance: &Tolerance) -> Result<Self, OperationError> {
        let mut masks = Vec::new();
        if tolerance.ignore_timestamps {
            let patterns = DEFAULT_TIMESTAMP_PATTERNS.iter().copied().chain(tolerance.timestamp_patterns.iter().map(String::as_str));
            for pattern in patterns {
                let re = Regex::new(pattern).map_err(|e| OperationError::InvalidSpec(format!("timestamp pattern {pattern:?}: {e}")))?;
                masks.push(re);
            }
        }
        Ok(Self { tolerance: tolerance.clone(), masks })
    }

    pub fn tolerance(&self) -> &Tolerance {
        &self.tolerance
    }

    pub fn ignores(&self, output_type: &str) -> bool {
        self.tolerance.ignore_output_types.iter().any(|t| t == output_type)
    }

    /// Masks volatile substrings and, outside exact mode, collapses whitespace.
    pub fn normalize(&self, text: &str) -> String {
        let mut out = text.to_string();
        for re in &self.masks {
            out = re.replace_all(&out, TIMESTAMP_MASK).into_owned();
        }
        if self.tolerance.text == TextMatch::Exact {
            return out;
        }
        match whitespace_pattern() {
            Some(ws) => ws.replace_all(out.trim(), " ").into_owned(),
            None => out.trim().to_string(),
        }
    }

    /// Whether two output texts agree within the tolerance.
    pub fn texts_match(&self, expected: &str, actual: &str) -> bool {
        let expected = self.normalize(expected);
        let actual = self.normalize(actual);
        if expected == actual || self.numbers_agree(&expected, &actual) {
            return true;
        }
        self.tolerance.text == TextMatch::Fuzzy && similarity(&expected, &actual) >= self.tolerance.fuzzy_threshold
    }

    /// Same text once every number is swapped for a placeholder, and each number pair within tolerance.
    fn numbers_agree(&self, expected: &str, actual: &str) -> bool {
        let Some(re) = number_pattern() else { return false };
        let skeleton = |s: &str| re.replace_all(s, "#").into_owned();
        if skeleton(expected) != skeleton(actual) {
            return false;
        }
        let numbers = |s: &str| re.find_iter(s).map(|m| m.as_str().parse::<f64>().ok()).collect::<Vec<_>>();
        let (e, a) = (numbers(expected), numbers(actual));
        e.len() == a.len()
            && e.iter().zip(&a).all(|pair| match pair {
                (Some(x), Some(y)) => self.tolerance.numbers_match(*x, *y),
                _ => false,
            })
    }
}

/// Levenshtein similarity ratio in `[0, 1]` over characters.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            cur[j + 1] = substitution.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    1.0 - prev[b.len()] as f64 / longest as f64
}
