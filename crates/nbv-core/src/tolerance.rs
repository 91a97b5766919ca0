use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextMatch {
    Exact,
    #[default]
    Normalized,
    Fuzzy,
}

/// Comparison tolerances for golden-notebook and serving-response checks.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Tolerance {
    pub numeric_absolute: f64,
    pub numeric_relative: f64,
    pub text: TextMatch,
    /// Minimum similarity ratio in `(0, 1]` for `TextMatch::Fuzzy`.
    pub fuzzy_threshold: f64,
    pub ignore_timestamps: bool,
    /// Extra regexes masked like timestamps, on top of the built-in set.
    pub timestamp_patterns: Vec<String>,
    /// Output types (`stream`, `display_data`, ...) skipped during comparison.
    pub ignore_output_types: Vec<String>,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            numeric_absolute: 1e-4,
            numeric_relative: 0.0,
            text: TextMatch::Normalized,
            fuzzy_threshold: 0.9,
            ignore_timestamps: true,
            timestamp_patterns: Vec::new(),
            ignore_output_types: Vec::new(),
        }
    }
}

impl Tolerance {
    pub fn numbers_match(&self, expected: f64, actual: f64) -> bool {
        if expected == actual {
            return true;
        }
        if expected.is_nan() || actual.is_nan() {
            return false;
        }
        let delta = (expected - actual).abs();
        delta <= self.numeric_absolute || delta <= self.numeric_relative * expected.abs().max(actual.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_and_relative_deltas() {
        let t = Tolerance::default();
        assert!(t.numbers_match(1.0, 1.00005));
        assert!(!t.numbers_match(1.0, 1.001));

        let rel = Tolerance { numeric_absolute: 0.0, numeric_relative: 0.01, ..Tolerance::default() };
        assert!(rel.numbers_match(1000.0, 1009.0));
        assert!(!rel.numbers_match(1000.0, 1020.0));
        assert!(!rel.numbers_match(f64::NAN, f64::NAN));
    }

    #[test]
    fn deserializes_partial_config_with_defaults() {
        let t: Tolerance = serde_json::from_str(r#"{"text":"fuzzy","ignoreOutputTypes":["stream"]}"#).unwrap();
        assert_eq!(t.text, TextMatch::Fuzzy);
        assert_eq!(t.ignore_output_types, vec!["stream".to_string()]);
        assert_eq!(t.numeric_absolute, 1e-4);
        assert!(t.ignore_timestamps);
    }
}
