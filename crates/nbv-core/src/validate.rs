use regex::Regex;

use crate::{JobSpec, NotebookSource, OperationError};

/// Rejects specs that can never run, before any cluster work starts.
pub fn validate_spec(spec: &JobSpec) -> Result<(), OperationError> {
    let mut problems = Vec::new();

    check_source("notebook", &spec.notebook, &mut problems);
    if let Some(golden) = &spec.golden_notebook {
        check_source("goldenNotebook", golden, &mut problems);
    }
    if spec.pod_config.container_image.trim().is_empty() && spec.build.is_none() {
        problems.push("podConfig.containerImage is required when no build is configured".to_string());
    }
    for env in &spec.pod_config.env {
        if env.name.is_empty() || env.name.contains('=') {
            problems.push(format!("invalid environment variable name '{}'", env.name));
        }
    }

    let t = &spec.comparison;
    if !(t.numeric_absolute >= 0.0) || !(t.numeric_relative >= 0.0) {
        problems.push("comparison tolerances must be non-negative".to_string());
    }
    if !(t.fuzzy_threshold > 0.0 && t.fuzzy_threshold <= 1.0) {
        problems.push(format!("comparison.fuzzyThreshold {} must be in (0, 1]", t.fuzzy_threshold));
    }
    for pattern in &t.timestamp_patterns {
        if let Err(e) = Regex::new(pattern) {
            problems.push(format!("timestamp pattern '{pattern}' does not compile: {e}"));
        }
    }

    if let Some(mv) = &spec.model_validation {
        if !(mv.endpoint.starts_with("http://") || mv.endpoint.starts_with("https://")) {
            problems.push(format!("modelValidation.endpoint '{}' must be an http(s) URL", mv.endpoint));
        }
    }
    if spec.timeout_seconds == Some(0) {
        problems.push("timeoutSeconds must be positive".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(OperationError::InvalidSpec(problems.join("; ")))
    }
}

fn check_source(field: &str, source: &NotebookSource, problems: &mut Vec<String>) {
    let url = source.git.url.trim();
    if url.is_empty() {
        problems.push(format!("{field}.git.url is required"));
    } else if !is_git_url(url) {
        problems.push(format!("{field}.git.url '{}' is neither an HTTPS nor an SSH repository", crate::redact::sanitize_url(url)));
    }
    if source.git.git_ref.trim().is_empty() {
        problems.push(format!("{field}.git.ref must not be empty"));
    }
    let path = source.path.trim();
    if !path.ends_with(".ipynb") {
        problems.push(format!("{field}.path '{path}' must point at an .ipynb file"));
    }
    if path.starts_with('/') || path.split('/').any(|seg| seg == "..") {
        problems.push(format!("{field}.path '{path}' must be relative to the repository root"));
    }
}

pub fn is_ssh_url(url: &str) -> bool {
    url.starts_with("ssh://") || (!url.contains("://") && url.contains('@') && url.contains(':'))
}

pub fn is_git_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://") || is_ssh_url(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(url: &str, path: &str) -> JobSpec {
        serde_json::from_value(serde_json::json!({
            "notebook": {"git": {"url": url}, "path": path},
            "podConfig": {"containerImage": "img"}
        }))
        .unwrap()
    }

    #[test]
    fn accepts_https_and_ssh_sources() {
        assert!(validate_spec(&spec("https://github.com/a/b.git", "nb/x.ipynb")).is_ok());
        assert!(validate_spec(&spec("git@github.com:a/b.git", "x.ipynb")).is_ok());
        assert!(validate_spec(&spec("ssh://git@github.com/a/b.git", "x.ipynb")).is_ok());
    }

    #[test]
    fn collects_every_problem() {
        let err = validate_spec(&spec("ftp://host/repo", "../escape.py")).unwrap_err();
        let OperationError::InvalidSpec(msg) = err else { panic!("wrong variant") };
        assert!(msg.contains("neither an HTTPS nor an SSH"));
        assert!(msg.contains(".ipynb"));
        assert!(msg.contains("relative"));
    }

    #[test]
    fn rejects_bad_tolerances() {
        let mut s = spec("https://h/r.git", "a.ipynb");
        s.comparison.fuzzy_threshold = 1.5;
        s.comparison.timestamp_patterns.push("([".into());
        let msg = validate_spec(&s).unwrap_err().to_string();
        assert!(msg.contains("fuzzyThreshold"));
        assert!(msg.contains("does not compile"));
    }
}
