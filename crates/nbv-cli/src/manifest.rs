use anyhow::{Context, Result};
use nbv_core::{GoldenNotebook, NotebookExecutionResult, ValidationJob};
use std::path::Path;

/// Reads a job manifest. `.json` files go through serde_json, anything else through serde_yaml.
pub fn load_job(path: &Path) -> Result<ValidationJob> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let job: ValidationJob = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))?
    } else {
        serde_yaml::from_str(&s).with_context(|| format!("parse {}", path.display()))?
    };
    Ok(job)
}

pub fn load_execution(path: &Path) -> Result<NotebookExecutionResult> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

/// Accepts either a golden summary or a full execution result.
pub fn load_golden(path: &Path) -> Result<GoldenNotebook> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    if let Ok(result) = serde_json::from_str::<NotebookExecutionResult>(&s) {
        return Ok(GoldenNotebook::from_execution(&result));
    }
    serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
apiVersion: nbv.io/v1alpha1
kind: NotebookValidationJob
metadata:
  name: iris
  namespace: ml
spec:
  notebook:
    git:
      url: https://github.com/acme/notebooks.git
    path: nb/iris.ipynb
  podConfig:
    containerImage: quay.io/jupyter/scipy-notebook:2024-05-27
"#;

    #[test]
    fn yaml_manifest_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.yaml");
        std::fs::write(&path, YAML).unwrap();
        let job = load_job(&path).unwrap();
        assert_eq!(job.key().to_string(), "ml/iris");
        assert_eq!(job.spec.notebook.path, "nb/iris.ipynb");
        assert_eq!(job.generation(), 1);
    }

    #[test]
    fn json_manifest_loads() {
        let dir = tempfile::tempdir().unwrap();
        let yaml: serde_json::Value = serde_yaml::from_str(YAML).unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(&path, serde_json::to_string(&yaml).unwrap()).unwrap();
        assert_eq!(load_job(&path).unwrap().metadata.name, "iris");
    }

    #[test]
    fn golden_accepts_execution_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("golden.json");
        let result = serde_json::json!({
            "status": "succeeded",
            "cells": [{"cellIndex": 0, "cellType": "code", "status": "succeeded", "outputs": [{"outputType": "stream", "text": "42\n"}]}]
        });
        std::fs::write(&path, result.to_string()).unwrap();
        let golden = load_golden(&path).unwrap();
        assert_eq!(golden.cells.len(), 1);

        std::fs::write(&path, "not json").unwrap();
        assert!(load_golden(&path).is_err());
    }
}
