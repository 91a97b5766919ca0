use nbv_core::ValidationJob;

use crate::backend::base_image;

#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedDockerfile {
    pub content: String,
    /// Requirements files looked for at build time, most specific first.
    pub requirements_candidates: Vec<String>,
}

/// Requirements lookup chain: explicit file, then the notebook's directory, `notebooks/`, and the
/// repository root.
pub fn requirements_candidates(job: &ValidationJob) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(explicit) = job.spec.build.as_ref().and_then(|b| b.requirements_file.clone()) {
        out.push(explicit);
    }
    let notebook_dir = job.spec.notebook.path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    if !notebook_dir.is_empty() {
        out.push(format!("{notebook_dir}/requirements.txt"));
    }
    out.push("notebooks/requirements.txt".to_string());
    out.push("requirements.txt".to_string());
    out.dedup();
    out
}

/// Dockerfile for pipeline builds: base image, the notebook executor, and the first
/// requirements file found in the cloned repository.
pub fn generate_dockerfile(job: &ValidationJob) -> GeneratedDockerfile {
    let candidates = requirements_candidates(job);
    let lookup = candidates
        .iter()
        .map(|c| format!("if [ -f \"/workspace/source/{c}\" ]; then pip install --no-cache-dir -r \"/workspace/source/{c}\";"))
        .collect::<Vec<_>>()
        .join(" el");
    let content = format!(
        "FROM {base}\n\
         USER root\n\
         RUN pip install --no-cache-dir papermill nbformat\n\
         COPY . /workspace/source\n\
         RUN {lookup} else echo \"no requirements file found\"; fi\n\
         WORKDIR /workspace/source\n\
         USER 1001\n",
        base = base_image(job),
    );
    GeneratedDockerfile { content, requirements_candidates: candidates }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbv_core::{JobKey, JobSpec};

    fn job(build: serde_json::Value, path: &str) -> ValidationJob {
        let spec: JobSpec = serde_json::from_value(serde_json::json!({
            "notebook": {"git": {"url": "https://h/r.git"}, "path": path},
            "build": build
        }))
        .unwrap();
        ValidationJob::new(JobKey::new("ml", "iris"), spec)
    }

    #[test]
    fn candidate_chain_prefers_explicit_then_notebook_dir() {
        let j = job(serde_json::json!({"strategy": "tekton", "requirementsFile": "env/req.txt"}), "notebooks/tier1/iris.ipynb");
        assert_eq!(
            requirements_candidates(&j),
            vec!["env/req.txt", "notebooks/tier1/requirements.txt", "notebooks/requirements.txt", "requirements.txt"]
        );
    }

    #[test]
    fn root_notebook_has_no_directory_candidate() {
        let j = job(serde_json::json!({"strategy": "tekton"}), "iris.ipynb");
        assert_eq!(requirements_candidates(&j), vec!["notebooks/requirements.txt", "requirements.txt"]);
    }

    #[test]
    fn dockerfile_uses_base_image_and_checks_in_order() {
        let j = job(serde_json::json!({"strategy": "tekton", "baseImage": "quay.io/custom/py:3.11"}), "nb/iris.ipynb");
        let d = generate_dockerfile(&j);
        assert!(d.content.starts_with("FROM quay.io/custom/py:3.11\n"));
        let first = d.content.find("nb/requirements.txt").unwrap();
        let root = d.content.find("\"/workspace/source/requirements.txt\"").unwrap();
        assert!(first < root);
        assert!(d.content.contains("elif [ -f"));
        assert!(d.content.contains("papermill"));
    }
}
