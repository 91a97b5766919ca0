use nbv_core::{BuildPhase, BuildReference, BuildStrategy, OperationError, ValidationJob};
use nbv_kubectl::Kubectl;
use serde_json::{json, Value};
use tracing::info;

use crate::backend::{classify, output_image, pending_reference, BuildBackend};
use crate::dockerfile::generate_dockerfile;

pub const PIPELINE_NAME: &str = "nbv-notebook-build";

/// Tekton pipeline builds: a shared clone + buildah Pipeline, one PipelineRun per build.
#[derive(Clone)]
pub struct TektonBackend {
    kubectl: Kubectl,
}

impl TektonBackend {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }
}

pub fn pipeline_manifest(namespace: &str) -> Value {
    json!({
        "apiVersion": "tekton.dev/v1",
        "kind": "Pipeline",
        "metadata": {"name": PIPELINE_NAME, "namespace": namespace},
        "spec": {
            "params": [
                {"name": "git-url", "type": "string"},
                {"name": "git-revision", "type": "string"},
                {"name": "image-reference", "type": "string"},
                {"name": "dockerfile", "type": "string"}
            ],
            "workspaces": [{"name": "source"}, {"name": "git-credentials", "optional": true}],
            "results": [{"name": "IMAGE_URL", "value": "$(tasks.build.results.IMAGE_URL)"}],
            "tasks": [
                {
                    "name": "clone",
                    "taskRef": {"resolver": "cluster", "params": [
                        {"name": "kind", "value": "task"},
                        {"name": "name", "value": "git-clone"},
                        {"name": "namespace", "value": "openshift-pipelines"}
                    ]},
                    "params": [
                        {"name": "URL", "value": "$(params.git-url)"},
                        {"name": "REVISION", "value": "$(params.git-revision)"}
                    ],
                    "workspaces": [
                        {"name": "output", "workspace": "source"},
                        {"name": "basic-auth", "workspace": "git-credentials"}
                    ]
                },
                {
                    "name": "write-dockerfile",
                    "runAfter": ["clone"],
                    "params": [{"name": "dockerfile", "value": "$(params.dockerfile)"}],
                    "workspaces": [{"name": "source", "workspace": "source"}],
                    "taskSpec": {
                        "params": [{"name": "dockerfile"}],
                        "workspaces": [{"name": "source"}],
                        "steps": [{
                            "name": "write",
                            "image": "registry.access.redhat.com/ubi9/ubi-minimal:latest",
                            "env": [{"name": "DOCKERFILE", "value": "$(params.dockerfile)"}],
                            "script": "printf '%s' \"$DOCKERFILE\" > $(workspaces.source.path)/Dockerfile.nbv"
                        }]
                    }
                },
                {
                    "name": "build",
                    "runAfter": ["write-dockerfile"],
                    "taskRef": {"resolver": "cluster", "params": [
                        {"name": "kind", "value": "task"},
                        {"name": "name", "value": "buildah"},
                        {"name": "namespace", "value": "openshift-pipelines"}
                    ]},
                    "params": [
                        {"name": "IMAGE", "value": "$(params.image-reference)"},
                        {"name": "DOCKERFILE", "value": "./Dockerfile.nbv"}
                    ],
                    "workspaces": [{"name": "source", "workspace": "source"}]
                }
            ]
        }
    })
}

pub fn pipeline_run_manifest(job: &ValidationJob, name: &str) -> Value {
    let git = &job.spec.notebook.git;
    let mut workspaces = vec![json!({
        "name": "source",
        "volumeClaimTemplate": {"spec": {"accessModes": ["ReadWriteOnce"], "resources": {"requests": {"storage": "1Gi"}}}}
    })];
    if let Some(secret) = &git.credentials_secret {
        workspaces.push(json!({"name": "git-credentials", "secret": {"secretName": secret}}));
    }
    json!({
        "apiVersion": "tekton.dev/v1",
        "kind": "PipelineRun",
        "metadata": {
            "name": name,
            "namespace": job.metadata.namespace,
            "labels": {"nbv.io/job": job.metadata.name, "nbv.io/generation": job.generation().to_string()},
        },
        "spec": {
            "pipelineRef": {"name": PIPELINE_NAME},
            "params": [
                {"name": "git-url", "value": git.url},
                {"name": "git-revision", "value": git.git_ref},
                {"name": "image-reference", "value": output_image(job)},
                {"name": "dockerfile", "value": generate_dockerfile(job).content}
            ],
            "taskRunTemplate": {"podTemplate": {"securityContext": {"fsGroup": 65532}}},
            "workspaces": workspaces,
        }
    })
}

/// Maps a PipelineRun's `Succeeded` condition onto a build reference.
pub fn reference_from_run(namespace: &str, name: &str, generation: i64, run: &Value) -> BuildReference {
    let condition = run
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .and_then(|cs| cs.iter().find(|c| c.get("type").and_then(Value::as_str) == Some("Succeeded")));
    let phase = match condition.and_then(|c| c.get("status")).and_then(Value::as_str) {
        Some("True") => BuildPhase::Succeeded,
        Some("False") => BuildPhase::Failed,
        Some(_) => BuildPhase::Running,
        None => BuildPhase::Pending,
    };
    let message = condition.and_then(|c| c.get("message")).and_then(Value::as_str).map(str::to_string);
    let image = (phase == BuildPhase::Succeeded).then(|| image_from_run(run)).flatten();
    BuildReference { name: name.to_string(), namespace: namespace.to_string(), strategy: BuildStrategy::Tekton, generation, phase, image, message }
}

fn image_from_run(run: &Value) -> Option<String> {
    let results = run.pointer("/status/results").and_then(Value::as_array);
    let from_results = results
        .and_then(|rs| rs.iter().find(|r| r.get("name").and_then(Value::as_str) == Some("IMAGE_URL")))
        .and_then(|r| r.get("value"))
        .and_then(Value::as_str);
    let from_params = || {
        run.pointer("/spec/params")
            .and_then(Value::as_array)
            .and_then(|ps| ps.iter().find(|p| p.get("name").and_then(Value::as_str) == Some("image-reference")))
            .and_then(|p| p.get("value"))
            .and_then(Value::as_str)
    };
    from_results.or_else(from_params).map(str::to_string)
}

impl BuildBackend for TektonBackend {
    fn strategy(&self) -> BuildStrategy {
        BuildStrategy::Tekton
    }

    fn find_build(&self, namespace: &str, name: &str) -> Result<Option<BuildReference>, OperationError> {
        let run = self.kubectl.get("pipelinerun", namespace, name).map_err(|e| classify(name, e))?;
        Ok(run.map(|r| {
            let generation = r.pointer("/metadata/labels/nbv.io~1generation").and_then(Value::as_str).and_then(|g| g.parse().ok()).unwrap_or(0);
            reference_from_run(namespace, name, generation, &r)
        }))
    }

    fn create_build(&self, job: &ValidationJob, name: &str) -> Result<BuildReference, OperationError> {
        let ns = &job.metadata.namespace;
        self.kubectl.apply(&pipeline_manifest(ns)).map_err(|e| classify(name, e))?;
        match self.kubectl.create(&pipeline_run_manifest(job, name)) {
            Ok(_) => {
                info!(build = %name, image = %output_image(job), "pipeline run created");
                Ok(pending_reference(job, name, BuildStrategy::Tekton))
            }
            Err(e) if e.is_already_exists() => self
                .find_build(ns, name)?
                .ok_or_else(|| OperationError::BuildTransientError(format!("pipeline run {name} exists but could not be read"))),
            Err(e) => Err(classify(name, e)),
        }
    }

    fn build_status(&self, build: &BuildReference) -> Result<BuildReference, OperationError> {
        let run = self.kubectl.get("pipelinerun", &build.namespace, &build.name).map_err(|e| classify(&build.name, e))?;
        match run {
            Some(r) => Ok(reference_from_run(&build.namespace, &build.name, build.generation, &r)),
            None => Err(OperationError::BuildFailed { build: build.name.clone(), message: "pipeline run was deleted".into() }),
        }
    }
}
