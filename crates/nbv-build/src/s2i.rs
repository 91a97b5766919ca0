use nbv_core::{BuildPhase, BuildReference, BuildStrategy, OperationError, ValidationJob};
use nbv_kubectl::Kubectl;
use serde_json::{json, Value};
use tracing::info;

use crate::backend::{base_image, classify, output_image, pending_reference, BuildBackend};

/// OpenShift Source-to-Image: an ImageStream plus BuildConfig named after the build, started
/// with `oc start-build`. Builds are found through the `openshift.io/build-config.name` label.
#[derive(Clone)]
pub struct S2iBackend {
    oc: Kubectl,
}

impl S2iBackend {
    pub fn new(oc: Kubectl) -> Self {
        Self { oc }
    }

    fn latest_build(&self, namespace: &str, name: &str) -> Result<Option<Value>, OperationError> {
        let selector = format!("openshift.io/build-config.name={name}");
        let builds = self.oc.list("builds", Some(namespace), Some(&selector)).map_err(|e| classify(name, e))?;
        Ok(builds.into_iter().max_by_key(build_number))
    }
}

fn build_number(build: &Value) -> i64 {
    build
        .pointer("/metadata/annotations/openshift.io~1build.number")
        .and_then(Value::as_str)
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Maps an OpenShift Build object onto a reference for the given config name.
pub fn reference_from_build(namespace: &str, name: &str, generation: i64, build: &Value) -> BuildReference {
    let phase = match build.pointer("/status/phase").and_then(Value::as_str).unwrap_or("New") {
        "New" | "Pending" => BuildPhase::Pending,
        "Running" => BuildPhase::Running,
        "Complete" => BuildPhase::Succeeded,
        _ => BuildPhase::Failed,
    };
    let image = (phase == BuildPhase::Succeeded).then(|| image_from_build(build)).flatten();
    let message = build
        .pointer("/status/message")
        .or_else(|| build.pointer("/status/reason"))
        .and_then(Value::as_str)
        .map(str::to_string);
    BuildReference { name: name.to_string(), namespace: namespace.to_string(), strategy: BuildStrategy::S2i, generation, phase, image, message }
}

fn image_from_build(build: &Value) -> Option<String> {
    let reference = build.pointer("/status/outputDockerImageReference").and_then(Value::as_str)?;
    match build.pointer("/status/output/to/imageDigest").and_then(Value::as_str) {
        Some(digest) => {
            let repo = match reference.rsplit_once(':') {
                Some((repo, tag)) if !tag.contains('/') => repo,
                _ => reference,
            };
            Some(format!("{repo}@{digest}"))
        }
        None => Some(reference.to_string()),
    }
}

fn generation_label(build: &Value) -> i64 {
    build.pointer("/metadata/labels/nbv.io~1generation").and_then(Value::as_str).and_then(|g| g.parse().ok()).unwrap_or(0)
}

pub fn build_config_manifest(job: &ValidationJob, name: &str) -> Value {
    let git = &job.spec.notebook.git;
    let mut source = json!({"type": "Git", "git": {"uri": git.url, "ref": git.git_ref}});
    if let Some(secret) = &git.credentials_secret {
        source["sourceSecret"] = json!({"name": secret});
    }
    let output = match job.spec.build.as_ref().and_then(|b| b.output_image.clone()) {
        Some(image) => json!({"to": {"kind": "DockerImage", "name": image}}),
        None => json!({"to": {"kind": "ImageStreamTag", "name": format!("{}:g{}", job.metadata.name, job.generation())}}),
    };
    json!({
        "apiVersion": "build.openshift.io/v1",
        "kind": "BuildConfig",
        "metadata": {
            "name": name,
            "namespace": job.metadata.namespace,
            "labels": labels(job),
        },
        "spec": {
            "source": source,
            "strategy": {"type": "Source", "sourceStrategy": {"from": {"kind": "DockerImage", "name": base_image(job)}}},
            "output": output,
            "runPolicy": "Serial",
        }
    })
}

fn labels(job: &ValidationJob) -> Value {
    json!({"nbv.io/job": job.metadata.name, "nbv.io/generation": job.generation().to_string()})
}

impl BuildBackend for S2iBackend {
    fn strategy(&self) -> BuildStrategy {
        BuildStrategy::S2i
    }

    fn find_build(&self, namespace: &str, name: &str) -> Result<Option<BuildReference>, OperationError> {
        Ok(self.latest_build(namespace, name)?.map(|b| reference_from_build(namespace, name, generation_label(&b), &b)))
    }

    fn create_build(&self, job: &ValidationJob, name: &str) -> Result<BuildReference, OperationError> {
        let ns = &job.metadata.namespace;
        let stream = json!({
            "apiVersion": "image.openshift.io/v1",
            "kind": "ImageStream",
            "metadata": {"name": job.metadata.name, "namespace": ns, "labels": labels(job)},
        });
        self.oc.apply(&stream).map_err(|e| classify(name, e))?;
        self.oc.apply(&build_config_manifest(job, name)).map_err(|e| classify(name, e))?;
        let started = self.oc.run(&["start-build", name, "-n", ns, "-o", "name"]).map_err(|e| classify(name, e))?;
        info!(build = %name, started = %started.trim(), image = %output_image(job), "s2i build triggered");
        Ok(pending_reference(job, name, BuildStrategy::S2i))
    }

    fn build_status(&self, build: &BuildReference) -> Result<BuildReference, OperationError> {
        match self.latest_build(&build.namespace, &build.name)? {
            Some(b) => Ok(reference_from_build(&build.namespace, &build.name, build.generation, &b)),
            None => Err(OperationError::BuildFailed { build: build.name.clone(), message: "no build exists for this build config".into() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_build_phases_and_digest_image() {
        let complete = json!({
            "metadata": {"name": "iris-build-g2-1", "labels": {"nbv.io/generation": "2"}},
            "status": {
                "phase": "Complete",
                "outputDockerImageReference": "image-registry.openshift-image-registry.svc:5000/ml/iris:g2",
                "output": {"to": {"imageDigest": "sha256:abc"}}
            }
        });
        let r = reference_from_build("ml", "iris-build-g2", generation_label(&complete), &complete);
        assert_eq!(r.phase, BuildPhase::Succeeded);
        assert_eq!(r.generation, 2);
        assert_eq!(r.image.as_deref(), Some("image-registry.openshift-image-registry.svc:5000/ml/iris@sha256:abc"));

        let failed = json!({"status": {"phase": "Error", "reason": "GenericBuildFailed"}});
        let r = reference_from_build("ml", "b", 1, &failed);
        assert_eq!(r.phase, BuildPhase::Failed);
        assert_eq!(r.message.as_deref(), Some("GenericBuildFailed"));
        assert_eq!(reference_from_build("ml", "b", 1, &json!({"status": {"phase": "New"}})).phase, BuildPhase::Pending);
    }

    #[test]
    fn latest_build_wins_by_number() {
        let older = json!({"metadata": {"annotations": {"openshift.io/build.number": "1"}}});
        let newer = json!({"metadata": {"annotations": {"openshift.io/build.number": "2"}}});
        assert!(build_number(&newer) > build_number(&older));
    }
}
