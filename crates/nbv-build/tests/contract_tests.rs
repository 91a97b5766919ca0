use std::sync::Arc;

use nbv_build::*;
use nbv_core::{BuildPhase, BuildStrategy, JobKey, JobSpec, OperationError, ValidationJob};
use nbv_kubectl::{Kubectl, ScriptedRunner};
use serde_json::json;

fn job(strategy: &str) -> ValidationJob {
    let spec: JobSpec = serde_json::from_value(json!({
        "notebook": {"git": {"url": "https://github.com/acme/nb.git", "credentialsSecret": "git-token"}, "path": "nb/iris.ipynb"},
        "build": {"strategy": strategy}
    }))
    .unwrap();
    let mut job = ValidationJob::new(JobKey::new("ml", "iris"), spec);
    job.metadata.generation = 3;
    job
}

#[test]
fn test_fake_backend_passes_contract() {
    let fake = FakeBuildBackend::new(BuildStrategy::S2i);
    run_build_contract_suite(&fake, &job("s2i")).unwrap();
    assert_eq!(fake.creates(), 1);
}

#[test]
fn test_tekton_backend_passes_contract() {
    let run = json!({
        "metadata": {"name": "iris-build-g3", "labels": {"nbv.io/generation": "3"}},
        "spec": {"params": [{"name": "image-reference", "value": "reg/ml/iris:g3"}]},
        "status": {"conditions": [{"type": "Succeeded", "status": "Unknown"}]}
    })
    .to_string();
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail_once("get pipelinerun iris-build-g3", "Error from server (NotFound): pipelineruns \"iris-build-g3\" not found")
            .on("get pipelinerun iris-build-g3", &run)
            .on("apply -f -", "")
            .on("create -f -", ""),
    );
    let backend = TektonBackend::new(Kubectl::with_runner("kubectl", runner.clone()));
    run_build_contract_suite(&backend, &job("tekton")).unwrap();

    let created = runner.calls().into_iter().find(|c| c.line().contains("create -f -")).unwrap();
    let stdin = created.stdin.unwrap();
    assert!(stdin.contains("\"pipelineRef\":{\"name\":\"nbv-notebook-build\"}"), "{stdin}");
    assert!(stdin.contains("git-token"));
}

#[test]
fn test_s2i_backend_passes_contract() {
    let builds = json!({"items": [{
        "metadata": {"name": "iris-build-g3-1", "labels": {"nbv.io/generation": "3"}, "annotations": {"openshift.io/build.number": "1"}},
        "status": {"phase": "Running"}
    }]})
    .to_string();
    let runner = Arc::new(
        ScriptedRunner::new()
            .once("get builds", r#"{"items":[]}"#)
            .on("get builds", &builds)
            .on("apply -f -", "")
            .on("start-build iris-build-g3", "build.build.openshift.io/iris-build-g3-1"),
    );
    let backend = S2iBackend::new(Kubectl::with_runner("oc", runner.clone()));
    run_build_contract_suite(&backend, &job("s2i")).unwrap();
    assert_eq!(runner.count("start-build"), 1);
}

#[test]
fn test_orchestrator_start_is_idempotent_per_generation() {
    let fake = Arc::new(FakeBuildBackend::new(BuildStrategy::Tekton));
    let orch = BuildOrchestrator::new(BackendRegistry::new().register(fake.clone()));
    let j = job("tekton");

    let first = orch.start_build(&j).unwrap();
    let second = orch.start_build(&j).unwrap();
    assert_eq!(first.name, "iris-build-g3");
    assert_eq!(first.name, second.name);
    assert_eq!(fake.creates(), 1);

    let mut next = j.clone();
    next.metadata.generation = 4;
    assert_eq!(orch.start_build(&next).unwrap().name, "iris-build-g4");
    assert_eq!(fake.creates(), 2);
}

#[test]
fn test_orchestrator_polls_until_image() {
    let fake = Arc::new(FakeBuildBackend::new(BuildStrategy::S2i));
    fake.script_phase(BuildPhase::Running);
    fake.fail_next_status(OperationError::BuildTransientError("api timeout".into()));
    let orch = BuildOrchestrator::new(BackendRegistry::new().register(fake.clone()));
    let build = orch.start_build(&job("s2i")).unwrap();

    assert_eq!(orch.build_status(&build).unwrap().phase, BuildPhase::Running);
    assert!(orch.build_status(&build).unwrap_err().class().is_retryable());
    let done = orch.build_status(&build).unwrap();
    assert_eq!(done.phase, BuildPhase::Succeeded);
    assert_eq!(done.image.as_deref(), Some("image-registry.openshift-image-registry.svc:5000/ml/iris:g3"));
    assert_eq!(fake.polls(), 3);
}

#[test]
fn test_transient_cli_failures_are_retryable() {
    let runner = Arc::new(ScriptedRunner::new().fail("get builds", "Unable to connect to the server: dial tcp 10.0.0.1:6443: i/o timeout"));
    let backend = S2iBackend::new(Kubectl::with_runner("oc", runner));
    let err = backend.find_build("ml", "iris-build-g3").unwrap_err();
    assert!(matches!(err, OperationError::BuildTransientError(_)));
}
