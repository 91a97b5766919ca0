use std::sync::Arc;

use nbv_core::*;
use nbv_kubectl::{Kubectl, ScriptedRunner};
use nbv_store::*;
use tempfile::tempdir;

fn job(name: &str) -> ValidationJob {
    let spec: JobSpec = serde_json::from_value(serde_json::json!({
        "notebook": {"git": {"url": "https://github.com/acme/nb.git"}, "path": "nb/iris.ipynb"},
        "podConfig": {"containerImage": "img:1"}
    }))
    .unwrap();
    ValidationJob::new(JobKey::new("ml", name), spec)
}

fn exercise(store: &dyn JobStore) {
    store.apply(job("a")).unwrap();
    store.apply(job("b")).unwrap();
    let keys: Vec<String> = store.list(Some("ml")).unwrap().iter().map(|j| j.key().to_string()).collect();
    assert_eq!(keys, vec!["ml/a".to_string(), "ml/b".to_string()]);
    assert!(store.list(Some("other")).unwrap().is_empty());

    let status = JobStatus { phase: Phase::Succeeded, observed_generation: 1, message: "3/3 cells matched".into(), ..JobStatus::default() };
    store.update_status(&JobKey::new("ml", "a"), &status).unwrap();
    assert_eq!(store.get(&JobKey::new("ml", "a")).unwrap().unwrap().status, status);

    let missing = store.update_status(&JobKey::new("ml", "gone"), &status).unwrap_err();
    assert!(StoreError::is_not_found(&missing));

    assert!(store.delete(&JobKey::new("ml", "b")).unwrap());
    assert!(!store.delete(&JobKey::new("ml", "b")).unwrap());
    assert!(store.get(&JobKey::new("ml", "b")).unwrap().is_none());
}

#[test]
fn test_memory_store_contract() {
    let store = InMemoryJobStore::new();
    exercise(&store);
    assert_eq!(store.status_writes(), 1);
}

#[test]
fn test_sqlite_store_contract_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nbv.db");
    {
        let store = SqliteJobStore::open(&path).unwrap();
        exercise(&store);
    }
    let reopened = SqliteJobStore::open(&path).unwrap();
    let job = reopened.get(&JobKey::new("ml", "a")).unwrap().unwrap();
    assert_eq!(job.status.phase, Phase::Succeeded);
    assert!(job.metadata.uid.is_some());
}

#[test]
fn test_kubectl_store_writes_status_subresource() {
    let obj = r#"{"apiVersion": "nbv.io/v1alpha1", "kind": "NotebookValidationJob",
        "metadata": {"name": "a", "namespace": "ml", "uid": "u-1", "generation": 2, "resourceVersion": "77"},
        "spec": {"notebook": {"git": {"url": "https://github.com/acme/nb.git"}, "path": "nb/iris.ipynb"}}}"#;
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("get notebookvalidationjobs.nbv.io a -n ml", obj)
            .on("replace --subresource=status", "")
            .fail("get notebookvalidationjobs.nbv.io gone", "Error from server (NotFound): notebookvalidationjobs.nbv.io \"gone\" not found"),
    );
    let store = KubectlJobStore::new(Kubectl::with_runner("kubectl", runner.clone()));

    let job = store.get(&JobKey::new("ml", "a")).unwrap().unwrap();
    assert_eq!(job.generation(), 2);

    let status = JobStatus { phase: Phase::Building, observed_generation: 2, ..JobStatus::default() };
    store.update_status(&job.key(), &status).unwrap();
    let call = runner.calls().into_iter().find(|c| c.line().contains("--subresource=status")).unwrap();
    let sent: serde_json::Value = serde_json::from_str(call.stdin.as_deref().unwrap()).unwrap();
    assert_eq!(sent["metadata"]["resourceVersion"], "77");
    assert_eq!(sent["status"]["phase"], "Building");

    assert!(store.get(&JobKey::new("ml", "gone")).unwrap().is_none());
    assert!(StoreError::is_not_found(&store.update_status(&JobKey::new("ml", "gone"), &status).unwrap_err()));
}
