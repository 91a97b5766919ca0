use std::collections::BTreeMap;

use nbv_core::OperationError;
use nbv_kubectl::{Kubectl, KubectlError};
use serde_json::Value;
use tracing::debug;

use crate::pod::{parse_pod, PodApi, PodInfo};

/// `PodApi` over the kubectl CLI.
pub struct KubectlPodApi {
    kubectl: Kubectl,
}

impl KubectlPodApi {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }
}

/// Quota exhaustion and API outages clear up on their own; rejected manifests do not.
pub fn dispatch_error(action: &str, err: KubectlError) -> OperationError {
    let detail = format!("{action}: {err}");
    if err.is_transient() || err.is_quota_exceeded() {
        OperationError::DispatchFailed(detail)
    } else if err.is_forbidden() || err.is_invalid() {
        OperationError::DispatchRejected(detail)
    } else {
        OperationError::DispatchFailed(detail)
    }
}

fn selector_arg(selector: &BTreeMap<String, String>) -> String {
    selector.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

impl PodApi for KubectlPodApi {
    fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodInfo>, OperationError> {
        let obj = self.kubectl.get("pod", namespace, name).map_err(|e| dispatch_error("get pod", e))?;
        Ok(obj.as_ref().map(parse_pod))
    }

    fn find_active_pods(&self, namespace: &str, selector: &BTreeMap<String, String>) -> Result<Vec<PodInfo>, OperationError> {
        let selector = selector_arg(selector);
        let items = self.kubectl.list("pod", Some(namespace), Some(&selector)).map_err(|e| dispatch_error("list pods", e))?;
        Ok(items.iter().map(parse_pod).filter(|p| !p.deleting).collect())
    }

    /// Creating a pod that already exists returns the existing one; names are per attempt.
    fn create_pod(&self, manifest: &Value) -> Result<PodInfo, OperationError> {
        match self.kubectl.create(manifest) {
            Ok(created) => {
                let pod = parse_pod(&created);
                debug!(pod = %pod.name, namespace = %pod.namespace, "pod created");
                Ok(pod)
            }
            Err(e) if e.is_already_exists() => {
                let namespace = manifest.pointer("/metadata/namespace").and_then(Value::as_str).unwrap_or("default");
                let name = manifest.pointer("/metadata/name").and_then(Value::as_str).unwrap_or_default();
                self.get_pod(namespace, name)?
                    .ok_or_else(|| OperationError::DispatchFailed(format!("pod {name} reported as existing but not found")))
            }
            Err(e) => Err(dispatch_error("create pod", e)),
        }
    }

    fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), OperationError> {
        self.kubectl.delete("pod", namespace, name).map(|_| ()).map_err(|e| dispatch_error("delete pod", e))
    }

    fn apply_secret(&self, manifest: &Value) -> Result<(), OperationError> {
        self.kubectl.apply(manifest).map(|_| ()).map_err(|e| dispatch_error("apply credentials secret", e))
    }

    fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), OperationError> {
        self.kubectl.delete("secret", namespace, name).map(|_| ()).map_err(|e| dispatch_error("delete credentials secret", e))
    }
}
