use std::collections::BTreeMap;

use nbv_core::{ExecutionPod, OperationError, PodPhase};
use serde_json::Value;

pub const LABEL_JOB: &str = "nbv.io/job";
pub const LABEL_GENERATION: &str = "nbv.io/generation";
pub const LABEL_ATTEMPT: &str = "nbv.io/attempt";
pub const LABEL_SPEC_DIGEST: &str = "nbv.io/spec-digest";
pub const VALIDATOR_CONTAINER: &str = "validator";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerState {
    pub name: String,
    pub waiting_reason: Option<String>,
    pub waiting_message: Option<String>,
    pub terminated_reason: Option<String>,
    pub exit_code: Option<i32>,
}

/// The parts of a pod object the dispatcher and analyzer look at.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub phase: PodPhase,
    pub init_containers: Vec<ContainerState>,
    pub containers: Vec<ContainerState>,
    /// `PodScheduled=False` reason and message, when scheduling is stuck.
    pub unschedulable: Option<String>,
    pub deleting: bool,
}

impl PodInfo {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn generation(&self) -> i64 {
        self.label(LABEL_GENERATION).and_then(|g| g.parse().ok()).unwrap_or(0)
    }

    pub fn attempt(&self) -> u32 {
        self.label(LABEL_ATTEMPT).and_then(|a| a.parse().ok()).unwrap_or(0)
    }

    pub fn validator(&self) -> Option<&ContainerState> {
        self.containers.iter().find(|c| c.name == VALIDATOR_CONTAINER)
    }

    pub fn to_execution_pod(&self) -> ExecutionPod {
        let reason = self
            .init_containers
            .iter()
            .chain(self.containers.iter())
            .find_map(|c| c.waiting_reason.clone().or_else(|| c.terminated_reason.clone().filter(|r| r != "Completed")))
            .or_else(|| self.unschedulable.as_ref().map(|_| "Unschedulable".to_string()));
        ExecutionPod {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            generation: self.generation(),
            attempt: self.attempt(),
            phase: self.phase,
            reason,
            message: self.unschedulable.clone(),
            exit_code: self.validator().and_then(|c| c.exit_code),
            spec_digest: self.label(LABEL_SPEC_DIGEST).map(str::to_string),
        }
    }
}

/// Pod and secret operations the dispatcher needs from the cluster.
pub trait PodApi: Send + Sync {
    fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodInfo>, OperationError>;

    /// Pods matching every label in `selector`, excluding ones already being deleted.
    fn find_active_pods(&self, namespace: &str, selector: &BTreeMap<String, String>) -> Result<Vec<PodInfo>, OperationError>;

    fn create_pod(&self, manifest: &Value) -> Result<PodInfo, OperationError>;

    fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), OperationError>;

    fn apply_secret(&self, manifest: &Value) -> Result<(), OperationError>;

    fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), OperationError>;
}

fn str_at<'a>(v: &'a Value, pointer: &str) -> Option<&'a str> {
    v.pointer(pointer).and_then(Value::as_str)
}

fn container_states(v: Option<&Value>) -> Vec<ContainerState> {
    v.and_then(Value::as_array)
        .map(|statuses| {
            statuses
                .iter()
                .map(|s| ContainerState {
                    name: str_at(s, "/name").unwrap_or_default().to_string(),
                    waiting_reason: str_at(s, "/state/waiting/reason").map(str::to_string),
                    waiting_message: str_at(s, "/state/waiting/message").map(str::to_string),
                    terminated_reason: str_at(s, "/state/terminated/reason").map(str::to_string),
                    exit_code: s.pointer("/state/terminated/exitCode").and_then(Value::as_i64).map(|c| c as i32),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Reads a Kubernetes Pod object.
pub fn parse_pod(obj: &Value) -> PodInfo {
    let labels = obj
        .pointer("/metadata/labels")
        .and_then(Value::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string())).collect())
        .unwrap_or_default();
    let unschedulable = obj
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .and_then(|cs| {
            cs.iter().find(|c| {
                c.get("type").and_then(Value::as_str) == Some("PodScheduled")
                    && c.get("status").and_then(Value::as_str) == Some("False")
                    && c.get("reason").and_then(Value::as_str) == Some("Unschedulable")
            })
        })
        .map(|c| c.get("message").and_then(Value::as_str).unwrap_or("pod is unschedulable").to_string());
    PodInfo {
        name: str_at(obj, "/metadata/name").unwrap_or_default().to_string(),
        namespace: str_at(obj, "/metadata/namespace").unwrap_or("default").to_string(),
        labels,
        phase: PodPhase::from_k8s(str_at(obj, "/status/phase").unwrap_or("Pending")),
        init_containers: container_states(obj.pointer("/status/initContainerStatuses")),
        containers: container_states(obj.pointer("/status/containerStatuses")),
        unschedulable,
        deleting: obj.pointer("/metadata/deletionTimestamp").is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_pod_status() {
        let obj = json!({
            "metadata": {"name": "iris-g2-a1", "namespace": "ml", "labels": {"nbv.io/generation": "2", "nbv.io/attempt": "1"}},
            "status": {
                "phase": "Failed",
                "initContainerStatuses": [{"name": "git-clone", "state": {"terminated": {"reason": "Completed", "exitCode": 0}}}],
                "containerStatuses": [{"name": "validator", "state": {"terminated": {"reason": "Error", "exitCode": 1}}}]
            }
        });
        let pod = parse_pod(&obj);
        assert_eq!(pod.phase, PodPhase::Failed);
        let ep = pod.to_execution_pod();
        assert_eq!((ep.generation, ep.attempt, ep.exit_code), (2, 1, Some(1)));
        assert_eq!(ep.reason.as_deref(), Some("Error"));
    }

    #[test]
    fn detects_unschedulable() {
        let obj = json!({
            "metadata": {"name": "p", "deletionTimestamp": "2024-01-01T00:00:00Z"},
            "status": {"phase": "Pending", "conditions": [{"type": "PodScheduled", "status": "False", "reason": "Unschedulable", "message": "0/3 nodes available"}]}
        });
        let pod = parse_pod(&obj);
        assert!(pod.deleting);
        assert_eq!(pod.unschedulable.as_deref(), Some("0/3 nodes available"));
        assert_eq!(pod.to_execution_pod().reason.as_deref(), Some("Unschedulable"));
    }
}
