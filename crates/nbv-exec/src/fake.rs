use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use nbv_core::{OperationError, PodPhase};
use serde_json::Value;

use crate::pod::{parse_pod, ContainerState, PodApi, PodInfo, VALIDATOR_CONTAINER};

/// In-memory cluster for dispatcher tests. Pods are keyed by name.
#[derive(Default)]
pub struct FakePodApi {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    pods: BTreeMap<String, (PodInfo, Value)>,
    secrets: BTreeMap<String, Value>,
    create_errors: VecDeque<OperationError>,
    get_errors: VecDeque<OperationError>,
    creates: usize,
    deletes: Vec<String>,
}

impl FakePodApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, name: &str, f: impl FnOnce(&mut PodInfo)) {
        if let Some((pod, _)) = self.lock().pods.get_mut(name) {
            f(pod);
        }
    }

    pub fn set_phase(&self, name: &str, phase: PodPhase) {
        self.update(name, |p| p.phase = phase);
    }

    /// Puts a container into `waiting` with the given kubelet reason.
    pub fn set_waiting(&self, name: &str, container: &str, reason: &str) {
        self.update(name, |p| {
            let state = ContainerState { name: container.to_string(), waiting_reason: Some(reason.to_string()), ..ContainerState::default() };
            let list = if container == VALIDATOR_CONTAINER { &mut p.containers } else { &mut p.init_containers };
            list.retain(|c| c.name != container);
            list.push(state);
        });
    }

    /// Terminates the validator container and moves the pod to the matching phase.
    pub fn finish(&self, name: &str, exit_code: i32) {
        self.update(name, |p| {
            p.containers.retain(|c| c.name != VALIDATOR_CONTAINER);
            p.containers.push(ContainerState {
                name: VALIDATOR_CONTAINER.to_string(),
                terminated_reason: Some(if exit_code == 0 { "Completed" } else { "Error" }.to_string()),
                exit_code: Some(exit_code),
                ..ContainerState::default()
            });
            p.phase = if exit_code == 0 { PodPhase::Succeeded } else { PodPhase::Failed };
        });
    }

    /// Simulates the pod vanishing (node loss, manual delete).
    pub fn remove(&self, name: &str) {
        self.lock().pods.remove(name);
    }

    pub fn fail_next_create(&self, err: OperationError) {
        self.lock().create_errors.push_back(err);
    }

    /// The next `get_pod` fails with `err`, as during an API server outage.
    pub fn fail_next_get(&self, err: OperationError) {
        self.lock().get_errors.push_back(err);
    }

    pub fn manifest(&self, name: &str) -> Option<Value> {
        self.lock().pods.get(name).map(|(_, m)| m.clone())
    }

    pub fn secret(&self, name: &str) -> Option<Value> {
        self.lock().secrets.get(name).cloned()
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.lock().pods.keys().cloned().collect()
    }

    pub fn creates(&self) -> usize {
        self.lock().creates
    }

    pub fn deleted(&self) -> Vec<String> {
        self.lock().deletes.clone()
    }
}

fn name_of(manifest: &Value) -> String {
    manifest.pointer("/metadata/name").and_then(Value::as_str).unwrap_or_default().to_string()
}

impl PodApi for FakePodApi {
    fn get_pod(&self, _namespace: &str, name: &str) -> Result<Option<PodInfo>, OperationError> {
        let mut inner = self.lock();
        if let Some(err) = inner.get_errors.pop_front() {
            return Err(err);
        }
        Ok(inner.pods.get(name).map(|(p, _)| p.clone()))
    }

    fn find_active_pods(&self, namespace: &str, selector: &BTreeMap<String, String>) -> Result<Vec<PodInfo>, OperationError> {
        Ok(self
            .lock()
            .pods
            .values()
            .map(|(p, _)| p)
            .filter(|p| p.namespace == namespace && !p.deleting)
            .filter(|p| selector.iter().all(|(k, v)| p.label(k) == Some(v.as_str())))
            .cloned()
            .collect())
    }

    fn create_pod(&self, manifest: &Value) -> Result<PodInfo, OperationError> {
        let mut inner = self.lock();
        if let Some(err) = inner.create_errors.pop_front() {
            return Err(err);
        }
        let name = name_of(manifest);
        if let Some((existing, _)) = inner.pods.get(&name) {
            return Ok(existing.clone());
        }
        inner.creates += 1;
        let pod = parse_pod(manifest);
        inner.pods.insert(name, (pod.clone(), manifest.clone()));
        Ok(pod)
    }

    fn delete_pod(&self, _namespace: &str, name: &str) -> Result<(), OperationError> {
        let mut inner = self.lock();
        inner.pods.remove(name);
        inner.deletes.push(name.to_string());
        Ok(())
    }

    fn apply_secret(&self, manifest: &Value) -> Result<(), OperationError> {
        self.lock().secrets.insert(name_of(manifest), manifest.clone());
        Ok(())
    }

    fn delete_secret(&self, _namespace: &str, name: &str) -> Result<(), OperationError> {
        self.lock().secrets.remove(name);
        Ok(())
    }
}
