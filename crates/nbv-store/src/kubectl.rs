use anyhow::{Context, Result};
use nbv_core::{JobKey, JobStatus, ValidationJob};
use nbv_kubectl::{Kubectl, KubectlError};
use serde_json::Value;
use tracing::warn;

use crate::traits::{JobStore, StoreError};

pub const RESOURCE: &str = "notebookvalidationjobs.nbv.io";

/// ValidationJob custom resources through kubectl.
pub struct KubectlJobStore {
    kubectl: Kubectl,
}

impl KubectlJobStore {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }
}

fn store_error(key: &JobKey, err: KubectlError) -> anyhow::Error {
    let text = err.to_string();
    if err.is_not_found() {
        StoreError::NotFound(key.clone()).into()
    } else if text.contains("the object has been modified") || text.contains("Conflict") {
        StoreError::Conflict { key: key.clone(), message: text }.into()
    } else {
        anyhow::Error::new(err).context(format!("kubectl request for {key}"))
    }
}

impl JobStore for KubectlJobStore {
    fn list(&self, namespace: Option<&str>) -> Result<Vec<ValidationJob>> {
        let items = self.kubectl.list(RESOURCE, namespace, None).context("list validation jobs")?;
        Ok(items
            .into_iter()
            .filter_map(|item| {
                let name = item.pointer("/metadata/name").and_then(Value::as_str).unwrap_or("?").to_string();
                serde_json::from_value::<ValidationJob>(item).map_err(|e| warn!(job = %name, error = %e, "skipping unreadable validation job")).ok()
            })
            .collect())
    }

    fn get(&self, key: &JobKey) -> Result<Option<ValidationJob>> {
        let obj = self.kubectl.get(RESOURCE, &key.namespace, &key.name).map_err(|e| store_error(key, e))?;
        obj.map(|o| serde_json::from_value(o).with_context(|| format!("decode validation job {key}"))).transpose()
    }

    /// Read-modify-write of the status subresource; the fetched `resourceVersion` makes a
    /// concurrent writer fail with a conflict instead of being overwritten.
    fn update_status(&self, key: &JobKey, status: &JobStatus) -> Result<()> {
        let mut obj = self
            .kubectl
            .get(RESOURCE, &key.namespace, &key.name)
            .map_err(|e| store_error(key, e))?
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        obj["status"] = serde_json::to_value(status)?;
        self.kubectl.replace_status(&obj).map_err(|e| store_error(key, e))?;
        Ok(())
    }

    fn apply(&self, job: ValidationJob) -> Result<ValidationJob> {
        let key = job.key();
        let mut manifest = serde_json::to_value(&job)?;
        if let Some(obj) = manifest.as_object_mut() {
            obj.remove("status");
        }
        if let Some(meta) = manifest.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.remove("uid");
            meta.remove("generation");
        }
        let applied = self.kubectl.apply(&manifest).map_err(|e| store_error(&key, e))?;
        serde_json::from_value(applied).with_context(|| format!("decode applied validation job {key}"))
    }

    fn delete(&self, key: &JobKey) -> Result<bool> {
        self.kubectl.delete(RESOURCE, &key.namespace, &key.name).map_err(|e| store_error(key, e))
    }
}
