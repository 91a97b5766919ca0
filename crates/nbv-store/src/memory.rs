use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use nbv_core::{JobKey, JobStatus, ValidationJob};

use crate::traits::{merge_applied, JobStore, StoreError};

/// In-memory store for tests. Counts status writes so idempotence can be asserted.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    jobs: BTreeMap<JobKey, ValidationJob>,
    status_writes: usize,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job(self, job: ValidationJob) -> Self {
        self.lock().jobs.insert(job.key(), job);
        self
    }

    pub fn status_writes(&self) -> usize {
        self.lock().status_writes
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl JobStore for InMemoryJobStore {
    fn list(&self, namespace: Option<&str>) -> anyhow::Result<Vec<ValidationJob>> {
        Ok(self.lock().jobs.values().filter(|j| namespace.map_or(true, |ns| j.metadata.namespace == ns)).cloned().collect())
    }

    fn get(&self, key: &JobKey) -> anyhow::Result<Option<ValidationJob>> {
        Ok(self.lock().jobs.get(key).cloned())
    }

    fn update_status(&self, key: &JobKey, status: &JobStatus) -> anyhow::Result<()> {
        let mut inner = self.lock();
        let job = inner.jobs.get_mut(key).ok_or_else(|| StoreError::NotFound(key.clone()))?;
        job.status = status.clone();
        inner.status_writes += 1;
        Ok(())
    }

    fn apply(&self, job: ValidationJob) -> anyhow::Result<ValidationJob> {
        let mut inner = self.lock();
        let key = job.key();
        let merged = merge_applied(inner.jobs.remove(&key), job);
        inner.jobs.insert(key, merged.clone());
        Ok(merged)
    }

    fn delete(&self, key: &JobKey) -> anyhow::Result<bool> {
        Ok(self.lock().jobs.remove(key).is_some())
    }
}
