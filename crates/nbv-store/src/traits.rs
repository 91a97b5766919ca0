use nbv_core::{JobKey, JobStatus, ValidationJob};
use thiserror::Error;

/// Typed failures carried inside the `anyhow::Error` a store returns; callers downcast when
/// they need to tell a vanished job from an outage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation job {0} not found")]
    NotFound(JobKey),
    #[error("validation job {key} was modified concurrently: {message}")]
    Conflict { key: JobKey, message: String },
}

impl StoreError {
    pub fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<StoreError>(), Some(StoreError::NotFound(_)))
    }
}

/// Where ValidationJobs live: the cluster, a local sqlite file, or memory.
pub trait JobStore: Send + Sync {
    /// Jobs in `namespace`, or in every namespace when `None`.
    fn list(&self, namespace: Option<&str>) -> anyhow::Result<Vec<ValidationJob>>;

    fn get(&self, key: &JobKey) -> anyhow::Result<Option<ValidationJob>>;

    /// Writes the status subresource only; the spec is never touched.
    fn update_status(&self, key: &JobKey, status: &JobStatus) -> anyhow::Result<()>;

    /// Creates the job or replaces its spec. A changed spec bumps the generation.
    fn apply(&self, job: ValidationJob) -> anyhow::Result<ValidationJob>;

    fn delete(&self, key: &JobKey) -> anyhow::Result<bool>;
}

/// Merges an incoming job into the stored one the way the API server does: same uid, status
/// kept, generation bumped only when the spec changed.
pub fn merge_applied(existing: Option<ValidationJob>, mut incoming: ValidationJob) -> ValidationJob {
    match existing {
        Some(mut current) => {
            if current.spec != incoming.spec {
                current.spec = incoming.spec;
                current.metadata.generation += 1;
            }
            current.metadata.labels = incoming.metadata.labels;
            current
        }
        None => {
            incoming.metadata.generation = 1;
            incoming.metadata.uid.get_or_insert_with(nbv_core::JobUid::new);
            incoming.status = JobStatus::default();
            incoming
        }
    }
}
