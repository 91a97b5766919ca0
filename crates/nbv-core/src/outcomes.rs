use crate::{error::OperationError, model::CredentialKind, results::*, types::*};

/// Result of executing a `Command`, fed back into `engine::advance`.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Initialized,
    CredentialsResolved { kind: CredentialKind },
    BuildSkipped { image: String },
    BuildStarted { build: BuildReference },
    BuildProgressed { build: BuildReference },
    BuildSucceeded { build: BuildReference, image: String },
    PodDispatched { pod: ExecutionPod },
    PodRunning { pod: ExecutionPod },
    PodTerminated { pod: ExecutionPod },
    LogsParsed { execution: NotebookExecutionResult, golden: Option<GoldenNotebook> },
    Evaluated { outcome: ValidationOutcome },
    GarbageCollected,
    Restarted,
    Waited { requeue_after_secs: Option<u64> },
    Failed { error: OperationError },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requeue {
    Now,
    AfterSecs(u64),
    Never,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub status: JobStatus,
    pub requeue: Requeue,
}
