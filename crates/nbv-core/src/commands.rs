use crate::{error::OperationError, types::*};

/// What the shell should do next for one job. Produced by `engine::plan`.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Initialize,
    ResolveCredentials,
    /// No build configured: run on the pod's own container image.
    SkipBuild { image: String },
    StartBuild,
    PollBuild { build: BuildReference },
    Dispatch { image: String },
    /// Tear down a lost or stuck pod and start the next attempt.
    Redispatch { image: String, previous: ExecutionPod },
    ObservePod { pod: ExecutionPod },
    CollectLogs { pod: ExecutionPod },
    Evaluate,
    CollectGarbage { pod: ExecutionPod },
    Restart { from_generation: i64 },
    /// The status itself is inconsistent; the shell reports this back as a failure.
    Abort { error: OperationError },
    Wait { requeue_after_secs: Option<u64> },
}
