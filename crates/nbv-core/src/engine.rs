use crate::conditions::{set_condition, set_condition_from_error, set_conditions_for_phase, ConditionStatus, BUILD_READY, PROGRESSING};
use crate::{redact::redact_text, Command, ErrorClass, ErrorReport, JobStatus, OperationError, Outcome, Phase, ReconcilePolicy, Requeue, Transition, ValidationJob};

/// Pure planner: decides the next command for a job from its spec and recorded status.
///
/// The imperative shell executes the command against the operation interfaces and feeds the
/// result back through `advance`.
pub fn plan(job: &ValidationJob, now_unix: i64, policy: &ReconcilePolicy) -> Command {
    let status = &job.status;
    if status.observed_generation != 0 && status.observed_generation != job.generation() {
        return Command::Restart { from_generation: status.observed_generation };
    }

    match status.phase {
        Phase::Pending => Command::Initialize,
        Phase::CredentialsResolving => Command::ResolveCredentials,
        Phase::Building => match (&job.spec.build, &status.build) {
            (None, _) => Command::SkipBuild { image: job.spec.pod_config.container_image.clone() },
            (Some(_), Some(build)) if build.generation == job.generation() => Command::PollBuild { build: build.clone() },
            (Some(_), _) => Command::StartBuild,
        },
        Phase::Dispatching => match &status.image {
            Some(image) => Command::Dispatch { image: image.clone() },
            None => abort("dispatching without an image"),
        },
        Phase::Executing => match (&status.pod, &status.image, &status.last_error) {
            // The last observation found the pod lost or unable to run; replace it with a new attempt.
            // Other transient errors (API outages) only repeat the observation.
            (Some(pod), Some(image), Some(err)) if err.replace_pod && err.phase == Phase::Executing => {
                Command::Redispatch { image: image.clone(), previous: pod.clone() }
            }
            (Some(pod), _, _) => Command::ObservePod { pod: pod.clone() },
            (None, _, _) => abort("executing without a pod"),
        },
        Phase::LogCollecting => match &status.pod {
            Some(pod) => Command::CollectLogs { pod: pod.clone() },
            None => abort("collecting logs without a pod"),
        },
        Phase::Evaluating => match &status.execution {
            Some(_) => Command::Evaluate,
            None => abort("evaluating without an execution result"),
        },
        Phase::Succeeded | Phase::Failed | Phase::Error => match &status.pod {
            Some(pod) if !status.pod_collected => {
                let retention = i64::try_from(policy.pod_retention_secs).unwrap_or(i64::MAX);
                let due = status.completion_time.unwrap_or(now_unix).saturating_add(retention);
                if now_unix >= due {
                    Command::CollectGarbage { pod: pod.clone() }
                } else {
                    Command::Wait { requeue_after_secs: Some(due.saturating_sub(now_unix).unsigned_abs()) }
                }
            }
            _ => Command::Wait { requeue_after_secs: None },
        },
    }
}

fn abort(what: &str) -> Command {
    Command::Abort { error: OperationError::Invariant(what.to_string()) }
}

/// Pure transition: applies an outcome to the job status and says when to look again.
pub fn advance(job: &ValidationJob, outcome: Outcome, now_unix: i64, policy: &ReconcilePolicy) -> Transition {
    let mut status = job.status.clone();
    let requeue = match outcome {
        Outcome::Initialized => {
            status.observed_generation = job.generation();
            status.start_time.get_or_insert(now_unix);
            enter(&mut status, Phase::CredentialsResolving, now_unix, "validation accepted");
            Requeue::Now
        }
        Outcome::CredentialsResolved { kind } => {
            enter(&mut status, Phase::Building, now_unix, format!("resolved {kind} git credentials"));
            Requeue::Now
        }
        Outcome::BuildSkipped { image } => {
            let msg = format!("no build configured, using image {image}");
            set_condition(&mut status.conditions, BUILD_READY, ConditionStatus::True, "BuildSkipped", "No build configured", now_unix);
            status.image = Some(image);
            enter(&mut status, Phase::Dispatching, now_unix, msg);
            Requeue::Now
        }
        Outcome::BuildStarted { build } => {
            status.message = format!("build {} started", build.name);
            status.build = Some(build);
            Requeue::AfterSecs(policy.build_poll_secs)
        }
        Outcome::BuildProgressed { build } => {
            status.message = format!("build {} is {}", build.name, lower(build.phase));
            set_condition(&mut status.conditions, PROGRESSING, ConditionStatus::True, "InProgress", "Build is in progress", now_unix);
            status.build = Some(build);
            Requeue::AfterSecs(policy.build_poll_secs)
        }
        Outcome::BuildSucceeded { build, image } => {
            let msg = format!("build {} produced {image}", build.name);
            set_condition(&mut status.conditions, BUILD_READY, ConditionStatus::True, "BuildComplete", msg.as_str(), now_unix);
            status.build = Some(build);
            status.image = Some(image);
            enter(&mut status, Phase::Dispatching, now_unix, msg);
            Requeue::Now
        }
        Outcome::PodDispatched { pod } => {
            let msg = format!("validation pod {} dispatched (attempt {})", pod.name, pod.attempt);
            status.attempt = pod.attempt;
            status.pod = Some(pod);
            status.pod_collected = false;
            enter(&mut status, Phase::Executing, now_unix, msg);
            Requeue::AfterSecs(policy.pod_poll_secs)
        }
        Outcome::PodRunning { pod } => {
            status.message = format!("validation pod {} is {}", pod.name, lower(pod.phase));
            status.pod = Some(pod);
            status.last_error = None;
            set_condition(&mut status.conditions, PROGRESSING, ConditionStatus::True, "InProgress", "Validation is running", now_unix);
            Requeue::AfterSecs(policy.pod_poll_secs)
        }
        Outcome::PodTerminated { pod } => {
            let msg = format!("validation pod {} finished", pod.name);
            status.pod = Some(pod);
            enter(&mut status, Phase::LogCollecting, now_unix, msg);
            Requeue::Now
        }
        Outcome::LogsParsed { execution, golden } => {
            let msg = format!("parsed {} cell results ({})", execution.cells.len(), lower(execution.status));
            status.execution = Some(execution);
            status.golden = golden;
            enter(&mut status, Phase::Evaluating, now_unix, msg);
            Requeue::Now
        }
        Outcome::Evaluated { outcome } => {
            let phase = if outcome.passed { Phase::Succeeded } else { Phase::Failed };
            let msg = outcome.summary.clone();
            status.outcome = Some(outcome);
            enter(&mut status, phase, now_unix, msg);
            status.completion_time = Some(now_unix);
            retention_requeue(&status, policy)
        }
        Outcome::GarbageCollected => {
            status.pod_collected = true;
            Requeue::Never
        }
        Outcome::Restarted => {
            let message = format!("spec changed to generation {}, restarting validation", job.generation());
            status = JobStatus { observed_generation: job.generation(), message, last_transition_time: Some(now_unix), ..JobStatus::default() };
            set_conditions_for_phase(&mut status.conditions, Phase::Pending, &status.message, now_unix);
            Requeue::Now
        }
        Outcome::Waited { requeue_after_secs } => requeue_after_secs.map(Requeue::AfterSecs).unwrap_or(Requeue::Never),
        Outcome::Failed { error } => return fail(job, status, error, now_unix, policy),
    };
    Transition { status, requeue }
}

fn fail(job: &ValidationJob, mut status: JobStatus, error: OperationError, now_unix: i64, policy: &ReconcilePolicy) -> Transition {
    let phase = status.phase;
    let class = error.class();
    let message = redact_text(&error.to_string());
    status.last_error = Some(ErrorReport { class, phase, component: error.component(), message: message.clone(), replace_pod: error.replaces_pod() });

    if phase.is_terminal() {
        // Only garbage collection runs in terminal phases; a failed delete is retried later.
        status.message = format!("pod cleanup failed: {message}");
        let requeue = Requeue::AfterSecs(policy.backoff_seconds(1));
        return Transition { status, requeue };
    }

    if class == ErrorClass::Transient {
        let attempts = {
            let count = status.retries.entry(phase).or_insert(0);
            *count += 1;
            *count
        };
        status.retry_count += 1;
        if attempts < policy.max_retries_per_phase {
            status.message = format!("{phase} attempt {attempts}/{} failed, retrying: {message}", policy.max_retries_per_phase);
            set_condition(&mut status.conditions, PROGRESSING, ConditionStatus::True, "Retrying", message.as_str(), now_unix);
            let requeue = Requeue::AfterSecs(policy.backoff_seconds(attempts));
            return Transition { status, requeue };
        }
        status.message = format!("{phase} failed after {attempts} attempts: {message}");
    } else {
        status.message = format!("{phase} failed: {message}");
    }

    status.phase = Phase::Error;
    status.last_transition_time = Some(now_unix);
    set_conditions_for_phase(&mut status.conditions, Phase::Error, &status.message, now_unix);
    set_condition_from_error(&mut status.conditions, &error, &message, now_unix);
    status.completion_time = Some(now_unix);
    if status.observed_generation == 0 {
        status.observed_generation = job.generation();
    }
    let requeue = retention_requeue(&status, policy);
    Transition { status, requeue }
}

fn enter(status: &mut JobStatus, phase: Phase, now_unix: i64, message: impl Into<String>) {
    status.phase = phase;
    status.last_transition_time = Some(now_unix);
    status.last_error = None;
    status.message = message.into();
    set_conditions_for_phase(&mut status.conditions, phase, &status.message, now_unix);
}

fn lower(value: impl std::fmt::Debug) -> String {
    format!("{value:?}").to_lowercase()
}

fn retention_requeue(status: &JobStatus, policy: &ReconcilePolicy) -> Requeue {
    match &status.pod {
        Some(_) if !status.pod_collected => Requeue::AfterSecs(policy.pod_retention_secs),
        _ => Requeue::Never,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    fn job() -> ValidationJob {
        let spec: JobSpec = serde_json::from_value(serde_json::json!({
            "notebook": {"git": {"url": "https://github.com/acme/nb.git"}, "path": "a.ipynb"},
            "podConfig": {"containerImage": "img:1"}
        }))
        .unwrap();
        ValidationJob::new(JobKey::new("ns", "j"), spec)
    }

    #[test]
    fn pending_job_initializes() {
        assert_eq!(plan(&job(), 0, &ReconcilePolicy::default()), Command::Initialize);
    }

    #[test]
    fn building_without_build_spec_skips() {
        let mut j = job();
        j.status.phase = Phase::Building;
        j.status.observed_generation = 1;
        assert_eq!(plan(&j, 0, &ReconcilePolicy::default()), Command::SkipBuild { image: "img:1".into() });
    }

    #[test]
    fn terminal_error_leaves_no_requeue_without_pod() {
        let mut j = job();
        j.status.phase = Phase::CredentialsResolving;
        j.status.observed_generation = 1;
        let t = advance(&j, Outcome::Failed { error: OperationError::CredentialNotFound { reference: "s".into() } }, 5, &ReconcilePolicy::default());
        assert_eq!(t.status.phase, Phase::Error);
        assert_eq!(t.requeue, Requeue::Never);
        assert_eq!(t.status.retry_count, 0);
    }
}
