use serde::{Deserialize, Serialize};

use crate::{Component, OperationError, Phase};

pub const BUILD_READY: &str = "BuildReady";
pub const VALIDATION_READY: &str = "ValidationReady";
pub const PROGRESSING: &str = "Progressing";
pub const AVAILABLE: &str = "Available";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Kubernetes-style status condition, one per `type`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: i64,
}

/// Upserts a condition. The transition time only moves when the status does.
pub fn set_condition(conditions: &mut Vec<Condition>, type_: &str, status: ConditionStatus, reason: &str, message: impl Into<String>, now_unix: i64) {
    let mut next = Condition { type_: type_.to_string(), status, reason: reason.to_string(), message: message.into(), last_transition_time: now_unix };
    match conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(existing) => {
            if existing.status == status {
                next.last_transition_time = existing.last_transition_time;
            }
            *existing = next;
        }
        None => conditions.push(next),
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Conditions implied by entering `phase`. `message` is the status message of the transition.
pub fn set_conditions_for_phase(conditions: &mut Vec<Condition>, phase: Phase, message: &str, now_unix: i64) {
    use ConditionStatus::*;
    let mut set = |type_: &str, status, reason: &str, msg: &str| set_condition(conditions, type_, status, reason, msg, now_unix);
    match phase {
        Phase::Pending => {
            set(PROGRESSING, False, "WaitingForDependency", "Waiting for resources");
            set(AVAILABLE, False, "Unknown", "Job pending");
        }
        Phase::CredentialsResolving => {
            set(PROGRESSING, True, "InProgress", "Job is initializing");
            set(BUILD_READY, Unknown, "BuildPending", "Build not started");
            set(VALIDATION_READY, Unknown, "ValidationPending", "Waiting for initialization");
            set(AVAILABLE, False, "Unknown", "Job not yet available");
        }
        Phase::Building => {
            set(PROGRESSING, True, "InProgress", "Build is in progress");
            set(BUILD_READY, False, "BuildInProgress", "Building container image");
            set(VALIDATION_READY, False, "WaitingForBuild", "Waiting for build to complete");
        }
        Phase::Dispatching => {
            set(PROGRESSING, True, "InProgress", "Image ready, starting validation");
            set(VALIDATION_READY, False, "ValidationPending", "Validation starting");
        }
        Phase::Executing | Phase::LogCollecting | Phase::Evaluating => {
            set(PROGRESSING, True, "InProgress", "Validation is running");
            set(VALIDATION_READY, False, "ValidationInProgress", message);
            set(AVAILABLE, False, "Unknown", "Validation in progress");
        }
        Phase::Succeeded => {
            set(PROGRESSING, False, "Succeeded", "Job completed successfully");
            set(VALIDATION_READY, True, "ValidationComplete", message);
            set(AVAILABLE, True, "Succeeded", "Job succeeded");
        }
        Phase::Failed => {
            set(PROGRESSING, False, "Failed", "Job failed");
            set(VALIDATION_READY, False, "ValidationFailed", message);
            set(AVAILABLE, False, "Failed", message);
        }
        Phase::Error => {
            set(PROGRESSING, False, "Failed", "Job stopped on an error");
            set(AVAILABLE, False, "Failed", message);
        }
    }
}

/// The condition a terminal error reports against, picked from the component it came from.
pub fn set_condition_from_error(conditions: &mut Vec<Condition>, error: &OperationError, message: &str, now_unix: i64) {
    let (type_, reason) = match (error.component(), error) {
        (Component::CredentialResolver, _) => (BUILD_READY, "GitAuthenticationFailed"),
        (Component::BuildOrchestrator, _) => (BUILD_READY, "BuildFailed"),
        (Component::ExecutionDispatcher, _) => (VALIDATION_READY, "PodCreationFailed"),
        (_, OperationError::LogCollectionTimeout { .. }) => (VALIDATION_READY, "ValidationTimeout"),
        (Component::LogCollector | Component::ResultEvaluator, _) => (VALIDATION_READY, "ValidationFailed"),
        (Component::SpecValidation | Component::Controller, _) => (PROGRESSING, "Failed"),
    };
    set_condition(conditions, type_, ConditionStatus::False, reason, message, now_unix);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_time_moves_only_with_status() {
        let mut cs = Vec::new();
        set_condition(&mut cs, PROGRESSING, ConditionStatus::True, "InProgress", "a", 10);
        set_condition(&mut cs, PROGRESSING, ConditionStatus::True, "InProgress", "b", 20);
        assert_eq!(cs.len(), 1);
        assert_eq!((cs[0].last_transition_time, cs[0].message.as_str()), (10, "b"));
        set_condition(&mut cs, PROGRESSING, ConditionStatus::False, "Failed", "c", 30);
        assert_eq!(cs[0].last_transition_time, 30);
    }

    #[test]
    fn errors_land_on_their_component_condition() {
        let mut cs = Vec::new();
        set_condition_from_error(&mut cs, &OperationError::CredentialNotFound { reference: "s".into() }, "missing", 1);
        assert_eq!(find_condition(&cs, BUILD_READY).map(|c| c.reason.as_str()), Some("GitAuthenticationFailed"));
        set_condition_from_error(&mut cs, &OperationError::LogCollectionTimeout { pod: "p".into(), timeout_secs: 60 }, "slow", 2);
        assert_eq!(find_condition(&cs, VALIDATION_READY).map(|c| c.reason.as_str()), Some("ValidationTimeout"));
        assert!(!is_condition_true(&cs, VALIDATION_READY));
    }

    #[test]
    fn serializes_with_kubernetes_field_names() {
        let mut cs = Vec::new();
        set_condition(&mut cs, AVAILABLE, ConditionStatus::True, "Succeeded", "ok", 5);
        let v = serde_json::to_value(&cs[0]).unwrap();
        assert_eq!(v["type"], "Available");
        assert_eq!(v["status"], "True");
        assert_eq!(v["lastTransitionTime"], 5);
    }
}
