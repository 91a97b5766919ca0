use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure taxonomy. The engine decides retry vs terminal from this alone.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    TerminalUser,
    TerminalSystem,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        self == ErrorClass::Transient
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    SpecValidation,
    CredentialResolver,
    BuildOrchestrator,
    ExecutionDispatcher,
    LogCollector,
    ResultEvaluator,
    Controller,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Component::SpecValidation => "spec-validation",
            Component::CredentialResolver => "credential-resolver",
            Component::BuildOrchestrator => "build-orchestrator",
            Component::ExecutionDispatcher => "execution-dispatcher",
            Component::LogCollector => "log-collector",
            Component::ResultEvaluator => "result-evaluator",
            Component::Controller => "controller",
        })
    }
}

/// Typed failure returned by every operation interface. The class of each variant is fixed here.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum OperationError {
    #[error("invalid job spec: {0}")]
    InvalidSpec(String),

    #[error("credential reference '{reference}' not found in any secret source")]
    CredentialNotFound { reference: String },

    #[error("credential '{reference}' is malformed: {reason}")]
    CredentialMalformed { reference: String, reason: String },

    #[error("secret source '{source_name}' unavailable: {message}")]
    CredentialSourceUnavailable { source_name: String, message: String },

    #[error("build '{build}' failed: {message}")]
    BuildFailed { build: String, message: String },

    #[error("build backend error: {0}")]
    BuildTransientError(String),

    #[error("pod dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("pod dispatch rejected: {0}")]
    DispatchRejected(String),

    #[error("validation pod '{pod}' no longer exists")]
    PodLost { pod: String },

    #[error("validation pod '{pod}' cannot run: {reason}")]
    PodUnhealthy { pod: String, reason: String },

    #[error("pod '{pod}' did not finish within {timeout_secs}s")]
    LogCollectionTimeout { pod: String, timeout_secs: u64 },

    #[error("reading pod logs failed: {0}")]
    LogReadFailed(String),

    #[error("no execution results in pod logs: {0}")]
    ParseError(String),

    #[error("golden notebook configured but no golden summary in pod logs")]
    GoldenNotebookMissing,

    #[error("serving endpoint unavailable: {0}")]
    ServingUnavailable(String),

    #[error("{platform} response does not match its contract: {message}")]
    ResponseContract { platform: String, message: String },

    #[error("controller invariant violated: {0}")]
    Invariant(String),
}

impl OperationError {
    pub fn class(&self) -> ErrorClass {
        use OperationError::*;
        match self {
            CredentialSourceUnavailable { .. }
            | BuildTransientError(_)
            | DispatchFailed(_)
            | PodLost { .. }
            | PodUnhealthy { .. }
            | LogCollectionTimeout { .. }
            | LogReadFailed(_)
            | ServingUnavailable(_) => ErrorClass::Transient,
            InvalidSpec(_)
            | CredentialNotFound { .. }
            | CredentialMalformed { .. }
            | BuildFailed { .. }
            | DispatchRejected(_)
            | GoldenNotebookMissing
            | ResponseContract { .. } => ErrorClass::TerminalUser,
            ParseError(_) | Invariant(_) => ErrorClass::TerminalSystem,
        }
    }

    /// True when the running attempt's pod has to be replaced rather than observed again.
    pub fn replaces_pod(&self) -> bool {
        matches!(self, OperationError::PodLost { .. } | OperationError::PodUnhealthy { .. })
    }

    pub fn component(&self) -> Component {
        use OperationError::*;
        match self {
            InvalidSpec(_) => Component::SpecValidation,
            CredentialNotFound { .. } | CredentialMalformed { .. } | CredentialSourceUnavailable { .. } => Component::CredentialResolver,
            BuildFailed { .. } | BuildTransientError(_) => Component::BuildOrchestrator,
            DispatchFailed(_) | DispatchRejected(_) | PodLost { .. } | PodUnhealthy { .. } => Component::ExecutionDispatcher,
            LogCollectionTimeout { .. } | LogReadFailed(_) | ParseError(_) | GoldenNotebookMissing => Component::LogCollector,
            ServingUnavailable(_) | ResponseContract { .. } => Component::ResultEvaluator,
            Invariant(_) => Component::Controller,
        }
    }
}

pub type OpResult<T> = Result<T, OperationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_fixed_per_variant() {
        assert_eq!(OperationError::CredentialNotFound { reference: "x".into() }.class(), ErrorClass::TerminalUser);
        assert_eq!(OperationError::BuildTransientError("503".into()).class(), ErrorClass::Transient);
        assert_eq!(OperationError::BuildFailed { build: "b".into(), message: "m".into() }.class(), ErrorClass::TerminalUser);
        assert_eq!(OperationError::ParseError("empty".into()).class(), ErrorClass::TerminalSystem);
        assert!(OperationError::LogCollectionTimeout { pod: "p".into(), timeout_secs: 60 }.class().is_retryable());
        assert_eq!(OperationError::PodUnhealthy { pod: "p".into(), reason: "evicted".into() }.class(), ErrorClass::Transient);
    }

    #[test]
    fn only_pod_failures_replace_the_pod() {
        assert!(OperationError::PodLost { pod: "p".into() }.replaces_pod());
        assert!(OperationError::PodUnhealthy { pod: "p".into(), reason: "Unschedulable".into() }.replaces_pod());
        assert!(!OperationError::DispatchFailed("Unable to connect to the server".into()).replaces_pod());
    }

    #[test]
    fn components_follow_origin() {
        assert_eq!(OperationError::DispatchRejected("forbidden".into()).component(), Component::ExecutionDispatcher);
        assert_eq!(OperationError::GoldenNotebookMissing.component(), Component::LogCollector);
        assert_eq!(Component::CredentialResolver.to_string(), "credential-resolver");
    }
}
