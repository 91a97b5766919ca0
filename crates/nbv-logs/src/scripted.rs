use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use nbv_core::{ExecutionPod, GoldenNotebook, NotebookExecutionResult, OperationError};

use crate::collector::PodLogOperations;
use crate::parser;

/// Test double: serves queued log texts (the last one repeats) and counts every call.
#[derive(Default)]
pub struct ScriptedLogOperations {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    replies: VecDeque<Result<String, OperationError>>,
    collected: Vec<String>,
    parse_calls: usize,
    golden_calls: usize,
    error_calls: usize,
}

impl ScriptedLogOperations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logs(logs: impl Into<String>) -> Self {
        let ops = Self::new();
        ops.push_logs(logs);
        ops
    }

    pub fn push_logs(&self, logs: impl Into<String>) {
        self.lock().replies.push_back(Ok(logs.into()));
    }

    pub fn push_error(&self, err: OperationError) {
        self.lock().replies.push_back(Err(err));
    }

    /// Names of the pods whose logs were requested, in order.
    pub fn collected(&self) -> Vec<String> {
        self.lock().collected.clone()
    }

    pub fn parse_calls(&self) -> usize {
        self.lock().parse_calls
    }

    pub fn golden_calls(&self) -> usize {
        self.lock().golden_calls
    }

    pub fn error_calls(&self) -> usize {
        self.lock().error_calls
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PodLogOperations for ScriptedLogOperations {
    fn collect_logs(&self, pod: &ExecutionPod, _timeout: Duration) -> Result<String, OperationError> {
        let mut inner = self.lock();
        inner.collected.push(pod.name.clone());
        let reply = if inner.replies.len() > 1 { inner.replies.pop_front() } else { inner.replies.front().cloned() };
        reply.unwrap_or_else(|| Err(OperationError::LogReadFailed(format!("no logs scripted for {}", pod.name))))
    }

    fn parse_results(&self, logs: &str) -> Result<NotebookExecutionResult, OperationError> {
        self.lock().parse_calls += 1;
        parser::parse_results(logs)
    }

    fn parse_golden(&self, logs: &str) -> Option<GoldenNotebook> {
        self.lock().golden_calls += 1;
        parser::parse_golden(logs)
    }

    fn extract_error(&self, logs: &str) -> String {
        self.lock().error_calls += 1;
        parser::extract_error(logs)
    }
}
