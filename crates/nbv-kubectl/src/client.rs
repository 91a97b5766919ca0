use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::runner::{KubectlError, ProcessRunner, Runner};

/// Thin wrapper around `kubectl` (or `oc`) that speaks JSON.
#[derive(Clone)]
pub struct Kubectl {
    runner: Arc<dyn Runner>,
    program: String,
    context: Option<String>,
    request_timeout: Option<String>,
}

impl Kubectl {
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_runner(program, Arc::new(ProcessRunner))
    }

    pub fn with_runner(program: impl Into<String>, runner: Arc<dyn Runner>) -> Self {
        Self { runner, program: program.into(), context: None, request_timeout: None }
    }

    pub fn context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    /// Passed through as `--request-timeout`, e.g. `30s`.
    pub fn request_timeout(mut self, timeout: Option<String>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn runner(&self) -> Arc<dyn Runner> {
        self.runner.clone()
    }

    fn full_args(&self, args: &[&str]) -> Vec<String> {
        let mut full: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        if let Some(ctx) = &self.context {
            full.push(format!("--context={ctx}"));
        }
        if let Some(t) = &self.request_timeout {
            full.push(format!("--request-timeout={t}"));
        }
        full
    }

    pub fn run(&self, args: &[&str]) -> Result<String, KubectlError> {
        let full = self.full_args(args);
        debug!(program = %self.program, args = ?args, "exec");
        self.runner.run(&self.program, &full, None)
    }

    pub fn run_with_stdin(&self, args: &[&str], stdin: &[u8]) -> Result<String, KubectlError> {
        let full = self.full_args(args);
        debug!(program = %self.program, args = ?args, bytes = stdin.len(), "exec with stdin");
        self.runner.run(&self.program, &full, Some(stdin))
    }

    pub fn run_json(&self, args: &[&str]) -> Result<Value, KubectlError> {
        let out = self.run(args)?;
        self.decode(&out)
    }

    fn decode(&self, out: &str) -> Result<Value, KubectlError> {
        serde_json::from_str(out).map_err(|e| KubectlError::Decode { program: self.program.clone(), message: e.to_string() })
    }

    /// `get <kind> <name> -o json`; a missing object is `Ok(None)`.
    pub fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<Option<Value>, KubectlError> {
        match self.run_json(&["get", kind, name, "-n", namespace, "-o", "json"]) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Lists objects; `namespace = None` spans all namespaces.
    pub fn list(&self, kind: &str, namespace: Option<&str>, selector: Option<&str>) -> Result<Vec<Value>, KubectlError> {
        let mut args = vec!["get", kind, "-o", "json"];
        match namespace {
            Some(ns) => args.extend(["-n", ns]),
            None => args.push("--all-namespaces"),
        }
        if let Some(sel) = selector {
            args.extend(["-l", sel]);
        }
        let list = self.run_json(&args)?;
        Ok(list.get("items").and_then(Value::as_array).cloned().unwrap_or_default())
    }

    pub fn create(&self, manifest: &Value) -> Result<Value, KubectlError> {
        self.send(&["create", "-f", "-", "-o", "json"], manifest)
    }

    pub fn apply(&self, manifest: &Value) -> Result<Value, KubectlError> {
        self.send(&["apply", "-f", "-", "-o", "json"], manifest)
    }

    /// Replaces the status subresource of a custom resource.
    pub fn replace_status(&self, manifest: &Value) -> Result<Value, KubectlError> {
        self.send(&["replace", "--subresource=status", "-f", "-", "-o", "json"], manifest)
    }

    fn send(&self, args: &[&str], manifest: &Value) -> Result<Value, KubectlError> {
        let body = serde_json::to_vec(manifest).map_err(|e| KubectlError::Decode { program: self.program.clone(), message: e.to_string() })?;
        let out = self.run_with_stdin(args, &body)?;
        if out.trim().is_empty() {
            return Ok(manifest.clone());
        }
        self.decode(&out)
    }

    /// Deletes an object; returns whether something was deleted.
    pub fn delete(&self, kind: &str, namespace: &str, name: &str) -> Result<bool, KubectlError> {
        let out = self.run(&["delete", kind, name, "-n", namespace, "--ignore-not-found", "--wait=false"])?;
        Ok(!out.trim().is_empty())
    }

    pub fn logs(&self, namespace: &str, pod: &str, container: &str) -> Result<String, KubectlError> {
        self.run(&["logs", pod, "-n", namespace, "-c", container])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScriptedRunner;

    #[test]
    fn get_maps_not_found_to_none() {
        let runner = Arc::new(ScriptedRunner::new().on("get pod present", r#"{"metadata":{"name":"present"}}"#));
        let k = Kubectl::with_runner("kubectl", runner.clone());
        assert!(k.get("pod", "ns", "present").unwrap().is_some());
        assert!(k.get("pod", "ns", "absent").unwrap().is_none());
    }

    #[test]
    fn list_extracts_items_with_selector() {
        let runner = Arc::new(ScriptedRunner::new().on("get pods", r#"{"items":[{"a":1},{"a":2}]}"#));
        let k = Kubectl::with_runner("kubectl", runner.clone()).context(Some("dev".into()));
        assert_eq!(k.list("pods", Some("ml"), Some("nbv.io/job=iris")).unwrap().len(), 2);
        let line = runner.calls()[0].line();
        assert!(line.contains("-l nbv.io/job=iris") && line.contains("--context=dev"), "{line}");
    }

    #[test]
    fn create_pipes_manifest_on_stdin() {
        let runner = Arc::new(ScriptedRunner::new().on("create -f -", ""));
        let k = Kubectl::with_runner("oc", runner.clone());
        let manifest = serde_json::json!({"kind": "Secret"});
        assert_eq!(k.create(&manifest).unwrap(), manifest);
        assert_eq!(runner.calls()[0].stdin.as_deref(), Some(r#"{"kind":"Secret"}"#));
    }
}
