use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use nbv_core::{ModelValidationSpec, OperationError, PlatformCheck, ServingPlatform, Tolerance};
use serde_json::Value;
use tracing::{debug, info};

use crate::platform::validate_platform_response;

#[derive(Clone, Debug, PartialEq)]
pub struct ServingTarget {
    pub platform: ServingPlatform,
    pub endpoint: String,
    pub model: Option<String>,
}

impl ServingTarget {
    pub fn from_spec(spec: &ModelValidationSpec) -> Self {
        Self { platform: spec.platform, endpoint: spec.endpoint.clone(), model: spec.model.clone() }
    }

    /// Inference URL following each platform's REST convention.
    pub fn url(&self, payload: &Value) -> String {
        let base = self.endpoint.trim_end_matches('/');
        let model = self.model.as_deref();
        match (self.platform, model) {
            (ServingPlatform::KServe | ServingPlatform::TensorflowServing, Some(m)) => format!("{base}/v1/models/{m}:predict"),
            (ServingPlatform::Triton, Some(m)) => format!("{base}/v2/models/{m}/infer"),
            (ServingPlatform::Seldon, _) => format!("{base}/api/v1.0/predictions"),
            (ServingPlatform::TorchServe, Some(m)) => format!("{base}/predictions/{m}"),
            (ServingPlatform::Vllm, _) if payload.get("messages").is_some() => format!("{base}/v1/chat/completions"),
            (ServingPlatform::Vllm, _) => format!("{base}/v1/completions"),
            (ServingPlatform::BentoMl, Some(m)) => format!("{base}/{m}"),
            _ => base.to_string(),
        }
    }
}

/// Sends one inference request to a model server.
pub trait ServingClient: Send + Sync {
    fn predict(&self, target: &ServingTarget, payload: &Value) -> Result<Value, OperationError>;
}

pub struct HttpServingClient {
    client: reqwest::blocking::Client,
}

impl HttpServingClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self { client }
    }
}

impl Default for HttpServingClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ServingClient for HttpServingClient {
    fn predict(&self, target: &ServingTarget, payload: &Value) -> Result<Value, OperationError> {
        let url = target.url(payload);
        debug!(platform = %target.platform, %url, "sending inference request");
        let resp = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .map_err(|e| OperationError::ServingUnavailable(format!("{url}: {e}")))?;
        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(OperationError::ServingUnavailable(format!("{url} answered {status}")));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(OperationError::ResponseContract {
                platform: target.platform.to_string(),
                message: format!("{url} answered {status}: {}", crate::diff::truncate(&body, 200)),
            });
        }
        resp.json::<Value>()
            .map_err(|e| OperationError::ResponseContract { platform: target.platform.to_string(), message: format!("response is not JSON: {e}") })
    }
}

/// Test double returning queued responses (the last one repeats) and recording requests.
#[derive(Default)]
pub struct FakeServingClient {
    inner: Mutex<FakeInner>,
}

#[derive(Default)]
struct FakeInner {
    replies: VecDeque<Result<Value, OperationError>>,
    requests: Vec<(ServingTarget, Value)>,
}

impl FakeServingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: Value) -> Self {
        self.lock().replies.push_back(Ok(response));
        self
    }

    pub fn fail(self, err: OperationError) -> Self {
        self.lock().replies.push_back(Err(err));
        self
    }

    pub fn requests(&self) -> Vec<(ServingTarget, Value)> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ServingClient for FakeServingClient {
    fn predict(&self, target: &ServingTarget, payload: &Value) -> Result<Value, OperationError> {
        let mut inner = self.lock();
        inner.requests.push((target.clone(), payload.clone()));
        let reply = if inner.replies.len() > 1 { inner.replies.pop_front() } else { inner.replies.front().cloned() };
        reply.unwrap_or_else(|| Err(OperationError::ServingUnavailable(format!("no response scripted for {}", target.endpoint))))
    }
}

/// Runs the configured inference request and judges the answer. Transport failures are errors
/// so the caller can retry; a wrong answer is a failed check.
pub fn check_model(client: &dyn ServingClient, spec: &ModelValidationSpec, tolerance: &Tolerance) -> Result<PlatformCheck, OperationError> {
    let target = ServingTarget::from_spec(spec);
    let response = client.predict(&target, &spec.request)?;
    let check = validate_platform_response(spec.platform, &response, &spec.expected, tolerance);
    info!(platform = %spec.platform, passed = check.passed, "model serving check");
    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target(platform: ServingPlatform, model: Option<&str>) -> ServingTarget {
        ServingTarget { platform, endpoint: "http://iris.ml.svc:8080/".into(), model: model.map(str::to_string) }
    }

    #[test]
    fn urls_follow_platform_conventions() {
        let p = json!({});
        assert_eq!(target(ServingPlatform::KServe, Some("iris")).url(&p), "http://iris.ml.svc:8080/v1/models/iris:predict");
        assert_eq!(target(ServingPlatform::Triton, Some("iris")).url(&p), "http://iris.ml.svc:8080/v2/models/iris/infer");
        assert_eq!(target(ServingPlatform::Seldon, None).url(&p), "http://iris.ml.svc:8080/api/v1.0/predictions");
        assert_eq!(target(ServingPlatform::TorchServe, Some("iris")).url(&p), "http://iris.ml.svc:8080/predictions/iris");
        assert_eq!(target(ServingPlatform::Vllm, None).url(&json!({"messages": []})), "http://iris.ml.svc:8080/v1/chat/completions");
        assert_eq!(target(ServingPlatform::RayServe, None).url(&p), "http://iris.ml.svc:8080");
    }

    #[test]
    fn check_model_uses_client_and_decoder() {
        let spec = ModelValidationSpec {
            platform: ServingPlatform::KServe,
            endpoint: "http://iris:8080".into(),
            model: Some("iris".into()),
            request: json!({"instances": [[5.1, 3.5, 1.4, 0.2]]}),
            expected: json!([0]),
        };
        let client = FakeServingClient::new().respond(json!({"predictions": [0]}));
        let check = check_model(&client, &spec, &Tolerance::default()).unwrap();
        assert!(check.passed);
        assert_eq!(client.requests()[0].1, spec.request);

        let down = FakeServingClient::new().fail(OperationError::ServingUnavailable("503".into()));
        assert!(check_model(&down, &spec, &Tolerance::default()).unwrap_err().class().is_retryable());
    }
}
