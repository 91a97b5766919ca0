use nbv_core::{OperationError, PlatformCheck, ServingPlatform, Tolerance};
use serde_json::Value;

fn contract(platform: ServingPlatform, message: impl Into<String>) -> OperationError {
    OperationError::ResponseContract { platform: platform.to_string(), message: message.into() }
}

fn field<'a>(platform: ServingPlatform, response: &'a Value, name: &str) -> Result<&'a Value, OperationError> {
    response.get(name).ok_or_else(|| contract(platform, format!("response has no `{name}` field")))
}

/// Extracts the prediction payload from a platform's response envelope.
pub fn decode_predictions(platform: ServingPlatform, response: &Value) -> Result<Value, OperationError> {
    match platform {
        ServingPlatform::KServe => match response.get("outputs") {
            // KServe v2 protocol answers in the Triton shape.
            Some(_) if response.get("predictions").is_none() => decode_predictions(ServingPlatform::Triton, response),
            _ => field(platform, response, "predictions").cloned(),
        },
        ServingPlatform::Triton => {
            let outputs = field(platform, response, "outputs")?
                .as_array()
                .ok_or_else(|| contract(platform, "`outputs` is not an array"))?;
            let data = outputs
                .iter()
                .map(|o| o.get("data").cloned().ok_or_else(|| contract(platform, "output tensor without `data`")))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match <[Value; 1]>::try_from(data) {
                Ok([single]) => single,
                Err(many) => Value::Array(many),
            })
        }
        ServingPlatform::TensorflowServing => response
            .get("predictions")
            .or_else(|| response.get("outputs"))
            .cloned()
            .ok_or_else(|| contract(platform, "response has neither `predictions` nor `outputs`")),
        ServingPlatform::Seldon => {
            let data = field(platform, response, "data")?;
            data.get("ndarray")
                .or_else(|| data.pointer("/tensor/values"))
                .cloned()
                .ok_or_else(|| contract(platform, "`data` has neither `ndarray` nor `tensor.values`"))
        }
        ServingPlatform::TorchServe => match response {
            Value::Array(_) | Value::Object(_) => Ok(response.clone()),
            _ => Err(contract(platform, "expected a JSON array or object")),
        },
        ServingPlatform::Vllm => {
            let choices = field(platform, response, "choices")?
                .as_array()
                .ok_or_else(|| contract(platform, "`choices` is not an array"))?;
            if choices.is_empty() {
                return Err(contract(platform, "`choices` is empty"));
            }
            let texts = choices
                .iter()
                .map(|c| {
                    c.get("text")
                        .or_else(|| c.pointer("/message/content"))
                        .cloned()
                        .ok_or_else(|| contract(platform, "choice has neither `text` nor `message.content`"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match <[Value; 1]>::try_from(texts) {
                Ok([single]) => single,
                Err(many) => Value::Array(many),
            })
        }
        ServingPlatform::RayServe | ServingPlatform::BentoMl => Ok(response.clone()),
    }
}

/// Structural comparison: numbers within tolerance, strings after trimming, arrays element-wise,
/// and objects on the keys the expectation names.
pub fn values_match(expected: &Value, actual: &Value, tolerance: &Tolerance) -> bool {
    match (expected, actual) {
        (Value::Null, _) => true,
        (Value::Number(e), Value::Number(a)) => match (e.as_f64(), a.as_f64()) {
            (Some(e), Some(a)) => tolerance.numbers_match(e, a),
            _ => false,
        },
        (Value::String(e), Value::String(a)) => e.trim() == a.trim(),
        (Value::Array(e), Value::Array(a)) => e.len() == a.len() && e.iter().zip(a).all(|(e, a)| values_match(e, a, tolerance)),
        (Value::Object(e), Value::Object(a)) => e.iter().all(|(k, ev)| a.get(k).is_some_and(|av| values_match(ev, av, tolerance))),
        // A single expected value against a one-element batch.
        (e, Value::Array(a)) if a.len() == 1 => values_match(e, &a[0], tolerance),
        (e, a) => e == a,
    }
}

/// Decodes a serving response and checks it against the expected predictions.
pub fn validate_platform_response(platform: ServingPlatform, response: &Value, expected: &Value, tolerance: &Tolerance) -> PlatformCheck {
    match decode_predictions(platform, response) {
        Ok(predictions) if values_match(expected, &predictions, tolerance) => {
            PlatformCheck { platform, passed: true, detail: "predictions within tolerance".to_string() }
        }
        Ok(predictions) => PlatformCheck { platform, passed: false, detail: format!("expected {expected}, got {}", abbreviate(&predictions)) },
        Err(e) => PlatformCheck { platform, passed: false, detail: e.to_string() },
    }
}

fn abbreviate(value: &Value) -> String {
    crate::diff::truncate(&value.to_string(), 200)
}
