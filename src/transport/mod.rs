//! Single-attempt HTTP transport for webhook calls.
//!
//! [`HttpTransport`] issues exactly one request and folds every outcome
//! into a [`CallResult`]. Retrying is the job of [`retry`].

pub mod mock;
pub mod retry;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::endpoints::webhook_url;
use crate::errors::{OrchestratorError, Result};
use crate::models::call_result::{CallResult, FailureKind};

/// One outbound webhook request.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub url: Url,
    pub method: Method,
    pub body: Option<Value>,
    pub headers: HeaderMap,
    pub timeout_ms: u64,
}

impl WebhookRequest {
    /// `POST {base}/webhook/{path}` with a JSON body.
    pub fn post(base: &Url, path: &str, body: Option<Value>, timeout_ms: u64) -> Result<Self> {
        if path.trim().is_empty() {
            return Err(OrchestratorError::config("webhook path must not be empty"));
        }
        let request = Self {
            url: webhook_url(base, path)?,
            method: Method::POST,
            body,
            headers: HeaderMap::new(),
            timeout_ms,
        };
        request.validate()?;
        Ok(request)
    }

    /// Adds `Authorization: Bearer <key>`.
    pub fn bearer(mut self, api_key: Option<&str>) -> Result<Self> {
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| OrchestratorError::config("API key contains invalid header characters"))?;
            self.headers.insert(AUTHORIZATION, value);
        }
        Ok(self)
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Result<Self> {
        let value = HeaderValue::from_str(value)
            .map_err(|_| OrchestratorError::config(format!("invalid value for header {}", name)))?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(OrchestratorError::config("timeout_ms must be greater than 0"));
        }
        if self.url.path().trim_matches('/').is_empty() {
            return Err(OrchestratorError::config("webhook path must not be empty"));
        }
        Ok(())
    }
}

/// Executes a single webhook request.
///
/// Implementations must never retry and must always resolve within the
/// request timeout. The only error is a [`OrchestratorError::Configuration`]
/// for a request that should never have been built.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn call(&self, request: &WebhookRequest) -> Result<CallResult>;
}

/// Production transport backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("hookline/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[tracing::instrument(skip(self, request), fields(url = %request.url, method = %request.method))]
    async fn call(&self, request: &WebhookRequest) -> Result<CallResult> {
        request.validate()?;

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .timeout(Duration::from_millis(request.timeout_ms))
            .headers(request.headers.clone())
            .header(CONTENT_TYPE, "application/json");

        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let result = transport_failure(&e, request.timeout_ms);
                tracing::warn!(error = %e, outcome = result.outcome(), "webhook request failed");
                return Ok(result);
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                let result = if e.is_timeout() {
                    CallResult::failure(
                        FailureKind::Timeout,
                        format!("request timed out after {} ms", request.timeout_ms),
                        None,
                    )
                } else {
                    CallResult::failure(
                        FailureKind::Network,
                        "connection lost while reading the response",
                        Some(status),
                    )
                };
                tracing::warn!(status, error = %e, "failed to read webhook response body");
                return Ok(result);
            }
        };

        let result = normalize_response(status, &body);
        tracing::debug!(
            status,
            success = result.success,
            response_len = body.len(),
            execution_id = ?result.execution_id,
            "webhook request completed"
        );
        Ok(result)
    }
}

fn transport_failure(err: &reqwest::Error, timeout_ms: u64) -> CallResult {
    if err.is_timeout() {
        CallResult::failure(
            FailureKind::Timeout,
            format!("request timed out after {} ms", timeout_ms),
            None,
        )
    } else if err.is_connect() {
        CallResult::failure(
            FailureKind::Network,
            "could not connect to the workflow engine",
            None,
        )
    } else {
        CallResult::failure(FailureKind::Network, "network error while calling webhook", None)
    }
}

/// Fold an HTTP status and raw body into a [`CallResult`].
///
/// 2xx bodies may be a `{success, data, error, executionId}` envelope or any
/// other JSON value (taken as `data`). Non-2xx bodies contribute their error
/// message when one can be found.
pub fn normalize_response(status: u16, body: &str) -> CallResult {
    let trimmed = body.trim();
    let parsed: Option<Value> = if trimmed.is_empty() {
        Some(Value::Null)
    } else {
        serde_json::from_str(trimmed).ok()
    };
    let execution_id = parsed.as_ref().and_then(execution_id_of);

    if !(200..300).contains(&status) {
        let message = parsed
            .as_ref()
            .and_then(remote_error_message)
            .unwrap_or_else(|| format!("webhook returned HTTP {}", status));
        return CallResult::failure(FailureKind::from_status(status), message, Some(status))
            .with_execution_id(execution_id);
    }

    let Some(value) = parsed else {
        return CallResult::failure(
            FailureKind::MalformedResponse,
            "workflow engine returned a malformed response",
            Some(status),
        );
    };

    match value {
        Value::Null => CallResult::ok(None, Some(status), None),
        Value::Object(ref map) if map.get("success").is_some_and(Value::is_boolean) => {
            if map.get("success") == Some(&Value::Bool(true)) {
                let data = map.get("data").filter(|d| !d.is_null()).cloned();
                CallResult::ok(data, Some(status), execution_id)
            } else {
                let message = remote_error_message(&value)
                    .unwrap_or_else(|| "workflow reported a failure".to_string());
                CallResult::failure(FailureKind::Rejected, message, Some(status))
                    .with_execution_id(execution_id)
            }
        }
        other => CallResult::ok(Some(other), Some(status), execution_id),
    }
}

fn execution_id_of(value: &Value) -> Option<String> {
    match value.get("executionId")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn remote_error_message(value: &Value) -> Option<String> {
    let candidate = match value.get("error") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(obj)) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    candidate
        .or_else(|| value.get("message").and_then(Value::as_str).map(str::to_string))
        .filter(|m| !m.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("http://localhost:5678").unwrap()
    }

    #[test]
    fn test_request_rejects_empty_path() {
        let err = WebhookRequest::post(&base(), "  ", None, 1000).unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn test_request_rejects_zero_timeout() {
        let err = WebhookRequest::post(&base(), "emit-invoice", None, 0).unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn test_bearer_header() {
        let req = WebhookRequest::post(&base(), "health-check", None, 1000)
            .unwrap()
            .bearer(Some("k-1"))
            .unwrap();
        assert_eq!(req.headers.get(AUTHORIZATION).unwrap(), "Bearer k-1");
    }

    #[test]
    fn test_envelope_success() {
        let result = normalize_response(
            200,
            r#"{"success":true,"data":{"invoiceId":"INV-1"},"executionId":"77"}"#,
        );
        assert!(result.success);
        assert_eq!(result.data, Some(json!({"invoiceId": "INV-1"})));
        assert_eq!(result.execution_id.as_deref(), Some("77"));
        assert_eq!(result.status_code, Some(200));
    }

    #[test]
    fn test_plain_json_body_becomes_data() {
        let result = normalize_response(200, r#"[{"id":1}]"#);
        assert!(result.success);
        assert_eq!(result.data, Some(json!([{"id": 1}])));
    }

    #[test]
    fn test_empty_body_is_success_without_data() {
        let result = normalize_response(204, "");
        assert!(result.success);
        assert!(result.data.is_none());
    }

    #[test]
    fn test_envelope_rejection() {
        let result = normalize_response(200, r#"{"success":false,"error":"customer missing"}"#);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("customer missing"));
        assert_eq!(result.failure, Some(FailureKind::Rejected));
        assert!(result.data.is_none());
    }

    #[test]
    fn test_malformed_success_body() {
        let result = normalize_response(200, "<html>oops</html>");
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::MalformedResponse));
        assert_eq!(result.status_code, Some(200));
    }

    #[test]
    fn test_client_error_propagates_remote_message() {
        let result = normalize_response(422, r#"{"error":"invoice total mismatch"}"#);
        assert_eq!(result.error.as_deref(), Some("invoice total mismatch"));
        assert_eq!(result.status_code, Some(422));
        assert_eq!(result.failure, Some(FailureKind::RemoteClient));
    }

    #[test]
    fn test_nested_error_message() {
        let result = normalize_response(500, r#"{"error":{"message":"workflow crashed"}}"#);
        assert_eq!(result.error.as_deref(), Some("workflow crashed"));
        assert!(result.is_retryable());
    }

    #[test]
    fn test_server_error_without_body() {
        let result = normalize_response(503, "Service Unavailable");
        assert_eq!(result.error.as_deref(), Some("webhook returned HTTP 503"));
        assert_eq!(result.status_code, Some(503));
        assert!(result.is_retryable());
    }
}
