//! Scripted transport for tests and dry runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{HttpTransport, WebhookRequest};
use crate::errors::Result;
use crate::models::call_result::{CallResult, FailureKind};

/// Record of a call made to the mock transport.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub url: String,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub authorization: Option<String>,
    pub timeout_ms: u64,
}

struct Scripted {
    result: CallResult,
    delay: Option<Duration>,
}

/// Returns predetermined results keyed by URL path, in FIFO order.
///
/// Unscripted paths return a 404-style failure. Peak concurrency is tracked
/// so tests can assert the one-call-in-flight guarantee.
#[derive(Clone, Default)]
pub struct MockTransport {
    responses: Arc<Mutex<HashMap<String, VecDeque<Scripted>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for `path` (e.g. `/webhook/emit-invoice`).
    pub fn push(&self, path: &str, result: CallResult) {
        self.push_delayed(path, result, None);
    }

    /// Queue a result that is only returned after `delay`.
    pub fn push_delayed(&self, path: &str, result: CallResult, delay: Option<Duration>) {
        self.responses
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(Scripted { result, delay });
    }

    pub fn push_ok(&self, path: &str, data: serde_json::Value) {
        self.push(path, CallResult::ok(Some(data), Some(200), None));
    }

    pub fn push_status(&self, path: &str, status: u16) {
        self.push(
            path,
            CallResult::failure(
                FailureKind::from_status(status),
                format!("webhook returned HTTP {}", status),
                Some(status),
            ),
        );
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Calls made to a given path.
    pub fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.path == path).count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn call(&self, request: &WebhookRequest) -> Result<CallResult> {
        request.validate()?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
        };

        let path = request.url.path().to_string();
        self.calls.lock().push(MockCall {
            url: request.url.to_string(),
            path: path.clone(),
            body: request.body.clone(),
            authorization: request
                .headers
                .get(reqwest::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            timeout_ms: request.timeout_ms,
        });

        let scripted = self
            .responses
            .lock()
            .get_mut(&path)
            .and_then(VecDeque::pop_front);

        match scripted {
            Some(Scripted { result, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                // Fresh timestamp, as a real transport would stamp it now.
                let mut result = result;
                result.timestamp = chrono::Utc::now().to_rfc3339();
                Ok(result)
            }
            None => Ok(CallResult::failure(
                FailureKind::RemoteClient,
                format!("no mock response configured for {}", path),
                Some(404),
            )),
        }
    }
}

/// Decrements the in-flight counter even if the call future is dropped.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
