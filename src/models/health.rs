use chrono::{DateTime, Utc};
use serde::Serialize;

/// Read-only view of recent webhook call outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub is_healthy: bool,
    /// Successes divided by calls over the rolling window; 1.0 before any call.
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    pub last_request_time: Option<DateTime<Utc>>,
    /// All-time count of recorded calls.
    pub total_calls: u64,
    /// All-time count of successful calls.
    pub successful_calls: u64,
    /// Number of calls currently inside the rolling window.
    pub window_size: usize,
}
