use serde::{Deserialize, Serialize};

/// Why a webhook attempt did not succeed.
///
/// Not part of the wire shape; the retry engine reads it to decide whether
/// another attempt is worthwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The attempt exceeded its timeout.
    Timeout,
    /// Connection refused, DNS failure, reset mid-body.
    Network,
    /// 2xx with a body that is not valid JSON.
    MalformedResponse,
    /// HTTP 5xx.
    RemoteServer,
    /// HTTP 4xx (and any other non-2xx below 500).
    RemoteClient,
    /// 2xx whose envelope reported `success: false`.
    Rejected,
    /// The request could not be built from the active configuration.
    Configuration,
}

impl FailureKind {
    /// Transient failures worth another attempt: network, timeout and 5xx.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::Timeout | FailureKind::Network | FailureKind::RemoteServer
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Network => "network",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::RemoteServer => "remote_server",
            FailureKind::RemoteClient => "remote_client",
            FailureKind::Rejected => "rejected",
            FailureKind::Configuration => "configuration",
        }
    }

    /// Classify a non-2xx HTTP status.
    pub fn from_status(status: u16) -> Self {
        if status >= 500 {
            FailureKind::RemoteServer
        } else {
            FailureKind::RemoteClient
        }
    }
}

/// Normalized outcome of a webhook call.
///
/// `success = true` never carries an `error`; `success = false` never carries
/// `data`. Use [`CallResult::ok`] and [`CallResult::failure`] to keep it that way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// RFC 3339, stamped locally when the result is produced.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

impl CallResult {
    pub fn ok(
        data: Option<serde_json::Value>,
        status_code: Option<u16>,
        execution_id: Option<String>,
    ) -> Self {
        Self {
            success: true,
            data,
            error: None,
            status_code,
            timestamp: now_rfc3339(),
            execution_id,
            failure: None,
        }
    }

    pub fn failure(kind: FailureKind, error: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            status_code,
            timestamp: now_rfc3339(),
            execution_id: None,
            failure: Some(kind),
        }
    }

    /// Attach the remote execution id (kept on failures too, for tracing).
    pub fn with_execution_id(mut self, execution_id: Option<String>) -> Self {
        self.execution_id = execution_id;
        self
    }

    pub fn is_retryable(&self) -> bool {
        !self.success && self.failure.is_some_and(FailureKind::is_retryable)
    }

    /// Label for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self.failure {
            None if self.success => "success",
            Some(kind) => kind.as_str(),
            None => "failure",
        }
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
