use thiserror::Error;

/// Result type alias using the orchestrator error type.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors raised directly to the caller.
///
/// Ordinary remote failures (timeouts, 5xx, 4xx) are *not* errors: they come
/// back as a [`CallResult`](crate::models::call_result::CallResult) with
/// `success = false`. Only programmer or setup mistakes land here.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Invalid or missing base URL, endpoint mapping, or transport parameter.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Payload failed local shape checks before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    /// The batch queue is full and refused a new operation.
    #[error("batch queue is full ({capacity} operations)")]
    QueueSaturated { capacity: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OrchestratorError {
    pub fn config(msg: impl Into<String>) -> Self {
        OrchestratorError::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        OrchestratorError::Validation(msg.into())
    }

    /// Stable machine-readable code, used in CLI error output and logs.
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::Configuration(_) => "configuration_error",
            OrchestratorError::Validation(_) => "validation_error",
            OrchestratorError::QueueSaturated { .. } => "queue_saturated",
            OrchestratorError::Serialization(_) => "serialization_error",
            OrchestratorError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_readable() {
        let err = OrchestratorError::config("base URL is required");
        assert_eq!(err.to_string(), "configuration error: base URL is required");

        let err = OrchestratorError::QueueSaturated { capacity: 10 };
        assert_eq!(err.to_string(), "batch queue is full (10 operations)");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(OrchestratorError::validation("x").code(), "validation_error");
        assert_eq!(
            OrchestratorError::Internal(anyhow::anyhow!("boom")).code(),
            "internal_error"
        );
    }

    #[test]
    fn test_code_survives_anyhow_wrapping() {
        let err: anyhow::Error = OrchestratorError::QueueSaturated { capacity: 5 }.into();
        let code = err
            .downcast_ref::<OrchestratorError>()
            .map_or("internal_error", OrchestratorError::code);
        assert_eq!(code, "queue_saturated");
    }
}
