use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::WebhookConfig;
use crate::endpoints::{EndpointRegistry, Operation};
use crate::errors::Result;
use crate::health::HealthTracker;
use crate::jobs::batch_queue::BatchExecutor;
use crate::metrics::WebhookMetrics;
use crate::models::batch::BatchOperation;
use crate::models::call_result::{CallResult, FailureKind};
use crate::store::DataStore;
use crate::transport::retry::{self, Attempt, RetryPolicy};
use crate::transport::{HttpTransport, WebhookRequest};

pub const AUDIT_TABLE: &str = "webhook_executions";

/// Configuration resolved once per update and shared by every call that
/// starts while it is active.
#[derive(Debug)]
struct ActiveConfig {
    config: WebhookConfig,
    base_url: Url,
    registry: EndpointRegistry,
    policy: RetryPolicy,
}

impl ActiveConfig {
    fn resolve(config: WebhookConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            base_url: config.base_url()?,
            registry: config.registry()?,
            policy: RetryPolicy::from_config(&config),
            config,
        })
    }
}

/// Turns an operation plus payload into retried, gated, recorded HTTP calls.
pub struct Dispatcher {
    active: RwLock<Arc<ActiveConfig>>,
    transport: Arc<dyn HttpTransport>,
    tracker: HealthTracker,
    metrics: WebhookMetrics,
    /// One outbound attempt at a time per service instance.
    gate: tokio::sync::Mutex<()>,
    audit: Option<Arc<dyn DataStore>>,
}

impl Dispatcher {
    pub fn new(
        config: WebhookConfig,
        transport: Arc<dyn HttpTransport>,
        metrics: WebhookMetrics,
        audit: Option<Arc<dyn DataStore>>,
    ) -> Result<Self> {
        let active = ActiveConfig::resolve(config)?;
        let tracker = HealthTracker::new(active.config.health_window, active.config.health_threshold);
        Ok(Self {
            active: RwLock::new(Arc::new(active)),
            transport,
            tracker,
            metrics,
            gate: tokio::sync::Mutex::new(()),
            audit,
        })
    }

    /// Swap in a new configuration. Calls already running keep the old one.
    pub fn update_config(&self, config: WebhookConfig) -> Result<()> {
        let next = Arc::new(ActiveConfig::resolve(config)?);
        *self.active.write() = next;
        Ok(())
    }

    pub fn config(&self) -> WebhookConfig {
        self.active.read().config.clone()
    }

    pub fn registry(&self) -> EndpointRegistry {
        self.active.read().registry.clone()
    }

    pub fn tracker(&self) -> &HealthTracker {
        &self.tracker
    }

    pub async fn dispatch(&self, operation: Operation, body: Value) -> Result<CallResult> {
        let active = self.active.read().clone();
        let request = WebhookRequest::post(
            &active.base_url,
            active.registry.resolve(operation),
            Some(body),
            active.config.timeout_ms,
        )?
        .bearer(active.config.api_key())?
        .header("x-hookline-operation", operation.as_str())?;

        let result = retry::execute(&active.policy, &self.tracker, |attempt| {
            let request = &request;
            async move {
                let _permit = self.gate.lock().await;
                let finished = Attempt::timed(self.transport.call(request)).await?;
                let elapsed_ms = finished.elapsed_ms();
                let result = &finished.result;
                self.metrics
                    .record_attempt(operation.as_str(), result.outcome(), elapsed_ms);
                debug!(
                    operation = operation.as_str(),
                    attempt,
                    outcome = result.outcome(),
                    status = ?result.status_code,
                    elapsed_ms,
                    "webhook attempt finished"
                );
                Ok(finished)
            }
        })
        .await?;

        self.write_audit(operation, &result).await;
        Ok(result)
    }

    async fn write_audit(&self, operation: Operation, result: &CallResult) {
        let Some(store) = &self.audit else {
            return;
        };
        let row = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "operation": operation.as_str(),
            "success": result.success,
            "statusCode": result.status_code,
            "error": result.error,
            "executionId": result.execution_id,
            "timestamp": result.timestamp,
        });
        let response = store.insert(AUDIT_TABLE, row).await;
        if let Some(err) = response.error {
            warn!(operation = operation.as_str(), error = %err, "failed to write webhook audit row");
        }
    }
}

#[async_trait]
impl BatchExecutor for Dispatcher {
    async fn execute(&self, operation: &BatchOperation) -> CallResult {
        match self
            .dispatch(operation.op_type.operation(), operation.payload.clone())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!(
                    operation_id = %operation.id,
                    code = e.code(),
                    error = %e,
                    "batch operation could not be dispatched"
                );
                CallResult::failure(FailureKind::Configuration, e.to_string(), None)
            }
        }
    }
}
