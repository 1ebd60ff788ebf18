//! Orchestration façade: named business operations over the webhook engine.
//!
//! Construct one [`WebhookService`] per process and pass it (usually in an
//! `Arc`) to whatever needs it.

pub mod dispatcher;

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::WebhookConfig;
use crate::endpoints::Operation;
use crate::errors::Result;
use crate::jobs::batch_queue::{BatchQueue, QueueConfig, QueueEvent};
use crate::metrics::WebhookMetrics;
use crate::models::batch::{
    BatchOperation, BatchOperationId, BatchQueueStatus, OperationType, Priority,
};
use crate::models::call_result::CallResult;
use crate::models::health::HealthSnapshot;
use crate::models::payload::{
    InvoicePayload, PaymentPayload, PurchaseOrderPayload, StockMovementPayload, Validate,
};
use crate::store::DataStore;
use crate::transport::HttpTransport;

pub use dispatcher::{Dispatcher, AUDIT_TABLE};

pub struct WebhookService {
    dispatcher: Arc<Dispatcher>,
    queue: BatchQueue,
    metrics: WebhookMetrics,
}

impl WebhookService {
    pub fn new(config: WebhookConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        Self::build(config, transport, None)
    }

    /// Like [`new`](Self::new), also recording every final call outcome in
    /// the `webhook_executions` table of `store`.
    pub fn with_audit_store(
        config: WebhookConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn DataStore>,
    ) -> Result<Self> {
        Self::build(config, transport, Some(store))
    }

    fn build(
        config: WebhookConfig,
        transport: Arc<dyn HttpTransport>,
        audit: Option<Arc<dyn DataStore>>,
    ) -> Result<Self> {
        let metrics = WebhookMetrics::new()?;
        let queue_config = QueueConfig {
            capacity: config.max_queue_size,
            retry_delay: Duration::from_millis(config.queue_retry_delay_ms),
        };
        let dispatcher = Arc::new(Dispatcher::new(config, transport, metrics.clone(), audit)?);
        let queue = BatchQueue::with_metrics(dispatcher.clone(), queue_config, Some(metrics.clone()));
        Ok(Self {
            dispatcher,
            queue,
            metrics,
        })
    }

    // ── Business operations ──────────────────────────────────────

    pub async fn emit_invoice(&self, payload: &InvoicePayload) -> Result<CallResult> {
        self.call_validated(Operation::EmitInvoice, payload).await
    }

    pub async fn create_purchase_order(&self, payload: &PurchaseOrderPayload) -> Result<CallResult> {
        self.call_validated(Operation::CreatePurchaseOrder, payload)
            .await
    }

    pub async fn record_payment(&self, payload: &PaymentPayload) -> Result<CallResult> {
        self.call_validated(Operation::RecordPayment, payload).await
    }

    pub async fn record_stock_movement(
        &self,
        payload: &StockMovementPayload,
    ) -> Result<CallResult> {
        self.call_validated(Operation::StockMovement, payload).await
    }

    /// Call any registered operation with an arbitrary JSON body.
    pub async fn invoke(&self, operation: Operation, payload: Value) -> Result<CallResult> {
        self.dispatcher.dispatch(operation, payload).await
    }

    /// Ping the engine's health-check webhook.
    pub async fn test_connection(&self) -> Result<CallResult> {
        let body = json!({
            "ping": true,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        let result = self.dispatcher.dispatch(Operation::HealthCheck, body).await?;
        if result.success {
            tracing::info!("workflow engine connection ok");
        } else {
            tracing::warn!(error = ?result.error, "workflow engine connection failed");
        }
        Ok(result)
    }

    async fn call_validated<P>(&self, operation: Operation, payload: &P) -> Result<CallResult>
    where
        P: Validate + Serialize,
    {
        payload.validate()?;
        let body = serde_json::to_value(payload)?;
        self.dispatcher.dispatch(operation, body).await
    }

    // ── Batch queue ──────────────────────────────────────────────

    /// Queue an untyped operation using the configured retry budget.
    pub fn enqueue(
        &self,
        op_type: OperationType,
        payload: Value,
        priority: Priority,
    ) -> Result<BatchOperationId> {
        let max_retries = self.dispatcher.config().queue_max_retries;
        self.queue
            .enqueue(BatchOperation::new(op_type, payload, priority, max_retries))
    }

    /// Queue a fully specified operation (own retry budget, deferred start).
    pub fn enqueue_operation(&self, operation: BatchOperation) -> Result<BatchOperationId> {
        self.queue.enqueue(operation)
    }

    pub fn enqueue_invoice(
        &self,
        payload: &InvoicePayload,
        priority: Priority,
    ) -> Result<BatchOperationId> {
        self.enqueue_validated(OperationType::Invoice, payload, priority)
    }

    pub fn enqueue_purchase_order(
        &self,
        payload: &PurchaseOrderPayload,
        priority: Priority,
    ) -> Result<BatchOperationId> {
        self.enqueue_validated(OperationType::PurchaseOrder, payload, priority)
    }

    pub fn enqueue_payment(
        &self,
        payload: &PaymentPayload,
        priority: Priority,
    ) -> Result<BatchOperationId> {
        self.enqueue_validated(OperationType::Payment, payload, priority)
    }

    pub fn enqueue_stock_movement(
        &self,
        payload: &StockMovementPayload,
        priority: Priority,
    ) -> Result<BatchOperationId> {
        self.enqueue_validated(OperationType::Stock, payload, priority)
    }

    fn enqueue_validated<P>(
        &self,
        op_type: OperationType,
        payload: &P,
        priority: Priority,
    ) -> Result<BatchOperationId>
    where
        P: Validate + Serialize,
    {
        payload.validate()?;
        let body = serde_json::to_value(payload)?;
        self.enqueue(op_type, body, priority)
    }

    pub fn subscribe_queue_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.queue.subscribe()
    }

    pub async fn wait_for_queue_idle(&self) {
        self.queue.wait_idle().await
    }

    pub fn clear_batch_queue(&self) -> usize {
        self.queue.clear()
    }

    // ── Configuration & status ───────────────────────────────────

    /// Takes effect for every call that starts afterwards.
    pub fn update_config(&self, config: WebhookConfig) -> Result<()> {
        self.dispatcher.update_config(config)?;
        tracing::info!("webhook configuration updated");
        Ok(())
    }

    pub fn config(&self) -> WebhookConfig {
        self.dispatcher.config()
    }

    pub fn endpoints(&self) -> Vec<(Operation, String)> {
        self.dispatcher
            .registry()
            .entries()
            .into_iter()
            .map(|(op, path)| (op, path.to_string()))
            .collect()
    }

    pub fn health_status(&self) -> HealthSnapshot {
        self.dispatcher.tracker().snapshot()
    }

    pub fn batch_queue_status(&self) -> BatchQueueStatus {
        self.queue.status()
    }

    /// Prometheus text exposition of this instance's metrics.
    pub fn render_metrics(&self) -> String {
        self.metrics.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OrchestratorError;
    use crate::models::call_result::FailureKind;
    use crate::store::{Filter, InMemoryStore};
    use crate::transport::mock::MockTransport;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn config() -> WebhookConfig {
        let mut cfg = WebhookConfig::new("http://engine.local");
        cfg.base_delay_ms = 1;
        cfg.queue_retry_delay_ms = 0;
        cfg
    }

    fn invoice() -> InvoicePayload {
        InvoicePayload {
            invoice_number: "INV-1".into(),
            customer_id: "cust-1".into(),
            issue_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            currency: "USD".into(),
            items: vec![crate::models::payload::LineItem {
                description: "Widget".into(),
                quantity: Decimal::new(3, 0),
                unit_price: Decimal::new(999, 2),
            }],
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_emit_invoice_success() {
        let mock = MockTransport::new();
        mock.push_ok("/webhook/emit-invoice", json!({"invoiceId": "INV-1"}));
        let service = WebhookService::new(config(), Arc::new(mock.clone())).unwrap();

        let result = service.emit_invoice(&invoice()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data, Some(json!({"invoiceId": "INV-1"})));

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body.as_ref().unwrap()["invoiceNumber"], "INV-1");
        assert_eq!(calls[0].timeout_ms, 10_000);
    }

    #[tokio::test]
    async fn test_invalid_payload_never_reaches_transport() {
        let mock = MockTransport::new();
        let service = WebhookService::new(config(), Arc::new(mock.clone())).unwrap();

        let mut bad = invoice();
        bad.customer_id.clear();
        let err = service.emit_invoice(&bad).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));

        let err = service.enqueue_invoice(&bad, Priority::High).unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
        assert_eq!(mock.call_count(), 0);
        assert_eq!(service.health_status().total_calls, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_at_construction() {
        let err = WebhookService::new(WebhookConfig::new(""), Arc::new(MockTransport::new()))
            .err()
            .unwrap();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_api_key_sent_as_bearer() {
        let mock = MockTransport::new();
        mock.push_ok("/webhook/health-check", json!({"status": "ok"}));
        let mut cfg = config();
        cfg.api_key = Some("secret-key".into());
        let service = WebhookService::new(cfg, Arc::new(mock.clone())).unwrap();

        assert!(service.test_connection().await.unwrap().success);
        assert_eq!(
            mock.calls()[0].authorization.as_deref(),
            Some("Bearer secret-key")
        );
    }

    #[tokio::test]
    async fn test_config_update_applies_to_next_call() {
        let mock = MockTransport::new();
        mock.push_ok("/webhook/health-check", json!({}));
        mock.push_ok("/v2/webhook/health-check", json!({}));
        let service = WebhookService::new(config(), Arc::new(mock.clone())).unwrap();

        service.test_connection().await.unwrap();
        let mut next = config();
        next.base_url = "http://engine.local/v2".into();
        service.update_config(next).unwrap();
        service.test_connection().await.unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0].url, "http://engine.local/webhook/health-check");
        assert_eq!(calls[1].url, "http://engine.local/v2/webhook/health-check");
    }

    #[tokio::test]
    async fn test_bad_config_update_keeps_previous() {
        let service = WebhookService::new(config(), Arc::new(MockTransport::new())).unwrap();
        let mut bad = config();
        bad.timeout_ms = 0;
        assert!(service.update_config(bad).is_err());
        assert_eq!(service.config().timeout_ms, 10_000);
    }

    #[tokio::test]
    async fn test_audit_rows_written() {
        let mock = MockTransport::new();
        mock.push_status("/webhook/record-payment", 422);
        let store = Arc::new(InMemoryStore::new());
        let service =
            WebhookService::with_audit_store(config(), Arc::new(mock), store.clone()).unwrap();

        let payment = PaymentPayload {
            invoice_id: "INV-1".into(),
            amount: Decimal::new(2997, 2),
            method: crate::models::payload::PaymentMethod::Card,
            paid_on: NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
            reference: None,
            extra: Default::default(),
        };
        let result = service.record_payment(&payment).await.unwrap();
        assert!(!result.success);

        let rows = store
            .select(AUDIT_TABLE, &[Filter::eq("operation", "record-payment")])
            .await
            .data
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["statusCode"], 422);
        assert_eq!(rows[0]["success"], false);
    }

    #[tokio::test]
    async fn test_queue_round_trip_returns_to_zero_pending() {
        let mock = MockTransport::new();
        mock.push_ok("/webhook/stock-movement", json!({"moved": true}));
        let service = WebhookService::new(config(), Arc::new(mock.clone())).unwrap();

        service
            .enqueue(OperationType::Stock, json!({"productId": "SKU-1"}), Priority::Medium)
            .unwrap();
        assert_eq!(service.batch_queue_status().pending, 1);
        service.wait_for_queue_idle().await;

        let status = service.batch_queue_status();
        assert_eq!(status.pending, 0);
        assert_eq!(status.completed, 1);
        assert_eq!(mock.calls_to("/webhook/stock-movement"), 1);
    }

    #[tokio::test]
    async fn test_queue_terminal_failure_surfaces_as_event() {
        let mock = MockTransport::new();
        // queue budget 1 retry x engine budget 1 attempt = 2 calls
        for _ in 0..2 {
            mock.push(
                "/webhook/emit-invoice",
                CallResult::failure(FailureKind::RemoteServer, "engine down", Some(500)),
            );
        }
        let mut cfg = config();
        cfg.max_retries = 1;
        cfg.queue_max_retries = 1;
        let service = WebhookService::new(cfg, Arc::new(mock.clone())).unwrap();
        let mut events = service.subscribe_queue_events();

        service.enqueue_invoice(&invoice(), Priority::High).unwrap();
        service.wait_for_queue_idle().await;

        let mut terminal = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let QueueEvent::Failed { result, .. } = event {
                terminal.push(result);
            }
        }
        assert_eq!(terminal.len(), 1);
        assert_eq!(terminal[0].error.as_deref(), Some("engine down"));
        assert_eq!(mock.call_count(), 2);
        assert_eq!(service.batch_queue_status().failed, 1);
    }

    #[tokio::test]
    async fn test_direct_and_queued_calls_share_one_gate() {
        let mock = MockTransport::new();
        for _ in 0..4 {
            mock.push_delayed(
                "/webhook/record-payment",
                CallResult::ok(Some(json!({})), Some(200), None),
                Some(Duration::from_millis(20)),
            );
        }
        let service = WebhookService::new(config(), Arc::new(mock.clone())).unwrap();

        service
            .enqueue(OperationType::Payment, json!({"n": 0}), Priority::Low)
            .unwrap();
        let direct = (1..4).map(|n| service.invoke(Operation::RecordPayment, json!({"n": n})));
        let results = futures::future::join_all(direct).await;
        service.wait_for_queue_idle().await;

        assert!(results.into_iter().all(|r| r.unwrap().success));
        assert_eq!(mock.call_count(), 4);
        assert_eq!(mock.peak_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_wait_is_not_counted_as_response_time() {
        let mock = MockTransport::new();
        for _ in 0..3 {
            mock.push_delayed(
                "/webhook/record-payment",
                CallResult::ok(Some(json!({})), Some(200), None),
                Some(Duration::from_millis(100)),
            );
        }
        let service = WebhookService::new(config(), Arc::new(mock)).unwrap();

        let calls = (0..3).map(|n| service.invoke(Operation::RecordPayment, json!({"n": n})));
        for result in futures::future::join_all(calls).await {
            assert!(result.unwrap().success);
        }

        let health = service.health_status();
        assert_eq!(health.total_calls, 3);
        assert!(
            (health.average_response_time_ms - 100.0).abs() < 1.0,
            "avg {}",
            health.average_response_time_ms
        );
    }

    #[tokio::test]
    async fn test_metrics_reflect_attempts() {
        let mock = MockTransport::new();
        mock.push_ok("/webhook/health-check", json!({}));
        let service = WebhookService::new(config(), Arc::new(mock)).unwrap();
        service.test_connection().await.unwrap();

        let text = service.render_metrics();
        assert!(text.contains(r#"operation="health-check""#));
        assert!(text.contains(r#"outcome="success""#));
    }
}
