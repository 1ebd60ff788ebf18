//! Prometheus metrics for webhook traffic and the batch queue.
//!
//! Each service owns its own [`Registry`] so several instances (or tests)
//! never collide on registration.

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::errors::Result;

#[derive(Clone)]
pub struct WebhookMetrics {
    registry: Registry,

    // Counters
    attempts_total: CounterVec,
    batch_operations_total: CounterVec,

    // Histograms
    attempt_duration_seconds: HistogramVec,

    // Gauges
    queue_pending: IntGauge,
}

impl WebhookMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let attempts_total = CounterVec::new(
            Opts::new(
                "hookline_webhook_attempts_total",
                "Webhook HTTP attempts by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .map_err(|e| anyhow::anyhow!("failed to create attempts counter: {}", e))?;

        let batch_operations_total = CounterVec::new(
            Opts::new(
                "hookline_batch_operations_total",
                "Batch operations finished by type and outcome",
            ),
            &["type", "outcome"],
        )
        .map_err(|e| anyhow::anyhow!("failed to create batch counter: {}", e))?;

        let attempt_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "hookline_webhook_attempt_duration_seconds",
                "Webhook HTTP attempt duration in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["operation"],
        )
        .map_err(|e| anyhow::anyhow!("failed to create duration histogram: {}", e))?;

        let queue_pending = IntGauge::new(
            "hookline_batch_queue_pending",
            "Operations waiting in the batch queue",
        )
        .map_err(|e| anyhow::anyhow!("failed to create queue gauge: {}", e))?;

        registry
            .register(Box::new(attempts_total.clone()))
            .map_err(|e| anyhow::anyhow!("failed to register attempts counter: {}", e))?;
        registry
            .register(Box::new(batch_operations_total.clone()))
            .map_err(|e| anyhow::anyhow!("failed to register batch counter: {}", e))?;
        registry
            .register(Box::new(attempt_duration_seconds.clone()))
            .map_err(|e| anyhow::anyhow!("failed to register duration histogram: {}", e))?;
        registry
            .register(Box::new(queue_pending.clone()))
            .map_err(|e| anyhow::anyhow!("failed to register queue gauge: {}", e))?;

        Ok(Self {
            registry,
            attempts_total,
            batch_operations_total,
            attempt_duration_seconds,
            queue_pending,
        })
    }

    pub fn record_attempt(&self, operation: &str, outcome: &str, duration_ms: f64) {
        self.attempts_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.attempt_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_ms / 1000.0);
    }

    pub fn record_batch_outcome(&self, op_type: &str, outcome: &str) {
        self.batch_operations_total
            .with_label_values(&[op_type, outcome])
            .inc();
    }

    pub fn set_queue_pending(&self, pending: usize) {
        self.queue_pending.set(pending as i64);
    }

    /// Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
