//! Background job: prioritized batch queue for business operations.
//!
//! A single drain task per queue pulls the next operation, runs it through
//! the [`BatchExecutor`], and decides its fate:
//!
//! ```text
//! pending ──select──> in-flight ──success──────────────> completed
//!    ^                    │
//!    │                    ├──retryable, budget left──> retry-scheduled ─┐
//!    │                    │                                             │
//!    └────────────────────┼─────────────────────────────────────────────┘
//!                         └──otherwise─────────────────> failed-terminal
//! ```
//!
//! Selection is highest priority first, FIFO inside a tier. The drain task
//! exists only while there is work; `enqueue` starts it when it is not
//! running. Queue state is only touched under a synchronous lock that is
//! never held across an `.await`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, error, info, warn};

use crate::errors::{OrchestratorError, Result};
use crate::metrics::WebhookMetrics;
use crate::models::batch::{BatchOperation, BatchOperationId, BatchQueueStatus, Priority};
use crate::models::call_result::CallResult;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Runs one queued operation to a final (possibly failed) result.
#[async_trait]
pub trait BatchExecutor: Send + Sync + 'static {
    async fn execute(&self, operation: &BatchOperation) -> CallResult;
}

/// Lifecycle notifications, one per state change.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    Completed {
        operation: BatchOperation,
        result: CallResult,
    },
    RetryScheduled {
        id: BatchOperationId,
        retry_count: u32,
        max_retries: u32,
        result: CallResult,
    },
    /// Terminal: the operation has left the queue and will not run again.
    Failed {
        operation: BatchOperation,
        result: CallResult,
    },
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Pending plus in-flight operations allowed before `enqueue` refuses.
    pub capacity: usize,
    /// Pause after re-queueing a failed operation.
    pub retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            retry_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Default)]
struct QueueState {
    /// Keyed by (tier, enqueue sequence): iteration order is drain order.
    pending: BTreeMap<(Priority, u64), BatchOperation>,
    next_seq: u64,
    in_flight: Option<BatchOperationId>,
    draining: bool,
    completed: u64,
    failed: u64,
}

enum Step {
    Run(BatchOperation),
    WaitUntil(DateTime<Utc>),
    Done,
}

impl QueueState {
    fn insert(&mut self, operation: BatchOperation) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert((operation.priority, seq), operation);
    }

    fn next_step(&mut self, now: DateTime<Utc>) -> Step {
        let due = self
            .pending
            .iter()
            .find(|(_, op)| op.is_due(now))
            .map(|(key, _)| *key);

        if let Some(key) = due {
            if let Some(op) = self.pending.remove(&key) {
                self.in_flight = Some(op.id);
                return Step::Run(op);
            }
        }

        match self.pending.values().filter_map(|op| op.scheduled_for).min() {
            Some(at) => Step::WaitUntil(at),
            None => {
                self.draining = false;
                Step::Done
            }
        }
    }

    fn status(&self, capacity: usize) -> BatchQueueStatus {
        let tier = |p: Priority| self.pending.keys().filter(|(tier, _)| *tier == p).count();
        BatchQueueStatus {
            pending: self.pending.len(),
            high: tier(Priority::High),
            medium: tier(Priority::Medium),
            low: tier(Priority::Low),
            in_flight: self.in_flight,
            is_draining: self.draining,
            completed: self.completed,
            failed: self.failed,
            capacity,
        }
    }
}

struct QueueShared {
    state: Mutex<QueueState>,
    executor: Arc<dyn BatchExecutor>,
    config: QueueConfig,
    events: broadcast::Sender<QueueEvent>,
    wake: Notify,
    idle: Notify,
    metrics: Option<WebhookMetrics>,
}

impl QueueShared {
    fn publish(&self, event: QueueEvent) {
        // No subscribers is fine; outcomes are also logged and counted.
        let _ = self.events.send(event);
    }

    fn observe_pending(&self, pending: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.set_queue_pending(pending);
        }
    }

    fn observe_outcome(&self, operation: &BatchOperation, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_batch_outcome(operation.op_type.as_str(), outcome);
        }
    }
}

/// Single-worker priority queue. Cloning shares the same queue.
#[derive(Clone)]
pub struct BatchQueue {
    shared: Arc<QueueShared>,
}

impl BatchQueue {
    pub fn new(executor: Arc<dyn BatchExecutor>, config: QueueConfig) -> Self {
        Self::with_metrics(executor, config, None)
    }

    pub fn with_metrics(
        executor: Arc<dyn BatchExecutor>,
        config: QueueConfig,
        metrics: Option<WebhookMetrics>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState::default()),
                executor,
                config,
                events,
                wake: Notify::new(),
                idle: Notify::new(),
                metrics,
            }),
        }
    }

    /// Add an operation and make sure the drain task is running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, operation: BatchOperation) -> Result<BatchOperationId> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            OrchestratorError::Internal(anyhow::anyhow!(
                "batch queue requires a running Tokio runtime"
            ))
        })?;

        let id = operation.id;
        let priority = operation.priority;
        let op_type = operation.op_type;

        let start_drain = {
            let mut state = self.shared.state.lock();
            let occupied = state.pending.len() + usize::from(state.in_flight.is_some());
            if occupied >= self.shared.config.capacity {
                warn!(
                    capacity = self.shared.config.capacity,
                    op_type = op_type.as_str(),
                    "batch queue saturated, rejecting operation"
                );
                return Err(OrchestratorError::QueueSaturated {
                    capacity: self.shared.config.capacity,
                });
            }
            state.insert(operation);
            self.shared.observe_pending(state.pending.len());
            let start = !state.draining;
            state.draining = true;
            start
        };

        debug!(
            operation_id = %id,
            op_type = op_type.as_str(),
            priority = priority.as_str(),
            "batch operation enqueued"
        );

        if start_drain {
            runtime.spawn(drain(self.shared.clone()));
        } else {
            self.shared.wake.notify_one();
        }
        Ok(id)
    }

    pub fn status(&self) -> BatchQueueStatus {
        self.shared.state.lock().status(self.shared.config.capacity)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }

    /// Drop every pending operation (the in-flight one finishes normally).
    pub fn clear(&self) -> usize {
        let mut state = self.shared.state.lock();
        let removed = state.pending.len();
        state.pending.clear();
        self.shared.observe_pending(0);
        if removed > 0 {
            info!(removed, "batch queue cleared");
        }
        removed
    }

    /// Resolves once nothing is pending and the drain task has stopped.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.shared.state.lock();
                if !state.draining && state.pending.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }
}

/// Resets the draining flag if the drain task unwinds mid-operation, so a
/// later `enqueue` can start a fresh one.
struct DrainGuard {
    shared: Arc<QueueShared>,
    finished: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.shared.state.lock();
            error!(in_flight = ?state.in_flight, "batch drain task aborted");
            state.in_flight = None;
            state.draining = false;
            drop(state);
            self.shared.idle.notify_waiters();
        }
    }
}

async fn drain(shared: Arc<QueueShared>) {
    let mut guard = DrainGuard {
        shared: shared.clone(),
        finished: false,
    };
    debug!("batch drain started");

    loop {
        let step = {
            let mut state = shared.state.lock();
            let step = state.next_step(Utc::now());
            shared.observe_pending(state.pending.len());
            step
        };

        let mut operation = match step {
            Step::Run(op) => op,
            Step::WaitUntil(at) => {
                let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shared.wake.notified() => {}
                }
                continue;
            }
            Step::Done => {
                guard.finished = true;
                shared.idle.notify_waiters();
                debug!("batch drain finished");
                return;
            }
        };

        debug!(
            operation_id = %operation.id,
            op_type = operation.op_type.as_str(),
            priority = operation.priority.as_str(),
            retry_count = operation.retry_count,
            "executing batch operation"
        );

        let result = shared.executor.execute(&operation).await;

        if result.success {
            {
                let mut state = shared.state.lock();
                state.in_flight = None;
                state.completed += 1;
            }
            info!(
                operation_id = %operation.id,
                op_type = operation.op_type.as_str(),
                execution_id = ?result.execution_id,
                "batch operation completed"
            );
            shared.observe_outcome(&operation, "completed");
            shared.publish(QueueEvent::Completed { operation, result });
            continue;
        }

        if result.is_retryable() && !operation.retries_exhausted() {
            operation.retry_count += 1;
            let id = operation.id;
            let retry_count = operation.retry_count;
            let max_retries = operation.max_retries;
            {
                let mut state = shared.state.lock();
                state.in_flight = None;
                state.insert(operation.clone());
                shared.observe_pending(state.pending.len());
            }
            warn!(
                operation_id = %id,
                op_type = operation.op_type.as_str(),
                retry_count,
                max_retries,
                error = ?result.error,
                "batch operation failed, re-queued"
            );
            shared.observe_outcome(&operation, "retried");
            shared.publish(QueueEvent::RetryScheduled {
                id,
                retry_count,
                max_retries,
                result,
            });
            if !shared.config.retry_delay.is_zero() {
                tokio::time::sleep(shared.config.retry_delay).await;
            }
            continue;
        }

        {
            let mut state = shared.state.lock();
            state.in_flight = None;
            state.failed += 1;
        }
        error!(
            operation_id = %operation.id,
            op_type = operation.op_type.as_str(),
            retry_count = operation.retry_count,
            error = ?result.error,
            status = ?result.status_code,
            "batch operation failed permanently"
        );
        shared.observe_outcome(&operation, "failed");
        shared.publish(QueueEvent::Failed { operation, result });
    }
}
