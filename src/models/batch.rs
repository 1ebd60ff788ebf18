use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::endpoints::Operation;

/// Unique identifier of a queued batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchOperationId(pub Uuid);

impl BatchOperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchOperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchOperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Business operations that may be queued for asynchronous execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Invoice,
    PurchaseOrder,
    Payment,
    Stock,
}

impl OperationType {
    /// The webhook that executes this kind of batch operation.
    pub fn operation(self) -> Operation {
        match self {
            OperationType::Invoice => Operation::EmitInvoice,
            OperationType::PurchaseOrder => Operation::CreatePurchaseOrder,
            OperationType::Payment => Operation::RecordPayment,
            OperationType::Stock => Operation::StockMovement,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Invoice => "invoice",
            OperationType::PurchaseOrder => "purchase_order",
            OperationType::Payment => "payment",
            OperationType::Stock => "stock",
        }
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice" => Ok(OperationType::Invoice),
            "purchase_order" | "purchase-order" => Ok(OperationType::PurchaseOrder),
            "payment" => Ok(OperationType::Payment),
            "stock" => Ok(OperationType::Stock),
            other => Err(format!("unknown operation type '{}'", other)),
        }
    }
}

/// Priority tier. Declaration order is drain order: `High < Medium < Low`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// A business operation waiting in the batch queue.
///
/// Owned by exactly one queue from `enqueue` until it completes or fails
/// terminally. `retry_count` only moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOperation {
    pub id: BatchOperationId,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl BatchOperation {
    pub fn new(
        op_type: OperationType,
        payload: serde_json::Value,
        priority: Priority,
        max_retries: u32,
    ) -> Self {
        Self {
            id: BatchOperationId::new(),
            op_type,
            payload,
            priority,
            retry_count: 0,
            max_retries,
            created_at: Utc::now(),
            scheduled_for: None,
        }
    }

    /// Defer the first attempt until `at`.
    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_for.map_or(true, |at| at <= now)
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Point-in-time view of a batch queue. Reading it has no side effects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchQueueStatus {
    pub pending: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub in_flight: Option<BatchOperationId>,
    pub is_draining: bool,
    pub completed: u64,
    pub failed: u64,
    pub capacity: usize,
}
