//! hookline: client-side orchestration for webhook-driven workflow engines.
//!
//! Business modules call named operations on [`WebhookService`]; the service
//! resolves each one to a webhook URL, calls it with retry and backoff,
//! normalizes the response into a [`CallResult`], tracks rolling health, and
//! optionally drains queued work by priority in the background.

pub mod config;
pub mod endpoints;
pub mod errors;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod service;
pub mod store;
pub mod transport;

pub use config::WebhookConfig;
pub use endpoints::{EndpointRegistry, Operation};
pub use errors::{OrchestratorError, Result};
pub use jobs::batch_queue::QueueEvent;
pub use models::batch::{BatchOperation, BatchOperationId, BatchQueueStatus, OperationType, Priority};
pub use models::call_result::{CallResult, FailureKind};
pub use models::health::HealthSnapshot;
pub use service::WebhookService;
pub use transport::{HttpTransport, ReqwestTransport};
