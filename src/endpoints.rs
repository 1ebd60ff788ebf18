//! Logical business operations and the webhook paths they map to.
//!
//! A registry is complete by construction: every [`Operation`] always resolves
//! to exactly one path, so a missing mapping surfaces when the configuration
//! is loaded rather than in the middle of a call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::errors::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    EmitInvoice,
    CreatePurchaseOrder,
    RecordPayment,
    StockMovement,
    HealthCheck,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::EmitInvoice,
        Operation::CreatePurchaseOrder,
        Operation::RecordPayment,
        Operation::StockMovement,
        Operation::HealthCheck,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::EmitInvoice => "emit-invoice",
            Operation::CreatePurchaseOrder => "create-purchase-order",
            Operation::RecordPayment => "record-payment",
            Operation::StockMovement => "stock-movement",
            Operation::HealthCheck => "health-check",
        }
    }

    /// Default webhook path, relative to `{baseUrl}/webhook/`.
    pub fn default_path(self) -> &'static str {
        match self {
            Operation::EmitInvoice => "emit-invoice",
            Operation::CreatePurchaseOrder => "purchase-order",
            Operation::RecordPayment => "record-payment",
            Operation::StockMovement => "stock-movement",
            Operation::HealthCheck => "health-check",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| OrchestratorError::config(format!("unknown operation '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRegistry {
    paths: HashMap<Operation, String>,
}

impl EndpointRegistry {
    /// Registry with every operation on its default path.
    pub fn new() -> Self {
        Self {
            paths: Operation::ALL
                .into_iter()
                .map(|op| (op, op.default_path().to_string()))
                .collect(),
        }
    }

    /// Registry with some defaults replaced. Leading/trailing slashes are
    /// trimmed; an override that is empty afterwards, or contains characters
    /// not allowed in a path segment, is a configuration error.
    pub fn with_overrides(overrides: &HashMap<Operation, String>) -> Result<Self> {
        let mut registry = Self::new();
        for (op, raw) in overrides {
            let path = raw.trim().trim_matches('/');
            if path.is_empty() {
                return Err(OrchestratorError::config(format!(
                    "endpoint path for '{}' must not be empty",
                    op
                )));
            }
            if path.contains(['?', '#', ' ']) {
                return Err(OrchestratorError::config(format!(
                    "endpoint path for '{}' contains invalid characters: '{}'",
                    op, raw
                )));
            }
            registry.paths.insert(*op, path.to_string());
        }
        Ok(registry)
    }

    pub fn resolve(&self, op: Operation) -> &str {
        // Every variant is inserted by `new`, and overrides only replace.
        self.paths
            .get(&op)
            .map(String::as_str)
            .unwrap_or_else(|| op.default_path())
    }

    /// `{base}/webhook/{path}` for an operation.
    pub fn url(&self, base: &Url, op: Operation) -> Result<Url> {
        webhook_url(base, self.resolve(op))
    }

    /// (operation, path) pairs in declaration order.
    pub fn entries(&self) -> Vec<(Operation, &str)> {
        Operation::ALL
            .into_iter()
            .map(|op| (op, self.resolve(op)))
            .collect()
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Join a webhook path onto the base URL, keeping any path prefix the base
/// already has (e.g. `https://host/flows`).
pub fn webhook_url(base: &Url, path: &str) -> Result<Url> {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return Err(OrchestratorError::config("webhook path must not be empty"));
    }
    let joined = format!("{}/webhook/{}", base.as_str().trim_end_matches('/'), path);
    Url::parse(&joined)
        .map_err(|e| OrchestratorError::config(format!("invalid webhook URL '{}': {}", joined, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://flows.example.com/").unwrap()
    }

    #[test]
    fn test_every_operation_resolves() {
        let registry = EndpointRegistry::new();
        for op in Operation::ALL {
            assert_eq!(registry.resolve(op), op.default_path());
        }
    }

    #[test]
    fn test_url_building() {
        let registry = EndpointRegistry::new();
        let url = registry.url(&base(), Operation::HealthCheck).unwrap();
        assert_eq!(url.as_str(), "https://flows.example.com/webhook/health-check");
    }

    #[test]
    fn test_url_keeps_base_prefix() {
        let base = Url::parse("http://localhost:5678/flows").unwrap();
        let url = webhook_url(&base, "/emit-invoice/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5678/flows/webhook/emit-invoice");
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert(Operation::EmitInvoice, "/invoices/v2/".to_string());
        let registry = EndpointRegistry::with_overrides(&overrides).unwrap();
        assert_eq!(registry.resolve(Operation::EmitInvoice), "invoices/v2");
        assert_eq!(registry.resolve(Operation::RecordPayment), "record-payment");
    }

    #[test]
    fn test_empty_override_is_configuration_error() {
        let mut overrides = HashMap::new();
        overrides.insert(Operation::StockMovement, " / ".to_string());
        let err = EndpointRegistry::with_overrides(&overrides).unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn test_override_with_query_is_rejected() {
        let mut overrides = HashMap::new();
        overrides.insert(Operation::StockMovement, "stock?x=1".to_string());
        assert!(EndpointRegistry::with_overrides(&overrides).is_err());
    }

    #[test]
    fn test_operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("refund".parse::<Operation>().is_err());
    }
}
