//! Business payloads sent to the workflow engine.
//!
//! Only the fields the local shape checks need are modelled. Anything else the
//! workflow expects travels in `extra`, which is flattened into the JSON body.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{OrchestratorError, Result};

/// Local shape checks run before any network call.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl LineItem {
    /// `None` when quantity x unit price does not fit in a `Decimal`.
    pub fn total(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.unit_price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePayload {
    pub invoice_number: String,
    pub customer_id: String,
    pub issue_date: NaiveDate,
    /// ISO 4217 code, e.g. "EUR".
    pub currency: String,
    pub items: Vec<LineItem>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Validate for InvoicePayload {
    fn validate(&self) -> Result<()> {
        require_non_empty("invoiceNumber", &self.invoice_number)?;
        require_non_empty("customerId", &self.customer_id)?;
        require_currency(&self.currency)?;
        if self.items.is_empty() {
            return Err(OrchestratorError::validation(
                "invoice must contain at least one line item",
            ));
        }
        validate_lines(&self.items)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderPayload {
    pub order_number: String,
    pub supplier_id: String,
    pub currency: String,
    pub items: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_delivery: Option<NaiveDate>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Validate for PurchaseOrderPayload {
    fn validate(&self) -> Result<()> {
        require_non_empty("orderNumber", &self.order_number)?;
        require_non_empty("supplierId", &self.supplier_id)?;
        require_currency(&self.currency)?;
        if self.items.is_empty() {
            return Err(OrchestratorError::validation(
                "purchase order must contain at least one line item",
            ));
        }
        validate_lines(&self.items)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Card,
    Check,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub invoice_id: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub paid_on: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Validate for PaymentPayload {
    fn validate(&self) -> Result<()> {
        require_non_empty("invoiceId", &self.invoice_id)?;
        if self.amount <= Decimal::ZERO {
            return Err(OrchestratorError::validation(format!(
                "payment amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    In,
    Out,
    Adjustment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovementPayload {
    pub product_id: String,
    pub kind: MovementKind,
    /// Positive for `in`/`out`; signed for `adjustment`.
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Validate for StockMovementPayload {
    fn validate(&self) -> Result<()> {
        require_non_empty("productId", &self.product_id)?;
        if self.quantity.is_zero() {
            return Err(OrchestratorError::validation(
                "stock movement quantity must not be zero",
            ));
        }
        if self.kind != MovementKind::Adjustment && self.quantity.is_sign_negative() {
            return Err(OrchestratorError::validation(format!(
                "quantity for an '{}' movement must be positive",
                match self.kind {
                    MovementKind::In => "in",
                    _ => "out",
                }
            )));
        }
        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(OrchestratorError::validation(format!("{} is required", field)));
    }
    Ok(())
}

fn require_currency(code: &str) -> Result<()> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(OrchestratorError::validation(format!(
            "currency must be a 3-letter ISO code, got '{}'",
            code
        )));
    }
    Ok(())
}

fn validate_lines(items: &[LineItem]) -> Result<()> {
    for (idx, item) in items.iter().enumerate() {
        require_non_empty(&format!("items[{}].description", idx), &item.description)?;
        if item.quantity <= Decimal::ZERO {
            return Err(OrchestratorError::validation(format!(
                "items[{}].quantity must be positive",
                idx
            )));
        }
        if item.unit_price.is_sign_negative() {
            return Err(OrchestratorError::validation(format!(
                "items[{}].unitPrice must not be negative",
                idx
            )));
        }
    }
    items
        .iter()
        .try_fold(Decimal::ZERO, |sum, item| sum.checked_add(item.total()?))
        .map(|_| ())
        .ok_or_else(|| OrchestratorError::validation("line item totals overflow"))
}
