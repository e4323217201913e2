//! Refund model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundState {
    Pending,
    Successful,
    Failed,
}

impl RefundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundState::Pending => "pending",
            RefundState::Successful => "successful",
            RefundState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RefundState::Pending),
            "successful" => Some(RefundState::Successful),
            "failed" => Some(RefundState::Failed),
            _ => None,
        }
    }
}

/// Refund against a settled payment. The sum of successful refund amounts
/// for a payment never exceeds the payment amount.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Refund {
    pub refund_id: Uuid,
    pub payment_id: Uuid,
    pub tenant_id: Uuid,
    pub amount_minor: i64,
    pub state: String,
    pub gateway_refund_id: Option<String>,
    pub reason: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub processed_utc: Option<DateTime<Utc>>,
}
