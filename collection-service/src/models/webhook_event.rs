//! Persisted webhook dedup / audit log entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookApplyState {
    Received,
    Applied,
    Rejected,
}

impl WebhookApplyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookApplyState::Received => "received",
            WebhookApplyState::Applied => "applied",
            WebhookApplyState::Rejected => "rejected",
        }
    }
}

/// Each (provider, gateway_event_id) is recorded exactly once; the insert
/// is the idempotency fence for the whole apply path.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookEvent {
    pub event_id: Uuid,
    pub provider: String,
    pub gateway_event_id: String,
    pub received_utc: DateTime<Utc>,
    pub signature_ok: bool,
    pub payload_hash: String,
    pub payment_id: Option<Uuid>,
    pub apply_state: String,
    pub apply_error: Option<String>,
}
