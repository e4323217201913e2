//! Tenant revenue account model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::enums::ChargeType;

/// One revenue account per (tenant, charge type).
///
/// Totals are monotonically non-decreasing and mutated only by the payment
/// orchestrator under the account row lock; total_refunded_minor never
/// exceeds total_collected_minor.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantAccount {
    pub account_id: Uuid,
    pub tenant_id: Uuid,
    pub charge_type: String,
    pub display_name: String,
    pub description: Option<String>,
    pub razorpay_account_id: Option<String>,
    pub billdesk_account_id: Option<String>,
    pub bank_account_name: Option<String>,
    pub bank_account_no: Option<String>,
    pub ifsc_code: Option<String>,
    pub is_active: bool,
    pub total_collected_minor: i64,
    pub total_refunded_minor: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a revenue account.
#[derive(Debug, Clone)]
pub struct CreateAccount {
    pub tenant_id: Uuid,
    pub charge_type: ChargeType,
    pub display_name: String,
    pub description: Option<String>,
    pub bank_account_name: Option<String>,
    pub bank_account_no: Option<String>,
    pub ifsc_code: Option<String>,
}

/// Metadata update; never touches totals or the charge type.
#[derive(Debug, Clone, Default)]
pub struct UpdateAccount {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub bank_account_name: Option<String>,
    pub bank_account_no: Option<String>,
    pub ifsc_code: Option<String>,
    pub is_active: Option<bool>,
}
