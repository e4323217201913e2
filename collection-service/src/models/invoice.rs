//! Invoice model and status derivation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::enums::ChargeType;

/// Invoice status, derived deterministically from (paid, amount, due date).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    PartialPaid,
    Paid,
    Overdue,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::PartialPaid => "partial_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Void => "void",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "issued" => Some(InvoiceStatus::Issued),
            "partial_paid" => Some(InvoiceStatus::PartialPaid),
            "paid" => Some(InvoiceStatus::Paid),
            "overdue" => Some(InvoiceStatus::Overdue),
            "void" => Some(InvoiceStatus::Void),
            _ => None,
        }
    }

    /// Status for a live (non-void) invoice.
    ///
    /// paid = 0 => issued, or overdue once the due date has passed;
    /// 0 < paid < amount => partial_paid; paid = amount => paid.
    pub fn derive(paid_minor: i64, amount_minor: i64, due_date: NaiveDate, today: NaiveDate) -> Self {
        if paid_minor == 0 {
            if today > due_date {
                InvoiceStatus::Overdue
            } else {
                InvoiceStatus::Issued
            }
        } else if paid_minor < amount_minor {
            InvoiceStatus::PartialPaid
        } else {
            InvoiceStatus::Paid
        }
    }
}

/// A bill issued to a client.
///
/// Invariant: paid_minor + outstanding_minor = amount_minor at all times;
/// both paid and outstanding are mutated only by the payment orchestrator
/// applying a settled payment, or by an explicit void while unpaid.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub client_id: Uuid,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub charge_type: String,
    pub invoice_number: String,
    pub amount_minor: i64,
    pub paid_minor: i64,
    pub outstanding_minor: i64,
    pub currency: String,
    pub description: Option<String>,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: String,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating an invoice (issued immediately).
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub tenant_id: Uuid,
    pub client_id: Uuid,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub charge_type: ChargeType,
    pub amount_minor: i64,
    pub currency: String,
    pub description: Option<String>,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub metadata: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn unpaid_invoice_is_issued_until_due_date_passes() {
        let due = d("2026-03-15");
        assert_eq!(
            InvoiceStatus::derive(0, 500_000, due, d("2026-03-10")),
            InvoiceStatus::Issued
        );
        // Due date itself is not yet overdue.
        assert_eq!(
            InvoiceStatus::derive(0, 500_000, due, due),
            InvoiceStatus::Issued
        );
        assert_eq!(
            InvoiceStatus::derive(0, 500_000, due, d("2026-03-16")),
            InvoiceStatus::Overdue
        );
    }

    #[test]
    fn partial_and_full_payment_override_overdue() {
        let due = d("2026-03-15");
        let late = d("2026-04-01");
        assert_eq!(
            InvoiceStatus::derive(200_000, 500_000, due, late),
            InvoiceStatus::PartialPaid
        );
        assert_eq!(
            InvoiceStatus::derive(500_000, 500_000, due, late),
            InvoiceStatus::Paid
        );
    }
}
