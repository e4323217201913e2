//! Payment model and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::enums::{ChargeType, PaymentMethod, Provider};

/// Payment lifecycle state.
///
/// `Settled` is the single canonical success terminal; the permitted edges
/// in [`PaymentState::can_transition`] are the only writes to a payment's
/// state column anywhere in the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Created,
    AuthorizedPending,
    Settled,
    Failed,
    Expired,
    Cancelled,
    Refunded,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Created => "created",
            PaymentState::AuthorizedPending => "authorized_pending",
            PaymentState::Settled => "settled",
            PaymentState::Failed => "failed",
            PaymentState::Expired => "expired",
            PaymentState::Cancelled => "cancelled",
            PaymentState::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(PaymentState::Created),
            "authorized_pending" => Some(PaymentState::AuthorizedPending),
            "settled" => Some(PaymentState::Settled),
            "failed" => Some(PaymentState::Failed),
            "expired" => Some(PaymentState::Expired),
            "cancelled" => Some(PaymentState::Cancelled),
            "refunded" => Some(PaymentState::Refunded),
            _ => None,
        }
    }

    /// Terminal states carry a non-null processed_utc and accept no further
    /// edges except Settled -> Refunded.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentState::Settled
                | PaymentState::Failed
                | PaymentState::Expired
                | PaymentState::Cancelled
                | PaymentState::Refunded
        )
    }

    /// Whether the edge `self -> to` is a legal transition.
    pub fn can_transition(self, to: PaymentState) -> bool {
        use PaymentState::*;
        matches!(
            (self, to),
            (Created, AuthorizedPending)
                | (Created, Failed)
                | (AuthorizedPending, Settled)
                | (AuthorizedPending, Failed)
                | (AuthorizedPending, Expired)
                | (AuthorizedPending, Cancelled)
                | (Settled, Refunded)
        )
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single payment attempt against an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub tenant_id: Uuid,
    pub client_id: Uuid,
    pub invoice_id: Uuid,
    pub account_id: Uuid,
    pub charge_type: String,
    pub order_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub state: String,
    pub provider: String,
    pub method: String,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub last_gateway_event_id: Option<String>,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub hosted_payment_url: Option<String>,
    pub receipt_url: Option<String>,
    pub idempotency_key: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub processed_utc: Option<DateTime<Utc>>,
    pub expires_utc: Option<DateTime<Utc>>,
}

impl Payment {
    /// Typed state; `None` means the row holds a value outside the enum,
    /// which is an integrity violation.
    pub fn typed_state(&self) -> Option<PaymentState> {
        PaymentState::parse(&self.state)
    }

    pub fn typed_provider(&self) -> Option<Provider> {
        Provider::parse(&self.provider)
    }
}

/// Input for inserting a payment row in state `created`.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub tenant_id: Uuid,
    pub client_id: Uuid,
    pub invoice_id: Uuid,
    pub account_id: Uuid,
    pub charge_type: ChargeType,
    pub amount_minor: i64,
    pub currency: String,
    pub provider: Provider,
    pub method: PaymentMethod,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub idempotency_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_edges() {
        use PaymentState::*;
        assert!(Created.can_transition(AuthorizedPending));
        assert!(AuthorizedPending.can_transition(Settled));
        assert!(AuthorizedPending.can_transition(Failed));
        assert!(AuthorizedPending.can_transition(Expired));
        assert!(AuthorizedPending.can_transition(Cancelled));
        assert!(Settled.can_transition(Refunded));
    }

    #[test]
    fn illegal_edges_are_rejected() {
        use PaymentState::*;
        // A late failure webhook must not undo a settlement.
        assert!(!Settled.can_transition(Failed));
        // A late capture must not revive an expired payment.
        assert!(!Expired.can_transition(Settled));
        assert!(!Created.can_transition(Settled));
        assert!(!Failed.can_transition(AuthorizedPending));
        assert!(!Refunded.can_transition(Settled));
        assert!(!Cancelled.can_transition(Settled));
    }

    #[test]
    fn terminal_set_matches_processed_at_invariant() {
        use PaymentState::*;
        for state in [Created, AuthorizedPending] {
            assert!(!state.is_terminal());
        }
        for state in [Settled, Failed, Expired, Cancelled, Refunded] {
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn state_strings_round_trip() {
        use PaymentState::*;
        for state in [
            Created,
            AuthorizedPending,
            Settled,
            Failed,
            Expired,
            Cancelled,
            Refunded,
        ] {
            assert_eq!(PaymentState::parse(state.as_str()), Some(state));
        }
        assert_eq!(PaymentState::parse("completed"), None);
        assert_eq!(PaymentState::parse("successful"), None);
    }
}
