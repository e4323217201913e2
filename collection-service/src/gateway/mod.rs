//! Provider-agnostic gateway capability.
//!
//! The orchestrator only ever sees the [`Gateway`] trait and the canonical
//! types below; each adapter owns its wire schema, signature
//! canonicalization, and webhook decoding.

pub mod billdesk;
pub mod razorpay;
pub mod registry;

use async_trait::async_trait;
use axum::http::HeaderMap;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{PaymentMethod, Provider};
use service_core::error::AppError;

pub use billdesk::BilldeskAdapter;
pub use razorpay::RazorpayAdapter;
pub use registry::GatewayRegistry;

/// Hard deadline for every gateway HTTP call.
pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded retries for idempotent gateway calls.
const MAX_RETRIES: u32 = 2;

/// Typed gateway failure. Transient failures (connect errors, timeouts,
/// 5xx) may be retried and trigger reconciliation; permanent failures
/// (4xx, unknown order) are recorded and never retried.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transient gateway error: {0}")]
    Transient(anyhow::Error),

    #[error("permanent gateway error: {0}")]
    Permanent(anyhow::Error),

    #[error("invalid gateway signature")]
    InvalidSignature,

    /// Signature was valid but the event type carries no canonical outcome.
    /// The ingestor acknowledges these so the gateway stops redelivering.
    #[error("unsupported gateway event type: {0}")]
    UnsupportedEvent(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Transient(e) => AppError::GatewayTransient(e),
            GatewayError::Permanent(e) => AppError::GatewayPermanent(e),
            GatewayError::InvalidSignature => {
                AppError::Unauthorized(anyhow::anyhow!("invalid gateway signature"))
            }
            GatewayError::UnsupportedEvent(event) => {
                AppError::GatewayPermanent(anyhow::anyhow!("unsupported event type: {}", event))
            }
        }
    }
}

/// Which surface delivered the signed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureChannel {
    Webhook,
    ReturnRedirect,
}

/// What happened to the money, as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Captured,
    Failed,
    Expired,
    Refunded,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Captured => "captured",
            EventOutcome::Failed => "failed",
            EventOutcome::Expired => "expired",
            EventOutcome::Refunded => "refunded",
        }
    }
}

/// Canonical event consumed by the orchestrator's apply path. Produced
/// either by an adapter decoding a verified webhook, or synthesized by
/// reconciliation from a fetched order snapshot.
#[derive(Debug, Clone)]
pub struct CanonicalEvent {
    pub provider: Provider,
    pub gateway_event_id: String,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub outcome: EventOutcome,
    pub amount_minor: i64,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Order creation input.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub amount_minor: i64,
    pub currency: String,
    pub internal_order_id: Uuid,
    pub description: String,
    pub allowed_methods: Vec<PaymentMethod>,
}

/// Order creation result.
#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub gateway_order_id: String,
    pub hosted_payment_url: String,
    pub expires_utc: Option<DateTime<Utc>>,
}

/// Gateway-side order state observed by polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Created,
    Authorized,
    Captured,
    Failed,
    Expired,
    Refunded,
}

/// Result of fetching an order from the gateway.
#[derive(Debug, Clone)]
pub struct OrderSnapshot {
    pub state: OrderState,
    pub gateway_payment_id: Option<String>,
    pub amount_minor: i64,
    pub error_code: Option<String>,
}

/// Refund creation result.
#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub gateway_refund_id: String,
    pub accepted: bool,
}

/// The four operations every payment provider must support.
#[async_trait]
pub trait Gateway: Send + Sync {
    fn provider(&self) -> Provider;

    /// Create a hosted-payment order. Not retried: the caller owns recovery
    /// via a fresh initiate.
    async fn create_order(&self, order: &CreateOrder) -> Result<GatewayOrder, GatewayError>;

    /// Fetch current order state. Idempotent; retried on transient errors.
    async fn fetch_order(&self, gateway_order_id: &str) -> Result<OrderSnapshot, GatewayError>;

    /// Verify the provider signature over the raw payload and decode the
    /// canonical event. Never mutates core state.
    fn verify_signature(
        &self,
        channel: SignatureChannel,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> Result<CanonicalEvent, GatewayError>;

    /// Create a refund against a captured payment.
    async fn create_refund(
        &self,
        gateway_payment_id: &str,
        amount_minor: i64,
        reason: &str,
    ) -> Result<GatewayRefund, GatewayError>;
}

/// Retry an idempotent gateway call with exponential backoff and jitter.
/// Attempts are bounded (initial call + MAX_RETRIES); only transient
/// failures are retried.
pub(crate) async fn retry_idempotent<T, Fut>(
    op_name: &str,
    mut op: impl FnMut() -> Fut,
) -> Result<T, GatewayError>
where
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(200))
        .with_randomization_factor(0.5)
        .with_max_elapsed_time(None)
        .build();

    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                attempt += 1;
                let delay = policy
                    .next_backoff()
                    .unwrap_or_else(|| Duration::from_millis(500));
                tracing::warn!(
                    op = op_name,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying transient gateway failure"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Classify a reqwest transport failure.
pub(crate) fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() || err.is_connect() {
        GatewayError::Transient(anyhow::Error::new(err))
    } else {
        GatewayError::Permanent(anyhow::Error::new(err))
    }
}

/// Classify a non-success HTTP status from the gateway. The body is kept
/// out of the error message so raw gateway payloads never leak upward.
pub(crate) fn status_error(op: &str, status: reqwest::StatusCode) -> GatewayError {
    if status.is_server_error() {
        GatewayError::Transient(anyhow::anyhow!("{} returned {}", op, status))
    } else {
        GatewayError::Permanent(anyhow::anyhow!("{} returned {}", op, status))
    }
}
