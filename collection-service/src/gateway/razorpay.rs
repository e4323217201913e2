//! Razorpay gateway adapter.
//!
//! Implements Razorpay's Orders API for payment initiation, the payments
//! sub-resource for capture lookup, the refund API, and HMAC-SHA256
//! signature verification for webhooks and checkout redirects.

use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{
    retry_idempotent, status_error, transport_error, CanonicalEvent, CreateOrder, EventOutcome,
    Gateway, GatewayError, GatewayOrder, GatewayRefund, OrderSnapshot, OrderState,
    SignatureChannel, GATEWAY_TIMEOUT,
};
use crate::models::{GatewayConfig, Provider, RazorpaySettings};
use service_core::error::AppError;

const DEFAULT_API_BASE_URL: &str = "https://api.razorpay.com/v1";
const CHECKOUT_BASE_URL: &str = "https://checkout.razorpay.com/v1";

/// Razorpay client. One instance per credential set; cached by the
/// gateway registry keyed on config id and version.
pub struct RazorpayAdapter {
    client: Client,
    key_id: String,
    key_secret: Secret<String>,
    webhook_secret: Secret<String>,
    api_base_url: String,
}

#[derive(Debug, Serialize)]
struct OrderRequest {
    /// Amount in the smallest currency unit (paise for INR).
    amount: i64,
    currency: String,
    receipt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OrderEntity {
    id: String,
    amount: i64,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    amount: i64,
    status: String,
    order_id: Option<String>,
    error_code: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentCollection {
    items: Vec<PaymentEntity>,
}

#[derive(Debug, Deserialize)]
struct RefundEntity {
    id: String,
    status: String,
}

/// Razorpay webhook envelope.
#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: Option<WebhookPaymentEntity>,
    refund: Option<WebhookRefundEntity>,
}

#[derive(Debug, Deserialize)]
struct WebhookPaymentEntity {
    entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
struct WebhookRefundEntity {
    entity: WebhookRefund,
}

#[derive(Debug, Deserialize)]
struct WebhookRefund {
    amount: i64,
    payment_id: String,
}

impl RazorpayAdapter {
    /// Build from explicit credentials. Fails fast on missing values.
    pub fn new(
        key_id: String,
        key_secret: Secret<String>,
        webhook_secret: Secret<String>,
        api_base_url: Option<String>,
    ) -> Result<Self, AppError> {
        if key_id.is_empty() || key_secret.expose_secret().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "razorpay key id and secret required"
            )));
        }

        let client = Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

        Ok(Self {
            client,
            key_id,
            key_secret,
            webhook_secret,
            api_base_url: api_base_url.unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        })
    }

    /// Build from a tenant's stored gateway config. `provider_settings`
    /// must decode to [`RazorpaySettings`].
    pub fn from_config(config: &GatewayConfig, api_base_url: Option<String>) -> Result<Self, AppError> {
        let settings: RazorpaySettings = config
            .provider_settings
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("invalid razorpay settings: {}", e))
            })?
            .ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("razorpay settings missing webhook secret"))
            })?;

        Self::new(
            config.api_key.clone(),
            Secret::new(config.api_secret.clone()),
            Secret::new(settings.webhook_secret),
            api_base_url,
        )
    }

    fn compute_signature(&self, payload: &[u8], secret: &str) -> Result<String, GatewayError> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| GatewayError::Permanent(anyhow::anyhow!("invalid hmac key length")))?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signature_matches(
        &self,
        payload: &[u8],
        secret: &str,
        provided: &str,
    ) -> Result<bool, GatewayError> {
        let expected = self.compute_signature(payload, secret)?;
        Ok(expected.as_bytes().ct_eq(provided.as_bytes()).into())
    }

    fn map_payment_status(status: &str) -> Option<EventOutcome> {
        match status {
            "captured" => Some(EventOutcome::Captured),
            "failed" => Some(EventOutcome::Failed),
            _ => None,
        }
    }

    async fn fetch_captured_payment(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentEntity>, GatewayError> {
        let url = format!("{}/orders/{}/payments", self.api_base_url, gateway_order_id);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("razorpay list payments", status));
        }

        let collection: PaymentCollection = response
            .json()
            .await
            .map_err(|e| GatewayError::Permanent(anyhow::Error::new(e)))?;

        Ok(collection
            .items
            .into_iter()
            .find(|p| p.status == "captured"))
    }
}

#[async_trait]
impl Gateway for RazorpayAdapter {
    fn provider(&self) -> Provider {
        Provider::Razorpay
    }

    async fn create_order(&self, order: &CreateOrder) -> Result<GatewayOrder, GatewayError> {
        let request = OrderRequest {
            amount: order.amount_minor,
            currency: order.currency.clone(),
            receipt: order.internal_order_id.to_string(),
            notes: Some(serde_json::json!({ "description": order.description })),
        };

        let url = format!("{}/orders", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, "Razorpay order creation failed");
            return Err(status_error("razorpay create order", status));
        }

        let entity: OrderEntity = response
            .json()
            .await
            .map_err(|e| GatewayError::Permanent(anyhow::Error::new(e)))?;

        tracing::info!(
            gateway_order_id = %entity.id,
            amount = entity.amount,
            "Razorpay order created"
        );

        Ok(GatewayOrder {
            hosted_payment_url: format!(
                "{}/checkout.html?order_id={}&key_id={}",
                CHECKOUT_BASE_URL, entity.id, self.key_id
            ),
            gateway_order_id: entity.id,
            // Razorpay orders stay payable until the gateway closes them.
            expires_utc: None,
        })
    }

    async fn fetch_order(&self, gateway_order_id: &str) -> Result<OrderSnapshot, GatewayError> {
        retry_idempotent("razorpay fetch_order", || async move {
            let url = format!("{}/orders/{}", self.api_base_url, gateway_order_id);
            let response = self
                .client
                .get(&url)
                .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            if !status.is_success() {
                return Err(status_error("razorpay fetch order", status));
            }

            let entity: OrderEntity = response
                .json()
                .await
                .map_err(|e| GatewayError::Permanent(anyhow::Error::new(e)))?;

            let (state, payment) = match entity.status.as_str() {
                "paid" => {
                    let payment = self.fetch_captured_payment(gateway_order_id).await?;
                    (OrderState::Captured, payment)
                }
                "attempted" => (OrderState::Authorized, None),
                _ => (OrderState::Created, None),
            };

            Ok(OrderSnapshot {
                state,
                gateway_payment_id: payment.as_ref().map(|p| p.id.clone()),
                amount_minor: entity.amount,
                error_code: payment.and_then(|p| p.error_code),
            })
        })
        .await
    }

    fn verify_signature(
        &self,
        channel: SignatureChannel,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> Result<CanonicalEvent, GatewayError> {
        let signature = headers
            .get("X-Razorpay-Signature")
            .and_then(|v| v.to_str().ok())
            .ok_or(GatewayError::InvalidSignature)?;

        // Webhooks sign the raw body with the webhook secret; checkout
        // redirects sign "order_id|payment_id" with the key secret. Both
        // arrive here as the raw payload bytes.
        let secret = match channel {
            SignatureChannel::Webhook => self.webhook_secret.expose_secret(),
            SignatureChannel::ReturnRedirect => self.key_secret.expose_secret(),
        };

        if !self.signature_matches(raw_body, secret, signature)? {
            return Err(GatewayError::InvalidSignature);
        }

        let gateway_event_id = headers
            .get("X-Razorpay-Event-Id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                GatewayError::Permanent(anyhow::anyhow!("missing razorpay event id header"))
            })?
            .to_string();

        let envelope: WebhookEnvelope = serde_json::from_slice(raw_body)
            .map_err(|e| GatewayError::Permanent(anyhow::Error::new(e)))?;

        match envelope.event.as_str() {
            "payment.captured" | "payment.failed" => {
                let payment = envelope
                    .payload
                    .payment
                    .ok_or_else(|| {
                        GatewayError::Permanent(anyhow::anyhow!("webhook missing payment entity"))
                    })?
                    .entity;
                let outcome = Self::map_payment_status(&payment.status)
                    .unwrap_or(EventOutcome::Failed);
                let gateway_order_id = payment.order_id.ok_or_else(|| {
                    GatewayError::Permanent(anyhow::anyhow!("webhook payment has no order id"))
                })?;

                Ok(CanonicalEvent {
                    provider: Provider::Razorpay,
                    gateway_event_id,
                    gateway_order_id,
                    gateway_payment_id: Some(payment.id),
                    outcome,
                    amount_minor: payment.amount,
                    error_code: payment.error_code,
                    error_message: payment.error_description,
                })
            }
            "refund.processed" => {
                let refund = envelope
                    .payload
                    .refund
                    .ok_or_else(|| {
                        GatewayError::Permanent(anyhow::anyhow!("webhook missing refund entity"))
                    })?
                    .entity;
                let payment = envelope.payload.payment.map(|p| p.entity);
                let gateway_order_id = payment
                    .as_ref()
                    .and_then(|p| p.order_id.clone())
                    .ok_or_else(|| {
                        GatewayError::Permanent(anyhow::anyhow!("refund webhook has no order id"))
                    })?;

                Ok(CanonicalEvent {
                    provider: Provider::Razorpay,
                    gateway_event_id,
                    gateway_order_id,
                    gateway_payment_id: Some(refund.payment_id),
                    outcome: EventOutcome::Refunded,
                    amount_minor: refund.amount,
                    error_code: None,
                    error_message: None,
                })
            }
            other => Err(GatewayError::UnsupportedEvent(other.to_string())),
        }
    }

    async fn create_refund(
        &self,
        gateway_payment_id: &str,
        amount_minor: i64,
        reason: &str,
    ) -> Result<GatewayRefund, GatewayError> {
        let url = format!("{}/payments/{}/refund", self.api_base_url, gateway_payment_id);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .json(&serde_json::json!({
                "amount": amount_minor,
                "notes": { "reason": reason },
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, "Razorpay refund failed");
            return Err(status_error("razorpay create refund", status));
        }

        let entity: RefundEntity = response
            .json()
            .await
            .map_err(|e| GatewayError::Permanent(anyhow::Error::new(e)))?;

        Ok(GatewayRefund {
            gateway_refund_id: entity.id,
            accepted: entity.status == "processed" || entity.status == "pending",
        })
    }
}
