//! Billdesk gateway adapter.
//!
//! Billdesk signs requests and callbacks with HMAC-SHA256 over
//! `body|timestamp`; the timestamp rides in the `X-Billdesk-Timestamp`
//! header and callbacks are rejected when it is older than the replay
//! window.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
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
use crate::config::Environment;
use crate::models::{BilldeskSettings, GatewayConfig, PaymentMethod, Provider};
use service_core::error::AppError;

const PRODUCTION_BASE_URL: &str = "https://api.billdesk.com";
const SANDBOX_BASE_URL: &str = "https://sandbox.billdesk.com";

/// Maximum age of a signed callback before it is treated as a replay.
const REPLAY_WINDOW_SECS: i64 = 300;

pub struct BilldeskAdapter {
    client: Client,
    api_key: String,
    api_secret: Secret<String>,
    merchant_id: String,
    api_base_url: String,
}

#[derive(Debug, Serialize)]
struct OrderRequest {
    merchant_id: String,
    order_id: String,
    /// Amount in paise.
    amount: i64,
    currency: String,
    description: String,
    payment_options: PaymentOptions,
}

#[derive(Debug, Serialize)]
struct PaymentOptions {
    netbanking: bool,
    cards: bool,
    upi: bool,
    wallets: bool,
}

impl PaymentOptions {
    fn from_methods(methods: &[PaymentMethod]) -> Self {
        Self {
            netbanking: methods.contains(&PaymentMethod::Netbanking),
            cards: methods.contains(&PaymentMethod::CreditCard)
                || methods.contains(&PaymentMethod::DebitCard),
            upi: methods.contains(&PaymentMethod::Upi),
            wallets: methods.contains(&PaymentMethod::Wallet),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    bd_order_id: String,
    amount: i64,
    status: String,
    payment_url: String,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    refund_id: String,
    status: String,
}

/// Billdesk callback payload.
#[derive(Debug, Deserialize)]
struct CallbackPayload {
    event_id: Option<String>,
    bd_order_id: String,
    transaction_id: String,
    status: String,
    amount: i64,
    #[serde(default)]
    error_code: Option<String>,
}

impl BilldeskAdapter {
    pub fn new(
        api_key: String,
        api_secret: Secret<String>,
        merchant_id: String,
        environment: Environment,
        api_base_url: Option<String>,
    ) -> Result<Self, AppError> {
        if api_key.is_empty() || api_secret.expose_secret().is_empty() || merchant_id.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "billdesk api key, secret, and merchant id required"
            )));
        }

        let client = Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

        let api_base_url = api_base_url.unwrap_or_else(|| {
            match environment {
                Environment::Production => PRODUCTION_BASE_URL,
                Environment::Sandbox => SANDBOX_BASE_URL,
            }
            .to_string()
        });

        Ok(Self {
            client,
            api_key,
            api_secret,
            merchant_id,
            api_base_url,
        })
    }

    pub fn from_config(
        config: &GatewayConfig,
        environment: Environment,
        api_base_url: Option<String>,
    ) -> Result<Self, AppError> {
        let settings: BilldeskSettings = config
            .provider_settings
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("invalid billdesk settings: {}", e))
            })?
            .ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("billdesk settings missing merchant id"))
            })?;

        Self::new(
            config.api_key.clone(),
            Secret::new(config.api_secret.clone()),
            settings.merchant_id,
            environment,
            api_base_url,
        )
    }

    fn compute_signature(&self, body: &[u8], timestamp: i64) -> Result<String, GatewayError> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.api_secret.expose_secret().as_bytes())
            .map_err(|_| GatewayError::Permanent(anyhow::anyhow!("invalid hmac key length")))?;
        mac.update(body);
        mac.update(b"|");
        mac.update(timestamp.to_string().as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn signed_post<T: serde::de::DeserializeOwned>(
        &self,
        op: &str,
        url: &str,
        body: &impl Serialize,
    ) -> Result<T, GatewayError> {
        let body_bytes =
            serde_json::to_vec(body).map_err(|e| GatewayError::Permanent(anyhow::Error::new(e)))?;
        let timestamp = Utc::now().timestamp();
        let signature = self.compute_signature(&body_bytes, timestamp)?;

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .bearer_auth(&self.api_key)
            .header("X-Billdesk-Timestamp", timestamp.to_string())
            .header("X-Billdesk-Signature", signature)
            .body(body_bytes)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, op = op, "Billdesk request failed");
            return Err(status_error(op, status));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Permanent(anyhow::Error::new(e)))
    }

    fn map_status(status: &str) -> OrderState {
        match status {
            "captured" | "paid" | "success" => OrderState::Captured,
            "authorized" => OrderState::Authorized,
            "failed" => OrderState::Failed,
            "expired" => OrderState::Expired,
            "refunded" => OrderState::Refunded,
            _ => OrderState::Created,
        }
    }
}

#[async_trait]
impl Gateway for BilldeskAdapter {
    fn provider(&self) -> Provider {
        Provider::Billdesk
    }

    async fn create_order(&self, order: &CreateOrder) -> Result<GatewayOrder, GatewayError> {
        let request = OrderRequest {
            merchant_id: self.merchant_id.clone(),
            order_id: order.internal_order_id.to_string(),
            amount: order.amount_minor,
            currency: order.currency.clone(),
            description: order.description.clone(),
            payment_options: PaymentOptions::from_methods(&order.allowed_methods),
        };

        let url = format!("{}/v1/orders", self.api_base_url);
        let response: OrderResponse = self.signed_post("billdesk create order", &url, &request).await?;

        tracing::info!(
            bd_order_id = %response.bd_order_id,
            amount = response.amount,
            "Billdesk order created"
        );

        Ok(GatewayOrder {
            gateway_order_id: response.bd_order_id,
            hosted_payment_url: response.payment_url,
            expires_utc: response.expires_at,
        })
    }

    async fn fetch_order(&self, gateway_order_id: &str) -> Result<OrderSnapshot, GatewayError> {
        retry_idempotent("billdesk fetch_order", || async move {
            let url = format!("{}/v1/orders/{}", self.api_base_url, gateway_order_id);
            let timestamp = Utc::now().timestamp();
            let signature = self.compute_signature(b"", timestamp)?;

            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .header("X-Billdesk-Timestamp", timestamp.to_string())
                .header("X-Billdesk-Signature", signature)
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            if !status.is_success() {
                return Err(status_error("billdesk fetch order", status));
            }

            let entity: OrderResponse = response
                .json()
                .await
                .map_err(|e| GatewayError::Permanent(anyhow::Error::new(e)))?;

            Ok(OrderSnapshot {
                state: Self::map_status(&entity.status),
                gateway_payment_id: entity.transaction_id,
                amount_minor: entity.amount,
                error_code: entity.error_code,
            })
        })
        .await
    }

    fn verify_signature(
        &self,
        _channel: SignatureChannel,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> Result<CanonicalEvent, GatewayError> {
        let signature = headers
            .get("X-Billdesk-Signature")
            .and_then(|v| v.to_str().ok())
            .ok_or(GatewayError::InvalidSignature)?;
        let timestamp: i64 = headers
            .get("X-Billdesk-Timestamp")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or(GatewayError::InvalidSignature)?;

        if (Utc::now().timestamp() - timestamp).abs() > REPLAY_WINDOW_SECS {
            return Err(GatewayError::InvalidSignature);
        }

        let expected = self.compute_signature(raw_body, timestamp)?;
        let matches: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();
        if !matches {
            return Err(GatewayError::InvalidSignature);
        }

        let payload: CallbackPayload = serde_json::from_slice(raw_body)
            .map_err(|e| GatewayError::Permanent(anyhow::Error::new(e)))?;

        let outcome = match Self::map_status(&payload.status) {
            OrderState::Captured => EventOutcome::Captured,
            OrderState::Failed => EventOutcome::Failed,
            OrderState::Expired => EventOutcome::Expired,
            OrderState::Refunded => EventOutcome::Refunded,
            OrderState::Created | OrderState::Authorized => {
                return Err(GatewayError::UnsupportedEvent(payload.status));
            }
        };

        // Billdesk does not always supply an event id; the transaction id
        // plus terminal status is unique per effective event.
        let gateway_event_id = payload
            .event_id
            .unwrap_or_else(|| format!("{}:{}", payload.transaction_id, payload.status));

        Ok(CanonicalEvent {
            provider: Provider::Billdesk,
            gateway_event_id,
            gateway_order_id: payload.bd_order_id,
            gateway_payment_id: Some(payload.transaction_id),
            outcome,
            amount_minor: payload.amount,
            error_code: payload.error_code,
            error_message: None,
        })
    }

    async fn create_refund(
        &self,
        gateway_order_id: &str,
        amount_minor: i64,
        reason: &str,
    ) -> Result<GatewayRefund, GatewayError> {
        let url = format!("{}/v1/orders/{}/refund", self.api_base_url, gateway_order_id);
        let response: RefundResponse = self
            .signed_post(
                "billdesk create refund",
                &url,
                &serde_json::json!({ "amount": amount_minor, "reason": reason }),
            )
            .await?;

        Ok(GatewayRefund {
            gateway_refund_id: response.refund_id,
            accepted: response.status == "accepted" || response.status == "processed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_adapter() -> BilldeskAdapter {
        BilldeskAdapter::new(
            "bd_test_key".to_string(),
            Secret::new("bd_test_secret".to_string()),
            "MERCHANT1".to_string(),
            Environment::Sandbox,
            None,
        )
        .unwrap()
    }

    fn callback_body() -> Vec<u8> {
        serde_json::json!({
            "event_id": "bd_evt_1",
            "bd_order_id": "bd_order_9",
            "transaction_id": "txn_42",
            "status": "captured",
            "amount": 500000
        })
        .to_string()
        .into_bytes()
    }

    fn signed_headers(adapter: &BilldeskAdapter, body: &[u8]) -> HeaderMap {
        let timestamp = Utc::now().timestamp();
        let signature = adapter.compute_signature(body, timestamp).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("X-Billdesk-Signature", signature.parse().unwrap());
        headers.insert(
            "X-Billdesk-Timestamp",
            timestamp.to_string().parse().unwrap(),
        );
        headers
    }

    #[test]
    fn missing_merchant_id_fails_fast() {
        let result = BilldeskAdapter::new(
            "key".to_string(),
            Secret::new("secret".to_string()),
            "".to_string(),
            Environment::Sandbox,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn sandbox_and_production_select_base_urls() {
        let sandbox = test_adapter();
        assert_eq!(sandbox.api_base_url, SANDBOX_BASE_URL);

        let production = BilldeskAdapter::new(
            "key".to_string(),
            Secret::new("secret".to_string()),
            "MERCHANT1".to_string(),
            Environment::Production,
            None,
        )
        .unwrap();
        assert_eq!(production.api_base_url, PRODUCTION_BASE_URL);
    }

    #[test]
    fn valid_callback_decodes_to_canonical_event() {
        let adapter = test_adapter();
        let body = callback_body();
        let headers = signed_headers(&adapter, &body);

        let event = adapter
            .verify_signature(SignatureChannel::Webhook, &body, &headers)
            .unwrap();

        assert_eq!(event.gateway_event_id, "bd_evt_1");
        assert_eq!(event.gateway_order_id, "bd_order_9");
        assert_eq!(event.outcome, EventOutcome::Captured);
        assert_eq!(event.amount_minor, 500_000);
    }

    #[test]
    fn stale_timestamp_is_rejected_as_replay() {
        let adapter = test_adapter();
        let body = callback_body();
        let stale = Utc::now().timestamp() - REPLAY_WINDOW_SECS - 10;
        let signature = adapter.compute_signature(&body, stale).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("X-Billdesk-Signature", signature.parse().unwrap());
        headers.insert("X-Billdesk-Timestamp", stale.to_string().parse().unwrap());

        let result = adapter.verify_signature(SignatureChannel::Webhook, &body, &headers);
        assert!(matches!(result, Err(GatewayError::InvalidSignature)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let adapter = test_adapter();
        let other = BilldeskAdapter::new(
            "bd_test_key".to_string(),
            Secret::new("some_other_secret".to_string()),
            "MERCHANT1".to_string(),
            Environment::Sandbox,
            None,
        )
        .unwrap();

        let body = callback_body();
        let headers = signed_headers(&other, &body);

        let result = adapter.verify_signature(SignatureChannel::Webhook, &body, &headers);
        assert!(matches!(result, Err(GatewayError::InvalidSignature)));
    }

    #[test]
    fn missing_event_id_falls_back_to_transaction_and_status() {
        let adapter = test_adapter();
        let body = serde_json::json!({
            "bd_order_id": "bd_order_9",
            "transaction_id": "txn_42",
            "status": "failed",
            "amount": 500000,
            "error_code": "TXN_DECLINED"
        })
        .to_string()
        .into_bytes();
        let headers = signed_headers(&adapter, &body);

        let event = adapter
            .verify_signature(SignatureChannel::Webhook, &body, &headers)
            .unwrap();

        assert_eq!(event.gateway_event_id, "txn_42:failed");
        assert_eq!(event.outcome, EventOutcome::Failed);
        assert_eq!(event.error_code.as_deref(), Some("TXN_DECLINED"));
    }
}
