//! Webhook ingestor.
//!
//! Reads the raw body bytes before any parsing, verifies the provider
//! signature through the adapter, and hands the canonical event to the
//! orchestrator. 200 only when the event was applied (or had been applied
//! before); anything else non-2xx so the gateway redelivers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::gateway::{GatewayError, SignatureChannel};
use crate::models::Provider;
use crate::services::metrics::WEBHOOK_EVENTS_TOTAL;
use crate::services::ApplyOutcome;
use crate::startup::AppState;
use service_core::error::AppError;

fn source_ip(headers: &HeaderMap) -> &str {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Gateway callback endpoint.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let provider = Provider::parse(&provider)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("unknown provider '{}'", provider)))?;

    // Webhook signatures verify against the platform-default credentials
    // for the provider; tenant routing happens after decode, via the
    // gateway order id.
    let adapter = state.orchestrator.registry().default_adapter(provider)?;

    let event = match adapter.verify_signature(SignatureChannel::Webhook, &body, &headers) {
        Ok(event) => event,
        Err(GatewayError::InvalidSignature) => {
            WEBHOOK_EVENTS_TOTAL
                .with_label_values(&[provider.as_str(), "invalid_signature"])
                .inc();
            tracing::warn!(
                provider = provider.as_str(),
                source_ip = source_ip(&headers),
                "Webhook signature verification failed"
            );
            // Record nothing; the sender is not who they claim to be.
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "invalid webhook signature"
            )));
        }
        Err(GatewayError::UnsupportedEvent(event_type)) => {
            tracing::debug!(
                provider = provider.as_str(),
                event_type = %event_type,
                "Ignoring webhook event type with no canonical outcome"
            );
            return Ok((StatusCode::OK, Json(json!({ "status": "ignored" }))));
        }
        Err(e) => return Err(e.into()),
    };

    let payload_hash = hex::encode(Sha256::digest(&body));
    let outcome = match state.orchestrator.apply(&event, &payload_hash).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // Any apply failure must read as 5xx so the gateway redelivers.
            tracing::error!(
                provider = provider.as_str(),
                gateway_event_id = %event.gateway_event_id,
                error = %e,
                "Webhook apply failed"
            );
            return Err(AppError::InternalError(anyhow::anyhow!(
                "webhook apply failed"
            )));
        }
    };

    let (result, status) = match &outcome {
        ApplyOutcome::Applied => ("applied", StatusCode::OK),
        ApplyOutcome::AlreadyApplied => ("already_applied", StatusCode::OK),
        // A rejected event is recorded but the gateway should know its
        // delivery did not take effect.
        ApplyOutcome::Rejected { .. } => ("rejected", StatusCode::INTERNAL_SERVER_ERROR),
        ApplyOutcome::Pending => ("pending", StatusCode::OK),
    };

    WEBHOOK_EVENTS_TOTAL
        .with_label_values(&[provider.as_str(), result])
        .inc();

    if status == StatusCode::OK {
        Ok((status, Json(json!({ "status": "ok" }))))
    } else {
        Ok((status, Json(json!({ "status": result }))))
    }
}
