//! Payment handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    InitiatePaymentRequest, InitiatePaymentResponse, PageQuery, PaymentHistoryResponse,
    PaymentResponse, RefundRequest, RefundResponse,
};
use crate::middleware::TenantContext;
use crate::models::money::to_minor;
use crate::services::{ApplyOutcome, InitiateRequest};
use crate::startup::AppState;
use service_core::error::AppError;

/// Begin a payment against an invoice. Returns the hosted payment URL the
/// client completes checkout on.
pub async fn initiate_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<InitiatePaymentResponse>), AppError> {
    payload.validate()?;
    let client_id = tenant.require_client()?;

    let initiated = state
        .orchestrator
        .initiate(
            tenant.tenant_id,
            client_id,
            InitiateRequest {
                invoice_id: payload.invoice_id,
                amount_minor: to_minor(payload.amount)?,
                provider: payload.provider,
                method: payload.payment_method,
                client_name: payload.client_name,
                client_email: payload.client_email,
                client_phone: payload.client_phone,
                idempotency_key: payload.idempotency_key,
            },
        )
        .await?;

    let payment = initiated.payment;
    Ok((
        StatusCode::CREATED,
        Json(InitiatePaymentResponse {
            payment_id: payment.payment_id,
            order_id: payment.order_id,
            amount: crate::models::money::to_decimal(payment.amount_minor),
            currency: payment.currency,
            state: payment.state,
            hosted_url: initiated.hosted_url,
            expires_at: initiated.expires_utc,
        }),
    ))
}

/// Current payment state.
pub async fn get_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = state
        .payments
        .get(tenant.tenant_id, payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment not found")))?;

    // A client sees only their own payments; tenant admins (no client
    // header) see all of the tenant's.
    if let Some(client_id) = tenant.client_id {
        if payment.client_id != client_id {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "payment belongs to another client"
            )));
        }
    }

    Ok(Json(payment.into()))
}

/// Paginated payment history for the calling client.
pub async fn list_payments(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(page): Query<PageQuery>,
) -> Result<Json<PaymentHistoryResponse>, AppError> {
    let client_id = tenant.require_client()?;
    let limit = page.limit.unwrap_or(20).clamp(1, 100);
    let offset = page.offset.unwrap_or(0).max(0);

    let (payments, total) = state
        .payments
        .list_by_client(tenant.tenant_id, client_id, limit, offset)
        .await?;

    Ok(Json(PaymentHistoryResponse {
        payments: payments.into_iter().map(Into::into).collect(),
        total,
        limit,
        offset,
    }))
}

/// Refund a settled payment, partially or in full.
pub async fn refund_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<RefundRequest>,
) -> Result<(StatusCode, Json<RefundResponse>), AppError> {
    payload.validate()?;

    let refund = state
        .orchestrator
        .refund(
            tenant.tenant_id,
            payment_id,
            to_minor(payload.amount)?,
            &payload.reason,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(refund.into())))
}

/// Cancel an in-flight payment.
pub async fn cancel_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = state
        .orchestrator
        .cancel(tenant.tenant_id, payment_id)
        .await?;
    Ok(Json(payment.into()))
}

/// Manually reconcile a payment against the gateway.
pub async fn reconcile_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = state
        .orchestrator
        .reconcile(tenant.tenant_id, payment_id)
        .await?;

    let result = match outcome {
        ApplyOutcome::Applied => "applied",
        ApplyOutcome::AlreadyApplied => "already_applied",
        ApplyOutcome::Pending => "pending",
        ApplyOutcome::Rejected { .. } => "rejected",
    };

    Ok(Json(serde_json::json!({ "result": result })))
}
