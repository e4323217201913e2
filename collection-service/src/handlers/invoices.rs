//! Invoice handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    BulkInvoiceRequest, BulkInvoiceResponse, CreateInvoiceRequest, InvoiceDetailResponse,
    InvoiceListQuery, InvoiceResponse, OutstandingSummaryResponse,
};
use crate::middleware::TenantContext;
use crate::models::money::to_minor;
use crate::models::{ChargeType, CreateInvoice};
use crate::startup::AppState;
use service_core::error::AppError;

/// Create a single invoice, issued immediately.
pub async fn create_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    payload.validate()?;

    let invoice_date = payload.invoice_date.unwrap_or_else(|| Utc::now().date_naive());
    if payload.due_date < invoice_date {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "due date precedes invoice date"
        )));
    }

    let invoice = state
        .invoices
        .create(&CreateInvoice {
            tenant_id: tenant.tenant_id,
            client_id: payload.client_id,
            client_name: payload.client_name,
            client_email: payload.client_email,
            client_phone: payload.client_phone,
            charge_type: payload.charge_type,
            amount_minor: to_minor(payload.amount)?,
            currency: "INR".to_string(),
            description: payload.description,
            invoice_date,
            due_date: payload.due_date,
            metadata: payload.metadata,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(invoice.into())))
}

/// Create a batch of invoices atomically. One bad row fails the whole
/// batch.
pub async fn create_bulk_invoices(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<BulkInvoiceRequest>,
) -> Result<(StatusCode, Json<BulkInvoiceResponse>), AppError> {
    payload.validate()?;

    let invoice_date = payload.invoice_date.unwrap_or_else(|| Utc::now().date_naive());
    if payload.due_date < invoice_date {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "due date precedes invoice date"
        )));
    }

    let inputs: Vec<CreateInvoice> = payload
        .invoices
        .iter()
        .map(|item| {
            Ok(CreateInvoice {
                tenant_id: tenant.tenant_id,
                client_id: item.client_id,
                client_name: item.client_name.clone(),
                client_email: item.client_email.clone(),
                client_phone: item.client_phone.clone(),
                charge_type: payload.charge_type,
                amount_minor: to_minor(item.amount)?,
                currency: "INR".to_string(),
                description: payload.description.clone(),
                invoice_date,
                due_date: payload.due_date,
                metadata: None,
            })
        })
        .collect::<Result<_, AppError>>()?;

    let invoices = state.invoices.create_bulk(tenant.tenant_id, &inputs).await?;
    let invoices: Vec<InvoiceResponse> = invoices.into_iter().map(Into::into).collect();
    let count = invoices.len();

    Ok((
        StatusCode::CREATED,
        Json(BulkInvoiceResponse { invoices, count }),
    ))
}

/// List invoices filtered by charge type.
pub async fn list_invoices(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<InvoiceListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let charge_type = ChargeType::parse(&query.charge_type).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "unknown charge type '{}'",
            query.charge_type
        ))
    })?;

    let invoices = state
        .invoices
        .list_by_charge_type(tenant.tenant_id, charge_type)
        .await?;
    let invoices: Vec<InvoiceResponse> = invoices.into_iter().map(Into::into).collect();

    Ok(Json(json!({
        "invoices": invoices,
        "total": invoices.len(),
    })))
}

/// Invoice detail with its payment history.
pub async fn get_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceDetailResponse>, AppError> {
    let invoice = state
        .invoices
        .get(tenant.tenant_id, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("invoice not found")))?;

    let payments = state
        .payments
        .list_by_invoice(tenant.tenant_id, invoice_id)
        .await?;

    Ok(Json(InvoiceDetailResponse {
        invoice: invoice.into(),
        payments: payments.into_iter().map(Into::into).collect(),
    }))
}

/// Void an unpaid invoice.
pub async fn void_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = state.invoices.void(tenant.tenant_id, invoice_id).await?;
    Ok(Json(invoice.into()))
}

/// All invoices for a client.
pub async fn client_invoices(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let invoices = state
        .invoices
        .list_by_client(tenant.tenant_id, client_id)
        .await?;
    let invoices: Vec<InvoiceResponse> = invoices.into_iter().map(Into::into).collect();

    Ok(Json(json!({
        "invoices": invoices,
        "total": invoices.len(),
    })))
}

/// Outstanding balance summary for a client, aggregated by charge type.
pub async fn client_outstanding(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<OutstandingSummaryResponse>, AppError> {
    let summary = state
        .dashboard
        .client_outstanding(tenant.tenant_id, client_id)
        .await?;

    Ok(Json(summary.into()))
}
