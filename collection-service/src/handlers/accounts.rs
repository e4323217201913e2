//! Tenant revenue account handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    AccountResponse, CreateAccountRequest, GatewayAccountCredentialsRequest,
    GatewayConfigResponse, UpdateAccountRequest, UpsertGatewayConfigRequest,
};
use crate::middleware::TenantContext;
use crate::models::{CreateAccount, UpdateAccount};
use crate::startup::AppState;
use service_core::error::AppError;

/// Create a revenue account for a charge type.
pub async fn create_account(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    payload.validate()?;

    let account = state
        .accounts
        .create(&CreateAccount {
            tenant_id: tenant.tenant_id,
            charge_type: payload.charge_type,
            display_name: payload.display_name,
            description: payload.description,
            bank_account_name: payload.bank_account_name,
            bank_account_no: payload.bank_account_no,
            ifsc_code: payload.ifsc_code,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(account.into())))
}

/// List the tenant's revenue accounts.
pub async fn list_accounts(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<serde_json::Value>, AppError> {
    let accounts = state.accounts.list(tenant.tenant_id).await?;
    let accounts: Vec<AccountResponse> = accounts.into_iter().map(Into::into).collect();

    Ok(Json(json!({
        "accounts": accounts,
        "total": accounts.len(),
    })))
}

/// Get a single account.
pub async fn get_account(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(account_id): Path<Uuid>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = state
        .accounts
        .get(tenant.tenant_id, account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("account not found")))?;

    Ok(Json(account.into()))
}

/// Update account metadata. Totals are untouchable from the API.
pub async fn update_account(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    payload.validate()?;

    let account = state
        .accounts
        .update(
            tenant.tenant_id,
            account_id,
            &UpdateAccount {
                display_name: payload.display_name,
                description: payload.description,
                bank_account_name: payload.bank_account_name,
                bank_account_no: payload.bank_account_no,
                ifsc_code: payload.ifsc_code,
                is_active: payload.is_active,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("account not found")))?;

    Ok(Json(account.into()))
}

/// Update per-provider external sub-account identifiers.
pub async fn update_gateway_credentials(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<GatewayAccountCredentialsRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = state
        .accounts
        .update_gateway_credentials(
            tenant.tenant_id,
            account_id,
            payload.razorpay_account_id.as_deref(),
            payload.billdesk_account_id.as_deref(),
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("account not found")))?;

    Ok(Json(account.into()))
}

/// Upsert the tenant's gateway credentials for a provider. The response
/// never carries the secret.
pub async fn upsert_gateway_config(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<UpsertGatewayConfigRequest>,
) -> Result<(StatusCode, Json<GatewayConfigResponse>), AppError> {
    payload.validate()?;

    let config = state
        .db
        .upsert_gateway_config(
            tenant.tenant_id,
            payload.provider.as_str(),
            &payload.api_key,
            &payload.api_secret,
            payload.provider_settings.as_ref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(config.into())))
}

/// List the tenant's gateway configs, secretless.
pub async fn list_gateway_configs(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Vec<GatewayConfigResponse>>, AppError> {
    let configs = state.db.list_gateway_configs(tenant.tenant_id).await?;
    Ok(Json(configs.into_iter().map(Into::into).collect()))
}
