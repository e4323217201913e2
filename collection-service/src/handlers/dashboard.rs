//! Tenant collection dashboard handler.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::dtos::DashboardResponse;
use crate::middleware::TenantContext;
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub recent_limit: Option<i64>,
}

/// Collection dashboard: headline totals, per-charge-type stats, recent
/// settled payments.
pub async fn collection_dashboard(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardResponse>, AppError> {
    let dashboard = state
        .dashboard
        .collection_dashboard(tenant.tenant_id, query.recent_limit.unwrap_or(10))
        .await?;

    Ok(Json(dashboard.into()))
}
