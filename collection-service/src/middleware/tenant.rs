//! Tenant context extractor for multi-tenancy support.
//!
//! The upstream BFF authenticates the caller and forwards the tenant (and,
//! for client-facing routes, the client) as headers. Every repository query
//! binds the tenant id from this context; a request without it never
//! reaches a handler.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const TENANT_ID_HEADER: &str = "X-Tenant-ID";
pub const CLIENT_ID_HEADER: &str = "X-Client-ID";

/// Tenant scope extracted from request headers.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    /// Present on client-facing routes (the paying resident).
    pub client_id: Option<Uuid>,
}

impl TenantContext {
    /// The client id, for routes acting on behalf of the payer.
    pub fn require_client(&self) -> Result<Uuid, AppError> {
        self.client_id.ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("missing {} header", CLIENT_ID_HEADER))
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = parts
            .headers
            .get(TENANT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("missing {} header", TENANT_ID_HEADER))
            })
            .and_then(|raw| {
                Uuid::parse_str(raw).map_err(|_| {
                    AppError::Unauthorized(anyhow::anyhow!("malformed {} header", TENANT_ID_HEADER))
                })
            })?;

        let client_id = parts
            .headers
            .get(CLIENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|raw| {
                Uuid::parse_str(raw).map_err(|_| {
                    AppError::Unauthorized(anyhow::anyhow!("malformed {} header", CLIENT_ID_HEADER))
                })
            })
            .transpose()?;

        let span = tracing::Span::current();
        span.record("tenant_id", tenant_id.to_string().as_str());
        if let Some(client) = client_id {
            span.record("client_id", client.to_string().as_str());
        }

        Ok(TenantContext {
            tenant_id,
            client_id,
        })
    }
}
