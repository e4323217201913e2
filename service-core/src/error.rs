use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error taxonomy.
///
/// Every state-changing operation surfaces one of these up to the HTTP
/// layer, which maps it to a status code and a stable error code string.
/// Secrets and raw gateway bodies must never be embedded in the message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    /// Entity exists but is not owned by the caller's tenant or client.
    /// The response body stays generic so existence is not leaked.
    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    /// Illegal payment state-machine edge. Carries the current state so the
    /// caller can observe what the row actually is.
    #[error("Invalid state transition from '{current}': {message}")]
    InvalidState { current: String, message: String },

    /// Upstream gateway timeout / 5xx. Retried internally; reconciliation
    /// picks up anything left behind.
    #[error("Gateway transient error: {0}")]
    GatewayTransient(anyhow::Error),

    /// Upstream gateway 4xx / invalid signature / unknown order. Recorded,
    /// never retried.
    #[error("Gateway permanent error: {0}")]
    GatewayPermanent(anyhow::Error),

    /// Unreachable-by-invariant condition (e.g. paid > amount). Alert.
    #[error("Integrity violation: {0}")]
    Integrity(anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl AppError {
    /// Stable error code string exposed in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) | AppError::BadRequest(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Conflict(_) => "conflict",
            AppError::InvalidState { .. } => "invalid_state",
            AppError::GatewayTransient(_) => "gateway_transient",
            AppError::GatewayPermanent(_) => "gateway_permanent",
            AppError::Integrity(_) => "integrity",
            AppError::DatabaseError(_) => "database",
            AppError::InternalError(_) => "internal",
            AppError::ConfigError(_) => "config",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_message, details) = match self {
            AppError::ValidationError(err) => (
                StatusCode::BAD_REQUEST,
                "Validation error".to_string(),
                Some(err.to_string()),
            ),
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), None),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None),
            AppError::Forbidden(_) => {
                // Generic body; existence of the entity stays internal.
                (StatusCode::FORBIDDEN, "Access denied".to_string(), None)
            }
            AppError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string(), None),
            AppError::Conflict(err) => (StatusCode::CONFLICT, err.to_string(), None),
            AppError::InvalidState { current, message } => (
                StatusCode::CONFLICT,
                message,
                Some(format!("current_state: {}", current)),
            ),
            AppError::GatewayTransient(err) => {
                tracing::warn!(error = %err, "Gateway transient failure surfaced to caller");
                (
                    StatusCode::BAD_GATEWAY,
                    "Payment gateway unavailable".to_string(),
                    None,
                )
            }
            AppError::GatewayPermanent(err) => {
                tracing::warn!(error = %err, "Gateway permanent failure surfaced to caller");
                (
                    StatusCode::BAD_GATEWAY,
                    "Payment gateway rejected the request".to_string(),
                    None,
                )
            }
            AppError::Integrity(err) => {
                tracing::error!(error = %err, "Integrity violation");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    None,
                )
            }
            AppError::InternalError(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Configuration error".to_string(),
                    None,
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                code,
                details,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_strings_are_stable() {
        assert_eq!(
            AppError::NotFound(anyhow::anyhow!("invoice not found")).code(),
            "not_found"
        );
        assert_eq!(
            AppError::InvalidState {
                current: "settled".to_string(),
                message: "cannot fail a settled payment".to_string(),
            }
            .code(),
            "invalid_state"
        );
        assert_eq!(
            AppError::GatewayTransient(anyhow::anyhow!("timeout")).code(),
            "gateway_transient"
        );
    }

    #[test]
    fn forbidden_body_is_generic() {
        let response =
            AppError::Forbidden(anyhow::anyhow!("invoice belongs to another client"))
                .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
