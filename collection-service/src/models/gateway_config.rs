//! Per-tenant gateway credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-tenant, per-provider credentials. At most one active config exists
/// per (tenant, provider); `version` increments on every update and
/// invalidates any cached adapter built from an older row.
///
/// `api_secret` is excluded from serialization so it can never leak through
/// an API response; adapters wrap it in `secrecy::Secret` at construction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GatewayConfig {
    pub config_id: Uuid,
    pub tenant_id: Uuid,
    pub provider: String,
    pub is_active: bool,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
    pub provider_settings: Option<serde_json::Value>,
    pub version: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Razorpay-specific settings decoded from `provider_settings` at adapter
/// construction.
#[derive(Debug, Clone, Deserialize)]
pub struct RazorpaySettings {
    pub webhook_secret: String,
}

/// Billdesk-specific settings decoded from `provider_settings` at adapter
/// construction.
#[derive(Debug, Clone, Deserialize)]
pub struct BilldeskSettings {
    pub merchant_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn api_secret_is_never_serialized() {
        let config = GatewayConfig {
            config_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            provider: "razorpay".to_string(),
            is_active: true,
            api_key: "rzp_test_123".to_string(),
            api_secret: "super-secret".to_string(),
            provider_settings: None,
            version: 1,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        };

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(!json.contains("api_secret"));
    }
}
