//! Gateway adapter registry.
//!
//! One adapter instance per credential set, reused for connection pooling.
//! Tenant-specific adapters are cached by GatewayConfig id; a version
//! counter on the config row invalidates the cache entry on credential
//! rotation. No module-global state: the registry is owned by the
//! orchestrator.

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{BilldeskAdapter, Gateway, RazorpayAdapter};
use crate::config::{Config, Environment};
use crate::models::{GatewayConfig, Provider};
use service_core::error::AppError;

struct CachedAdapter {
    version: i32,
    adapter: Arc<dyn Gateway>,
}

pub struct GatewayRegistry {
    environment: Environment,
    razorpay_base_url: Option<String>,
    billdesk_base_url: Option<String>,
    default_razorpay: Option<Arc<dyn Gateway>>,
    default_billdesk: Option<Arc<dyn Gateway>>,
    cache: DashMap<Uuid, CachedAdapter>,
}

impl GatewayRegistry {
    /// Build the registry and the platform-default adapters from env
    /// credentials. A provider with no default credentials stays usable for
    /// tenants that carry their own GatewayConfig.
    pub fn new(config: &Config) -> Self {
        let default_razorpay: Option<Arc<dyn Gateway>> = RazorpayAdapter::new(
            config.razorpay.key_id.clone(),
            config.razorpay.key_secret.clone(),
            config.razorpay.webhook_secret.clone(),
            config.razorpay.api_base_url.clone(),
        )
        .map(|a| Arc::new(a) as Arc<dyn Gateway>)
        .map_err(|e| {
            tracing::warn!(error = %e, "Razorpay default credentials not configured");
            e
        })
        .ok();

        let default_billdesk: Option<Arc<dyn Gateway>> = BilldeskAdapter::new(
            config.billdesk.api_key.clone(),
            config.billdesk.api_secret.clone(),
            config.billdesk.merchant_id.clone(),
            config.environment,
            config.billdesk.api_base_url.clone(),
        )
        .map(|a| Arc::new(a) as Arc<dyn Gateway>)
        .map_err(|e| {
            tracing::warn!(error = %e, "Billdesk default credentials not configured");
            e
        })
        .ok();

        Self {
            environment: config.environment,
            razorpay_base_url: config.razorpay.api_base_url.clone(),
            billdesk_base_url: config.billdesk.api_base_url.clone(),
            default_razorpay,
            default_billdesk,
            cache: DashMap::new(),
        }
    }

    /// Platform-default adapter for a provider. Used for webhook signature
    /// verification and for tenants without their own config.
    pub fn default_adapter(&self, provider: Provider) -> Result<Arc<dyn Gateway>, AppError> {
        let adapter = match provider {
            Provider::Razorpay => self.default_razorpay.clone(),
            Provider::Billdesk => self.default_billdesk.clone(),
        };
        adapter.ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "no default credentials configured for provider '{}'",
                provider
            ))
        })
    }

    /// Adapter for a tenant's stored config, cached until the config's
    /// version changes.
    pub fn adapter_for(&self, config: &GatewayConfig) -> Result<Arc<dyn Gateway>, AppError> {
        if let Some(entry) = self.cache.get(&config.config_id) {
            if entry.version == config.version {
                return Ok(entry.adapter.clone());
            }
        }

        let provider = Provider::parse(&config.provider).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("unknown provider '{}'", config.provider))
        })?;

        let adapter: Arc<dyn Gateway> = match provider {
            Provider::Razorpay => Arc::new(RazorpayAdapter::from_config(
                config,
                self.razorpay_base_url.clone(),
            )?),
            Provider::Billdesk => Arc::new(BilldeskAdapter::from_config(
                config,
                self.environment,
                self.billdesk_base_url.clone(),
            )?),
        };

        tracing::info!(
            config_id = %config.config_id,
            provider = %config.provider,
            version = config.version,
            "Gateway adapter (re)built"
        );

        self.cache.insert(
            config.config_id,
            CachedAdapter {
                version: config.version,
                adapter: adapter.clone(),
            },
        );

        Ok(adapter)
    }

    /// Resolve the adapter for an outbound call: the tenant's active config
    /// wins; otherwise fall back to platform defaults.
    pub fn resolve(
        &self,
        tenant_config: Option<&GatewayConfig>,
        provider: Provider,
    ) -> Result<Arc<dyn Gateway>, AppError> {
        match tenant_config {
            Some(config) => self.adapter_for(config),
            None => self.default_adapter(provider),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use secrecy::Secret;

    fn registry() -> GatewayRegistry {
        let mut config = Config::for_tests();
        config.razorpay.key_id = "rzp_test".to_string();
        config.razorpay.key_secret = Secret::new("secret".to_string());
        GatewayRegistry::new(&config)
    }

    fn tenant_config(version: i32) -> GatewayConfig {
        GatewayConfig {
            config_id: Uuid::parse_str("11111111-1111-4111-8111-111111111111").unwrap(),
            tenant_id: Uuid::new_v4(),
            provider: "razorpay".to_string(),
            is_active: true,
            api_key: "rzp_tenant".to_string(),
            api_secret: "tenant_secret".to_string(),
            provider_settings: Some(serde_json::json!({ "webhook_secret": "wh" })),
            version,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn cache_hits_on_same_version() {
        let registry = registry();
        let config = tenant_config(1);

        let first = registry.adapter_for(&config).unwrap();
        let second = registry.adapter_for(&config).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn version_bump_invalidates_cache() {
        let registry = registry();

        let first = registry.adapter_for(&tenant_config(1)).unwrap();
        let second = registry.adapter_for(&tenant_config(2)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unconfigured_default_provider_is_an_error() {
        let config = Config::for_tests();
        let registry = GatewayRegistry::new(&config);
        assert!(registry.default_adapter(Provider::Billdesk).is_err());
    }
}
