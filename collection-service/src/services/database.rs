//! Database connection pool, webhook-event log, and gateway-config store.
//!
//! Domain row access lives with its service (accounts, invoices, payments);
//! this module owns the pool plus the two cross-cutting tables: the
//! webhook idempotency fence and per-tenant gateway credentials.

use crate::models::{GatewayConfig, WebhookApplyState};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "collection-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a transaction. All multi-row state transitions go through
    /// here so row locks and the webhook fence share one commit point.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Webhook Event Log
    // -------------------------------------------------------------------------

    /// Insert the dedup row for a gateway event. Returns false when the
    /// (provider, gateway_event_id) pair is already recorded, in which case
    /// the caller must treat the event as already applied.
    #[instrument(skip(self, tx, payload_hash), fields(provider = %provider, gateway_event_id = %gateway_event_id))]
    pub async fn insert_webhook_event(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        provider: &str,
        gateway_event_id: &str,
        signature_ok: bool,
        payload_hash: &str,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_webhook_event"])
            .start_timer();

        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, provider, gateway_event_id, signature_ok, payload_hash, apply_state)
            VALUES ($1, $2, $3, $4, $5, 'received')
            ON CONFLICT (provider, gateway_event_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(provider)
        .bind(gateway_event_id)
        .bind(signature_ok)
        .bind(payload_hash)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert webhook event: {}", e))
        })?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    /// Record the apply outcome for a webhook event.
    #[instrument(skip(self, tx), fields(provider = %provider, gateway_event_id = %gateway_event_id))]
    pub async fn set_webhook_event_state(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        provider: &str,
        gateway_event_id: &str,
        apply_state: WebhookApplyState,
        payment_id: Option<Uuid>,
        apply_error: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET apply_state = $3, payment_id = $4, apply_error = $5
            WHERE provider = $1 AND gateway_event_id = $2
            "#,
        )
        .bind(provider)
        .bind(gateway_event_id)
        .bind(apply_state.as_str())
        .bind(payment_id)
        .bind(apply_error)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update webhook event: {}", e))
        })?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Gateway Config Operations
    // -------------------------------------------------------------------------

    /// Upsert the active credentials for (tenant, provider). Bumps the
    /// version so cached adapters are rebuilt.
    #[instrument(skip(self, api_key, api_secret, provider_settings), fields(tenant_id = %tenant_id, provider = %provider))]
    pub async fn upsert_gateway_config(
        &self,
        tenant_id: Uuid,
        provider: &str,
        api_key: &str,
        api_secret: &str,
        provider_settings: Option<&serde_json::Value>,
    ) -> Result<GatewayConfig, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_gateway_config"])
            .start_timer();

        let existing = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT config_id FROM payment_gateway_configs
            WHERE tenant_id = $1 AND provider = $2 AND is_active
            "#,
        )
        .bind(tenant_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to look up gateway config: {}", e))
        })?;

        let config = if let Some(config_id) = existing {
            sqlx::query_as::<_, GatewayConfig>(
                r#"
                UPDATE payment_gateway_configs
                SET api_key = $2, api_secret = $3, provider_settings = $4,
                    version = version + 1, updated_utc = NOW()
                WHERE config_id = $1
                RETURNING config_id, tenant_id, provider, is_active, api_key, api_secret,
                    provider_settings, version, created_utc, updated_utc
                "#,
            )
            .bind(config_id)
            .bind(api_key)
            .bind(api_secret)
            .bind(provider_settings)
            .fetch_one(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, GatewayConfig>(
                r#"
                INSERT INTO payment_gateway_configs (
                    config_id, tenant_id, provider, is_active, api_key, api_secret, provider_settings
                )
                VALUES ($1, $2, $3, TRUE, $4, $5, $6)
                RETURNING config_id, tenant_id, provider, is_active, api_key, api_secret,
                    provider_settings, version, created_utc, updated_utc
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(provider)
            .bind(api_key)
            .bind(api_secret)
            .bind(provider_settings)
            .fetch_one(&self.pool)
            .await
        }
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "active gateway config already exists for provider '{}'",
                    provider
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to upsert gateway config: {}", e)),
        })?;

        timer.observe_duration();

        info!(config_id = %config.config_id, version = config.version, "Gateway config upserted");

        Ok(config)
    }

    /// Fetch the active config for (tenant, provider), if any.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, provider = %provider))]
    pub async fn get_active_gateway_config(
        &self,
        tenant_id: Uuid,
        provider: &str,
    ) -> Result<Option<GatewayConfig>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_active_gateway_config"])
            .start_timer();

        let config = sqlx::query_as::<_, GatewayConfig>(
            r#"
            SELECT config_id, tenant_id, provider, is_active, api_key, api_secret,
                provider_settings, version, created_utc, updated_utc
            FROM payment_gateway_configs
            WHERE tenant_id = $1 AND provider = $2 AND is_active
            "#,
        )
        .bind(tenant_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get gateway config: {}", e))
        })?;

        timer.observe_duration();

        Ok(config)
    }

    /// List the tenant's configs. Secrets stay out of serialized output at
    /// the model layer.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_gateway_configs(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<GatewayConfig>, AppError> {
        let configs = sqlx::query_as::<_, GatewayConfig>(
            r#"
            SELECT config_id, tenant_id, provider, is_active, api_key, api_secret,
                provider_settings, version, created_utc, updated_utc
            FROM payment_gateway_configs
            WHERE tenant_id = $1
            ORDER BY provider
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list gateway configs: {}", e))
        })?;

        Ok(configs)
    }
}
