//! Tenant revenue account service.
//!
//! One account per (tenant, charge type). Totals are mutated only by the
//! payment orchestrator through the tx-scoped credit operations here, under
//! the account row lock.

use crate::models::{ChargeType, CreateAccount, TenantAccount, UpdateAccount};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::Database;
use service_core::error::AppError;
use sqlx::{Postgres, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = r#"account_id, tenant_id, charge_type, display_name, description,
    razorpay_account_id, billdesk_account_id, bank_account_name, bank_account_no, ifsc_code,
    is_active, total_collected_minor, total_refunded_minor, created_utc, updated_utc"#;

#[derive(Clone)]
pub struct AccountService {
    db: Database,
}

impl AccountService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a revenue account. Duplicate (tenant, charge_type) maps to a
    /// conflict.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, charge_type = %input.charge_type.as_str()))]
    pub async fn create(&self, input: &CreateAccount) -> Result<TenantAccount, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_account"])
            .start_timer();

        let account = sqlx::query_as::<_, TenantAccount>(&format!(
            r#"
            INSERT INTO tenant_accounts (
                account_id, tenant_id, charge_type, display_name, description,
                bank_account_name, bank_account_no, ifsc_code
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.charge_type.as_str())
        .bind(&input.display_name)
        .bind(&input.description)
        .bind(&input.bank_account_name)
        .bind(&input.bank_account_no)
        .bind(&input.ifsc_code)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "account for charge type '{}' already exists",
                    input.charge_type.as_str()
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create account: {}", e)),
        })?;

        timer.observe_duration();

        info!(account_id = %account.account_id, "Tenant account created");

        Ok(account)
    }

    /// Get an account by id within the tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, account_id = %account_id))]
    pub async fn get(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<TenantAccount>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_account"])
            .start_timer();

        let account = sqlx::query_as::<_, TenantAccount>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM tenant_accounts
            WHERE tenant_id = $1 AND account_id = $2
            "#
        ))
        .bind(tenant_id)
        .bind(account_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get account: {}", e)))?;

        timer.observe_duration();

        Ok(account)
    }

    /// Get the account for a charge type.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, charge_type = %charge_type.as_str()))]
    pub async fn get_by_charge_type(
        &self,
        tenant_id: Uuid,
        charge_type: ChargeType,
    ) -> Result<Option<TenantAccount>, AppError> {
        let account = sqlx::query_as::<_, TenantAccount>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM tenant_accounts
            WHERE tenant_id = $1 AND charge_type = $2
            "#
        ))
        .bind(tenant_id)
        .bind(charge_type.as_str())
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get account: {}", e)))?;

        Ok(account)
    }

    /// List all accounts for a tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list(&self, tenant_id: Uuid) -> Result<Vec<TenantAccount>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_accounts"])
            .start_timer();

        let accounts = sqlx::query_as::<_, TenantAccount>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM tenant_accounts
            WHERE tenant_id = $1
            ORDER BY charge_type
            "#
        ))
        .bind(tenant_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list accounts: {}", e)))?;

        timer.observe_duration();

        Ok(accounts)
    }

    /// Update metadata and bank details. Never touches totals or the
    /// charge type.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, account_id = %account_id))]
    pub async fn update(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        input: &UpdateAccount,
    ) -> Result<Option<TenantAccount>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_account"])
            .start_timer();

        let account = sqlx::query_as::<_, TenantAccount>(&format!(
            r#"
            UPDATE tenant_accounts
            SET display_name = COALESCE($3, display_name),
                description = COALESCE($4, description),
                bank_account_name = COALESCE($5, bank_account_name),
                bank_account_no = COALESCE($6, bank_account_no),
                ifsc_code = COALESCE($7, ifsc_code),
                is_active = COALESCE($8, is_active),
                updated_utc = NOW()
            WHERE tenant_id = $1 AND account_id = $2
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(account_id)
        .bind(&input.display_name)
        .bind(&input.description)
        .bind(&input.bank_account_name)
        .bind(&input.bank_account_no)
        .bind(&input.ifsc_code)
        .bind(input.is_active)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update account: {}", e)))?;

        timer.observe_duration();

        if let Some(ref acc) = account {
            info!(account_id = %acc.account_id, "Tenant account updated");
        }

        Ok(account)
    }

    /// Update per-provider external sub-account identifiers.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, account_id = %account_id))]
    pub async fn update_gateway_credentials(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        razorpay_account_id: Option<&str>,
        billdesk_account_id: Option<&str>,
    ) -> Result<Option<TenantAccount>, AppError> {
        let account = sqlx::query_as::<_, TenantAccount>(&format!(
            r#"
            UPDATE tenant_accounts
            SET razorpay_account_id = COALESCE($3, razorpay_account_id),
                billdesk_account_id = COALESCE($4, billdesk_account_id),
                updated_utc = NOW()
            WHERE tenant_id = $1 AND account_id = $2
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(account_id)
        .bind(razorpay_account_id)
        .bind(billdesk_account_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Failed to update gateway credentials: {}",
                e
            ))
        })?;

        Ok(account)
    }

    // -------------------------------------------------------------------------
    // Orchestrator-only, transaction-scoped operations
    // -------------------------------------------------------------------------

    /// Lock the account row for the tenant's charge type.
    pub async fn lock_by_charge_type(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        charge_type: ChargeType,
    ) -> Result<Option<TenantAccount>, AppError> {
        let account = sqlx::query_as::<_, TenantAccount>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM tenant_accounts
            WHERE tenant_id = $1 AND charge_type = $2
            FOR UPDATE
            "#
        ))
        .bind(tenant_id)
        .bind(charge_type.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock account: {}", e)))?;

        Ok(account)
    }

    /// Lock the account row for a state transition.
    pub async fn lock(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<TenantAccount>, AppError> {
        let account = sqlx::query_as::<_, TenantAccount>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM tenant_accounts
            WHERE tenant_id = $1 AND account_id = $2
            FOR UPDATE
            "#
        ))
        .bind(tenant_id)
        .bind(account_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock account: {}", e)))?;

        Ok(account)
    }

    /// Credit settled money to the account. Caller holds the row lock.
    pub async fn credit_collected(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: Uuid,
        amount_minor: i64,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE tenant_accounts
            SET total_collected_minor = total_collected_minor + $2, updated_utc = NOW()
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .bind(amount_minor)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to credit collected: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Integrity(anyhow::anyhow!(
                "account {} vanished during settlement",
                account_id
            )));
        }

        Ok(())
    }

    /// Credit refunded money to the account. The guard keeps
    /// total_refunded_minor within total_collected_minor; tripping it means
    /// a refund was applied that collections cannot cover.
    pub async fn credit_refunded(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: Uuid,
        amount_minor: i64,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE tenant_accounts
            SET total_refunded_minor = total_refunded_minor + $2, updated_utc = NOW()
            WHERE account_id = $1
              AND total_refunded_minor + $2 <= total_collected_minor
            "#,
        )
        .bind(account_id)
        .bind(amount_minor)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to credit refunded: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Integrity(anyhow::anyhow!(
                "refund on account {} exceeds collected total",
                account_id
            )));
        }

        Ok(())
    }
}
