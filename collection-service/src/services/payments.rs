//! Payment and refund row store.
//!
//! Every state transition goes through a guarded UPDATE with the expected
//! current state in the WHERE clause; together with the `FOR UPDATE` row
//! lock taken by the orchestrator this makes illegal edges unrepresentable
//! in the database.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use crate::models::{CreatePayment, Payment, PaymentState, Refund, RefundState};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::Database;
use service_core::error::AppError;

const PAYMENT_COLUMNS: &str = r#"payment_id, tenant_id, client_id, invoice_id, account_id,
    charge_type, order_id, amount_minor, currency, state, provider, method, gateway_order_id,
    gateway_payment_id, last_gateway_event_id, client_name, client_email, client_phone,
    hosted_payment_url, receipt_url, idempotency_key, error_code, error_message, created_utc,
    updated_utc, processed_utc, expires_utc"#;

const REFUND_COLUMNS: &str = r#"refund_id, payment_id, tenant_id, amount_minor, state,
    gateway_refund_id, reason, created_utc, updated_utc, processed_utc"#;

#[derive(Clone)]
pub struct PaymentStore {
    db: Database,
}

impl PaymentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a payment row in state `created` inside the caller's
    /// transaction.
    pub async fn insert_created(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        input: &CreatePayment,
    ) -> Result<Payment, AppError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO client_payments (
                payment_id, tenant_id, client_id, invoice_id, account_id, charge_type,
                order_id, amount_minor, currency, state, provider, method,
                client_name, client_email, client_phone, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'created', $10, $11, $12, $13, $14, $15)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.client_id)
        .bind(input.invoice_id)
        .bind(input.account_id)
        .bind(input.charge_type.as_str())
        .bind(Uuid::new_v4())
        .bind(input.amount_minor)
        .bind(&input.currency)
        .bind(input.provider.as_str())
        .bind(input.method.as_str())
        .bind(&input.client_name)
        .bind(&input.client_email)
        .bind(&input.client_phone)
        .bind(&input.idempotency_key)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("duplicate payment for idempotency key"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert payment: {}", e)),
        })?;

        Ok(payment)
    }

    /// Look up an earlier initiate with the same idempotency key.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn find_by_idempotency_key(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM client_payments
            WHERE tenant_id = $1 AND invoice_id = $2 AND idempotency_key = $3
            "#
        ))
        .bind(tenant_id)
        .bind(invoice_id)
        .bind(idempotency_key)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to look up payment: {}", e)))?;

        Ok(payment)
    }

    /// Get a payment by id within the tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn get(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM client_payments
            WHERE tenant_id = $1 AND payment_id = $2
            "#
        ))
        .bind(tenant_id)
        .bind(payment_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        timer.observe_duration();

        Ok(payment)
    }

    /// Lock a payment row by id.
    pub async fn lock(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM client_payments
            WHERE tenant_id = $1 AND payment_id = $2
            FOR UPDATE
            "#
        ))
        .bind(tenant_id)
        .bind(payment_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock payment: {}", e)))?;

        Ok(payment)
    }

    /// Lock a payment row by its gateway order id. Webhooks arrive without
    /// tenant context; (provider, gateway_order_id) is globally unique.
    pub async fn lock_by_gateway_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        provider: &str,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM client_payments
            WHERE provider = $1 AND gateway_order_id = $2
            FOR UPDATE
            "#
        ))
        .bind(provider)
        .bind(gateway_order_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock payment: {}", e)))?;

        Ok(payment)
    }

    /// created -> authorized_pending once the gateway order exists.
    pub async fn mark_authorized(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        payment_id: Uuid,
        gateway_order_id: &str,
        hosted_url: &str,
        expires_utc: Option<DateTime<Utc>>,
    ) -> Result<Payment, AppError> {
        let updated = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE client_payments
            SET state = 'authorized_pending', gateway_order_id = $2, hosted_payment_url = $3,
                expires_utc = $4, updated_utc = NOW()
            WHERE payment_id = $1 AND state = 'created'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .bind(gateway_order_id)
        .bind(hosted_url)
        .bind(expires_utc)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to authorize payment: {}", e)))?;

        updated.ok_or_else(|| AppError::InvalidState {
            current: "unknown".to_string(),
            message: format!("payment {} left 'created' before authorization", payment_id),
        })
    }

    /// Guarded terminal transition. `from` must be the observed (locked)
    /// state; zero rows affected means the row moved underneath us, which
    /// the payment row lock is supposed to prevent.
    #[allow(clippy::too_many_arguments)]
    pub async fn transition(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        payment_id: Uuid,
        from: PaymentState,
        to: PaymentState,
        gateway_payment_id: Option<&str>,
        gateway_event_id: Option<&str>,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<Payment, AppError> {
        if !from.can_transition(to) {
            return Err(AppError::InvalidState {
                current: from.as_str().to_string(),
                message: format!("transition to '{}' is not permitted", to),
            });
        }

        let processed = to.is_terminal();
        let updated = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE client_payments
            SET state = $3,
                gateway_payment_id = COALESCE($4, gateway_payment_id),
                last_gateway_event_id = COALESCE($5, last_gateway_event_id),
                error_code = $6,
                error_message = $7,
                processed_utc = CASE WHEN $8::bool THEN NOW() ELSE processed_utc END,
                updated_utc = NOW()
            WHERE payment_id = $1 AND state = $2
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(gateway_payment_id)
        .bind(gateway_event_id)
        .bind(error_code)
        .bind(error_message)
        .bind(processed)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to transition payment: {}", e)))?;

        updated.ok_or_else(|| {
            AppError::Integrity(anyhow::anyhow!(
                "payment {} changed state under an exclusive lock",
                payment_id
            ))
        })
    }

    /// Payments against an invoice, newest first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn list_by_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM client_payments
            WHERE tenant_id = $1 AND invoice_id = $2
            ORDER BY created_utc DESC
            "#
        ))
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        Ok(payments)
    }

    /// Paginated payment history for a client.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, client_id = %client_id))]
    pub async fn list_by_client(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Payment>, i64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM client_payments WHERE tenant_id = $1 AND client_id = $2",
        )
        .bind(tenant_id)
        .bind(client_id)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count payments: {}", e)))?;

        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM client_payments
            WHERE tenant_id = $1 AND client_id = $2
            ORDER BY created_utc DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(tenant_id)
        .bind(client_id)
        .bind(limit.clamp(1, 100))
        .bind(offset.max(0))
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        timer.observe_duration();

        Ok((payments, total))
    }

    /// AUTHORIZED_PENDING payments whose webhook has been silent beyond the
    /// threshold. Crosses tenants: the reconcile sweep owns the whole fleet.
    #[instrument(skip(self))]
    pub async fn list_stale_authorized(
        &self,
        stale_after_minutes: i64,
        limit: i64,
    ) -> Result<Vec<Payment>, AppError> {
        let cutoff = Utc::now() - Duration::minutes(stale_after_minutes);
        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM client_payments
            WHERE state = 'authorized_pending' AND created_utc < $1
            ORDER BY created_utc
            LIMIT $2
            "#
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list stale payments: {}", e))
        })?;

        Ok(payments)
    }

    // -------------------------------------------------------------------------
    // Refunds
    // -------------------------------------------------------------------------

    /// Insert a refund row in state `pending` before the gateway call.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn insert_refund_pending(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
        amount_minor: i64,
        reason: &str,
    ) -> Result<Refund, AppError> {
        let refund = sqlx::query_as::<_, Refund>(&format!(
            r#"
            INSERT INTO refunds (refund_id, payment_id, tenant_id, amount_minor, state, reason)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING {REFUND_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(payment_id)
        .bind(tenant_id)
        .bind(amount_minor)
        .bind(reason)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert refund: {}", e)))?;

        Ok(refund)
    }

    /// Mark a pending refund successful inside the settlement transaction.
    pub async fn mark_refund_successful(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        refund_id: Uuid,
        gateway_refund_id: &str,
    ) -> Result<Refund, AppError> {
        let refund = sqlx::query_as::<_, Refund>(&format!(
            r#"
            UPDATE refunds
            SET state = 'successful', gateway_refund_id = $2,
                processed_utc = NOW(), updated_utc = NOW()
            WHERE refund_id = $1 AND state = 'pending'
            RETURNING {REFUND_COLUMNS}
            "#
        ))
        .bind(refund_id)
        .bind(gateway_refund_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update refund: {}", e)))?;

        refund.ok_or_else(|| {
            AppError::Integrity(anyhow::anyhow!("refund {} was not pending", refund_id))
        })
    }

    /// Mark a pending refund failed after a gateway rejection.
    pub async fn mark_refund_failed(&self, refund_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE refunds
            SET state = 'failed', processed_utc = NOW(), updated_utc = NOW()
            WHERE refund_id = $1 AND state = 'pending'
            "#,
        )
        .bind(refund_id)
        .execute(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fail refund: {}", e)))?;

        Ok(())
    }

    /// Sum of successful refund amounts for a payment. Serialized by the
    /// payment row lock held by the caller.
    pub async fn sum_successful_refunds(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        payment_id: Uuid,
    ) -> Result<i64, AppError> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_minor), 0)::BIGINT
            FROM refunds
            WHERE payment_id = $1 AND state = $2
            "#,
        )
        .bind(payment_id)
        .bind(RefundState::Successful.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum refunds: {}", e)))?;

        Ok(total.unwrap_or(0))
    }

    /// Refunds for a payment, newest first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn list_refunds(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Vec<Refund>, AppError> {
        let refunds = sqlx::query_as::<_, Refund>(&format!(
            r#"
            SELECT {REFUND_COLUMNS}
            FROM refunds
            WHERE tenant_id = $1 AND payment_id = $2
            ORDER BY created_utc DESC
            "#
        ))
        .bind(tenant_id)
        .bind(payment_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list refunds: {}", e)))?;

        Ok(refunds)
    }
}
