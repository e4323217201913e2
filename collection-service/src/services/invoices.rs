//! Client invoice service.
//!
//! Invoices are created `issued` with an allocated invoice number and are
//! mutated afterwards only by the payment orchestrator applying a settled
//! payment, or by an explicit void while unpaid.

use chrono::{NaiveDate, Utc};
use sqlx::{Postgres, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::invoice_number::format_invoice_number;
use crate::models::{ChargeType, CreateInvoice, Invoice, InvoiceStatus};
use crate::services::metrics::{DB_QUERY_DURATION, INVOICES_TOTAL};
use crate::services::Database;
use service_core::error::AppError;

const INVOICE_COLUMNS: &str = r#"invoice_id, tenant_id, client_id, client_name, client_email,
    client_phone, charge_type, invoice_number, amount_minor, paid_minor, outstanding_minor,
    currency, description, invoice_date, due_date, status, metadata, created_utc, updated_utc"#;

#[derive(Clone)]
pub struct InvoiceService {
    db: Database,
}

impl InvoiceService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Allocate the next invoice sequence value for a tenant. Runs inside
    /// the caller's transaction; a rollback burns the number (gap-tolerant
    /// by design).
    async fn next_sequence(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
    ) -> Result<i64, AppError> {
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO invoice_sequences (tenant_id, next_seq)
            VALUES ($1, 1)
            ON CONFLICT (tenant_id)
            DO UPDATE SET next_seq = invoice_sequences.next_seq + 1
            RETURNING next_seq
            "#,
        )
        .bind(tenant_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to allocate invoice number: {}", e))
        })?;

        Ok(seq)
    }

    async fn insert_invoice(
        tx: &mut Transaction<'_, Postgres>,
        input: &CreateInvoice,
    ) -> Result<Invoice, AppError> {
        let seq = Self::next_sequence(tx, input.tenant_id).await?;
        let invoice_number = format_invoice_number(input.tenant_id, input.invoice_date, seq);

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO client_invoices (
                invoice_id, tenant_id, client_id, client_name, client_email, client_phone,
                charge_type, invoice_number, amount_minor, paid_minor, outstanding_minor,
                currency, description, invoice_date, due_date, status, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $9, $10, $11, $12, $13, 'issued', $14)
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.client_id)
        .bind(&input.client_name)
        .bind(&input.client_email)
        .bind(&input.client_phone)
        .bind(input.charge_type.as_str())
        .bind(&invoice_number)
        .bind(input.amount_minor)
        .bind(&input.currency)
        .bind(&input.description)
        .bind(input.invoice_date)
        .bind(input.due_date)
        .bind(&input.metadata)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "invoice number '{}' already exists",
                    invoice_number
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)),
        })?;

        Ok(invoice)
    }

    /// Create a single invoice, issued immediately.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, client_id = %input.client_id))]
    pub async fn create(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self.db.begin().await?;
        let invoice = Self::insert_invoice(&mut tx, input).await?;
        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit invoice: {}", e))
        })?;

        timer.observe_duration();
        INVOICES_TOTAL.with_label_values(&["issued"]).inc();

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            amount_minor = invoice.amount_minor,
            "Invoice issued"
        );

        Ok(invoice)
    }

    /// Create a batch of invoices in one transaction. All-or-nothing: any
    /// failure rolls back every row and every burned sequence number.
    #[instrument(skip(self, inputs), fields(tenant_id = %tenant_id, count = inputs.len()))]
    pub async fn create_bulk(
        &self,
        tenant_id: Uuid,
        inputs: &[CreateInvoice],
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_bulk_invoices"])
            .start_timer();

        let mut tx = self.db.begin().await?;
        let mut invoices = Vec::with_capacity(inputs.len());

        for input in inputs {
            if input.tenant_id != tenant_id {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "bulk invoice item for a different tenant"
                )));
            }
            invoices.push(Self::insert_invoice(&mut tx, input).await?);
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit bulk invoices: {}", e))
        })?;

        timer.observe_duration();
        INVOICES_TOTAL
            .with_label_values(&["issued"])
            .inc_by(invoices.len() as f64);

        info!(count = invoices.len(), "Bulk invoices issued");

        Ok(invoices)
    }

    /// Get an invoice by id within the tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn get(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM client_invoices
            WHERE tenant_id = $1 AND invoice_id = $2
            "#
        ))
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// All invoices for a client, newest first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, client_id = %client_id))]
    pub async fn list_by_client(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
    ) -> Result<Vec<Invoice>, AppError> {
        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM client_invoices
            WHERE tenant_id = $1 AND client_id = $2
            ORDER BY invoice_date DESC, created_utc DESC
            "#
        ))
        .bind(tenant_id)
        .bind(client_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        Ok(invoices)
    }

    /// Invoices filtered by charge type, newest first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, charge_type = %charge_type.as_str()))]
    pub async fn list_by_charge_type(
        &self,
        tenant_id: Uuid,
        charge_type: ChargeType,
    ) -> Result<Vec<Invoice>, AppError> {
        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM client_invoices
            WHERE tenant_id = $1 AND charge_type = $2
            ORDER BY invoice_date DESC, created_utc DESC
            "#
        ))
        .bind(tenant_id)
        .bind(charge_type.as_str())
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        Ok(invoices)
    }

    /// Unpaid and partially paid invoices for a client, earliest due first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, client_id = %client_id))]
    pub async fn list_outstanding(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
    ) -> Result<Vec<Invoice>, AppError> {
        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM client_invoices
            WHERE tenant_id = $1 AND client_id = $2
              AND outstanding_minor > 0 AND status <> 'void'
            ORDER BY due_date ASC
            "#
        ))
        .bind(tenant_id)
        .bind(client_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list outstanding invoices: {}", e))
        })?;

        Ok(invoices)
    }

    /// Void an invoice. Only legal while nothing has been paid against it.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn void(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let mut tx = self.db.begin().await?;

        let invoice = Self::lock(&mut tx, tenant_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("invoice not found")))?;

        if invoice.paid_minor > 0 {
            return Err(AppError::InvalidState {
                current: invoice.status.clone(),
                message: "cannot void an invoice with recorded payments".to_string(),
            });
        }
        if invoice.status == "void" {
            return Err(AppError::InvalidState {
                current: invoice.status.clone(),
                message: "invoice is already void".to_string(),
            });
        }

        let voided = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE client_invoices
            SET status = 'void', updated_utc = NOW()
            WHERE tenant_id = $1 AND invoice_id = $2
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to void invoice: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit void: {}", e))
        })?;

        INVOICES_TOTAL.with_label_values(&["void"]).inc();
        info!(invoice_id = %invoice_id, "Invoice voided");

        Ok(voided)
    }

    // -------------------------------------------------------------------------
    // Orchestrator-only, transaction-scoped operations
    // -------------------------------------------------------------------------

    /// Lock the invoice row for a state transition.
    pub async fn lock(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM client_invoices
            WHERE tenant_id = $1 AND invoice_id = $2
            FOR UPDATE
            "#
        ))
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock invoice: {}", e)))?;

        Ok(invoice)
    }

    /// Apply a settled payment to a locked invoice. Caller holds the row
    /// lock; the `outstanding_minor >= amount` guard makes over-application
    /// impossible even so.
    pub async fn apply_payment(
        tx: &mut Transaction<'_, Postgres>,
        invoice: &Invoice,
        amount_minor: i64,
    ) -> Result<Invoice, AppError> {
        if amount_minor > invoice.outstanding_minor {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "payment of {} exceeds outstanding {} on invoice {}",
                amount_minor,
                invoice.outstanding_minor,
                invoice.invoice_number
            )));
        }

        let new_paid = invoice.paid_minor + amount_minor;
        let status = InvoiceStatus::derive(
            new_paid,
            invoice.amount_minor,
            invoice.due_date,
            Utc::now().date_naive(),
        );

        let updated = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE client_invoices
            SET paid_minor = paid_minor + $3,
                outstanding_minor = GREATEST(0, outstanding_minor - $3),
                status = $4,
                updated_utc = NOW()
            WHERE tenant_id = $1 AND invoice_id = $2 AND outstanding_minor >= $3
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice.tenant_id)
        .bind(invoice.invoice_id)
        .bind(amount_minor)
        .bind(status.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to apply payment: {}", e)))?
        .ok_or_else(|| {
            AppError::Conflict(anyhow::anyhow!(
                "payment application lost to a concurrent update on invoice {}",
                invoice.invoice_number
            ))
        })?;

        if status == InvoiceStatus::Paid {
            INVOICES_TOTAL.with_label_values(&["paid"]).inc();
        }

        Ok(updated)
    }

    /// Refresh the overdue flag for display. Derivation is deterministic
    /// from stored amounts, so this is a read-side convenience.
    pub fn display_status(invoice: &Invoice, today: NaiveDate) -> InvoiceStatus {
        if invoice.status == "void" {
            return InvoiceStatus::Void;
        }
        InvoiceStatus::derive(
            invoice.paid_minor,
            invoice.amount_minor,
            invoice.due_date,
            today,
        )
    }
}
